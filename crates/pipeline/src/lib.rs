//! Configurable chain of cluster-association algorithms.
//!
//! A [`PipelineConfig`] names the algorithms to run; the
//! [`AlgorithmRegistry`] turns each name into a configured [`Algorithm`],
//! and [`Pipeline::run`] applies them to an event in order.

mod algorithm;
mod config;
mod error;
mod pipeline;
mod registry;

pub use algorithm::{
    Algorithm, AlgorithmReport, MergeSummary, LOOPING_TRACKS, MAIN_FRAGMENT_REMOVAL, MUON_RECONSTRUCTION,
};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
pub use registry::{AlgorithmFactory, AlgorithmRegistry};
