//! Fragment removal for calorimeter clusters.
//!
//! Clustering tends to split the shower of a charged hadron into a
//! track-associated core and several trackless fragments. This crate
//! decides which fragments belong to which track-anchored parent and merges
//! them, one pair at a time:
//!
//! 1. [`ContactGraphBuilder`] records a [`ClusterContact`] for every
//!    admissible (daughter, parent) pair.
//! 2. [`MergeSelector`] weighs each contact's total evidence against the
//!    evidence it is required to show and picks the largest excess.
//! 3. The pair is merged; [`affected_clusters`] names the contacts that must
//!    be rebuilt before the next pass.
//!
//! [`MainFragmentRemoval`] drives the loop until no pair qualifies.

mod algorithm;
mod config;
mod contact;
mod contact_map;
mod context;
mod error;
pub mod evidence;
mod invalidator;
mod selector;

pub use algorithm::{FragmentRemovalReport, LoopState, MainFragmentRemoval, MergeRecord};
pub use config::{ContactParameters, FragmentRemovalConfig};
pub use contact::{contact_layers, ClusterContact};
pub use contact_map::{AffectedClusters, BuildScope, ContactGraphBuilder, ContactMap};
pub use context::RunContext;
pub use error::{FragmentError, Result};
pub use evidence::{EvidenceModel, RequiredEvidence};
pub use invalidator::affected_clusters;
pub use selector::{preselect, MergeCandidate, MergeSelector, Preselection};
