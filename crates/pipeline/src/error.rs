use pfa_event::EventError;
use pfa_fragment::FragmentError;
use pfa_topology::TopologyError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Fragment removal failed: {0}")]
    Fragment(#[from] FragmentError),

    #[error("Topological association failed: {0}")]
    Topology(#[from] TopologyError),

    #[error("Report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
