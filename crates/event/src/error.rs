use thiserror::Error;

use crate::types::{ClusterId, TrackId};

/// Result type for event container operations
pub type Result<T> = std::result::Result<T, EventError>;

/// Errors raised by the event container and its geometric helpers
#[derive(Error, Debug)]
pub enum EventError {
    /// Cluster handle does not resolve to a live cluster
    #[error("Cluster not found: {0}")]
    ClusterNotFound(ClusterId),

    /// Track handle does not resolve to a known track
    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    /// Named hit list is absent from the event
    #[error("Hit list not found: {0}")]
    HitListNotFound(String),

    /// A cluster cannot be merged into itself
    #[error("Cannot merge cluster {0} into itself")]
    SelfMerge(ClusterId),

    /// Geometric query received unusable input
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// IO error while reading or writing an event file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed event document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EventError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// True for the "nothing there" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ClusterNotFound(_) | Self::TrackNotFound(_) | Self::HitListNotFound(_)
        )
    }
}
