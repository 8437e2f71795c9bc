use pfa_event::EventError;
use thiserror::Error;

/// Result type for fragment removal
pub type Result<T> = std::result::Result<T, FragmentError>;

/// Errors that abort a fragment-removal pass
#[derive(Error, Debug)]
pub enum FragmentError {
    /// A configured value cannot be used, e.g. a zero denominator
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Internal bookkeeping is inconsistent; indicates a bug in the contact graph
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Failure reported by the event container or a geometric query
    #[error("Event error: {0}")]
    Propagation(#[from] EventError),
}

impl FragmentError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
