//! Error taxonomy shared by every funnel operation

use thiserror::Error;

use crate::cnf::ParseError;

/// Errors that can occur while building, addressing or evaluating funnels
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FunnelError {
    /// Unknown field, value, key or funnel id
    #[error("not found: {0}")]
    NotFound(String),

    /// Too many terms or children for one compiled predicate
    #[error("capacity exceeded: {what} {index} is beyond the limit of {limit}")]
    Capacity {
        what: String,
        index: usize,
        limit: usize,
    },

    /// Malformed query string, key serialization or persisted index
    #[error("format error: {0}")]
    Format(String),

    /// The evaluator reported a failure
    #[error("engine error: {0}")]
    Engine(String),
}

impl From<ParseError> for FunnelError {
    fn from(err: ParseError) -> Self {
        FunnelError::Format(err.to_string())
    }
}

impl From<serde_json::Error> for FunnelError {
    fn from(err: serde_json::Error) -> Self {
        FunnelError::Format(err.to_string())
    }
}

/// Result type for funnel operations
pub type FunnelResult<T> = Result<T, FunnelError>;
