//! Unified error handling for ral
//!
//! Every layer (pool, strategies, collaborators, HTTP) reports failures
//! through one error type so they can be mapped to distinguishable responses.

use std::fmt;

use super::model::WorkId;

/// Unified error types for the aggregation engine
#[derive(Debug)]
pub enum RalError {
    /// The worker pool refused admission of a task
    PoolSaturated(String),

    /// A lookup/cache/compute/trend call failed or timed out
    Collaborator { item: WorkId, reason: String },

    /// Work cancelled because a sibling in the same request failed
    Cancelled(String),

    /// The request deadline elapsed
    Timeout(String),

    /// Configuration-related errors
    Configuration(String),

    /// Invalid request input
    Validation(String),

    /// Network and I/O errors
    Network(std::io::Error),

    /// Outbound HTTP client errors
    Http(reqwest::Error),

    /// JSON encoding errors
    Serialization(serde_json::Error),

    /// Internal system errors
    Internal(String),

    /// Pingora framework errors
    Pingora(Box<pingora_error::Error>),
}

impl RalError {
    /// Stable machine-readable name, used for metrics labels and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            RalError::PoolSaturated(_) => "pool_saturated",
            RalError::Collaborator { .. } => "collaborator_failure",
            RalError::Cancelled(_) => "cancelled_by_peer",
            RalError::Timeout(_) => "timeout",
            RalError::Configuration(_) => "configuration",
            RalError::Validation(_) => "validation",
            RalError::Network(_) => "network",
            RalError::Http(_) => "http",
            RalError::Serialization(_) => "serialization",
            RalError::Internal(_) => "internal",
            RalError::Pingora(_) => "pingora",
        }
    }

    /// Attribute a raw collaborator error to the work item that raised it.
    ///
    /// Pool, cancellation and already-attributed errors pass through unchanged.
    pub fn for_item(self, item: WorkId) -> Self {
        match self {
            RalError::PoolSaturated(_)
            | RalError::Cancelled(_)
            | RalError::Timeout(_)
            | RalError::Collaborator { .. } => self,
            other => RalError::Collaborator {
                item,
                reason: other.to_string(),
            },
        }
    }

    /// True for errors that are only a consequence of another failure.
    pub fn is_secondary(&self) -> bool {
        matches!(self, RalError::Cancelled(_))
    }
}

impl fmt::Display for RalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RalError::PoolSaturated(pool) => write!(f, "Pool saturated: {pool} rejected task"),
            RalError::Collaborator { item, reason } => {
                write!(f, "Collaborator failure in {item}: {reason}")
            }
            RalError::Cancelled(msg) => write!(f, "Cancelled by peer: {msg}"),
            RalError::Timeout(msg) => write!(f, "Timed out: {msg}"),
            RalError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            RalError::Validation(msg) => write!(f, "Validation error: {msg}"),
            RalError::Network(err) => write!(f, "Network error: {err}"),
            RalError::Http(err) => write!(f, "HTTP client error: {err}"),
            RalError::Serialization(err) => write!(f, "Serialization error: {err}"),
            RalError::Internal(msg) => write!(f, "Internal error: {msg}"),
            RalError::Pingora(err) => write!(f, "Pingora error: {err}"),
        }
    }
}

impl std::error::Error for RalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RalError::Network(err) => Some(err),
            RalError::Http(err) => Some(err),
            RalError::Serialization(err) => Some(err),
            RalError::Pingora(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

// Error conversions
impl From<std::io::Error> for RalError {
    fn from(err: std::io::Error) -> Self {
        RalError::Network(err)
    }
}

impl From<reqwest::Error> for RalError {
    fn from(err: reqwest::Error) -> Self {
        RalError::Http(err)
    }
}

impl From<serde_json::Error> for RalError {
    fn from(err: serde_json::Error) -> Self {
        RalError::Serialization(err)
    }
}

impl From<Box<pingora_error::Error>> for RalError {
    fn from(err: Box<pingora_error::Error>) -> Self {
        RalError::Pingora(err)
    }
}

/// Result type alias for engine operations
pub type RalResult<T> = std::result::Result<T, RalError>;

/// Convenience macros for error creation
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::error::RalError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::RalError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::core::error::RalError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::RalError::Internal(format!($fmt, $($arg)*))
    };
}
