//! Error types for session storage

use thiserror::Error;

/// Result type for session store operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Session store errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Could not obtain a backend connection
    #[error("Session backend unavailable: {0}")]
    Unavailable(String),

    /// Backend command failed
    #[error("Session backend error during '{operation}': {reason}")]
    Backend { operation: String, reason: String },

    /// Record could not be encoded
    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store configuration is unusable
    #[error("Invalid session store configuration: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// Create a backend error
    pub fn backend(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if a retry could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Backend { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = SessionError::backend("load", "connection reset");
        assert!(err.to_string().contains("load"));
        assert!(err.to_string().contains("connection reset"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_config_error_not_recoverable() {
        let err = SessionError::InvalidConfig("ttl_secs must be positive".to_string());
        assert!(!err.is_recoverable());
    }
}
