//! Unified error handling for the adrotate crate
//!
//! Domain modules keep their own error types; this module folds them into a
//! single [`Error`] for use across module boundaries.
//!
//! # Architecture
//!
//! - [`AdrotateErrorTrait`] - Common interface implemented by crate errors
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use adrotate::error::{AdrotateErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = %err.category(), "Retrying: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::fmt;
use thiserror::Error;

pub use crate::server::ServerError;
pub use crate::session::SessionError;

/// Common trait for adrotate error types
pub trait AdrotateErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Session store errors
    Storage,
    /// Listener and socket errors
    Network,
    /// Malformed session records
    Parsing,
    /// Configuration and validation errors
    Config,
}

impl ErrorCategory {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unified error type for the adrotate crate
#[derive(Error, Debug)]
pub enum Error {
    /// Session store errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// HTTP server errors
    #[error("{0}")]
    Server(#[from] ServerError),
}

impl AdrotateErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Session(e) => e.is_recoverable(),
            Self::Server(ServerError::BindError(_)) => true,
            Self::Server(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Session(SessionError::InvalidConfig(_)) => ErrorCategory::Config,
            Self::Session(SessionError::Serialization(_)) => ErrorCategory::Parsing,
            Self::Session(_) => ErrorCategory::Storage,
            Self::Server(ServerError::ConfigError(_)) => ErrorCategory::Config,
            Self::Server(_) => ErrorCategory::Network,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
