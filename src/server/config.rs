//! Server configuration

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

fn default_bind_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Configuration for the HTTP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable CORS for API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,

    /// API key guarding the settings endpoints (optional)
    pub api_key: Option<String>,

    /// Interval between housekeeping sweeps in seconds
    pub maintenance_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            enable_cors: true,
            enable_request_logging: true,
            api_key: None,
            maintenance_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maintenance_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maintenance_interval_secs".to_string(),
                reason: "Must be at least 1 second".to_string(),
            });
        }

        if matches!(&self.api_key, Some(key) if key.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "api_key".to_string(),
                reason: "Must not be blank; omit it to disable the check".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
