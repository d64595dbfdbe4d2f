//! Visitor session storage
//!
//! The rotation engine is storage-agnostic; it only needs one record per
//! visitor that can be loaded at the start of a request and saved at the end.
//! This module defines that contract and ships two backends.
//!
//! # Backends
//!
//! | Backend | Lifetime | Notes |
//! |---------|----------|-------|
//! | `memory` | process | Idle TTL, purged by a background task |
//! | `redis` | shared | `SET EX` per record, expiry handled by Redis |
//!
//! # Usage
//!
//! ```rust,ignore
//! use adrotate::session::{build_store, SessionConfig, SessionId};
//!
//! let store = build_store(&SessionConfig::default()).await?;
//! let id = SessionId::generate();
//! let state = store.load(&id).await?.unwrap_or_default();
//! store.save(&id, &state).await?;
//! ```

pub mod error;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::rotation::RotationState;

pub use error::{SessionError, SessionResult};
pub use memory::InMemorySessionStore;
pub use self::redis::RedisSessionStore;

// ============================================================================
// Session Id
// ============================================================================

/// Opaque visitor session identifier (UUID v4 text)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a new random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied id only if it is a well-formed UUID
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim())
            .ok()
            .map(|uuid| Self(uuid.hyphenated().to_string()))
    }

    /// Borrow as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Store Contract
// ============================================================================

/// Load/save access to per-session rotation records
///
/// Implementations must keep sessions isolated from each other and make a
/// save visible to the next load of the same id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the record for `id`, `None` if the session is new or expired
    async fn load(&self, id: &SessionId) -> SessionResult<Option<RotationState>>;

    /// Persist the record for `id`, refreshing its expiry
    async fn save(&self, id: &SessionId, state: &RotationState) -> SessionResult<()>;

    /// Drop the record for `id`
    async fn remove(&self, id: &SessionId) -> SessionResult<()>;

    /// Remove expired records, returning how many were dropped
    async fn purge_expired(&self) -> SessionResult<usize>;

    /// Number of live records
    async fn count(&self) -> SessionResult<usize>;

    /// Backend identifier for logs and stats
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Configuration
// ============================================================================

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// In-process map
    #[default]
    Memory,
    /// Shared Redis instance
    Redis,
}

impl SessionBackend {
    /// Parse from a config or environment string
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "memory" | "mem" | "in-memory" => Some(Self::Memory),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }
}

impl fmt::Display for SessionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Storage backend
    pub backend: SessionBackend,

    /// Cookie carrying the session id
    pub cookie_name: String,

    /// Idle lifetime of a record in seconds (default: 24 hours)
    pub ttl_secs: u64,

    /// Redis URL (e.g., redis://localhost:6379)
    pub redis_url: String,

    /// Redis key prefix for namespacing
    pub key_prefix: String,

    /// Redis connection pool size
    pub pool_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            cookie_name: "adrotate_session".to_string(),
            ttl_secs: 86400,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "adrotate".to_string(),
            pool_size: 10,
        }
    }
}

impl SessionConfig {
    /// Validate the configuration
    pub fn validate(&self) -> SessionResult<()> {
        if self.ttl_secs == 0 {
            return Err(SessionError::InvalidConfig(
                "ttl_secs must be greater than 0".to_string(),
            ));
        }

        if !is_valid_cookie_name(&self.cookie_name) {
            return Err(SessionError::InvalidConfig(format!(
                "Invalid cookie name: '{}'",
                self.cookie_name
            )));
        }

        if self.backend == SessionBackend::Redis && self.pool_size == 0 {
            return Err(SessionError::InvalidConfig(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Build the configured store
pub async fn build_store(config: &SessionConfig) -> SessionResult<Arc<dyn SessionStore>> {
    config.validate()?;

    let store: Arc<dyn SessionStore> = match config.backend {
        SessionBackend::Memory => Arc::new(InMemorySessionStore::new(config.ttl_secs)),
        SessionBackend::Redis => Arc::new(RedisSessionStore::new(config).await?),
    };

    tracing::info!(backend = store.backend_name(), ttl_secs = config.ttl_secs, "Session store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_parseable() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("not-a-uuid").is_none());
        assert!(SessionId::parse("../../etc/passwd").is_none());
    }

    #[test]
    fn test_parse_normalizes_case() {
        let id = SessionId::parse("  67E55044-10B1-426F-9247-BB680E5FE0C8 ").unwrap();
        assert_eq!(id.as_str(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn test_backend_from_name() {
        assert_eq!(SessionBackend::from_name("Memory"), Some(SessionBackend::Memory));
        assert_eq!(SessionBackend::from_name("redis"), Some(SessionBackend::Redis));
        assert_eq!(SessionBackend::from_name("postgres"), None);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let zero_ttl = SessionConfig {
            ttl_secs: 0,
            ..SessionConfig::default()
        };
        assert!(zero_ttl.validate().is_err());

        let bad_cookie = SessionConfig {
            cookie_name: "bad name;".to_string(),
            ..SessionConfig::default()
        };
        assert!(bad_cookie.validate().is_err());

        let no_pool = SessionConfig {
            backend: SessionBackend::Redis,
            pool_size: 0,
            ..SessionConfig::default()
        };
        assert!(no_pool.validate().is_err());
    }

    #[tokio::test]
    async fn test_build_memory_store() {
        let store = build_store(&SessionConfig::default()).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
