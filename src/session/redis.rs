//! Redis-backed session store
//!
//! Each record is a JSON string under `<prefix>:session:<id>`, written with
//! `SET EX` so Redis drops idle sessions on its own. Records that fail to
//! decode are treated as fresh state rather than errors.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;

use super::{SessionConfig, SessionError, SessionId, SessionResult, SessionStore};
use crate::rotation::RotationState;

/// Keys fetched per `SCAN` round
const SCAN_BATCH: usize = 500;

/// Redis session store
pub struct RedisSessionStore {
    pool: Pool,
    key_prefix: String,
    ttl_secs: u64,
}

impl RedisSessionStore {
    /// Connect and verify the server answers `PING`
    pub async fn new(config: &SessionConfig) -> SessionResult<Self> {
        let pool = PoolConfig::from_url(&config.redis_url)
            .builder()
            .map_err(|e| SessionError::InvalidConfig(format!("Failed to create pool builder: {e}")))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| SessionError::InvalidConfig(format!("Failed to create Redis pool: {e}")))?;

        let store = Self {
            pool,
            key_prefix: config.key_prefix.clone(),
            ttl_secs: config.ttl_secs.max(1),
        };

        if !store.health_check().await? {
            return Err(SessionError::Unavailable(
                "Redis did not answer PING".to_string(),
            ));
        }

        tracing::info!(url = %config.redis_url, prefix = %store.key_prefix, "Connected to Redis session store");
        Ok(store)
    }

    /// Key holding the record for `id`
    pub fn session_key(&self, id: &SessionId) -> String {
        format!("{}:session:{}", self.key_prefix, id)
    }

    fn key_pattern(&self) -> String {
        format!("{}:session:*", self.key_prefix)
    }

    async fn connection(&self) -> SessionResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| SessionError::Unavailable(e.to_string()))
    }

    /// Check that Redis answers `PING`
    pub async fn health_check(&self) -> SessionResult<bool> {
        let mut conn = self.connection().await?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| SessionError::backend("ping", e))?;
        Ok(reply == "PONG")
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, id: &SessionId) -> SessionResult<Option<RotationState>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(self.session_key(id))
            .await
            .map_err(|e| SessionError::backend("load", e))?;

        Ok(raw.map(|json| RotationState::from_json_lenient(&json)))
    }

    async fn save(&self, id: &SessionId, state: &RotationState) -> SessionResult<()> {
        let json = state.to_json()?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(self.session_key(id), json, self.ttl_secs)
            .await
            .map_err(|e| SessionError::backend("save", e))
    }

    async fn remove(&self, id: &SessionId) -> SessionResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.session_key(id))
            .await
            .map_err(|e| SessionError::backend("remove", e))
    }

    async fn purge_expired(&self) -> SessionResult<usize> {
        // Expiry is enforced by the key TTL
        Ok(0)
    }

    async fn count(&self) -> SessionResult<usize> {
        let mut conn = self.connection().await?;
        let pattern = self.key_pattern();
        let mut cursor: u64 = 0;
        let mut total = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await
                .map_err(|e| SessionError::backend("count", e))?;

            total += keys.len();
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(total)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
