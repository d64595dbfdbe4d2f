//! In-process session store
//!
//! Records live in a map keyed by session id and expire after a period of
//! inactivity. Expired records are invisible to `load` immediately and are
//! physically removed by `purge_expired`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{SessionId, SessionResult, SessionStore};
use crate::rotation::RotationState;

#[derive(Debug, Clone)]
struct Entry {
    state: RotationState,
    touched_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.touched_at) < ttl
    }
}

/// Map-backed store with an idle TTL
#[derive(Debug)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<SessionId, Entry>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    /// Create a store whose records expire after `ttl_secs` without a save
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs.max(1)),
        }
    }

    /// Idle lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Load as seen at `now`
    pub async fn load_at(&self, id: &SessionId, now: Instant) -> Option<RotationState> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .filter(|entry| entry.is_live(now, self.ttl))
            .map(|entry| entry.state.clone())
    }

    /// Save with an explicit touch time
    pub async fn save_at(&self, id: &SessionId, state: &RotationState, now: Instant) {
        let mut entries = self.entries.write().await;
        entries.insert(
            id.clone(),
            Entry {
                state: state.clone(),
                touched_at: now,
            },
        );
    }

    /// Drop records that are no longer live at `now`
    pub async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now, self.ttl));
        before - entries.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(86400)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &SessionId) -> SessionResult<Option<RotationState>> {
        Ok(self.load_at(id, Instant::now()).await)
    }

    async fn save(&self, id: &SessionId, state: &RotationState) -> SessionResult<()> {
        self.save_at(id, state, Instant::now()).await;
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> SessionResult<()> {
        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn purge_expired(&self) -> SessionResult<usize> {
        let removed = self.purge_expired_at(Instant::now()).await;
        if removed > 0 {
            tracing::debug!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }

    async fn count(&self) -> SessionResult<usize> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|entry| entry.is_live(now, self.ttl))
            .count())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(index: usize) -> RotationState {
        RotationState {
            current_index: index,
            views_for_current: 1,
            exhausted: false,
            last_reset_day: "2024-05-01".to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = InMemorySessionStore::default();
        let id = SessionId::generate();
        assert!(store.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemorySessionStore::default();
        let id = SessionId::generate();

        store.save(&id, &state(2)).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), Some(state(2)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = InMemorySessionStore::default();
        let a = SessionId::generate();
        let b = SessionId::generate();

        store.save(&a, &state(1)).await.unwrap();
        store.save(&b, &state(4)).await.unwrap();

        assert_eq!(store.load(&a).await.unwrap().unwrap().current_index, 1);
        assert_eq!(store.load(&b).await.unwrap().unwrap().current_index, 4);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemorySessionStore::default();
        let id = SessionId::generate();

        store.save(&id, &state(0)).await.unwrap();
        store.remove(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_record_invisible_then_purged() {
        let store = InMemorySessionStore::new(60);
        let id = SessionId::generate();
        let start = Instant::now();

        store.save_at(&id, &state(3), start).await;
        assert!(store.load_at(&id, start + Duration::from_secs(59)).await.is_some());

        let later = start + Duration::from_secs(61);
        assert!(store.load_at(&id, later).await.is_none());
        assert_eq!(store.purge_expired_at(later).await, 1);
        assert_eq!(store.purge_expired_at(later).await, 0);
    }

    #[tokio::test]
    async fn test_save_refreshes_expiry() {
        let store = InMemorySessionStore::new(60);
        let id = SessionId::generate();
        let start = Instant::now();

        store.save_at(&id, &state(0), start).await;
        store
            .save_at(&id, &state(1), start + Duration::from_secs(50))
            .await;

        let later = start + Duration::from_secs(100);
        assert_eq!(store.load_at(&id, later).await, Some(state(1)));
        assert_eq!(store.purge_expired_at(later).await, 0);
    }

    #[test]
    fn test_zero_ttl_clamped() {
        assert_eq!(InMemorySessionStore::new(0).ttl(), Duration::from_secs(1));
    }
}
