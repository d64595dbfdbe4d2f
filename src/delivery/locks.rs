//! Per-session async locks
//!
//! Requests for the same session run their load/advance/save sequence one at
//! a time inside this process. The registry only holds weak references, so a
//! session's mutex disappears once no request is using it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::session::SessionId;

/// Dead entries are swept once the map grows past this many entries
const MIN_PRUNE_AT: usize = 1024;

#[derive(Debug)]
struct Registry {
    entries: HashMap<SessionId, Weak<AsyncMutex<()>>>,
    prune_at: usize,
}

/// Registry of per-session mutexes
#[derive(Debug)]
pub struct SessionLocks {
    registry: Mutex<Registry>,
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                entries: HashMap::new(),
                prune_at: MIN_PRUNE_AT,
            }),
        }
    }

    /// Wait for exclusive access to `id`
    pub async fn lock(&self, id: &SessionId) -> OwnedMutexGuard<()> {
        self.handle(id).lock_owned().await
    }

    fn handle(&self, id: &SessionId) -> Arc<AsyncMutex<()>> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = registry.entries.get(id).and_then(Weak::upgrade) {
            return existing;
        }

        let fresh = Arc::new(AsyncMutex::new(()));
        registry.entries.insert(id.clone(), Arc::downgrade(&fresh));

        if registry.entries.len() >= registry.prune_at {
            registry.entries.retain(|_, lock| lock.strong_count() > 0);
            registry.prune_at = (registry.entries.len() * 2).max(MIN_PRUNE_AT);
        }

        fresh
    }

    /// Drop entries whose mutex is no longer in use
    pub fn prune(&self) -> usize {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.entries.len();
        registry.entries.retain(|_, lock| lock.strong_count() > 0);
        before - registry.entries.len()
    }

    /// Number of registry entries, live or not yet pruned
    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_exclusive() {
        let locks = SessionLocks::new();
        let id = SessionId::generate();

        let guard = locks.lock(&id).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(&id)).await;
        assert!(second.is_err(), "second lock should wait");

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), locks.lock(&id)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_different_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let a = SessionId::generate();
        let b = SessionId::generate();

        let _guard = locks.lock(&a).await;
        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock(&b)).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_prune_drops_released_locks() {
        let locks = SessionLocks::new();
        let held = SessionId::generate();

        let _guard = locks.lock(&held).await;
        for _ in 0..3 {
            drop(locks.lock(&SessionId::generate()).await);
        }

        assert_eq!(locks.len(), 4);
        assert_eq!(locks.prune(), 3);
        assert_eq!(locks.len(), 1);
    }
}
