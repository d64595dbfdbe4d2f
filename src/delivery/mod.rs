//! Per-request ad delivery
//!
//! Ties the gate, the session store and the rotation engine together:
//!
//! ```text
//! request ──► settings snapshot ──► gate ──► session lock
//!                  │ no ads           │ skip       │
//!                  ▼                  ▼            ▼
//!               Skipped            Skipped    load ─► advance ─► save
//!                                                                │
//!                                           Served / Exhausted ◄─┘
//! ```
//!
//! Store failures never surface as errors: the visitor simply gets no ad and
//! the failure is logged and counted.

pub mod locks;

use axum::http::HeaderMap;
use chrono::NaiveDate;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::gate::{cookie_value, extract_user_agent, is_authenticated, Gate, GateConfig, GateDecision};
use crate::metrics;
use crate::rotation::{advance, Clock, RotationConfig, RotationState};
use crate::session::{SessionId, SessionStore};

pub use locks::SessionLocks;

// ============================================================================
// Visitor Context
// ============================================================================

/// What the delivery path needs to know about a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorContext {
    /// Session the rotation record belongs to
    pub session_id: SessionId,

    /// Visitor is signed in
    pub authenticated: bool,

    /// Raw `User-Agent` value
    pub user_agent: String,

    /// The id was minted for this request and must be sent back
    pub is_new_session: bool,
}

impl VisitorContext {
    /// Context for a known session
    pub fn new(session_id: SessionId, authenticated: bool, user_agent: impl Into<String>) -> Self {
        Self {
            session_id,
            authenticated,
            user_agent: user_agent.into(),
            is_new_session: false,
        }
    }

    /// Build from request headers, minting a session id when the cookie is
    /// missing or malformed
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str, gate: &GateConfig) -> Self {
        let existing = cookie_value(headers, cookie_name).and_then(SessionId::parse);
        let is_new_session = existing.is_none();

        Self {
            session_id: existing.unwrap_or_else(SessionId::generate),
            authenticated: is_authenticated(headers, gate),
            user_agent: extract_user_agent(headers),
            is_new_session,
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Why the engine did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The ad list is empty
    NoAds,
    /// Visitor is signed in
    Authenticated,
    /// User agent matched a crawler signature
    Bot { signature: String },
}

impl SkipReason {
    /// Short label for logs, metrics and API responses
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoAds => "no_ads",
            Self::Authenticated => "authenticated",
            Self::Bot { .. } => "bot",
        }
    }
}

/// Result of one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// An ad is shown
    Served {
        index: usize,
        view: u32,
        payload: String,
    },
    /// The session has used up today's views
    Exhausted,
    /// The engine did not run
    Skipped(SkipReason),
    /// The session store failed; nothing is shown
    Unavailable,
}

impl DeliveryOutcome {
    /// Payload to render, if any
    pub fn ad(&self) -> Option<&str> {
        match self {
            Self::Served { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Check if an ad is shown
    pub fn is_served(&self) -> bool {
        matches!(self, Self::Served { .. })
    }

    /// Short label for logs, metrics and API responses
    pub fn label(&self) -> &'static str {
        match self {
            Self::Served { .. } => "served",
            Self::Exhausted => "exhausted",
            Self::Skipped(reason) => reason.label(),
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Served { index, view, .. } => write!(f, "served ad {index} (view {view})"),
            Self::Skipped(SkipReason::Bot { signature }) => write!(f, "bot ({signature})"),
            other => f.write_str(other.label()),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Active rotation configuration, swappable at runtime
#[derive(Debug)]
pub struct SettingsProvider {
    current: RwLock<Arc<RotationConfig>>,
}

impl SettingsProvider {
    /// Start with `config`
    pub fn new(config: RotationConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Configuration in effect right now
    pub fn snapshot(&self) -> Arc<RotationConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new configuration; in-flight requests keep their snapshot
    pub fn replace(&self, config: RotationConfig) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }
}

// ============================================================================
// Ad Delivery
// ============================================================================

/// Request-level delivery service
pub struct AdDelivery {
    settings: SettingsProvider,
    gate: Gate,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    locks: SessionLocks,
}

impl AdDelivery {
    /// Create a delivery service
    pub fn new(
        config: RotationConfig,
        gate: Gate,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings: SettingsProvider::new(config),
            gate,
            store,
            clock,
            locks: SessionLocks::new(),
        }
    }

    /// Configuration in effect right now
    pub fn settings(&self) -> Arc<RotationConfig> {
        self.settings.snapshot()
    }

    /// Swap the rotation configuration
    pub fn replace_settings(&self, config: RotationConfig) {
        tracing::info!(
            ads = config.len(),
            views_per_ad = config.views_per_ad(),
            "Rotation settings replaced"
        );
        self.settings.replace(config);
    }

    /// Session store in use
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Eligibility gate in use
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Current calendar day for the reset
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Drop unused session locks
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }

    /// Decide what to show for one request
    pub async fn deliver(&self, visitor: &VisitorContext) -> DeliveryOutcome {
        let _timer = metrics::start_delivery_timer();
        let outcome = self.run(visitor).await;

        metrics::record_delivery(outcome.label());
        tracing::debug!(
            session = %visitor.session_id,
            outcome = %outcome,
            "Delivery decided"
        );

        outcome
    }

    async fn run(&self, visitor: &VisitorContext) -> DeliveryOutcome {
        let config = self.settings.snapshot();
        if config.is_empty() {
            return DeliveryOutcome::Skipped(SkipReason::NoAds);
        }

        match self.gate.evaluate(visitor.authenticated, &visitor.user_agent) {
            GateDecision::Eligible => {}
            GateDecision::Authenticated => {
                return DeliveryOutcome::Skipped(SkipReason::Authenticated)
            }
            GateDecision::Bot { signature } => {
                return DeliveryOutcome::Skipped(SkipReason::Bot { signature })
            }
        }

        let _guard = self.locks.lock(&visitor.session_id).await;

        let state = match self.store.load(&visitor.session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => RotationState::new(),
            Err(e) => {
                metrics::record_store_error("load");
                tracing::warn!(
                    session = %visitor.session_id,
                    backend = self.store.backend_name(),
                    error = %e,
                    "Failed to load session, serving no ad"
                );
                return DeliveryOutcome::Unavailable;
            }
        };

        let today = self.clock.today();
        let transition = advance(&config, state, today);

        if transition.was_reset {
            metrics::record_daily_reset();
            tracing::debug!(session = %visitor.session_id, day = %today, "Daily reset");
        }

        if let Err(e) = self.store.save(&visitor.session_id, &transition.state).await {
            metrics::record_store_error("save");
            tracing::warn!(
                session = %visitor.session_id,
                backend = self.store.backend_name(),
                error = %e,
                "Failed to save session, withholding ad"
            );
            return DeliveryOutcome::Unavailable;
        }

        match transition.selection {
            Some(ad) => DeliveryOutcome::Served {
                index: ad.index,
                view: ad.view,
                payload: ad.payload.to_string(),
            },
            None => DeliveryOutcome::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::FixedClock;
    use crate::session::InMemorySessionStore;
    use axum::http::HeaderValue;

    fn delivery(raw: &str, views_per_ad: i64) -> AdDelivery {
        AdDelivery::new(
            RotationConfig::from_raw(raw, views_per_ad),
            Gate::new(),
            Arc::new(InMemorySessionStore::default()),
            Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())),
        )
    }

    fn browser(id: &SessionId) -> VisitorContext {
        VisitorContext::new(id.clone(), false, "Mozilla/5.0 Firefox/128.0")
    }

    #[tokio::test]
    async fn test_served_then_exhausted() {
        let delivery = delivery("A\nB", 1);
        let id = SessionId::generate();

        assert_eq!(delivery.deliver(&browser(&id)).await.ad(), Some("A"));
        assert_eq!(delivery.deliver(&browser(&id)).await.ad(), Some("B"));
        assert_eq!(
            delivery.deliver(&browser(&id)).await,
            DeliveryOutcome::Exhausted
        );
    }

    #[tokio::test]
    async fn test_shrunk_list_exhausts_session_past_its_end() {
        let delivery = delivery("A\nB\nC", 1);
        let id = SessionId::generate();

        for _ in 0..3 {
            delivery.deliver(&browser(&id)).await;
        }
        delivery.replace_settings(RotationConfig::from_raw("A", 1));

        let outcome = delivery.deliver(&browser(&id)).await;
        assert_eq!(outcome, DeliveryOutcome::Exhausted);
        assert_eq!(outcome.label(), "exhausted");
        assert!(delivery.store().load(&id).await.unwrap().unwrap().exhausted);
    }

    #[tokio::test]
    async fn test_empty_list_does_not_touch_store() {
        let delivery = delivery("\n  \n", 3);
        let id = SessionId::generate();

        let outcome = delivery.deliver(&browser(&id)).await;
        assert_eq!(outcome, DeliveryOutcome::Skipped(SkipReason::NoAds));
        assert_eq!(delivery.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_skipped_visitors_leave_no_record() {
        let delivery = delivery("A", 1);
        let id = SessionId::generate();

        let signed_in = VisitorContext::new(id.clone(), true, "Mozilla/5.0");
        assert_eq!(
            delivery.deliver(&signed_in).await,
            DeliveryOutcome::Skipped(SkipReason::Authenticated)
        );

        let crawler = VisitorContext::new(id.clone(), false, "Googlebot/2.1");
        assert_eq!(delivery.deliver(&crawler).await.label(), "bot");
        assert!(delivery.store().load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_settings() {
        let delivery = delivery("A", 1);
        delivery.replace_settings(RotationConfig::from_raw("X\nY\nZ", 2));

        assert_eq!(delivery.settings().len(), 3);
        assert_eq!(delivery.settings().views_per_ad(), 2);
    }

    #[test]
    fn test_visitor_from_headers_reuses_valid_cookie() {
        let id = SessionId::generate();
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_str(&format!("adrotate_session={id}")).unwrap(),
        );
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));

        let visitor = VisitorContext::from_headers(&headers, "adrotate_session", &GateConfig::default());
        assert_eq!(visitor.session_id, id);
        assert!(!visitor.is_new_session);
        assert!(!visitor.authenticated);
        assert_eq!(visitor.user_agent, "Mozilla/5.0");
    }

    #[test]
    fn test_visitor_from_headers_replaces_bad_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("adrotate_session=forged"));

        let visitor = VisitorContext::from_headers(&headers, "adrotate_session", &GateConfig::default());
        assert!(visitor.is_new_session);
        assert_ne!(visitor.session_id.as_str(), "forged");
    }

    #[test]
    fn test_outcome_labels() {
        let served = DeliveryOutcome::Served {
            index: 1,
            view: 2,
            payload: "<b>".to_string(),
        };
        assert_eq!(served.label(), "served");
        assert_eq!(served.to_string(), "served ad 1 (view 2)");
        assert_eq!(DeliveryOutcome::Unavailable.label(), "unavailable");
        assert_eq!(DeliveryOutcome::Skipped(SkipReason::NoAds).ad(), None);
    }
}
