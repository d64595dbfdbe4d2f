//! Common test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use adrotate::delivery::{AdDelivery, VisitorContext};
use adrotate::gate::Gate;
use adrotate::rotation::{Clock, RotationConfig, RotationState};
use adrotate::session::{
    InMemorySessionStore, SessionError, SessionId, SessionResult, SessionStore,
};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Desktop browser user agent
pub const BROWSER_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Crawler user agent
pub const CRAWLER_UA: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// Build a date, panicking on invalid input
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

/// Clock whose date can be moved by the test
#[derive(Debug)]
pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Arc<Self> {
        Arc::new(Self {
            today: Mutex::new(today),
        })
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.lock().unwrap() = today;
    }

    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap();
        *today = *today + chrono::Days::new(days);
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap()
    }
}

/// Store wrapper whose loads and saves can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemorySessionStore,
    pub fail_load: AtomicBool,
    pub fail_save: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn load(&self, id: &SessionId) -> SessionResult<Option<RotationState>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(SessionError::backend("load", "injected failure"));
        }
        self.inner.load(id).await
    }

    async fn save(&self, id: &SessionId, state: &RotationState) -> SessionResult<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(SessionError::Unavailable("injected failure".to_string()));
        }
        self.inner.save(id, state).await
    }

    async fn remove(&self, id: &SessionId) -> SessionResult<()> {
        self.inner.remove(id).await
    }

    async fn purge_expired(&self) -> SessionResult<usize> {
        self.inner.purge_expired().await
    }

    async fn count(&self) -> SessionResult<usize> {
        self.inner.count().await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Delivery over an in-memory store with the given clock
pub fn memory_delivery(ads: &str, views_per_ad: i64, clock: Arc<dyn Clock>) -> AdDelivery {
    AdDelivery::new(
        RotationConfig::from_raw(ads, views_per_ad),
        Gate::new(),
        Arc::new(InMemorySessionStore::default()),
        clock,
    )
}

/// Anonymous browser visitor for `id`
pub fn browser(id: &SessionId) -> VisitorContext {
    VisitorContext::new(id.clone(), false, BROWSER_UA)
}
