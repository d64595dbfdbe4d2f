//! Ad server implementation
//!
//! Wires configuration, the session store and the delivery service into an
//! axum application and runs periodic housekeeping.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::delivery::AdDelivery;
use crate::gate::{Gate, GateConfig};
use crate::metrics;
use crate::session::build_store;

use super::api::create_router;
use super::config::ServerConfig;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Delivery service
    pub delivery: Arc<AdDelivery>,

    /// Signed-in detection settings
    pub gate_config: Arc<GateConfig>,

    /// Session cookie name
    pub cookie_name: Arc<str>,

    /// Reset offset the clock was built with
    pub utc_offset: Arc<str>,

    /// Key required by the settings endpoints
    pub api_key: Option<Arc<str>>,

    /// File the configuration was loaded from
    pub config_path: Option<Arc<PathBuf>>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Build state around an existing delivery service
    pub fn new(delivery: Arc<AdDelivery>, config: &Config, config_path: Option<PathBuf>) -> Self {
        Self {
            delivery,
            gate_config: Arc::new(config.gate.clone()),
            cookie_name: Arc::from(config.session.cookie_name.as_str()),
            utc_offset: Arc::from(config.rotation.utc_offset.as_str()),
            api_key: config.server.api_key.as_deref().map(Arc::from),
            config_path: config_path.map(Arc::new),
            start_time: Instant::now(),
        }
    }

    /// Re-read the rotation section from the config file
    ///
    /// The active settings are kept when the file cannot be used.
    pub fn reload_settings(&self) -> Result<(), ReloadError> {
        let path = self.config_path.as_deref().ok_or(ReloadError::NoConfigFile)?;

        let result = Config::from_file(path)
            .and_then(|config| {
                config.validate()?;
                Ok(config)
            })
            .and_then(|config| {
                if config.rotation.utc_offset.trim() != self.utc_offset.trim() {
                    tracing::warn!(
                        active = %self.utc_offset,
                        configured = %config.rotation.utc_offset,
                        "utc_offset changes take effect after a restart"
                    );
                }
                config.rotation.rotation_config()
            });

        match result {
            Ok(rotation) => {
                self.delivery.replace_settings(rotation);
                metrics::record_settings_reload(true);
                Ok(())
            }
            Err(e) => {
                metrics::record_settings_reload(false);
                tracing::warn!(path = %path.display(), error = %format!("{e:#}"), "Settings reload failed");
                Err(ReloadError::Invalid(format!("{e:#}")))
            }
        }
    }
}

/// Settings reload failures
#[derive(Debug, Clone, Error)]
pub enum ReloadError {
    /// Server was started without a config file
    #[error("Server was started without a config file")]
    NoConfigFile,

    /// The file could not be read or validated
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Ad Server
// ============================================================================

/// Main ad server
pub struct AdServer {
    config: ServerConfig,
    state: AppState,
}

impl AdServer {
    /// Create a server from a validated configuration
    pub async fn new(config: Config, config_path: Option<PathBuf>) -> crate::Result<Self> {
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(format!("{e:#}")))?;

        let rotation = config
            .rotation
            .rotation_config()
            .map_err(|e| ServerError::ConfigError(format!("{e:#}")))?;
        let clock = config
            .rotation
            .clock()
            .map_err(|e| ServerError::ConfigError(format!("{e:#}")))?;

        let store = build_store(&config.session).await?;

        if rotation.is_empty() {
            tracing::warn!("Ad list is empty, no ads will be served");
        }

        let delivery = Arc::new(AdDelivery::new(
            rotation,
            Gate::from_config(&config.gate),
            store,
            Arc::new(clock),
        ));

        Ok(Self::with_state(
            config.server.clone(),
            AppState::new(delivery, &config, config_path),
        ))
    }

    /// Create a server around prepared state
    pub fn with_state(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        // Add CORS layer if enabled
        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        // Add tracing layer if enabled
        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the server
    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("{addr}: {e}")))?;

        tracing::info!(
            %addr,
            backend = self.state.delivery.store().backend_name(),
            ads = self.state.delivery.settings().len(),
            "Ad server listening"
        );

        let maintenance = self.start_background_tasks();

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()));

        maintenance.abort();
        served?;

        tracing::info!("Ad server shutdown complete");
        Ok(())
    }

    /// Start background tasks
    fn start_background_tasks(&self) -> tokio::task::JoinHandle<()> {
        let delivery = self.state.delivery.clone();
        let period = Duration::from_secs(self.config.maintenance_interval_secs.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                run_maintenance(&delivery).await;
            }
        })
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.bind_address,
            session_backend: self.state.delivery.store().backend_name(),
            ad_count: self.state.delivery.settings().len(),
            views_per_ad: self.state.delivery.settings().views_per_ad(),
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
            api_key_required: self.state.api_key.is_some(),
        }
    }
}

/// One housekeeping pass: purge expired sessions and unused locks
pub async fn run_maintenance(delivery: &AdDelivery) {
    let store = delivery.store();

    match store.purge_expired().await {
        Ok(removed) if removed > 0 => tracing::debug!(removed, "Expired sessions purged"),
        Ok(_) => {}
        Err(e) => {
            metrics::record_store_error("purge");
            tracing::warn!(error = %e, "Session purge failed");
        }
    }

    match store.count().await {
        Ok(count) => metrics::set_live_sessions(count),
        Err(e) => {
            metrics::record_store_error("count");
            tracing::debug!(error = %e, "Session count unavailable");
        }
    }

    let pruned = delivery.prune_locks();
    if pruned > 0 {
        tracing::trace!(pruned, "Session locks pruned");
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub session_backend: &'static str,
    pub ad_count: usize,
    pub views_per_ad: u32,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
    pub api_key_required: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Ad Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Session Backend: {}\n\
             Ads: {} ({} views each)\n\
             CORS: {}\n\
             Request Logging: {}\n\
             Settings API Key: {}",
            "",
            self.bind_address,
            self.session_backend,
            self.ad_count,
            self.views_per_ad,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" },
            if self.api_key_required { "required" } else { "not required" }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failed to bind to address
    #[error("Failed to bind: {0}")]
    BindError(String),

    /// Server error
    #[error("Server error: {0}")]
    ServeError(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AdrotateErrorTrait, Error, ErrorCategory};
    use crate::rotation::{FixedClock, RotationConfig};
    use crate::rotation::RotationState;
    use crate::session::{InMemorySessionStore, SessionBackend, SessionId, SessionStore};

    fn config_with_ads(ads: &str) -> Config {
        let mut config = Config::default();
        config.rotation.ad_scripts = ads.to_string();
        config.rotation.views_per_ad = 2;
        config
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = AdServer::new(config_with_ads("A\nB"), None).await.unwrap();
        let info = server.info();

        assert_eq!(info.session_backend, "memory");
        assert_eq!(info.ad_count, 2);
        assert_eq!(info.views_per_ad, 2);
        assert!(info.cors_enabled);
        assert!(!info.api_key_required);
        assert!(info.display().contains("Ads: 2 (2 views each)"));
    }

    #[tokio::test]
    async fn test_server_rejects_bad_offset() {
        let mut config = config_with_ads("A");
        config.rotation.utc_offset = "tomorrow".to_string();

        let result = AdServer::new(config, None).await;
        assert!(matches!(
            result,
            Err(Error::Server(ServerError::ConfigError(_)))
        ));
    }

    #[tokio::test]
    async fn test_server_reports_unreachable_session_store() {
        let mut config = config_with_ads("A");
        config.session.backend = SessionBackend::Redis;
        config.session.redis_url = "redis://127.0.0.1:1".to_string();

        let err = match AdServer::new(config, None).await {
            Ok(_) => panic!("server started without its session store"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Session(_)));
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_reload_without_file() {
        let config = config_with_ads("A");
        let delivery = Arc::new(AdDelivery::new(
            RotationConfig::from_raw("A", 1),
            Gate::new(),
            Arc::new(InMemorySessionStore::default()),
            Arc::new(FixedClock(chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())),
        ));
        let state = AppState::new(delivery, &config, None);

        assert!(matches!(state.reload_settings(), Err(ReloadError::NoConfigFile)));
    }

    #[tokio::test]
    async fn test_maintenance_purges_and_prunes() {
        let store = Arc::new(InMemorySessionStore::new(1));
        let delivery = AdDelivery::new(
            RotationConfig::from_raw("A", 1),
            Gate::new(),
            store.clone(),
            Arc::new(FixedClock(chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())),
        );

        store
            .save(&SessionId::generate(), &RotationState::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        run_maintenance(&delivery).await;
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
