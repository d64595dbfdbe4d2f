//! adrotate - Session-capped ad rotation
//!
//! Serves one ad per page view from an administrator-supplied list. Each
//! visitor session sees every ad a fixed number of times, in list order, then
//! nothing more until the next calendar day. Signed-in visitors and crawlers
//! are never shown an ad.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`rotation`] - Ad list parsing and the per-session state machine
//! - [`gate`] - Signed-in and crawler detection
//! - [`session`] - Session record storage (memory, Redis)
//! - [`delivery`] - Per-request flow tying the pieces together
//! - [`render`] - Page snippet output
//! - [`server`] - HTTP API
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus counters
//!
//! # Example
//!
//! ```no_run
//! use adrotate::config::Config;
//! use adrotate::server::AdServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = AdServer::new(config, None).await?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod delivery;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod render;
pub mod rotation;
pub mod server;
pub mod session;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::delivery::{AdDelivery, DeliveryOutcome, SkipReason, VisitorContext};
    pub use crate::error::{AdrotateErrorTrait, Error, ErrorCategory, Result};
    pub use crate::gate::{is_eligible, Gate, GateDecision};
    pub use crate::rotation::{select_ad, Clock, RotationConfig, RotationState, SelectedAd};
    pub use crate::server::AdServer;
    pub use crate::session::{SessionId, SessionStore};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
