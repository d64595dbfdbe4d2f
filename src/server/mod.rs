//! HTTP surface of the ad rotation service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │             Ad Server               │
//! │                                     │
//! │  ┌──────────────────────────────┐  │
//! │  │        AdDelivery            │  │
//! │  │  - Eligibility gate          │  │
//! │  │  - Per-session locking       │  │
//! │  │  - Rotation engine           │  │
//! │  └──────────────────────────────┘  │
//! │                                     │
//! │  ┌──────────────────────────────┐  │
//! │  │        Session Store         │  │
//! │  │  - memory / redis            │  │
//! │  │  - periodic purge            │  │
//! │  └──────────────────────────────┘  │
//! │                                     │
//! │  ┌──────────────────────────────┐  │
//! │  │        REST API              │  │
//! │  │  GET  /api/health            │  │
//! │  │  GET  /api/ad                │  │
//! │  │  GET  /api/ad/snippet        │  │
//! │  │  GET  /api/settings          │  │
//! │  │  POST /api/settings/reload   │  │
//! │  │  GET  /api/stats             │  │
//! │  │  GET  /metrics               │  │
//! │  └──────────────────────────────┘  │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use adrotate::config::Config;
//! use adrotate::server::AdServer;
//!
//! let server = AdServer::new(Config::default(), None).await?;
//! server.start().await?;
//! ```

pub mod api;
pub mod config;
#[allow(clippy::module_inception)]
pub mod server;

// Re-export main types
pub use api::{create_router, API_KEY_HEADER};
pub use config::{ConfigError, ServerConfig};
pub use server::{run_maintenance, AdServer, AppState, ReloadError, ServerError, ServerInfo};
