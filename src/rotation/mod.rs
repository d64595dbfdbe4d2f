//! Session-capped ad rotation
//!
//! This module holds the pure core of the service: the ad list parser, the
//! per-session state record and the state machine that walks the list.
//!
//! # Overview
//!
//! Each eligible request runs exactly one transition:
//!
//! ```text
//!   ┌──────────────┐   new day    ┌─────────────┐
//!   │ stored state ├─────────────►│ reset + mark│
//!   └──────┬───────┘              └──────┬──────┘
//!          │ same day                    │
//!          ▼                             ▼
//!   ┌──────────────┐  views > T   ┌─────────────┐  index >= len  ┌───────────┐
//!   │  count view  ├─────────────►│ next ad, v=1├───────────────►│ exhausted │
//!   └──────┬───────┘              └──────┬──────┘                └───────────┘
//!          │                             │
//!          ▼                             ▼
//!      show ads[index]               show ads[index]
//! ```
//!
//! With `N` ads and a threshold of `T`, a session sees exactly `N * T` ads per
//! day. Nothing here performs I/O; persistence and request handling live in
//! [`crate::session`] and [`crate::delivery`].
//!
//! # Modules
//!
//! - [`parser`] - Raw ad blob to ordered ad list
//! - [`state`] - Session record and lenient normalization
//! - [`engine`] - The transition function
//! - [`clock`] - Reference-offset calendar day

pub mod clock;
pub mod engine;
pub mod parser;
pub mod state;

pub use clock::{parse_utc_offset, Clock, FixedClock, InvalidOffset, SystemClock};
pub use engine::{
    advance, clamp_views_per_ad, format_simulation, select_ad, simulate_day, RotationConfig,
    SelectedAd, Transition, DEFAULT_VIEWS_PER_AD,
};
pub use parser::parse_ad_list;
pub use state::{day_key, RotationState, DAY_KEY_FORMAT};
