//! Calendar day source for the daily reset
//!
//! The reset boundary is midnight in one fixed reference offset for every
//! visitor, not the visitor's own timezone.

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use thiserror::Error;

/// Source of "today" for the rotation engine
pub trait Clock: Send + Sync {
    /// Current calendar date in the reference offset
    fn today(&self) -> NaiveDate;
}

/// Wall clock shifted to a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Create a clock for the given offset
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Clock on UTC
    pub fn utc() -> Self {
        Self::new(utc_offset())
    }

    /// Reference offset
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}

/// Clock pinned to a single date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

// ============================================================================
// Offset Parsing
// ============================================================================

/// Error for a malformed UTC offset string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid UTC offset '{0}'. Expected +HH:MM or -HH:MM")]
pub struct InvalidOffset(pub String);

/// Parse an offset such as `+09:00`, `-05:30`, `+0900` or `Z`
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, InvalidOffset> {
    let trimmed = raw.trim();
    let invalid = || InvalidOffset(raw.to_string());

    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return Ok(utc_offset());
    }

    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
