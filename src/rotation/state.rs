//! Per-session rotation state
//!
//! One [`RotationState`] lives in each visitor session. It is read, advanced
//! by the engine and written back once per eligible request.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Date format used for the daily reset key
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Format a calendar date as a reset key (`YYYY-MM-DD`)
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

// ============================================================================
// Rotation State
// ============================================================================

/// Rotation progress for a single visitor session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    /// 0-based position in the ad list
    pub current_index: usize,

    /// Views of the ad at `current_index` in the current cycle
    pub views_for_current: u32,

    /// Every ad has used up its quota for the day
    pub exhausted: bool,

    /// Day key of the last reset, empty before the first request
    pub last_reset_day: String,
}

impl RotationState {
    /// Fresh state as created on first access
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset counters and stamp the given day key
    pub fn reset_for_day(&mut self, day: impl Into<String>) {
        self.current_index = 0;
        self.views_for_current = 0;
        self.exhausted = false;
        self.last_reset_day = day.into();
    }

    /// Check whether the state was last reset on `date`
    pub fn is_current_for(&self, date: NaiveDate) -> bool {
        self.last_reset_day == day_key(date)
    }

    /// Build a state from a loosely typed session record
    ///
    /// Never fails. Each field that is missing or has an unusable value falls
    /// back to its default, so a corrupt record behaves like a new session
    /// for that field only.
    pub fn from_record(record: &Value) -> Self {
        let Some(fields) = record.as_object() else {
            return Self::default();
        };

        Self {
            current_index: fields
                .get("current_index")
                .and_then(as_count)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0),
            views_for_current: fields
                .get("views_for_current")
                .and_then(as_count)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            exhausted: fields.get("exhausted").and_then(as_flag).unwrap_or(false),
            last_reset_day: fields
                .get("last_reset_day")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_default(),
        }
    }

    /// Decode a stored JSON record, falling back to defaults on garbage
    pub fn from_json_lenient(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(record) => Self::from_record(&record),
            Err(e) => {
                tracing::debug!(error = %e, "Discarding unreadable rotation record");
                Self::default()
            }
        }
    }

    /// Encode for storage
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Non-negative integer from a number or a numeric string
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_state() {
        let state = RotationState::new();
        assert_eq!(state.current_index, 0);
        assert_eq!(state.views_for_current, 0);
        assert!(!state.exhausted);
        assert_eq!(state.last_reset_day, "");
    }

    #[test]
    fn test_day_key_format() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(day_key(date), "2024-01-05");
    }

    #[test]
    fn test_is_current_for() {
        let state = RotationState {
            last_reset_day: "2024-01-05".to_string(),
            ..RotationState::default()
        };
        assert!(state.is_current_for(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()));
        assert!(!state.is_current_for(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()));
        assert!(!RotationState::new().is_current_for(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()));
    }

    #[test]
    fn test_reset_for_day() {
        let mut state = RotationState {
            current_index: 2,
            views_for_current: 4,
            exhausted: true,
            last_reset_day: "2024-01-01".to_string(),
        };
        state.reset_for_day("2024-01-02");

        assert_eq!(state.current_index, 0);
        assert_eq!(state.views_for_current, 0);
        assert!(!state.exhausted);
        assert_eq!(state.last_reset_day, "2024-01-02");
    }

    #[test]
    fn test_from_record_full() {
        let record = json!({
            "current_index": 1,
            "views_for_current": 3,
            "exhausted": false,
            "last_reset_day": "2024-03-10"
        });
        let state = RotationState::from_record(&record);

        assert_eq!(state.current_index, 1);
        assert_eq!(state.views_for_current, 3);
        assert!(!state.exhausted);
        assert_eq!(state.last_reset_day, "2024-03-10");
    }

    #[test]
    fn test_from_record_missing_fields_use_defaults() {
        let state = RotationState::from_record(&json!({ "current_index": 2 }));
        assert_eq!(state.current_index, 2);
        assert_eq!(state.views_for_current, 0);
        assert!(!state.exhausted);
        assert_eq!(state.last_reset_day, "");
    }

    #[test]
    fn test_from_record_corrupt_fields() {
        let record = json!({
            "current_index": -4,
            "views_for_current": "lots",
            "exhausted": "maybe",
            "last_reset_day": 20240310
        });
        assert_eq!(RotationState::from_record(&record), RotationState::default());
    }

    #[test]
    fn test_from_record_loose_types() {
        let record = json!({
            "current_index": "2",
            "views_for_current": 1,
            "exhausted": 1,
            "last_reset_day": "2024-03-10"
        });
        let state = RotationState::from_record(&record);
        assert_eq!(state.current_index, 2);
        assert!(state.exhausted);
    }

    #[test]
    fn test_from_record_not_an_object() {
        assert_eq!(RotationState::from_record(&json!([1, 2])), RotationState::default());
        assert_eq!(RotationState::from_record(&Value::Null), RotationState::default());
    }

    #[test]
    fn test_json_lenient_garbage() {
        assert_eq!(RotationState::from_json_lenient("{not json"), RotationState::default());
    }

    #[test]
    fn test_json_round_trip() {
        let state = RotationState {
            current_index: 1,
            views_for_current: 2,
            exhausted: false,
            last_reset_day: "2024-06-01".to_string(),
        };
        let json = state.to_json().unwrap();
        assert_eq!(RotationState::from_json_lenient(&json), state);
    }
}
