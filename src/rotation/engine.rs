//! Rotation state machine
//!
//! A pure transition over `(configuration, session state, today)`. Each call
//! counts one view, advances to the next ad once the current one has been
//! shown `views_per_ad` times, and stops for the day when the list runs out.

use chrono::NaiveDate;

use super::parser::parse_ad_list;
use super::state::{day_key, RotationState};

/// Default number of views per ad before rotating
pub const DEFAULT_VIEWS_PER_AD: u32 = 5;

// ============================================================================
// Rotation Config
// ============================================================================

/// Ad list and threshold for one request cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationConfig {
    ads: Vec<String>,
    views_per_ad: u32,
}

impl RotationConfig {
    /// Create a config, clamping the threshold to at least 1
    pub fn new(ads: Vec<String>, views_per_ad: i64) -> Self {
        Self {
            ads,
            views_per_ad: clamp_views_per_ad(views_per_ad),
        }
    }

    /// Create a config from the raw multi-line ad blob
    pub fn from_raw(raw: &str, views_per_ad: i64) -> Self {
        Self::new(parse_ad_list(raw), views_per_ad)
    }

    /// Ads in rotation order
    pub fn ads(&self) -> &[String] {
        &self.ads
    }

    /// Views each ad gets before rotating
    pub fn views_per_ad(&self) -> u32 {
        self.views_per_ad
    }

    /// Number of configured ads
    pub fn len(&self) -> usize {
        self.ads.len()
    }

    /// No ads configured, rotation disabled
    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }

    /// Shows available per session per day (`ads * views_per_ad`)
    pub fn daily_quota(&self) -> u64 {
        self.ads.len() as u64 * u64::from(self.views_per_ad)
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            ads: Vec::new(),
            views_per_ad: DEFAULT_VIEWS_PER_AD,
        }
    }
}

/// Clamp a configured threshold into the valid range
pub fn clamp_views_per_ad(views_per_ad: i64) -> u32 {
    u32::try_from(views_per_ad.max(1)).unwrap_or(u32::MAX)
}

// ============================================================================
// Transition
// ============================================================================

/// An ad chosen for the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedAd<'a> {
    /// Position in the ad list
    pub index: usize,

    /// 1-based view number of this ad in the current cycle
    pub view: u32,

    /// Payload to embed verbatim
    pub payload: &'a str,
}

/// Result of one engine step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<'a> {
    /// Ad to show, if any
    pub selection: Option<SelectedAd<'a>>,

    /// Updated session state to persist
    pub state: RotationState,

    /// The daily reset fired during this step
    pub was_reset: bool,
}

/// Run one rotation step and return the selection with the updated state
///
/// # Example
/// ```
/// use adrotate::rotation::{select_ad, RotationConfig, RotationState};
/// use chrono::NaiveDate;
///
/// let config = RotationConfig::from_raw("A\nB", 1);
/// let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
///
/// let (ad, state) = select_ad(&config, RotationState::new(), today);
/// assert_eq!(ad.unwrap().payload, "A");
/// let (ad, state) = select_ad(&config, state, today);
/// assert_eq!(ad.unwrap().payload, "B");
/// let (ad, state) = select_ad(&config, state, today);
/// assert!(ad.is_none());
/// assert!(state.exhausted);
/// ```
pub fn select_ad(
    config: &RotationConfig,
    state: RotationState,
    today: NaiveDate,
) -> (Option<SelectedAd<'_>>, RotationState) {
    let transition = advance(config, state, today);
    (transition.selection, transition.state)
}

/// Run one rotation step, also reporting whether the daily reset fired
pub fn advance(config: &RotationConfig, mut state: RotationState, today: NaiveDate) -> Transition<'_> {
    let was_reset = !state.is_current_for(today);
    if was_reset {
        state.reset_for_day(day_key(today));
    }

    let suppressed = |state: RotationState| Transition {
        selection: None,
        state,
        was_reset,
    };

    if state.exhausted || config.is_empty() {
        return suppressed(state);
    }

    state.views_for_current = state.views_for_current.saturating_add(1);

    // The request that moves past the quota is also the next ad's first view.
    if state.views_for_current > config.views_per_ad {
        state.current_index = state.current_index.saturating_add(1);
        state.views_for_current = 1;
    }

    if state.current_index >= config.len() {
        state.exhausted = true;
        return suppressed(state);
    }

    let Some(payload) = config.ads.get(state.current_index) else {
        state.exhausted = true;
        return suppressed(state);
    };

    Transition {
        selection: Some(SelectedAd {
            index: state.current_index,
            view: state.views_for_current,
            payload: payload.as_str(),
        }),
        state,
        was_reset,
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Drive `requests` same-day steps from a fresh session
///
/// Used by the CLI to preview a configuration.
pub fn simulate_day(
    config: &RotationConfig,
    requests: usize,
    date: NaiveDate,
) -> Vec<Option<SelectedAd<'_>>> {
    let mut state = RotationState::new();
    let mut results = Vec::with_capacity(requests);

    for _ in 0..requests {
        let (selection, next) = select_ad(config, state, date);
        results.push(selection);
        state = next;
    }

    results
}

/// Format a simulated day as a table
pub fn format_simulation(config: &RotationConfig, requests: usize, date: NaiveDate) -> String {
    let mut output = format!(
        "Rotation for {} ({} ads x {} views = {} shows)\n",
        day_key(date),
        config.len(),
        config.views_per_ad(),
        config.daily_quota()
    );
    output.push_str(&format!("{:=<60}\n", ""));
    output.push_str(&format!("{:>7} | {:>5} | {:>4} | {}\n", "Request", "Ad", "View", "Payload"));
    output.push_str(&format!("{:-<60}\n", ""));

    for (i, selection) in simulate_day(config, requests, date).iter().enumerate() {
        match selection {
            Some(ad) => output.push_str(&format!(
                "{:>7} | {:>5} | {:>4} | {}\n",
                i + 1,
                ad.index,
                ad.view,
                preview(ad.payload, 40)
            )),
            None => output.push_str(&format!("{:>7} | {:>5} | {:>4} | (none)\n", i + 1, "-", "-")),
        }
    }

    output
}

fn preview(payload: &str, max_chars: usize) -> String {
    if payload.chars().count() <= max_chars {
        payload.to_string()
    } else {
        let head: String = payload.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

// ============================================================================
// Tests
// ============================================================================
