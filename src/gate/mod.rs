//! Delivery eligibility gate
//!
//! Decides whether the rotation engine runs at all for a request. Signed-in
//! visitors never see ads, and requests whose user agent looks like a crawler
//! are skipped so they do not burn through a session's quota.
//!
//! The bot check is a case-insensitive substring heuristic. It is trivially
//! bypassed by a client that lies about its user agent and must not be
//! treated as a security boundary. A missing user agent is not evidence of a
//! bot, so such requests stay eligible.

pub mod visitor;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use visitor::{cookie_value, extract_user_agent, is_authenticated};

/// Known crawler tokens, lowercase
pub const BOT_SIGNATURES: &[&str] = &[
    "bot",
    "crawl",
    "spider",
    "slurp",
    "mediapartners-google",
    "googlebot",
    "bingbot",
    "yahoo! slurp",
    "duckduckbot",
    "baiduspider",
    "yandexbot",
    "sogou",
    "exabot",
    "facebot",
    "ia_archiver",
    "ahrefsbot",
    "semrushbot",
    "megaindex",
    "mj12bot",
    "dotbot",
    "lipperhey",
    "serpstat",
    "seokicks",
    "nutch",
    "lighthouse",
];

/// Return the first builtin signature found in `user_agent`
pub fn match_bot_signature(user_agent: &str) -> Option<&'static str> {
    let normalized = user_agent.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    BOT_SIGNATURES
        .iter()
        .copied()
        .find(|signature| normalized.contains(signature))
}

/// Check a user agent against the builtin signatures
pub fn is_bot(user_agent: &str) -> bool {
    match_bot_signature(user_agent).is_some()
}

/// Eligibility with the builtin signature list
///
/// # Examples
///
/// ```
/// use adrotate::gate::is_eligible;
///
/// assert!(is_eligible(false, "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"));
/// assert!(!is_eligible(false, "Mozilla/5.0 (compatible; Googlebot/2.1)"));
/// assert!(!is_eligible(true, "Mozilla/5.0"));
/// assert!(is_eligible(false, ""));
/// ```
pub fn is_eligible(visitor_is_authenticated: bool, user_agent: &str) -> bool {
    !visitor_is_authenticated && !is_bot(user_agent)
}

// ============================================================================
// Gate
// ============================================================================

/// Gate settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Cookie name prefixes that mark a signed-in visitor
    pub auth_cookie_prefixes: Vec<String>,

    /// Honor an upstream authentication header
    pub trust_auth_header: bool,

    /// Header set by a trusted upstream for signed-in visitors
    pub auth_header: String,

    /// Signatures checked in addition to the builtin list
    pub extra_bot_signatures: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            auth_cookie_prefixes: vec!["wordpress_logged_in_".to_string()],
            trust_auth_header: false,
            auth_header: "x-visitor-authenticated".to_string(),
            extra_bot_signatures: Vec::new(),
        }
    }
}

/// Why a request was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Run the rotation engine
    Eligible,
    /// Visitor is signed in
    Authenticated,
    /// User agent matched a crawler signature
    Bot { signature: String },
}

impl GateDecision {
    /// Check if the engine should run
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::Authenticated => "authenticated",
            Self::Bot { .. } => "bot",
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bot { signature } => write!(f, "bot ({signature})"),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// Eligibility gate with configured extra signatures
#[derive(Debug, Clone, Default)]
pub struct Gate {
    extra_signatures: Vec<String>,
}

impl Gate {
    /// Gate with only the builtin signatures
    pub fn new() -> Self {
        Self::default()
    }

    /// Add signatures, lowercased; blank entries are ignored
    pub fn with_extra_signatures<I, S>(mut self, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extra_signatures.extend(
            signatures
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty()),
        );
        self
    }

    /// Build from gate settings
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new().with_extra_signatures(&config.extra_bot_signatures)
    }

    /// Classify a request
    pub fn evaluate(&self, authenticated: bool, user_agent: &str) -> GateDecision {
        if authenticated {
            return GateDecision::Authenticated;
        }

        if let Some(signature) = match_bot_signature(user_agent) {
            return GateDecision::Bot {
                signature: signature.to_string(),
            };
        }

        let normalized = user_agent.trim().to_lowercase();
        if !normalized.is_empty() {
            if let Some(signature) = self
                .extra_signatures
                .iter()
                .find(|signature| normalized.contains(signature.as_str()))
            {
                return GateDecision::Bot {
                    signature: signature.clone(),
                };
            }
        }

        GateDecision::Eligible
    }

    /// Number of configured extra signatures
    pub fn extra_signature_count(&self) -> usize {
        self.extra_signatures.len()
    }
}
