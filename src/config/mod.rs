//! Configuration management for adrotate
//!
//! Settings come from a TOML file or from `ADROTATE_*` environment variables.
//! Every section has defaults, so a file only needs the keys it changes:
//!
//! ```toml
//! [rotation]
//! views_per_ad = 3
//! utc_offset = "+09:00"
//! ad_scripts = """
//! <script src="https://ads.example.com/a.js"></script>
//! <script src="https://ads.example.com/b.js"></script>
//! """
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gate::GateConfig;
use crate::rotation::{parse_utc_offset, RotationConfig, SystemClock, DEFAULT_VIEWS_PER_AD};
use crate::server::ServerConfig;
use crate::session::{SessionBackend, SessionConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Ad list and rotation threshold
    pub rotation: RotationSettings,

    /// Session storage configuration
    pub session: SessionConfig,

    /// Eligibility gate configuration
    pub gate: GateConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Rotation settings as written in the config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    /// Inline ad list, one payload per line
    pub ad_scripts: String,

    /// File holding the ad list; takes precedence over `ad_scripts`
    pub ad_scripts_file: Option<PathBuf>,

    /// Views per ad before advancing; values below 1 are treated as 1
    pub views_per_ad: i64,

    /// Offset whose calendar day drives the daily reset (e.g. "+09:00")
    pub utc_offset: String,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            ad_scripts: String::new(),
            ad_scripts_file: None,
            views_per_ad: i64::from(DEFAULT_VIEWS_PER_AD),
            utc_offset: String::from("+00:00"),
        }
    }
}

impl RotationSettings {
    /// Raw ad blob, read from `ad_scripts_file` when set
    pub fn raw_ad_scripts(&self) -> Result<String> {
        match &self.ad_scripts_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read ad scripts file: {}", path.display())),
            None => Ok(self.ad_scripts.clone()),
        }
    }

    /// Build the engine configuration
    pub fn rotation_config(&self) -> Result<RotationConfig> {
        let raw = self.raw_ad_scripts()?;
        let config = RotationConfig::from_raw(&raw, self.views_per_ad);

        if i64::from(config.views_per_ad()) != self.views_per_ad {
            tracing::warn!(
                configured = self.views_per_ad,
                effective = config.views_per_ad(),
                "views_per_ad out of range, clamped"
            );
        }

        Ok(config)
    }

    /// Clock for the configured reset offset
    pub fn clock(&self) -> Result<SystemClock> {
        let offset = parse_utc_offset(&self.utc_offset)?;
        Ok(SystemClock::new(offset))
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, pretty, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["text", "pretty", "json"];

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("ADROTATE_BIND") {
            config.server.bind_address = addr
                .parse()
                .with_context(|| format!("Invalid ADROTATE_BIND address: {addr}"))?;
        }
        if let Some(key) = lookup("ADROTATE_API_KEY").filter(|k| !k.is_empty()) {
            config.server.api_key = Some(key);
        }
        if let Some(enable) = lookup("ADROTATE_ENABLE_CORS").and_then(|v| parse_flag(&v)) {
            config.server.enable_cors = enable;
        }

        if let Some(ads) = lookup("ADROTATE_AD_SCRIPTS") {
            config.rotation.ad_scripts = ads;
        }
        if let Some(path) = lookup("ADROTATE_AD_SCRIPTS_FILE").filter(|p| !p.is_empty()) {
            config.rotation.ad_scripts_file = Some(PathBuf::from(path));
        }
        if let Some(views) = lookup("ADROTATE_VIEWS_PER_AD").and_then(|v| v.trim().parse().ok()) {
            config.rotation.views_per_ad = views;
        }
        if let Some(offset) = lookup("ADROTATE_UTC_OFFSET") {
            config.rotation.utc_offset = offset;
        }

        if let Some(name) = lookup("ADROTATE_SESSION_BACKEND") {
            config.session.backend = SessionBackend::from_name(&name)
                .with_context(|| format!("Unknown session backend: {name}"))?;
        }
        if let Some(name) = lookup("ADROTATE_SESSION_COOKIE") {
            config.session.cookie_name = name;
        }
        if let Some(ttl) = lookup("ADROTATE_SESSION_TTL").and_then(|v| v.trim().parse().ok()) {
            config.session.ttl_secs = ttl;
        }
        if let Some(url) = lookup("ADROTATE_REDIS_URL") {
            config.session.redis_url = url;
        }
        if let Some(prefix) = lookup("ADROTATE_REDIS_PREFIX") {
            config.session.key_prefix = prefix;
        }
        if let Some(size) = lookup("ADROTATE_REDIS_POOL_SIZE").and_then(|v| v.trim().parse().ok()) {
            config.session.pool_size = size;
        }

        if let Some(prefixes) = lookup("ADROTATE_AUTH_COOKIE_PREFIXES") {
            config.gate.auth_cookie_prefixes = split_list(&prefixes);
        }
        if let Some(trust) = lookup("ADROTATE_TRUST_AUTH_HEADER").and_then(|v| parse_flag(&v)) {
            config.gate.trust_auth_header = trust;
        }
        if let Some(header) = lookup("ADROTATE_AUTH_HEADER") {
            config.gate.auth_header = header.to_ascii_lowercase();
        }
        if let Some(signatures) = lookup("ADROTATE_EXTRA_BOT_SIGNATURES") {
            config.gate.extra_bot_signatures = split_list(&signatures);
        }

        if let Some(level) = lookup("ADROTATE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("ADROTATE_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` if given, otherwise from the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.server.validate().context("Invalid [server] section")?;
        self.session.validate().context("Invalid [session] section")?;

        parse_utc_offset(&self.rotation.utc_offset).context("Invalid [rotation] section")?;

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            );
        }

        if !LOG_FORMATS.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!(
                "logging.format must be one of {}, got '{}'",
                LOG_FORMATS.join(", "),
                self.logging.format
            );
        }

        if self.gate.trust_auth_header
            && axum::http::HeaderName::from_bytes(self.gate.auth_header.as_bytes()).is_err()
        {
            anyhow::bail!("gate.auth_header is not a valid header name: '{}'", self.gate.auth_header);
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
