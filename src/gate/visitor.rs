//! Request context extraction for the gate
//!
//! Pulls the user agent and the signed-in signal out of incoming headers.

use axum::http::header::{COOKIE, USER_AGENT};
use axum::http::HeaderMap;

use super::GateConfig;

/// Raw `User-Agent` value, empty when absent or not valid text
pub fn extract_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Iterate `(name, value)` pairs across all `Cookie` headers
fn cookie_pairs(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            Some((name.trim(), value.trim()))
        })
}

/// Value of the first cookie named `name`
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    cookie_pairs(headers)
        .find(|(cookie, _)| *cookie == name)
        .map(|(_, value)| value)
}

/// Check whether the request comes from a signed-in visitor
pub fn is_authenticated(headers: &HeaderMap, config: &GateConfig) -> bool {
    let has_auth_cookie = cookie_pairs(headers).any(|(name, _)| {
        config
            .auth_cookie_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
    });
    if has_auth_cookie {
        return true;
    }

    if !config.trust_auth_header {
        return false;
    }

    headers
        .get(config.auth_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
