//! REST API handlers for the ad server
//!
//! This module defines the API routes and handlers.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::delivery::{DeliveryOutcome, VisitorContext};
use crate::metrics;
use crate::render::render_snippet;
use crate::rotation::day_key;

use super::server::{AppState, ReloadError};

/// Header carrying the settings API key
pub const API_KEY_HEADER: &str = "x-api-key";

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Delivery decision for one request
#[derive(Debug, Serialize)]
pub struct AdResponse {
    /// Payload to embed, absent when nothing is shown
    pub ad: Option<String>,
    pub index: Option<usize>,
    pub view: Option<u32>,
    /// Outcome label (served, exhausted, no_ads, authenticated, bot, unavailable)
    pub reason: &'static str,
}

impl From<&DeliveryOutcome> for AdResponse {
    fn from(outcome: &DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::Served {
                index,
                view,
                payload,
            } => Self {
                ad: Some(payload.clone()),
                index: Some(*index),
                view: Some(*view),
                reason: outcome.label(),
            },
            other => Self {
                ad: None,
                index: None,
                view: None,
                reason: other.label(),
            },
        }
    }
}

/// Effective rotation settings
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub ad_count: usize,
    pub views_per_ad: u32,
    pub daily_quota: u64,
    pub utc_offset: String,
    pub today: String,
    pub config_file: Option<String>,
}

/// Service statistics
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub sessions: Option<usize>,
    pub session_backend: String,
    pub ad_count: usize,
    pub uptime_secs: u64,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/api/health", get(health_check))
        // Delivery endpoints
        .route("/api/ad", get(get_ad))
        .route("/api/ad/snippet", get(get_snippet))
        // Settings endpoints
        .route("/api/settings", get(get_settings))
        .route("/api/settings/reload", post(reload_settings))
        // Stats endpoints
        .route("/api/stats", get(get_stats))
        .route("/metrics", get(get_metrics))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Record per-endpoint request counts and latency
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
    }))
}

// ============================================================================
// Delivery Handlers
// ============================================================================

/// Run delivery for the request's visitor
async fn deliver(state: &AppState, headers: &HeaderMap) -> (VisitorContext, DeliveryOutcome) {
    let visitor = VisitorContext::from_headers(headers, &state.cookie_name, &state.gate_config);
    let outcome = state.delivery.deliver(&visitor).await;
    (visitor, outcome)
}

/// Attach the session cookie when the id was minted for this request
fn with_session_cookie(mut response: Response, state: &AppState, visitor: &VisitorContext) -> Response {
    if visitor.is_new_session {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            state.cookie_name, visitor.session_id
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "Session cookie not representable as a header"),
        }
    }

    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Delivery decision as JSON
async fn get_ad(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (visitor, outcome) = deliver(&state, &headers).await;
    let response = Json(ApiResponse::success(AdResponse::from(&outcome))).into_response();
    with_session_cookie(response, &state, &visitor)
}

/// Rendered snippet, or 204 when nothing is shown
async fn get_snippet(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (visitor, outcome) = deliver(&state, &headers).await;

    let response = match outcome.ad() {
        Some(payload) => (
            [(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
            render_snippet(payload),
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };

    with_session_cookie(response, &state, &visitor)
}

// ============================================================================
// Settings Handlers
// ============================================================================

/// Reject the request unless it carries the configured API key
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.api_key.as_deref() else {
        return Ok(());
    };

    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Missing or invalid API key")),
        )
            .into_response())
    }
}

/// Effective rotation settings
async fn get_settings(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let settings = state.delivery.settings();
    Json(ApiResponse::success(SettingsResponse {
        ad_count: settings.len(),
        views_per_ad: settings.views_per_ad(),
        daily_quota: settings.daily_quota(),
        utc_offset: state.utc_offset.to_string(),
        today: day_key(state.delivery.today()),
        config_file: state
            .config_path
            .as_ref()
            .map(|path| path.display().to_string()),
    }))
    .into_response()
}

/// Reload rotation settings from the config file
async fn reload_settings(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    match state.reload_settings() {
        Ok(()) => get_settings(State(state), headers).await,
        Err(e @ ReloadError::NoConfigFile) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))).into_response()
        }
        Err(e @ ReloadError::Invalid(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

// ============================================================================
// Stats Handlers
// ============================================================================

/// Service statistics
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.delivery.store();
    let sessions = match store.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to count sessions");
            None
        }
    };

    Json(ApiResponse::success(StatsResponse {
        sessions,
        session_backend: store.backend_name().to_string(),
        ad_count: state.delivery.settings().len(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

/// Prometheus text exposition
async fn get_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            [(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            )],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(format!("Failed to encode metrics: {e}"))),
        )
            .into_response(),
    }
}
