//! REST API v1 endpoints
//!
//! Every settings page and list panel talks to these routes. All endpoints
//! return JSON responses except the CSV export.
//!
//! ## API Structure
//!
//! ```text
//! /api/v1/
//! ├── health                          GET     Health check
//! ├── settings/                       List + get + replace per domain
//! ├── records/{collection}            List (filtered, paginated), POST issues an API key
//! │   ├── {id}                        DELETE
//! │   └── export                      GET     CSV download
//! ├── notifications/
//! │   ├── test/{smtp,sms,push}        POST    Channel checks
//! │   ├── send-test                   POST
//! │   ├── templates[/{id}]            GET list, POST create, DELETE
//! │   └── channels[/{id}]             GET list, POST create, DELETE
//! ├── webhooks/{id}/test              POST    Deliver a test event
//! └── jobs/                           POST start, GET status, DELETE cancel
//! ```
//!
//! Mutating requests carry the configured CSRF token, either as the `_token`
//! body field or as the `X-CSRF-Token` header.

pub mod jobs;
pub mod notifications;
pub mod records;
pub mod settings;
pub mod webhooks;

use axum::{http::HeaderMap, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use stockctl_core::remote::CSRF_FIELD;
use stockctl_core::{Error, SettingsBlob};
use subtle::ConstantTimeEq;
use tracing::{debug, error, instrument, warn};

use crate::state::AppState;

pub const CSRF_HEADER: &str = "x-csrf-token";

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: ApiErrorDetails,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetails {
    pub code: String,
    pub message: String,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

impl ApiError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ApiErrorDetails {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn not_found(resource: &str) -> (StatusCode, Json<Self>) {
        (
            StatusCode::NOT_FOUND,
            Json(Self::new("NOT_FOUND", format!("{} not found", resource))),
        )
    }

    pub fn bad_request(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::BAD_REQUEST,
            Json(Self::new("BAD_REQUEST", message)),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new("INTERNAL_ERROR", message)),
        )
    }

    pub fn conflict(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::CONFLICT, Json(Self::new("CONFLICT", message)))
    }

    /// An upstream the server contacted on the caller's behalf failed
    pub fn bad_gateway(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::BAD_GATEWAY,
            Json(Self::new("BAD_GATEWAY", message)),
        )
    }

    pub fn csrf_mismatch() -> (StatusCode, Json<Self>) {
        (
            StatusCode::FORBIDDEN,
            Json(Self::new("CSRF_MISMATCH", "Invalid or missing CSRF token")),
        )
    }

    /// Map a core error: validation problems are the caller's fault
    pub fn from_core(err: Error) -> (StatusCode, Json<Self>) {
        match err {
            Error::ValidationError(msg) => Self::bad_request(msg),
            Error::UnknownDomain(d) => Self::not_found(&format!("Settings domain '{}'", d)),
            Error::UnknownCollection(c) => Self::not_found(&format!("Collection '{}'", c)),
            other => {
                error!(error = %other, "Request failed");
                Self::internal_error(other.user_message())
            }
        }
    }
}

pub(crate) fn default_page() -> usize {
    1
}

pub(crate) fn default_per_page() -> usize {
    50
}

/// Pagination metadata for list responses
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl PaginationMeta {
    pub fn new(page: usize, per_page: usize, total: usize) -> Self {
        Self {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page.max(1)),
        }
    }
}

// ============================================================================
// CSRF
// ============================================================================

pub fn header_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok())
}

/// Compare the provided token with the configured one
///
/// Without a configured token the check is off.
pub fn verify_csrf(state: &AppState, provided: Option<&str>) -> ApiResult<()> {
    let Some(expected) = state.config.csrf_token.as_deref() else {
        return Ok(());
    };
    let matches = provided.is_some_and(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())));
    if matches {
        Ok(())
    } else {
        warn!(provided = provided.is_some(), "CSRF token mismatch");
        Err(ApiError::csrf_mismatch())
    }
}

/// Read a form-style JSON body into a settings blob
///
/// Checks the CSRF token (body field first, header second) and strips it.
pub fn read_form(state: &AppState, headers: &HeaderMap, body: Value) -> ApiResult<SettingsBlob> {
    let Value::Object(mut fields) = body else {
        return Err(ApiError::bad_request("Request body must be a JSON object"));
    };
    let token = fields.remove(CSRF_FIELD);
    let provided = token
        .as_ref()
        .and_then(Value::as_str)
        .or_else(|| header_token(headers));
    verify_csrf(state, provided)?;

    SettingsBlob::parse(&Value::Object(fields).to_string()).map_err(ApiError::from_core)
}

/// Create the complete v1 API router
pub fn routes() -> Router<AppState> {
    Router::new()
        // System endpoints
        .route("/health", get(health_check))
        // Resource endpoints (nested routers)
        .nest("/settings", settings::routes())
        .nest("/records", records::routes())
        .nest("/notifications", notifications::routes())
        .nest("/webhooks", webhooks::routes())
        .nest("/jobs", jobs::routes())
}

/// Health check endpoint
///
/// ## Response
/// ```json
/// {
///   "status": "ok",
///   "service": "stockctl",
///   "version": "0.1.0"
/// }
/// ```
#[instrument]
async fn health_check() -> impl IntoResponse {
    debug!("Health check requested");
    Json(json!({
        "status": "ok",
        "service": "stockctl",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
