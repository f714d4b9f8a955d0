//! Webhook API endpoints
//!
//! Delivers a test event to a registered webhook.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use stockctl_core::remote::CSRF_FIELD;
use stockctl_core::{Collection, SampleRecord};
use stockctl_database::queries;
use tracing::{error, info, instrument, warn};

use super::{header_token, verify_csrf, ApiError, ApiResult};
use crate::state::AppState;

/// Create webhooks router
pub fn routes() -> Router<AppState> {
    Router::new().route("/{id}/test", post(test_webhook))
}

/// Token from an optional JSON body, falling back to the header
fn request_token(headers: &HeaderMap, body: &Bytes) -> Option<String> {
    let from_body = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get(CSRF_FIELD).and_then(Value::as_str).map(str::to_string));
    from_body.or_else(|| header_token(headers).map(str::to_string))
}

/// POST a test event to the webhook's URL
#[instrument(skip(state, headers, body))]
async fn test_webhook(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    verify_csrf(&state, request_token(&headers, &body).as_deref())?;

    let record = queries::get_record(&state.pool, Collection::Webhooks, id)
        .await
        .map_err(|e| {
            error!(error = %e, id, "Failed to load webhook");
            ApiError::internal_error(format!("Failed to load webhook: {}", e))
        })?;
    let Some(SampleRecord::Webhook(webhook)) = record else {
        return Err(ApiError::not_found("Webhook"));
    };

    let event = json!({
        "event": "webhook.test",
        "webhook_id": webhook.id,
        "timestamp": Utc::now(),
    });

    info!(id, url = %webhook.url, "Delivering webhook test event");
    let response = state
        .http
        .post(&webhook.url)
        .json(&event)
        .send()
        .await
        .map_err(|e| {
            warn!(id, error = %e, "Webhook delivery failed");
            ApiError::bad_gateway(format!("Webhook delivery failed: {}", e))
        })?;

    let status = response.status();
    if !status.is_success() {
        warn!(id, status = %status, "Webhook rejected test event");
        return Err(ApiError::bad_gateway(format!(
            "Webhook responded with HTTP {}",
            status.as_u16()
        )));
    }

    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Test event delivered to {} (HTTP {})",
            webhook.name,
            status.as_u16()
        )
    })))
}
