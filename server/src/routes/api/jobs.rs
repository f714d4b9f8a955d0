//! Job API endpoints
//!
//! Long-running actions started by a page and polled until they finish.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use stockctl_core::schema::BACKUP_TYPES;
use tracing::{info, instrument};

use super::{header_token, read_form, verify_csrf, ApiError, ApiResult};
use crate::jobs::BACKUP_PARTS;
use crate::state::AppState;

/// Create jobs router
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(start_job))
        .route("/{id}", get(job_status).delete(cancel_job))
}

/// Start a job
///
/// Only `kind: "backup"` exists; the backup type checkboxes pick the parts.
#[instrument(skip(state, headers, body))]
async fn start_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let blob = read_form(&state, &headers, body)?;

    let kind = blob.get_text("kind").unwrap_or_else(|| "backup".to_string());
    if kind != "backup" {
        return Err(ApiError::bad_request(format!("Unknown job kind '{}'", kind)));
    }

    let parts: Vec<String> = BACKUP_TYPES
        .iter()
        .zip(BACKUP_PARTS)
        .filter(|(field, _)| blob.get_bool(field).unwrap_or(false))
        .map(|(_, part)| part.to_string())
        .collect();
    if parts.is_empty() {
        return Err(ApiError::bad_request("Please select at least one backup type"));
    }

    let job_id = state.jobs.start_backup(state.pool.clone(), parts).await;
    info!(job_id = %job_id, "Job started");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "job_id": job_id,
            "message": "Backup started"
        })),
    ))
}

/// Current progress of a job
#[instrument(skip(state))]
async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let status = state
        .jobs
        .status(&id)
        .await
        .ok_or_else(|| ApiError::not_found("Job"))?;
    Ok(Json(status))
}

/// Cancel a running job
#[instrument(skip(state, headers))]
async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    verify_csrf(&state, header_token(&headers))?;

    match state.jobs.cancel(&id).await {
        None => Err(ApiError::not_found("Job")),
        Some(false) => Err(ApiError::conflict("Job has already finished")),
        Some(true) => {
            info!(job_id = %id, "Job cancelled");
            Ok(Json(json!({
                "success": true,
                "message": "Job cancelled"
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_backup_job_lifecycle() {
        let app = app(state(None).await);
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/jobs",
                json!({"kind": "backup", "backupDatabase": true, "backupFiles": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/jobs/{}", job_id);
        let mut status = json!(null);
        for _ in 0..500 {
            let response = app
                .clone()
                .oneshot(empty_request("GET", &uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            status = body_json(response).await;
            if status["state"] != "running" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(status["state"], "completed");
        assert_eq!(status["percent"], 100);

        // A finished job cannot be cancelled
        let response = app
            .oneshot(empty_request("DELETE", &uri))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_backup_needs_a_part() {
        let app = app(state(None).await);
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/jobs",
                json!({"backupDatabase": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Please select at least one backup type");
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let app = app(state(None).await);
        let response = app
            .clone()
            .oneshot(empty_request("GET", "/api/v1/jobs/job_missing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(empty_request("DELETE", "/api/v1/jobs/job_missing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
