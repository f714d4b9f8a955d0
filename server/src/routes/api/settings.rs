//! Settings API endpoints
//!
//! One JSON blob per settings page, replaced as a whole on save.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};
use stockctl_core::schema::{form_for, persisted_fields};
use stockctl_core::{Domain, Error, Result, SettingsBlob};
use stockctl_database::queries;
use tracing::{error, info, instrument};

use super::{read_form, ApiError, ApiResult};
use crate::state::AppState;

/// Create settings router
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_settings))
        .route("/{domain}", get(get_settings).put(update_settings))
}

fn parse_domain(raw: &str) -> ApiResult<Domain> {
    raw.parse()
        .map_err(|_| ApiError::not_found(&format!("Settings domain '{}'", raw)))
}

/// Check a submitted blob against the page's controls
///
/// Returns the blob normalized through the form: every persisted control is
/// present, checkboxes as booleans and everything else as text.
pub fn validate_settings(domain: Domain, blob: &SettingsBlob) -> Result<SettingsBlob> {
    let persisted = persisted_fields(domain);
    if let Some(unknown) = blob.keys().find(|k| !persisted.contains(&k.as_str())) {
        return Err(Error::ValidationError(format!("Unknown setting '{}'", unknown)));
    }

    let mut form = form_for(domain);
    form.populate(blob);
    form.validate()?;
    Ok(form.collect(&persisted))
}

/// List the stored settings of every page
#[instrument(skip(state))]
async fn list_settings(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let rows = queries::list_settings(&state.pool).await.map_err(|e| {
        error!(error = %e, "Failed to list settings");
        ApiError::internal_error(format!("Failed to list settings: {}", e))
    })?;

    let mut pages = Map::new();
    for row in rows {
        let Ok(domain) = row.domain.parse::<Domain>() else {
            continue;
        };
        pages.insert(
            domain.as_str().to_string(),
            json!({
                "key": row.domain,
                "settings": row.settings(domain),
                "updated_at": row.updated_at
            }),
        );
    }

    Ok(Json(json!({
        "success": true,
        "settings": pages
    })))
}

/// Get the settings of one page
///
/// A page that was never saved has an empty blob.
#[instrument(skip(state))]
async fn get_settings(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let domain = parse_domain(&raw)?;
    let row = queries::get_settings(&state.pool, domain)
        .await
        .map_err(|e| {
            error!(error = %e, domain = %domain, "Failed to get settings");
            ApiError::internal_error(format!("Failed to get settings: {}", e))
        })?;

    let (settings, updated_at) = match row {
        Some(row) => (row.settings(domain), Some(row.updated_at)),
        None => (SettingsBlob::new(), None),
    };

    Ok(Json(json!({
        "success": true,
        "domain": domain.as_str(),
        "key": domain.storage_key(),
        "settings": settings,
        "updated_at": updated_at
    })))
}

/// Replace the settings of one page
#[instrument(skip(state, headers, body))]
async fn update_settings(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let domain = parse_domain(&raw)?;
    let blob = read_form(&state, &headers, body)?;
    let blob = validate_settings(domain, &blob).map_err(ApiError::from_core)?;

    queries::put_settings(&state.pool, domain, &blob)
        .await
        .map_err(|e| {
            error!(error = %e, domain = %domain, "Failed to save settings");
            ApiError::internal_error(format!("Failed to save settings: {}", e))
        })?;

    info!(domain = %domain, fields = blob.len(), "Settings saved");

    Ok(Json(json!({
        "success": true,
        "message": format!("{} settings saved successfully", domain.title()),
        "settings": blob
    })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[test]
    fn test_validate_rejects_unknown_key() {
        let blob = SettingsBlob::parse(r#"{"apiTimeout": "30", "bogus": 1}"#).unwrap();
        let err = validate_settings(Domain::Api, &blob).unwrap_err();
        assert_eq!(err.user_message(), "Unknown setting 'bogus'");
    }

    #[test]
    fn test_validate_normalizes() {
        let blob = SettingsBlob::parse(r#"{"lowStockThreshold": 5}"#).unwrap();
        let normalized = validate_settings(Domain::Inventory, &blob).unwrap();
        assert_eq!(normalized.get_text("lowStockThreshold").as_deref(), Some("5"));
        assert_eq!(normalized.get_text("defaultUnit").as_deref(), Some("pcs"));
        assert_eq!(normalized.get_bool("enableBarcodes"), Some(true));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let app = app(state(None).await);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/v1/settings/maintenance",
                json!({"maintenanceMode": true, "logLevel": "debug"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Maintenance settings saved successfully");

        let response = app
            .oneshot(empty_request("GET", "/api/v1/settings/maintenance"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["key"], "maintenanceSettings");
        assert_eq!(body["settings"]["maintenanceMode"], true);
        assert_eq!(body["settings"]["logLevel"], "debug");
    }

    #[tokio::test]
    async fn test_unsaved_page_is_empty() {
        let app = app(state(None).await);
        let response = app
            .oneshot(empty_request("GET", "/api/v1/settings/backup"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["settings"], json!({}));
        assert!(body["updated_at"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_domain() {
        let app = app(state(None).await);
        let response = app
            .oneshot(empty_request("GET", "/api/v1/settings/payroll"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_value_rejected() {
        let app = app(state(None).await);
        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/settings/inventory",
                json!({"lowStockThreshold": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Low Stock Threshold is required");
    }

    #[tokio::test]
    async fn test_csrf_token_enforced() {
        let app = app(state(Some("s3cret")).await);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/v1/settings/api",
                json!({"apiTimeout": "45"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/settings/api",
                json!({"apiTimeout": "45", "_token": "s3cret"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["settings"]["apiTimeout"], "45");
        assert!(body["settings"].get("_token").is_none());
    }
}
