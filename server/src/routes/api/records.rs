//! Record API endpoints
//!
//! List panels for API keys, webhooks, backups, logs and metrics. Rows can be
//! deleted; only API keys can be created.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use stockctl_core::records::{ApiKey, DateRange};
use stockctl_core::render::to_csv;
use stockctl_core::schema::form_for;
use stockctl_core::{Collection, Domain, RecordFilter, RecordPage, Result, SampleRecord};
use stockctl_database::queries;
use tracing::{error, info, instrument};

use super::{
    default_page, default_per_page, header_token, read_form, verify_csrf, ApiError, ApiResult,
    PaginationMeta,
};
use crate::state::AppState;

/// Create records router
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{collection}", get(list_records).post(create_record))
        .route("/{collection}/export", get(export_records))
        .route("/{collection}/{id}", delete(delete_record))
}

/// Filter and pagination query of the list endpoints
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
    method: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "dateRange")]
    date_range: Option<String>,
    search: Option<String>,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_per_page")]
    per_page: usize,
}

impl ListQuery {
    fn filter(&self) -> Result<RecordFilter> {
        let date_range = match self.date_range.as_deref() {
            Some(raw) => raw.parse()?,
            None => DateRange::All,
        };
        Ok(RecordFilter {
            status: self.status.clone(),
            method: self.method.clone(),
            kind: self.kind.clone(),
            date_range,
            search: self.search.clone(),
        })
    }
}

fn parse_collection(raw: &str) -> ApiResult<Collection> {
    raw.parse()
        .map_err(|_| ApiError::not_found(&format!("Collection '{}'", raw)))
}

async fn filtered(state: &AppState, collection: Collection, query: &ListQuery) -> ApiResult<Vec<SampleRecord>> {
    let filter = query.filter().map_err(ApiError::from_core)?;
    queries::list_records(&state.pool, collection, &filter)
        .await
        .map_err(|e| {
            error!(error = %e, collection = %collection, "Failed to list records");
            ApiError::internal_error(format!("Failed to list records: {}", e))
        })
}

/// List records of a collection, newest first
#[instrument(skip(state))]
async fn list_records(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let collection = parse_collection(&raw)?;
    let records = filtered(&state, collection, &query).await?;
    let page = RecordPage::paginate(records, query.page, query.per_page);
    let pagination = PaginationMeta::new(page.page, page.per_page, page.total);

    Ok(Json(json!({
        "success": true,
        "items": page.items,
        "page": page.page,
        "per_page": page.per_page,
        "total": page.total,
        "pagination": pagination
    })))
}

/// Issue an API key; the only collection that accepts new rows
///
/// A key with the same name is replaced under its old id. The full token is
/// returned once and only its masked preview is stored.
#[instrument(skip(state, headers, body))]
async fn create_record(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let collection = parse_collection(&raw)?;
    if collection != Collection::ApiKeys {
        return Err(ApiError::bad_request(format!(
            "Records cannot be created in {}",
            collection
        )));
    }

    let blob = read_form(&state, &headers, body)?;
    let mut form = form_for(Domain::Api);
    form.populate(&blob);
    form.require(&["keyName"])
        .map_err(|e| ApiError::bad_request(e.user_message()))?;
    let name = form.value("keyName").unwrap_or_default().trim().to_string();
    let level = form.value("keyPermissions").unwrap_or("read").to_string();

    let existing = queries::list_records(&state.pool, collection, &RecordFilter::default())
        .await
        .map_err(ApiError::from_core)?
        .into_iter()
        .find(|r| r.display_name() == name)
        .map(|r| r.id());

    let (mut key, token) = ApiKey::issue(existing.unwrap_or(0), &name, &level, Utc::now());
    match existing {
        Some(_) => {
            queries::upsert_record(&state.pool, collection, &SampleRecord::ApiKey(key.clone()))
                .await
                .map_err(ApiError::from_core)?;
        }
        None => {
            key.id = queries::insert_record(&state.pool, collection, &SampleRecord::ApiKey(key.clone()))
                .await
                .map_err(ApiError::from_core)?;
        }
    }

    info!(id = key.id, name = %name, "API key issued");
    Ok(Json(json!({
        "success": true,
        "message": format!(
            "API key '{}' generated. Copy it now, it will not be shown again.",
            name
        ),
        "token": token,
        "record": SampleRecord::ApiKey(key)
    })))
}

/// Delete one record
#[instrument(skip(state, headers))]
async fn delete_record(
    State(state): State<AppState>,
    Path((raw, id)): Path<(String, i64)>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    verify_csrf(&state, header_token(&headers))?;
    let collection = parse_collection(&raw)?;

    let deleted = queries::delete_record(&state.pool, collection, id)
        .await
        .map_err(|e| {
            error!(error = %e, collection = %collection, id, "Failed to delete record");
            ApiError::internal_error(format!("Failed to delete record: {}", e))
        })?;
    if !deleted {
        return Err(ApiError::not_found("Record"));
    }

    info!(collection = %collection, id, "Record deleted");
    Ok(Json(json!({
        "success": true,
        "message": "Record deleted successfully"
    })))
}

/// Download the filtered records as CSV
#[instrument(skip(state))]
async fn export_records(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let collection = parse_collection(&raw)?;
    let records = filtered(&state, collection, &query).await?;
    let body = to_csv(collection, &records, Utc::now()).map_err(ApiError::from_core)?;

    let filename = format!("{}-{}.csv", collection, Utc::now().format("%Y-%m-%d"));
    info!(collection = %collection, rows = records.len(), "Records exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}
