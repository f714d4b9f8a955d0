//! Notification API endpoints
//!
//! Connection checks for the delivery channels, the test notification, and
//! the stored message templates and delivery channels.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::time::Duration;
use stockctl_core::schema::form_for;
use stockctl_core::delivery::{ChannelDraft, TemplateDraft};
use stockctl_core::{Channel, Domain, FormModel, SettingsBlob};
use stockctl_database::queries;
use tokio::net::TcpStream;
use tracing::{error, info, instrument, warn};

use super::{header_token, read_form, verify_csrf, ApiError, ApiResult};
use crate::state::AppState;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Create notifications router
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/test/smtp", post(test_smtp))
        .route("/test/sms", post(test_sms))
        .route("/test/push", post(test_push))
        .route("/send-test", post(send_test))
        .route("/templates", get(list_templates).post(create_template))
        .route("/templates/{id}", delete(delete_template))
        .route("/channels", get(list_channels).post(create_channel))
        .route("/channels/{id}", delete(delete_channel))
}

/// Load the submitted fields onto the notifications form
fn notification_form(blob: &SettingsBlob, channel: Option<Channel>) -> ApiResult<FormModel> {
    let mut form = form_for(Domain::Notifications);
    form.populate(blob);
    if let Some(channel) = channel {
        form.require(channel.required())
            .map_err(|e| ApiError::bad_request(e.user_message()))?;
    }
    Ok(form)
}

/// Open a TCP connection to the configured SMTP server
#[instrument(skip(state, headers, body))]
async fn test_smtp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let blob = read_form(&state, &headers, body)?;
    let form = notification_form(&blob, Some(Channel::Smtp))?;

    let host = form.value("smtpHost").unwrap_or_default().trim().to_string();
    let port: u16 = form
        .value("smtpPort")
        .unwrap_or_default()
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("SMTP Port must be a valid port number"))?;

    info!(host = %host, port, "Testing SMTP connection");
    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_)) => Ok(Json(json!({
            "success": true,
            "message": format!("SMTP connection to {}:{} successful", host, port)
        }))),
        Ok(Err(e)) => {
            warn!(host = %host, port, error = %e, "SMTP connection failed");
            Err(ApiError::bad_gateway(format!(
                "SMTP connection to {}:{} failed: {}",
                host, port, e
            )))
        }
        Err(_) => {
            warn!(host = %host, port, "SMTP connection timed out");
            Err(ApiError::bad_gateway(format!(
                "SMTP connection to {}:{} timed out",
                host, port
            )))
        }
    }
}

/// Check the SMS provider settings
#[instrument(skip(state, headers, body))]
async fn test_sms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let blob = read_form(&state, &headers, body)?;
    let form = notification_form(&blob, Some(Channel::Sms))?;
    form.validate()
        .map_err(|e| ApiError::bad_request(e.user_message()))?;

    let provider = form.value("smsProvider").unwrap_or_default();
    Ok(Json(json!({
        "success": true,
        "message": format!("SMS provider {} configuration is valid", provider)
    })))
}

/// Check the push notification settings
#[instrument(skip(state, headers, body))]
async fn test_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let blob = read_form(&state, &headers, body)?;
    notification_form(&blob, Some(Channel::Push))?;

    Ok(Json(json!({
        "success": true,
        "message": "Push notification configuration is valid"
    })))
}

/// Queue a test notification to the given recipient
#[instrument(skip(state, headers, body))]
async fn send_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let blob = read_form(&state, &headers, body)?;
    let form = notification_form(&blob, None)?;
    form.require(&["testRecipient"])
        .map_err(|e| ApiError::bad_request(e.user_message()))?;

    let recipient = form.value("testRecipient").unwrap_or_default().trim().to_string();
    let is_email = recipient.contains('@');
    let is_phone = recipient.starts_with('+')
        && recipient.len() > 4
        && recipient[1..].chars().all(|c| c.is_ascii_digit());
    if !is_email && !is_phone {
        return Err(ApiError::bad_request(
            "Test recipient must be an email address or phone number",
        ));
    }

    info!(recipient = %recipient, "Test notification queued");
    Ok(Json(json!({
        "success": true,
        "message": format!("Test notification sent to {}", recipient)
    })))
}

// ============================================================================
// Templates and channels
// ============================================================================

#[instrument(skip(state))]
async fn list_templates(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let templates = queries::list_templates(&state.pool).await.map_err(|e| {
        error!(error = %e, "Failed to list templates");
        ApiError::internal_error(format!("Failed to list templates: {}", e))
    })?;
    Ok(Json(json!({ "success": true, "templates": templates })))
}

/// Create a template, replacing any with the same name
#[instrument(skip(state, headers, body))]
async fn create_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let blob = read_form(&state, &headers, body)?;
    let draft = TemplateDraft::from_form(&blob).map_err(ApiError::from_core)?;
    let template = queries::save_template(&state.pool, &draft)
        .await
        .map_err(ApiError::from_core)?;

    info!(id = template.id, name = %template.name, "Template saved");
    Ok(Json(json!({
        "success": true,
        "message": format!("Template '{}' saved", template.name),
        "template": template
    })))
}

#[instrument(skip(state, headers))]
async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    verify_csrf(&state, header_token(&headers))?;
    let deleted = queries::delete_template(&state.pool, id)
        .await
        .map_err(ApiError::from_core)?;
    if !deleted {
        return Err(ApiError::not_found(&format!("Template #{}", id)));
    }

    info!(id, "Template deleted");
    Ok(Json(json!({
        "success": true,
        "message": format!("Template #{} deleted", id)
    })))
}

#[instrument(skip(state))]
async fn list_channels(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let channels = queries::list_channels(&state.pool).await.map_err(|e| {
        error!(error = %e, "Failed to list channels");
        ApiError::internal_error(format!("Failed to list channels: {}", e))
    })?;
    Ok(Json(json!({ "success": true, "channels": channels })))
}

/// Create a delivery channel, replacing any with the same name
#[instrument(skip(state, headers, body))]
async fn create_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let blob = read_form(&state, &headers, body)?;
    let draft = ChannelDraft::from_form(&blob).map_err(ApiError::from_core)?;
    let channel = queries::save_channel(&state.pool, &draft)
        .await
        .map_err(ApiError::from_core)?;

    info!(id = channel.id, name = %channel.name, kind = %channel.channel_type, "Channel saved");
    Ok(Json(json!({
        "success": true,
        "message": format!("{} channel '{}' saved", channel.channel_type, channel.name),
        "channel": channel
    })))
}

#[instrument(skip(state, headers))]
async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    verify_csrf(&state, header_token(&headers))?;
    let deleted = queries::delete_channel(&state.pool, id)
        .await
        .map_err(ApiError::from_core)?;
    if !deleted {
        return Err(ApiError::not_found(&format!("Channel #{}", id)));
    }

    info!(id, "Channel deleted");
    Ok(Json(json!({
        "success": true,
        "message": format!("Channel #{} deleted", id)
    })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_smtp_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let app = app(state(None).await);
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/test/smtp",
                json!({"smtpHost": "127.0.0.1", "smtpPort": port}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["message"],
            format!("SMTP connection to 127.0.0.1:{} successful", port)
        );
    }

    #[tokio::test]
    async fn test_smtp_unreachable() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let app = app(state(None).await);
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/test/smtp",
                json!({"smtpHost": "127.0.0.1", "smtpPort": port.to_string()}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_smtp_requires_host() {
        let app = app(state(None).await);
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/test/smtp",
                json!({"smtpPort": "587"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "SMTP Host is required");
    }

    #[tokio::test]
    async fn test_sms_and_push() {
        let app = app(state(None).await);
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/test/sms",
                json!({"smsProvider": "nexmo", "smsApiKey": "k-123"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "SMS provider nexmo configuration is valid");

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/test/push",
                json!({"pushServerKey": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_test_recipient() {
        let app = app(state(None).await);
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/send-test",
                json!({"testRecipient": "ops@example.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/send-test",
                json!({"testRecipient": "nobody"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_template_lifecycle() {
        let app = app(state(Some("tok")).await);
        let template = json!({
            "_token": "tok",
            "templateName": "Low stock",
            "templateEvent": "low-stock",
            "templateSubject": "Stock running low",
            "templateBody": "{{product}} has {{quantity}} left"
        });

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/notifications/templates", template.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let id = body["template"]["id"].as_i64().unwrap();

        // Same name replaces
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/notifications/templates", template))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["template"]["id"], id);

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/api/v1/notifications/templates"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["templates"].as_array().unwrap().len(), 1);

        let uri = format!("/api/v1/notifications/templates/{}", id);
        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &uri))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = || {
            axum::http::Request::builder()
                .method("DELETE")
                .uri(&uri)
                .header("X-CSRF-Token", "tok")
                .body(axum::body::Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_template_requires_subject() {
        let app = app(state(None).await);
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/templates",
                json!({"templateName": "Low stock", "templateBody": "x"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Subject is required");
    }

    #[tokio::test]
    async fn test_channel_validation_and_listing() {
        let app = app(state(None).await);
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/channels",
                json!({"channelName": "Ops hook", "channelType": "webhook", "channelTarget": "ops"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/notifications/channels",
                json!({
                    "channelName": "Ops hook",
                    "channelType": "webhook",
                    "channelTarget": "https://hooks.example.com/ops"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["channel"]["channel_type"], "webhook");
        assert_eq!(body["channel"]["enabled"], true);

        let response = app
            .oneshot(empty_request("GET", "/api/v1/notifications/channels"))
            .await
            .unwrap();
        let body = body_json(response).await;
        let channels: Vec<stockctl_core::DeliveryChannel> =
            serde_json::from_value(body["channels"].clone()).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].target, "https://hooks.example.com/ops");
    }
}
