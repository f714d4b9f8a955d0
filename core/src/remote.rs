//! Remote routes consumed by the settings pages

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::records::{Collection, RecordFilter, RecordPage, RecordSource, SampleRecord};
use crate::{Domain, Error, Result, SettingsBlob};

/// Name of the CSRF field added to every request body
pub const CSRF_FIELD: &str = "_token";

/// Named server route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    LoadSettings(Domain),
    SaveSettings(Domain),
    TestSmtp,
    TestSms,
    TestPush,
    SendTestNotification,
    ListTemplates,
    CreateTemplate,
    DeleteTemplate(i64),
    ListChannels,
    CreateChannel,
    DeleteChannel(i64),
    TestWebhook(i64),
    ListRecords(Collection),
    CreateApiKey,
    DeleteRecord(Collection, i64),
    ExportRecords(Collection),
    StartJob,
    JobStatus(String),
    CancelJob(String),
}

impl Route {
    /// Dotted route name, as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Route::LoadSettings(_) => "settings.load",
            Route::SaveSettings(_) => "settings.save",
            Route::TestSmtp => "notifications.test.smtp",
            Route::TestSms => "notifications.test.sms",
            Route::TestPush => "notifications.test.push",
            Route::SendTestNotification => "notifications.send-test",
            Route::ListTemplates => "notifications.templates.list",
            Route::CreateTemplate => "notifications.templates.create",
            Route::DeleteTemplate(_) => "notifications.templates.delete",
            Route::ListChannels => "notifications.channels.list",
            Route::CreateChannel => "notifications.channels.create",
            Route::DeleteChannel(_) => "notifications.channels.delete",
            Route::TestWebhook(_) => "webhooks.test",
            Route::ListRecords(_) => "records.list",
            Route::CreateApiKey => "records.api-keys.create",
            Route::DeleteRecord(_, _) => "records.delete",
            Route::ExportRecords(_) => "records.export",
            Route::StartJob => "jobs.start",
            Route::JobStatus(_) => "jobs.status",
            Route::CancelJob(_) => "jobs.cancel",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Route::LoadSettings(_)
            | Route::ListTemplates
            | Route::ListChannels
            | Route::ListRecords(_)
            | Route::ExportRecords(_)
            | Route::JobStatus(_) => Method::GET,
            Route::SaveSettings(_) => Method::PUT,
            Route::DeleteTemplate(_)
            | Route::DeleteChannel(_)
            | Route::DeleteRecord(_, _)
            | Route::CancelJob(_) => Method::DELETE,
            _ => Method::POST,
        }
    }

    /// Path relative to the server base URL
    pub fn path(&self) -> String {
        match self {
            Route::LoadSettings(d) | Route::SaveSettings(d) => format!("/api/v1/settings/{}", d),
            Route::TestSmtp => "/api/v1/notifications/test/smtp".to_string(),
            Route::TestSms => "/api/v1/notifications/test/sms".to_string(),
            Route::TestPush => "/api/v1/notifications/test/push".to_string(),
            Route::SendTestNotification => "/api/v1/notifications/send-test".to_string(),
            Route::ListTemplates | Route::CreateTemplate => {
                "/api/v1/notifications/templates".to_string()
            }
            Route::DeleteTemplate(id) => format!("/api/v1/notifications/templates/{}", id),
            Route::ListChannels | Route::CreateChannel => {
                "/api/v1/notifications/channels".to_string()
            }
            Route::DeleteChannel(id) => format!("/api/v1/notifications/channels/{}", id),
            Route::TestWebhook(id) => format!("/api/v1/webhooks/{}/test", id),
            Route::ListRecords(c) => format!("/api/v1/records/{}", c),
            Route::CreateApiKey => format!("/api/v1/records/{}", Collection::ApiKeys),
            Route::DeleteRecord(c, id) => format!("/api/v1/records/{}/{}", c, id),
            Route::ExportRecords(c) => format!("/api/v1/records/{}/export", c),
            Route::StartJob => "/api/v1/jobs".to_string(),
            Route::JobStatus(id) | Route::CancelJob(id) => format!("/api/v1/jobs/{}", id),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.path())
    }
}

/// Status of a server-side job, as polled for progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub percent: u8,
    #[serde(default)]
    pub step: usize,
    /// running, completed, failed, cancelled
    pub state: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client side of the remote routes
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Send a form payload to a route and return the JSON response
    async fn send(&self, route: &Route, payload: &SettingsBlob) -> Result<Value>;

    /// GET a route with query parameters
    async fn query(&self, route: &Route, params: &[(String, String)]) -> Result<Value>;
}

#[async_trait]
impl<T: RemoteClient + ?Sized> RemoteClient for Arc<T> {
    async fn send(&self, route: &Route, payload: &SettingsBlob) -> Result<Value> {
        (**self).send(route, payload).await
    }

    async fn query(&self, route: &Route, params: &[(String, String)]) -> Result<Value> {
        (**self).query(route, params).await
    }
}

/// Success message carried by a response body, if any
pub fn response_message(value: &Value) -> Option<String> {
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Extract the user-facing message from an error response body
///
/// Accepts `{"error": {"message": ..}}`, `{"message": ..}` and
/// `{"error": ".."}`; falls back to the HTTP status text.
pub fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let candidates = [
            json.pointer("/error/message"),
            json.get("message"),
            json.get("error"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(msg) = candidate.as_str() {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 200 && !trimmed.starts_with('{') {
        return trimmed.to_string();
    }
    format!(
        "Request failed: {}",
        status.canonical_reason().unwrap_or(status.as_str())
    )
}

/// reqwest-backed client
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    csrf_token: Option<String>,
}

impl HttpRemote {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            csrf_token: None,
        }
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, route: &Route) -> String {
        format!("{}{}", self.base_url, route.path())
    }

    async fn read_response(route: &Route, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(status, &body);
            warn!(route = %route.name(), status = %status, message = %message, "Remote call rejected");
            return Err(Error::RemoteError(message));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    /// Download a route's raw body, e.g. a CSV export
    #[instrument(skip(self, params), fields(route = %route.name()))]
    pub async fn download(&self, route: &Route, params: &[(String, String)]) -> Result<Vec<u8>> {
        let response = self
            .client
            .request(route.method(), self.url(route))
            .query(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteError(error_message(status, &body)));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl RemoteClient for HttpRemote {
    #[instrument(skip(self, payload), fields(route = %route.name()))]
    async fn send(&self, route: &Route, payload: &SettingsBlob) -> Result<Value> {
        let mut body = payload.clone();
        if let Some(token) = &self.csrf_token {
            body.insert(CSRF_FIELD, token.as_str());
        }

        debug!(url = %self.url(route), fields = body.len(), "Sending request");
        let mut request = self.client.request(route.method(), self.url(route));
        if route.method() != Method::GET && route.method() != Method::DELETE {
            request = request.json(&body);
        } else if let Some(token) = &self.csrf_token {
            request = request.header("X-CSRF-Token", token);
        }

        let response = request.send().await?;
        Self::read_response(route, response).await
    }

    #[instrument(skip(self, params), fields(route = %route.name()))]
    async fn query(&self, route: &Route, params: &[(String, String)]) -> Result<Value> {
        let response = self
            .client
            .get(self.url(route))
            .query(params)
            .send()
            .await?;
        Self::read_response(route, response).await
    }
}

/// Turn a filter into query parameters
pub fn filter_params(filter: &RecordFilter) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if let Ok(Value::Object(map)) = serde_json::to_value(filter) {
        for (key, value) in map {
            match value {
                Value::String(s) if !s.is_empty() => params.push((key, s)),
                Value::Null => {}
                Value::String(_) => {}
                other => params.push((key, other.to_string())),
            }
        }
    }
    params
}

/// Record source backed by the paginated list route
pub struct HttpRecordSource<C: RemoteClient> {
    remote: C,
    per_page: usize,
}

impl<C: RemoteClient> HttpRecordSource<C> {
    pub fn new(remote: C) -> Self {
        Self {
            remote,
            per_page: 100,
        }
    }

    pub fn with_page_size(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Fetch a single page
    pub async fn fetch_page(
        &self,
        collection: Collection,
        filter: &RecordFilter,
        page: usize,
    ) -> Result<RecordPage> {
        let mut params = filter_params(filter);
        params.push(("page".into(), page.to_string()));
        params.push(("per_page".into(), self.per_page.to_string()));

        let value = self
            .remote
            .query(&Route::ListRecords(collection), &params)
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl<C: RemoteClient> RecordSource for HttpRecordSource<C> {
    async fn list_records(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<SampleRecord>> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let result = self.fetch_page(collection, filter, page).await?;
            let fetched = result.items.len();
            let pages = result.total_pages();
            records.extend(result.items);
            if fetched == 0 || page >= pages {
                break;
            }
            page += 1;
        }
        debug!(collection = %collection, count = records.len(), "Fetched records");
        Ok(records)
    }
}
