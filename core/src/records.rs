//! Sample records shown in the read-only panels, and their filters

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::{Domain, Error, Result};

// ============================================================================
// Collections
// ============================================================================

/// A list panel on one of the settings pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    ApiKeys,
    Webhooks,
    Backups,
    ApiLogs,
    MaintenanceLogs,
    Metrics,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::ApiKeys,
        Collection::Webhooks,
        Collection::Backups,
        Collection::ApiLogs,
        Collection::MaintenanceLogs,
        Collection::Metrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::ApiKeys => "api-keys",
            Collection::Webhooks => "webhooks",
            Collection::Backups => "backups",
            Collection::ApiLogs => "api-logs",
            Collection::MaintenanceLogs => "maintenance-logs",
            Collection::Metrics => "metrics",
        }
    }

    /// Page the collection is shown on
    pub fn domain(&self) -> Domain {
        match self {
            Collection::ApiKeys | Collection::Webhooks | Collection::ApiLogs => Domain::Api,
            Collection::Backups => Domain::Backup,
            Collection::MaintenanceLogs | Collection::Metrics => Domain::Maintenance,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.as_str().replace('-', "_") == s)
            .ok_or_else(|| Error::UnknownCollection(s.to_string()))
    }
}

// ============================================================================
// Record types
// ============================================================================

/// Active/inactive status for keys and webhooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStatus {
    Active,
    Inactive,
}

/// Result of a backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Success,
    Warning,
    Failed,
}

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Health of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub name: String,
    /// Masked token, never the full secret
    pub key_preview: String,
    pub permissions: Vec<String>,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub last_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub id: i64,
    pub name: String,
    /// full, database, files, config
    pub backup_type: String,
    pub size_bytes: u64,
    pub status: BackupStatus,
    pub created_at: DateTime<Utc>,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    /// Log category, e.g. "request", "cleanup", "cache"
    pub kind: String,
    pub level: LogLevel,
    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub status_code: Option<u16>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub id: i64,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub status: HealthStatus,
    pub recorded_at: DateTime<Utc>,
}

/// Any row shown in a list panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum SampleRecord {
    ApiKey(ApiKey),
    Webhook(Webhook),
    Backup(BackupEntry),
    Log(LogEntry),
    Metric(MetricRow),
}

impl SampleRecord {
    pub fn id(&self) -> i64 {
        match self {
            SampleRecord::ApiKey(r) => r.id,
            SampleRecord::Webhook(r) => r.id,
            SampleRecord::Backup(r) => r.id,
            SampleRecord::Log(r) => r.id,
            SampleRecord::Metric(r) => r.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            SampleRecord::ApiKey(r) => &r.name,
            SampleRecord::Webhook(r) => &r.name,
            SampleRecord::Backup(r) => &r.name,
            SampleRecord::Log(r) => &r.message,
            SampleRecord::Metric(r) => &r.name,
        }
    }

    /// Status as shown in the badge
    pub fn status_label(&self) -> &'static str {
        match self {
            SampleRecord::ApiKey(ApiKey { status, .. })
            | SampleRecord::Webhook(Webhook { status, .. }) => match status {
                KeyStatus::Active => "Active",
                KeyStatus::Inactive => "Inactive",
            },
            SampleRecord::Backup(r) => match r.status {
                BackupStatus::Success => "success",
                BackupStatus::Warning => "warning",
                BackupStatus::Failed => "failed",
            },
            SampleRecord::Log(r) => match r.level {
                LogLevel::Info => "info",
                LogLevel::Success => "success",
                LogLevel::Warning => "warning",
                LogLevel::Error => "error",
            },
            SampleRecord::Metric(r) => match r.status {
                HealthStatus::Healthy => "healthy",
                HealthStatus::Warning => "warning",
                HealthStatus::Critical => "critical",
            },
        }
    }

    /// Timestamp the record is sorted and range-filtered by
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SampleRecord::ApiKey(r) => r.created_at,
            SampleRecord::Webhook(r) => r.created_at,
            SampleRecord::Backup(r) => r.created_at,
            SampleRecord::Log(r) => r.timestamp,
            SampleRecord::Metric(r) => r.recorded_at,
        }
    }

    /// HTTP method, for request logs
    pub fn method(&self) -> Option<&str> {
        match self {
            SampleRecord::Log(r) => r.method.as_deref(),
            _ => None,
        }
    }

    /// Category used by the "type" filter
    pub fn kind(&self) -> Option<&str> {
        match self {
            SampleRecord::Backup(r) => Some(&r.backup_type),
            SampleRecord::Log(r) => Some(&r.kind),
            _ => None,
        }
    }

    fn search_text(&self) -> String {
        match self {
            SampleRecord::ApiKey(r) => format!("{} {} {}", r.name, r.key_preview, r.permissions.join(" ")),
            SampleRecord::Webhook(r) => format!("{} {} {}", r.name, r.url, r.events.join(" ")),
            SampleRecord::Backup(r) => format!("{} {}", r.name, r.backup_type),
            SampleRecord::Log(r) => format!(
                "{} {} {}",
                r.message,
                r.endpoint.as_deref().unwrap_or_default(),
                r.kind
            ),
            SampleRecord::Metric(r) => format!("{} {}", r.name, r.unit),
        }
    }
}

/// Generate a fresh API token
pub fn generate_key_token() -> String {
    let body: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("ik_live_{}", body)
}

/// Mask a token for display
///
/// Tokens longer than 8 characters keep their first and last 3 characters.
/// Shorter tokens are fully masked.
pub fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}***{}", &token[..3], &token[token.len() - 3..])
    }
}

/// Permissions granted by a key permission level
pub fn key_permissions(level: &str) -> Vec<String> {
    let granted: &[&str] = match level {
        "admin" => &["read", "write", "admin"],
        "read-write" => &["read", "write"],
        _ => &["read"],
    };
    granted.iter().map(|p| p.to_string()).collect()
}

impl ApiKey {
    /// A new active key; returns the key and its full token
    pub fn issue(id: i64, name: &str, level: &str, now: DateTime<Utc>) -> (Self, String) {
        let token = generate_key_token();
        let key = ApiKey {
            id,
            name: name.to_string(),
            key_preview: mask_token(&token),
            permissions: key_permissions(level),
            status: KeyStatus::Active,
            created_at: now,
            last_used: None,
        };
        (key, token)
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// Date window for list filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateRange {
    #[default]
    #[serde(rename = "all", alias = "")]
    All,
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "7d", alias = "week")]
    Last7Days,
    #[serde(rename = "30d", alias = "month")]
    Last30Days,
}

impl DateRange {
    pub fn contains(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let window = match self {
            DateRange::All => return true,
            DateRange::Today => Duration::hours(24),
            DateRange::Last7Days => Duration::days(7),
            DateRange::Last30Days => Duration::days(30),
        };
        ts >= now - window && ts <= now + Duration::minutes(5)
    }
}

impl FromStr for DateRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "all" => Ok(DateRange::All),
            "today" => Ok(DateRange::Today),
            "7d" | "week" => Ok(DateRange::Last7Days),
            "30d" | "month" => Ok(DateRange::Last30Days),
            other => Err(Error::ValidationError(format!("Unknown date range: {}", other))),
        }
    }
}

/// Filter fields shared by every list panel
///
/// Serialized with the query parameter names the list endpoint expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// A select filter; `all` means unset
fn non_empty(field: &Option<String>) -> Option<&str> {
    trimmed(field).filter(|s| !s.eq_ignore_ascii_case("all"))
}

fn trimmed(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        non_empty(&self.status).is_none()
            && non_empty(&self.method).is_none()
            && non_empty(&self.kind).is_none()
            && trimmed(&self.search).is_none()
            && self.date_range == DateRange::All
    }

    /// Does the record pass every set field?
    pub fn matches(&self, record: &SampleRecord, now: DateTime<Utc>) -> bool {
        if let Some(status) = non_empty(&self.status) {
            if !record.status_label().eq_ignore_ascii_case(status) {
                return false;
            }
        }
        if let Some(method) = non_empty(&self.method) {
            if !record.method().is_some_and(|m| m.eq_ignore_ascii_case(method)) {
                return false;
            }
        }
        if let Some(kind) = non_empty(&self.kind) {
            if !record.kind().is_some_and(|k| k.eq_ignore_ascii_case(kind)) {
                return false;
            }
        }
        if !self.date_range.contains(record.timestamp(), now) {
            return false;
        }
        if let Some(search) = trimmed(&self.search) {
            let needle = search.to_lowercase();
            if !record.search_text().to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }

    /// Filter a set of records, newest first
    pub fn apply(&self, records: &[SampleRecord], now: DateTime<Utc>) -> Vec<SampleRecord> {
        let mut out: Vec<SampleRecord> = records
            .iter()
            .filter(|r| self.matches(r, now))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()).then(a.id().cmp(&b.id())));
        out
    }
}

/// One page of a record listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    pub items: Vec<SampleRecord>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl RecordPage {
    /// Slice a full result set; `page` is 1-based
    pub fn paginate(records: Vec<SampleRecord>, page: usize, per_page: usize) -> Self {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 500);
        let total = records.len();
        let items = records
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();
        Self {
            items,
            page,
            per_page,
            total,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.per_page)
    }
}

// ============================================================================
// Data access
// ============================================================================

/// Source of list panel data
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records of a collection that pass the filter, newest first
    async fn list_records(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<SampleRecord>>;
}

/// Fixed in-memory dataset
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    records: HashMap<Collection, Vec<SampleRecord>>,
}

impl FixtureSource {
    /// The built-in sample data, timestamped relative to now
    pub fn sample() -> Self {
        Self::sample_at(Utc::now())
    }

    pub fn sample_at(now: DateTime<Utc>) -> Self {
        let records = Collection::ALL
            .into_iter()
            .map(|c| (c, crate::fixtures::sample_records(c, now)))
            .collect();
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the dataset of one collection
    pub fn with_records(mut self, collection: Collection, records: Vec<SampleRecord>) -> Self {
        self.records.insert(collection, records);
        self
    }

    pub fn records(&self, collection: Collection) -> &[SampleRecord] {
        self.records
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordSource for FixtureSource {
    async fn list_records(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<SampleRecord>> {
        Ok(filter.apply(self.records(collection), Utc::now()))
    }
}
