//! Built-in sample data for the list panels

use chrono::{DateTime, Duration, Utc};

use crate::records::{
    ApiKey, BackupEntry, BackupStatus, Collection, HealthStatus, KeyStatus, LogEntry, LogLevel,
    MetricRow, SampleRecord, Webhook,
};

/// Sample records for a collection, timestamped relative to `now`
pub fn sample_records(collection: Collection, now: DateTime<Utc>) -> Vec<SampleRecord> {
    match collection {
        Collection::ApiKeys => api_keys(now),
        Collection::Webhooks => webhooks(now),
        Collection::Backups => backups(now),
        Collection::ApiLogs => api_logs(now),
        Collection::MaintenanceLogs => maintenance_logs(now),
        Collection::Metrics => metrics(now),
    }
}

fn api_keys(now: DateTime<Utc>) -> Vec<SampleRecord> {
    let key = |id, name: &str, preview: &str, perms: &[&str], status, age_days, used_hours: Option<i64>| {
        SampleRecord::ApiKey(ApiKey {
            id,
            name: name.to_string(),
            key_preview: preview.to_string(),
            permissions: perms.iter().map(|p| p.to_string()).collect(),
            status,
            created_at: now - Duration::days(age_days),
            last_used: used_hours.map(|h| now - Duration::hours(h)),
        })
    };

    vec![
        key(1, "Mobile App", "ik_***a9f", &["read", "write"], KeyStatus::Active, 45, Some(2)),
        key(2, "POS Terminal", "ik_***3c1", &["read", "write"], KeyStatus::Active, 120, Some(0)),
        key(3, "Reporting Dashboard", "ik_***77e", &["read"], KeyStatus::Active, 12, Some(26)),
        key(4, "Legacy Import Script", "ik_***0b2", &["read", "write", "admin"], KeyStatus::Inactive, 400, None),
    ]
}

fn webhooks(now: DateTime<Utc>) -> Vec<SampleRecord> {
    let hook = |id, name: &str, url: &str, events: &[&str], status, age_days, delivered_hours: Option<i64>| {
        SampleRecord::Webhook(Webhook {
            id,
            name: name.to_string(),
            url: url.to_string(),
            events: events.iter().map(|e| e.to_string()).collect(),
            status,
            created_at: now - Duration::days(age_days),
            last_delivery: delivered_hours.map(|h| now - Duration::hours(h)),
        })
    };

    vec![
        hook(
            1,
            "Low stock to Slack",
            "https://hooks.example.com/services/T000/B000/stock",
            &["inventory.low_stock"],
            KeyStatus::Active,
            30,
            Some(5),
        ),
        hook(
            2,
            "Order sync",
            "https://erp.example.com/webhooks/orders",
            &["order.created", "order.updated"],
            KeyStatus::Active,
            90,
            Some(1),
        ),
        hook(
            3,
            "Supplier feed",
            "https://supplier.example.net/inbound",
            &["product.updated"],
            KeyStatus::Inactive,
            200,
            None,
        ),
    ]
}

fn backups(now: DateTime<Utc>) -> Vec<SampleRecord> {
    let backup = |id, name: &str, kind: &str, size_mb: u64, status, hours_ago, duration_secs| {
        SampleRecord::Backup(BackupEntry {
            id,
            name: name.to_string(),
            backup_type: kind.to_string(),
            size_bytes: size_mb * 1024 * 1024,
            status,
            created_at: now - Duration::hours(hours_ago),
            duration_secs,
        })
    };

    vec![
        backup(1, "Nightly full backup", "full", 2458, BackupStatus::Success, 6, 754),
        backup(2, "Nightly full backup", "full", 2431, BackupStatus::Success, 30, 741),
        backup(3, "Database snapshot", "database", 512, BackupStatus::Warning, 54, 128),
        backup(4, "Nightly full backup", "full", 0, BackupStatus::Failed, 78, 12),
        backup(5, "Uploaded files", "files", 1830, BackupStatus::Success, 24 * 6, 512),
        backup(6, "Configuration export", "config", 1, BackupStatus::Success, 24 * 12, 3),
    ]
}

fn api_logs(now: DateTime<Utc>) -> Vec<SampleRecord> {
    let entry = |id, method: &str, endpoint: &str, code: u16, minutes_ago| {
        let level = match code {
            200..=299 => LogLevel::Success,
            400..=499 => LogLevel::Warning,
            _ => LogLevel::Error,
        };
        SampleRecord::Log(LogEntry {
            id,
            kind: "request".to_string(),
            level,
            method: Some(method.to_string()),
            endpoint: Some(endpoint.to_string()),
            status_code: Some(code),
            message: format!("{} {} {}", method, endpoint, code),
            timestamp: now - Duration::minutes(minutes_ago),
        })
    };

    vec![
        entry(1, "GET", "/api/v1/products", 200, 2),
        entry(2, "POST", "/api/v1/orders", 201, 9),
        entry(3, "GET", "/api/v1/products/1042", 404, 35),
        entry(4, "PUT", "/api/v1/inventory/adjust", 200, 80),
        entry(5, "DELETE", "/api/v1/products/77", 403, 60 * 5),
        entry(6, "POST", "/api/v1/orders", 500, 60 * 30),
        entry(7, "GET", "/api/v1/warehouses", 200, 60 * 24 * 3),
        entry(8, "POST", "/api/v1/auth/token", 429, 60 * 24 * 9),
    ]
}

fn maintenance_logs(now: DateTime<Utc>) -> Vec<SampleRecord> {
    let entry = |id, kind: &str, level, message: &str, hours_ago| {
        SampleRecord::Log(LogEntry {
            id,
            kind: kind.to_string(),
            level,
            method: None,
            endpoint: None,
            status_code: None,
            message: message.to_string(),
            timestamp: now - Duration::hours(hours_ago),
        })
    };

    vec![
        entry(1, "cache", LogLevel::Success, "Application cache cleared", 1),
        entry(2, "database", LogLevel::Success, "Database tables optimized", 5),
        entry(3, "cleanup", LogLevel::Info, "Removed 1,204 expired sessions", 20),
        entry(4, "cleanup", LogLevel::Warning, "Temp directory above 80% of quota", 47),
        entry(5, "database", LogLevel::Error, "Index rebuild on stock_movements timed out", 24 * 4),
        entry(6, "maintenance", LogLevel::Info, "Maintenance mode disabled", 24 * 15),
    ]
}

fn metrics(now: DateTime<Utc>) -> Vec<SampleRecord> {
    let metric = |id, name: &str, value, unit: &str, status| {
        SampleRecord::Metric(MetricRow {
            id,
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            status,
            recorded_at: now - Duration::minutes(1),
        })
    };

    vec![
        metric(1, "CPU usage", 23.5, "%", HealthStatus::Healthy),
        metric(2, "Memory usage", 71.2, "%", HealthStatus::Warning),
        metric(3, "Disk usage", 46.0, "%", HealthStatus::Healthy),
        metric(4, "Database size", 3.4, "GB", HealthStatus::Healthy),
        metric(5, "Cache hit rate", 94.1, "%", HealthStatus::Healthy),
        metric(6, "Queue backlog", 1520.0, "jobs", HealthStatus::Critical),
    ]
}
