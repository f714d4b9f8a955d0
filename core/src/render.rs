//! Rendering records into list panels

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::records::{Collection, SampleRecord};
use crate::{Error, Result};

/// Badge class for a status label
pub fn badge_class(status: &str) -> &'static str {
    match status.to_ascii_lowercase().as_str() {
        "active" | "success" | "healthy" | "completed" => "bg-success",
        "inactive" | "cancelled" => "bg-secondary",
        "warning" | "pending" | "running" => "bg-warning",
        "failed" | "error" | "critical" => "bg-danger",
        _ => "bg-info",
    }
}

/// Relative time such as "5 minutes ago"
///
/// Anything older than a week is shown as a calendar date.
pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {} ago", unit)
        } else {
            format!("{} {}s ago", n, unit)
        }
    };
    match secs {
        s if s < 3600 => plural(s / 60, "minute"),
        s if s < 86_400 => plural(s / 3600, "hour"),
        s if s < 7 * 86_400 => plural(s / 86_400, "day"),
        _ => ts.format("%Y-%m-%d").to_string(),
    }
}

/// Human readable byte size
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Human readable duration
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// One rendered table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRow {
    pub id: i64,
    pub cells: Vec<String>,
    pub status: String,
    pub badge_class: &'static str,
    pub when: String,
}

/// Column headings per collection
pub fn headers(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::ApiKeys => &["Name", "Key", "Permissions", "Last used"],
        Collection::Webhooks => &["Name", "URL", "Events", "Last delivery"],
        Collection::Backups => &["Name", "Type", "Size", "Duration"],
        Collection::ApiLogs => &["Method", "Endpoint", "Code", "Message"],
        Collection::MaintenanceLogs => &["Type", "Message"],
        Collection::Metrics => &["Metric", "Value"],
    }
}

/// Format one record as a row
pub fn format_row(record: &SampleRecord, now: DateTime<Utc>) -> RenderedRow {
    let cells = match record {
        SampleRecord::ApiKey(k) => vec![
            k.name.clone(),
            k.key_preview.clone(),
            k.permissions.join(", "),
            k.last_used
                .map(|t| relative_time(t, now))
                .unwrap_or_else(|| "Never".to_string()),
        ],
        SampleRecord::Webhook(w) => vec![
            w.name.clone(),
            w.url.clone(),
            w.events.join(", "),
            w.last_delivery
                .map(|t| relative_time(t, now))
                .unwrap_or_else(|| "Never".to_string()),
        ],
        SampleRecord::Backup(b) => vec![
            b.name.clone(),
            b.backup_type.clone(),
            format_size(b.size_bytes),
            format_duration(b.duration_secs),
        ],
        SampleRecord::Log(l) => match (&l.method, &l.endpoint) {
            (Some(method), Some(endpoint)) => vec![
                method.clone(),
                endpoint.clone(),
                l.status_code.map(|c| c.to_string()).unwrap_or_default(),
                l.message.clone(),
            ],
            _ => vec![l.kind.clone(), l.message.clone()],
        },
        SampleRecord::Metric(m) => vec![m.name.clone(), format!("{} {}", m.value, m.unit)],
    };

    let status = record.status_label().to_string();
    RenderedRow {
        id: record.id(),
        cells,
        badge_class: badge_class(&status),
        status,
        when: relative_time(record.timestamp(), now),
    }
}

/// A list panel's rendered content
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableView {
    rows: Vec<RenderedRow>,
    renders: u64,
}

impl TableView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the view's content with the given records
    pub fn render(&mut self, records: &[SampleRecord], now: DateTime<Utc>) {
        self.rows.clear();
        self.rows.extend(records.iter().map(|r| format_row(r, now)));
        self.renders += 1;
    }

    pub fn rows(&self) -> &[RenderedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.id).collect()
    }

    /// How many times the view has been rendered
    pub fn render_count(&self) -> u64 {
        self.renders
    }

    /// Plain-text table for terminals
    pub fn to_text(&self, collection: Collection) -> String {
        let mut header: Vec<String> = vec!["ID".into()];
        header.extend(headers(collection).iter().map(|h| h.to_string()));
        header.push("Status".into());
        header.push("When".into());

        let mut table: Vec<Vec<String>> = vec![header];
        for row in &self.rows {
            let mut line = vec![row.id.to_string()];
            line.extend(row.cells.iter().cloned());
            line.push(row.status.clone());
            line.push(row.when.clone());
            table.push(line);
        }

        let columns = table.iter().map(Vec::len).max().unwrap_or(0);
        let widths: Vec<usize> = (0..columns)
            .map(|c| {
                table
                    .iter()
                    .filter_map(|r| r.get(c))
                    .map(|s| s.chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        table
            .iter()
            .map(|r| {
                r.iter()
                    .enumerate()
                    .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                    .collect::<Vec<_>>()
                    .join("  ")
                    .trim_end()
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn csv_error(e: impl std::fmt::Display) -> Error {
    Error::Other(format!("CSV export failed: {}", e))
}

/// Render records as CSV: id, the panel's columns, status, timestamp
///
/// Rows with fewer cells than the panel has columns are padded.
pub fn to_csv(collection: Collection, records: &[SampleRecord], now: DateTime<Utc>) -> Result<Vec<u8>> {
    let columns = headers(collection);
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut heading = vec!["ID"];
    heading.extend_from_slice(columns);
    heading.extend_from_slice(&["Status", "Timestamp"]);
    writer.write_record(&heading).map_err(csv_error)?;

    for record in records {
        let row = format_row(record, now);
        let mut cells = row.cells;
        cells.resize(columns.len(), String::new());

        let mut line = vec![row.id.to_string()];
        line.extend(cells);
        line.push(row.status);
        line.push(record.timestamp().to_rfc3339());
        writer.write_record(&line).map_err(csv_error)?;
    }

    writer.into_inner().map_err(csv_error)
}
