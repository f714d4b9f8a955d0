use anyhow::Context;
use sqlx::{Pool, Sqlite};
use stockctl_core::{Domain, Error, Result, SettingsBlob};
use tracing::instrument;

use crate::models::SettingsRow;

/// List every stored blob
#[instrument(skip(pool))]
pub async fn list_settings(pool: &Pool<Sqlite>) -> Result<Vec<SettingsRow>> {
    sqlx::query_as::<_, SettingsRow>(
        r#"
        SELECT domain, blob, updated_at
        FROM settings_blobs
        ORDER BY domain
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list settings")
    .map_err(|e| Error::DatabaseError(e.to_string()))
}

/// Get the stored blob of a domain
#[instrument(skip(pool))]
pub async fn get_settings(pool: &Pool<Sqlite>, domain: Domain) -> Result<Option<SettingsRow>> {
    sqlx::query_as::<_, SettingsRow>(
        r#"
        SELECT domain, blob, updated_at
        FROM settings_blobs
        WHERE domain = ?
        "#,
    )
    .bind(domain.storage_key())
    .fetch_optional(pool)
    .await
    .context("Failed to get settings")
    .map_err(|e| Error::DatabaseError(e.to_string()))
}

/// Replace the stored blob of a domain
#[instrument(skip(pool, blob))]
pub async fn put_settings(pool: &Pool<Sqlite>, domain: Domain, blob: &SettingsBlob) -> Result<()> {
    put_raw_settings(pool, domain, &blob.to_json()?).await
}

/// Store raw text for a domain without validation
pub async fn put_raw_settings(pool: &Pool<Sqlite>, domain: Domain, raw: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings_blobs (domain, blob, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(domain) DO UPDATE SET
            blob = excluded.blob,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(domain.storage_key())
    .bind(raw)
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(format!("Failed to save settings: {}", e)))?;

    Ok(())
}
