use chrono::Utc;
use sqlx::{Pool, Sqlite};
use stockctl_core::delivery::{ChannelDraft, TemplateDraft};
use stockctl_core::{DeliveryChannel, Error, NotificationTemplate, Result};
use tracing::instrument;

use crate::models::{ChannelRow, TemplateRow};

/// List all notification templates
pub async fn list_templates(pool: &Pool<Sqlite>) -> Result<Vec<NotificationTemplate>> {
    let rows = sqlx::query_as::<_, TemplateRow>(
        r#"
        SELECT id, name, event, subject, body, created_at
        FROM notification_templates
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(format!("Failed to list templates: {}", e)))?;

    Ok(rows.into_iter().map(NotificationTemplate::from).collect())
}

/// Create a template, or replace the one with the same name
#[instrument(skip(pool, draft), fields(name = %draft.name))]
pub async fn save_template(
    pool: &Pool<Sqlite>,
    draft: &TemplateDraft,
) -> Result<NotificationTemplate> {
    let row = sqlx::query_as::<_, TemplateRow>(
        r#"
        INSERT INTO notification_templates (name, event, subject, body, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            event = excluded.event,
            subject = excluded.subject,
            body = excluded.body
        RETURNING id, name, event, subject, body, created_at
        "#,
    )
    .bind(&draft.name)
    .bind(&draft.event)
    .bind(&draft.subject)
    .bind(&draft.body)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| Error::DatabaseError(format!("Failed to save template: {}", e)))?;

    Ok(row.into())
}

/// Delete a template; returns false when it did not exist
pub async fn delete_template(pool: &Pool<Sqlite>, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM notification_templates WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to delete template: {}", e)))?;

    Ok(result.rows_affected() > 0)
}

/// List all delivery channels
pub async fn list_channels(pool: &Pool<Sqlite>) -> Result<Vec<DeliveryChannel>> {
    let rows = sqlx::query_as::<_, ChannelRow>(
        r#"
        SELECT id, name, channel_type, target, enabled, created_at
        FROM notification_channels
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(format!("Failed to list channels: {}", e)))?;

    rows.into_iter().map(ChannelRow::decode).collect()
}

/// Create a channel, or replace the one with the same name
#[instrument(skip(pool, draft), fields(name = %draft.name))]
pub async fn save_channel(pool: &Pool<Sqlite>, draft: &ChannelDraft) -> Result<DeliveryChannel> {
    let row = sqlx::query_as::<_, ChannelRow>(
        r#"
        INSERT INTO notification_channels (name, channel_type, target, enabled, created_at)
        VALUES (?, ?, ?, 1, ?)
        ON CONFLICT(name) DO UPDATE SET
            channel_type = excluded.channel_type,
            target = excluded.target,
            enabled = 1
        RETURNING id, name, channel_type, target, enabled, created_at
        "#,
    )
    .bind(&draft.name)
    .bind(draft.channel_type.as_str())
    .bind(&draft.target)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| Error::DatabaseError(format!("Failed to save channel: {}", e)))?;

    row.decode()
}

/// Delete a channel; returns false when it did not exist
pub async fn delete_channel(pool: &Pool<Sqlite>, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM notification_channels WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to delete channel: {}", e)))?;

    Ok(result.rows_affected() > 0)
}
