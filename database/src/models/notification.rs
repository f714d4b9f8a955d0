use chrono::{DateTime, Utc};
use sqlx::FromRow;
use stockctl_core::{DeliveryChannel, Error, NotificationTemplate, Result};

#[derive(Debug, Clone, FromRow)]
pub struct TemplateRow {
    pub id: i64,
    pub name: String,
    pub event: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<TemplateRow> for NotificationTemplate {
    fn from(row: TemplateRow) -> Self {
        NotificationTemplate {
            id: row.id,
            name: row.name,
            event: row.event,
            subject: row.subject,
            body: row.body,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ChannelRow {
    pub id: i64,
    pub name: String,
    /// email, sms, push, slack or webhook
    pub channel_type: String,
    pub target: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl ChannelRow {
    pub fn decode(self) -> Result<DeliveryChannel> {
        let channel_type = self.channel_type.parse().map_err(|e: Error| {
            Error::DatabaseError(format!("Corrupt channel #{}: {}", self.id, e))
        })?;
        Ok(DeliveryChannel {
            id: self.id,
            name: self.name,
            channel_type,
            target: self.target,
            enabled: self.enabled,
            created_at: self.created_at,
        })
    }
}
