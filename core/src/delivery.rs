//! Notification templates and delivery channels managed on the notifications page

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result, SettingsBlob};

/// Where a delivery channel sends to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Sms,
    Push,
    Slack,
    Webhook,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
            Self::Slack => "slack",
            Self::Webhook => "webhook",
        }
    }

    /// Check a target address for this channel type
    pub fn validate_target(&self, target: &str) -> Result<()> {
        let ok = match self {
            Self::Email => {
                let mut parts = target.splitn(2, '@');
                let local = parts.next().unwrap_or_default();
                let domain = parts.next().unwrap_or_default();
                !local.is_empty() && domain.contains('.')
            }
            Self::Sms => {
                target.starts_with('+')
                    && target.len() > 4
                    && target[1..].chars().all(|c| c.is_ascii_digit())
            }
            Self::Push => !target.trim().is_empty(),
            Self::Slack | Self::Webhook => {
                target.starts_with("https://") || target.starts_with("http://")
            }
        };
        if ok {
            Ok(())
        } else {
            Err(Error::ValidationError(format!(
                "'{}' is not a valid {} target",
                target, self
            )))
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "push" => Ok(Self::Push),
            "slack" => Ok(Self::Slack),
            "webhook" => Ok(Self::Webhook),
            other => Err(Error::ValidationError(format!(
                "Unknown channel type '{}'",
                other
            ))),
        }
    }
}

/// Message template sent when an event fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: i64,
    pub name: String,
    /// low-stock, order-placed, order-shipped, system-alert
    pub event: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A configured destination for notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryChannel {
    pub id: i64,
    pub name: String,
    pub channel_type: ChannelType,
    pub target: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

fn text(form: &SettingsBlob, key: &str) -> String {
    form.get_text(key).unwrap_or_default().trim().to_string()
}

fn required(form: &SettingsBlob, key: &str, label: &str) -> Result<String> {
    let value = text(form, key);
    if value.is_empty() {
        return Err(Error::ValidationError(format!("{} is required", label)));
    }
    Ok(value)
}

/// Fields of a new template, read from the template form inputs
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDraft {
    pub name: String,
    pub event: String,
    pub subject: String,
    pub body: String,
}

impl TemplateDraft {
    pub fn from_form(form: &SettingsBlob) -> Result<Self> {
        let event = text(form, "templateEvent");
        Ok(Self {
            name: required(form, "templateName", "Template Name")?,
            event: if event.is_empty() {
                "low-stock".to_string()
            } else {
                event
            },
            subject: required(form, "templateSubject", "Subject")?,
            body: required(form, "templateBody", "Message Body")?,
        })
    }

    pub fn into_template(self, id: i64, now: DateTime<Utc>) -> NotificationTemplate {
        NotificationTemplate {
            id,
            name: self.name,
            event: self.event,
            subject: self.subject,
            body: self.body,
            created_at: now,
        }
    }
}

/// Fields of a new channel, read from the channel form inputs
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDraft {
    pub name: String,
    pub channel_type: ChannelType,
    pub target: String,
}

impl ChannelDraft {
    pub fn from_form(form: &SettingsBlob) -> Result<Self> {
        let name = required(form, "channelName", "Channel Name")?;
        let kind = text(form, "channelType");
        let channel_type = if kind.is_empty() {
            ChannelType::Email
        } else {
            kind.parse()?
        };
        let target = required(form, "channelTarget", "Recipient or URL")?;
        channel_type.validate_target(&target)?;
        Ok(Self {
            name,
            channel_type,
            target,
        })
    }

    pub fn into_channel(self, id: i64, now: DateTime<Utc>) -> DeliveryChannel {
        DeliveryChannel {
            id,
            name: self.name,
            channel_type: self.channel_type,
            target: self.target,
            enabled: true,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> SettingsBlob {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_channel_targets() {
        assert!(ChannelType::Email.validate_target("ops@example.com").is_ok());
        assert!(ChannelType::Email.validate_target("ops").is_err());
        assert!(ChannelType::Sms.validate_target("+15551234567").is_ok());
        assert!(ChannelType::Sms.validate_target("5551234567").is_err());
        assert!(ChannelType::Slack.validate_target("https://hooks.slack.com/x").is_ok());
        assert!(ChannelType::Webhook.validate_target("ftp://x").is_err());
    }

    #[test]
    fn test_template_draft_requires_fields() {
        let err = TemplateDraft::from_form(&form(&[("templateName", "Low stock")])).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Subject is required");

        let draft = TemplateDraft::from_form(&form(&[
            ("templateName", " Low stock "),
            ("templateSubject", "Stock low"),
            ("templateBody", "{{product}} is below {{threshold}}"),
        ]))
        .unwrap();
        assert_eq!(draft.name, "Low stock");
        assert_eq!(draft.event, "low-stock");
    }

    #[test]
    fn test_channel_draft_checks_target() {
        let err = ChannelDraft::from_form(&form(&[
            ("channelName", "Ops SMS"),
            ("channelType", "sms"),
            ("channelTarget", "not-a-number"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));

        let draft = ChannelDraft::from_form(&form(&[
            ("channelName", "Ops SMS"),
            ("channelType", "SMS"),
            ("channelTarget", "+15551234567"),
        ]))
        .unwrap();
        assert_eq!(draft.channel_type, ChannelType::Sms);
    }
}
