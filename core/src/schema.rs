//! Control declarations for each settings page

use crate::form::{ControlSpec, FormModel};
use crate::Domain;

/// Build the form for a domain with every control at its default
pub fn form_for(domain: Domain) -> FormModel {
    FormModel::new(controls(domain))
}

/// Backup type checkboxes; a manual backup needs at least one
pub const BACKUP_TYPES: [&str; 3] = ["backupDatabase", "backupFiles", "backupConfig"];

/// Inputs of the new-template form on the notifications page
pub const TEMPLATE_FIELDS: [&str; 4] = [
    "templateName",
    "templateEvent",
    "templateSubject",
    "templateBody",
];

/// Inputs of the new-channel form on the notifications page
pub const CHANNEL_FIELDS: [&str; 3] = ["channelName", "channelType", "channelTarget"];

/// Controls that belong to the persisted blob of each domain
///
/// Transient inputs (a new key's name, a test recipient) are part of the
/// form but are not saved with the page settings.
pub fn persisted_fields(domain: Domain) -> Vec<&'static str> {
    let transient: &[&str] = match domain {
        Domain::Api => &["keyName", "keyPermissions"],
        Domain::Notifications => &["testRecipient"],
        _ => &[],
    };
    controls(domain)
        .into_iter()
        .map(|c| c.name)
        .filter(|n| !transient.contains(n))
        .filter(|n| !TEMPLATE_FIELDS.contains(n) && !CHANNEL_FIELDS.contains(n))
        .collect()
}

/// Control declarations for a domain
pub fn controls(domain: Domain) -> Vec<ControlSpec> {
    match domain {
        Domain::Api => vec![
            ControlSpec::number("apiTimeout", "API Timeout (seconds)", "30"),
            ControlSpec::number("apiRateLimit", "Rate Limit (requests/minute)", "60"),
            ControlSpec::select("apiVersion", "Default API Version", &["v1", "v2"], "v1"),
            ControlSpec::checkbox("enableCORS", "Enable CORS", false),
            ControlSpec::textarea("allowedOrigins", "Allowed Origins", ""),
            ControlSpec::checkbox("requireHttps", "Require HTTPS", true),
            ControlSpec::checkbox("enableApiLogging", "Log API Requests", true),
            ControlSpec::text("keyName", "Key Name", ""),
            ControlSpec::select(
                "keyPermissions",
                "Key Permissions",
                &["read", "read-write", "admin"],
                "read",
            ),
        ],
        Domain::Backup => vec![
            ControlSpec::checkbox("autoBackup", "Automatic Backups", true),
            ControlSpec::select(
                "backupFrequency",
                "Backup Frequency",
                &["hourly", "daily", "weekly", "monthly"],
                "daily",
            ),
            ControlSpec::text("backupSchedule", "Backup Schedule (cron)", "0 0 2 * * *"),
            ControlSpec::number("retentionDays", "Retention (days)", "30"),
            ControlSpec::select(
                "storageLocation",
                "Storage Location",
                &["local", "s3", "ftp"],
                "local",
            ),
            ControlSpec::text("storagePath", "Storage Path", "/var/backups/inventory"),
            ControlSpec::checkbox("compressBackups", "Compress Backups", true),
            ControlSpec::checkbox("encryptBackups", "Encrypt Backups", false),
            ControlSpec::checkbox("backupDatabase", "Database", true),
            ControlSpec::checkbox("backupFiles", "Uploaded Files", false),
            ControlSpec::checkbox("backupConfig", "Configuration", false),
        ],
        Domain::Inventory => vec![
            ControlSpec::number("lowStockThreshold", "Low Stock Threshold", "10").required(),
            ControlSpec::select(
                "defaultUnit",
                "Default Unit",
                &["pcs", "box", "kg", "l"],
                "pcs",
            ),
            ControlSpec::select(
                "valuationMethod",
                "Valuation Method",
                &["fifo", "lifo", "average"],
                "fifo",
            ),
            ControlSpec::text("skuPrefix", "SKU Prefix", "SKU-"),
            ControlSpec::checkbox("enableBarcodes", "Enable Barcodes", true),
            ControlSpec::checkbox("autoReorder", "Automatic Reorder", false),
            ControlSpec::number("reorderQuantity", "Reorder Quantity", "50"),
            ControlSpec::checkbox("allowNegativeStock", "Allow Negative Stock", false),
        ],
        Domain::Maintenance => vec![
            ControlSpec::checkbox("maintenanceMode", "Maintenance Mode", false),
            ControlSpec::textarea(
                "maintenanceMessage",
                "Maintenance Message",
                "The system is undergoing scheduled maintenance.",
            ),
            ControlSpec::number("logRetentionDays", "Log Retention (days)", "90"),
            ControlSpec::number("cacheTtl", "Cache TTL (minutes)", "60"),
            ControlSpec::checkbox("autoCleanup", "Automatic Cleanup", true),
            ControlSpec::select(
                "logLevel",
                "Log Level",
                &["debug", "info", "warning", "error"],
                "info",
            ),
        ],
        Domain::Notifications => vec![
            ControlSpec::checkbox("emailEnabled", "Email Notifications", true),
            ControlSpec::text("smtpHost", "SMTP Host", ""),
            ControlSpec::number("smtpPort", "SMTP Port", "587"),
            ControlSpec::text("smtpUsername", "SMTP Username", ""),
            ControlSpec::password("smtpPassword", "SMTP Password"),
            ControlSpec::select("smtpEncryption", "Encryption", &["none", "ssl", "tls"], "tls"),
            ControlSpec::text("fromAddress", "From Address", ""),
            ControlSpec::checkbox("smsEnabled", "SMS Notifications", false),
            ControlSpec::select(
                "smsProvider",
                "SMS Provider",
                &["twilio", "nexmo", "messagebird"],
                "twilio",
            ),
            ControlSpec::text("smsApiKey", "SMS API Key", ""),
            ControlSpec::checkbox("pushEnabled", "Push Notifications", false),
            ControlSpec::text("pushServerKey", "Push Server Key", ""),
            ControlSpec::checkbox("lowStockAlerts", "Low Stock Alerts", true),
            ControlSpec::checkbox("orderAlerts", "Order Alerts", true),
            ControlSpec::checkbox("systemAlerts", "System Alerts", true),
            ControlSpec::text("testRecipient", "Test Recipient", ""),
            ControlSpec::text("templateName", "Template Name", ""),
            ControlSpec::select(
                "templateEvent",
                "Event",
                &["low-stock", "order-placed", "order-shipped", "system-alert"],
                "low-stock",
            ),
            ControlSpec::text("templateSubject", "Subject", ""),
            ControlSpec::textarea("templateBody", "Message Body", ""),
            ControlSpec::text("channelName", "Channel Name", ""),
            ControlSpec::select(
                "channelType",
                "Channel Type",
                &["email", "sms", "push", "slack", "webhook"],
                "email",
            ),
            ControlSpec::text("channelTarget", "Recipient or URL", ""),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_domain_has_controls() {
        for domain in Domain::ALL {
            let form = form_for(domain);
            assert!(!form.names().is_empty(), "{} has no controls", domain);
            for name in persisted_fields(domain) {
                assert!(form.has_control(name));
            }
        }
    }

    #[test]
    fn test_transient_fields_not_persisted() {
        let fields = persisted_fields(Domain::Api);
        assert!(fields.contains(&"apiTimeout"));
        assert!(!fields.contains(&"keyName"));
        // Webhooks are managed from the list panel, not a form input
        assert!(!form_for(Domain::Api).has_control("webhookUrl"));

        let fields = persisted_fields(Domain::Notifications);
        assert!(fields.contains(&"smtpHost"));
        for name in TEMPLATE_FIELDS.iter().chain(&CHANNEL_FIELDS) {
            assert!(!fields.contains(name), "{} should not be persisted", name);
            assert!(form_for(Domain::Notifications).has_control(name));
        }
    }

    #[test]
    fn test_defaults_validate() {
        for domain in Domain::ALL {
            assert!(form_for(domain).validate().is_ok(), "{} defaults invalid", domain);
        }
    }

    #[test]
    fn test_backup_types_declared() {
        let form = form_for(Domain::Backup);
        for name in BACKUP_TYPES {
            assert!(form.is_checked(name).is_some());
        }
    }
}
