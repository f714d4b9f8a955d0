use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stockctl_core::{store::decode_slot, Domain, SettingsBlob};

/// Persisted settings blob of one domain
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SettingsRow {
    /// Storage key, e.g. `apiSettings`
    pub domain: String,
    /// Raw JSON text as last written
    pub blob: String,
    pub updated_at: DateTime<Utc>,
}

impl SettingsRow {
    /// Decode the blob; a malformed value yields an empty blob
    pub fn settings(&self, domain: Domain) -> SettingsBlob {
        decode_slot(domain, Some(&self.blob))
    }
}
