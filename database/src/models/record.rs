use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stockctl_core::{Error, Result, SampleRecord};

/// A list panel row as stored
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecordRow {
    pub collection: String,
    pub id: i64,
    /// Serialized [`SampleRecord`]
    pub payload: String,
    pub recorded_at: DateTime<Utc>,
}

impl RecordRow {
    pub fn decode(&self) -> Result<SampleRecord> {
        serde_json::from_str(&self.payload).map_err(|e| {
            Error::DatabaseError(format!(
                "Corrupt {} record #{}: {}",
                self.collection, self.id, e
            ))
        })
    }
}
