//! sqlx-backed implementations of the core storage traits

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use stockctl_core::{
    Collection, Domain, RecordFilter, RecordSource, Result, SampleRecord, SettingsBlob,
    SettingsStore,
};
use tracing::warn;

use crate::queries;

/// Settings store backed by the `settings_blobs` table
#[derive(Debug, Clone)]
pub struct SqliteSettingsStore {
    pool: Pool<Sqlite>,
}

impl SqliteSettingsStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn load(&self, domain: Domain) -> SettingsBlob {
        match queries::get_settings(&self.pool, domain).await {
            Ok(Some(row)) => row.settings(domain),
            Ok(None) => SettingsBlob::new(),
            Err(e) => {
                warn!(domain = %domain, error = %e, "Failed to read settings, using defaults");
                SettingsBlob::new()
            }
        }
    }

    async fn save(&self, domain: Domain, blob: &SettingsBlob) -> Result<()> {
        queries::put_settings(&self.pool, domain, blob).await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Record source backed by the `records` table
#[derive(Debug, Clone)]
pub struct SqliteRecordSource {
    pool: Pool<Sqlite>,
}

impl SqliteRecordSource {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSource for SqliteRecordSource {
    async fn list_records(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<SampleRecord>> {
        queries::list_records(&self.pool, collection, filter).await
    }
}
