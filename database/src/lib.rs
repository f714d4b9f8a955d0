//! Database layer with SQLite

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use stockctl_core::{Error, Result};
use tracing::info;

// Export models and queries
pub mod models;
pub mod queries;
pub mod store;

pub use models::*;
pub use queries::*;
pub use store::{SqliteRecordSource, SqliteSettingsStore};

// Re-export sqlx types for convenience
pub use sqlx::{self, Pool as SqlxPool, Sqlite as SqlxSqlite};

// Embed migrations at compile time
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// File path of a `sqlite:` URL, without scheme or query string
fn sqlite_path(database_url: &str) -> Option<&str> {
    let rest = database_url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty()).then_some(path)
}

/// Database connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(database_url: &str) -> Result<Self> {
        info!(url = %database_url, "Connecting to database");

        if is_memory_url(database_url) {
            return Self::in_memory().await;
        }

        // Make sure the parent directory of a file database exists
        if let Some(path) = sqlite_path(database_url) {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    info!(dir = ?parent, "Creating database directory");
                    std::fs::create_dir_all(parent).map_err(|e| {
                        Error::DatabaseError(format!("Failed to create database directory: {}", e))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::DatabaseError(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to connect: {}", e)))?;

        Ok(Self { pool })
    }

    /// Private in-memory database
    ///
    /// Limited to one connection; every connection to `:memory:` would
    /// otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to connect: {}", e)))?;
        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to run migrations: {}", e)))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn settings_store(&self) -> SqliteSettingsStore {
        SqliteSettingsStore::new(self.pool.clone())
    }

    pub fn record_source(&self) -> SqliteRecordSource {
        SqliteRecordSource::new(self.pool.clone())
    }

    /// Close the database connection
    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockctl_core::delivery::{ChannelDraft, TemplateDraft};
    use stockctl_core::fixtures::sample_records;
    use stockctl_core::{
        ChannelType, Collection, Domain, RecordFilter, RecordSource, SampleRecord, SettingsBlob,
        SettingsStore,
    };

    async fn db() -> Database {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[test]
    fn test_sqlite_path() {
        assert_eq!(sqlite_path("sqlite:data/app.db"), Some("data/app.db"));
        assert_eq!(sqlite_path("sqlite:///var/lib/app.db?mode=rwc"), Some("/var/lib/app.db"));
        assert_eq!(sqlite_path("postgres://x"), None);
        assert!(is_memory_url("sqlite::memory:"));
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let db = db().await;
        let store = db.settings_store();

        let mut blob = SettingsBlob::new();
        blob.insert("apiTimeout", "30");
        blob.insert("enableCORS", true);
        blob.insert("retries", 3_i64);
        store.save(Domain::Api, &blob).await.unwrap();

        assert_eq!(store.load(Domain::Api).await, blob);
        assert!(store.load(Domain::Backup).await.is_empty());

        blob.insert("apiTimeout", "45");
        store.save(Domain::Api, &blob).await.unwrap();
        assert_eq!(list_settings(db.pool()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}/nested/stockctl.db", dir.path().display());

        let db = Database::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        let mut blob = SettingsBlob::new();
        blob.insert("maintenanceMode", true);
        db.settings_store().save(Domain::Maintenance, &blob).await.unwrap();
        db.close().await.unwrap();

        let db = Database::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.settings_store().load(Domain::Maintenance).await, blob);
    }

    #[tokio::test]
    async fn test_garbage_blob_loads_empty() {
        let db = db().await;
        put_raw_settings(db.pool(), Domain::Maintenance, "{not json").await.unwrap();
        assert!(db.settings_store().load(Domain::Maintenance).await.is_empty());
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = db().await;
        let first = seed_fixtures(db.pool(), Utc::now()).await.unwrap();
        assert!(first > 0);
        assert_eq!(seed_fixtures(db.pool(), Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filtered_listing_and_delete() {
        let db = db().await;
        seed_fixtures(db.pool(), Utc::now()).await.unwrap();
        let source = db.record_source();

        let failed = RecordFilter {
            status: Some("failed".into()),
            ..Default::default()
        };
        let rows = source.list_records(Collection::Backups, &failed).await.unwrap();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r.status_label() == "failed"));

        let id = rows[0].id();
        assert!(delete_record(db.pool(), Collection::Backups, id).await.unwrap());
        assert!(!delete_record(db.pool(), Collection::Backups, id).await.unwrap());
        assert!(get_record(db.pool(), Collection::Backups, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}/stockctl.db", dir.path().display());
        let db = Database::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        seed_fixtures(db.pool(), Utc::now()).await.unwrap();
        let before = count_records(db.pool(), Collection::Backups).await.unwrap();

        let record = sample_records(Collection::Backups, Utc::now()).remove(0);
        let (a, b) = tokio::join!(
            insert_record(db.pool(), Collection::Backups, &record),
            insert_record(db.pool(), Collection::Backups, &record)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a, b);
        assert_eq!(count_records(db.pool(), Collection::Backups).await.unwrap(), before + 2);
        let stored = get_record(db.pool(), Collection::Backups, a).await.unwrap().unwrap();
        assert_eq!(stored.id(), a);
    }

    #[tokio::test]
    async fn test_templates_replace_by_name() {
        let db = db().await;
        let mut draft = TemplateDraft {
            name: "Low stock".into(),
            event: "low-stock".into(),
            subject: "Stock low".into(),
            body: "{{product}} is low".into(),
        };
        let first = save_template(db.pool(), &draft).await.unwrap();
        draft.subject = "Reorder now".into();
        let second = save_template(db.pool(), &draft).await.unwrap();

        assert_eq!(first.id, second.id);
        let templates = list_templates(db.pool()).await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].subject, "Reorder now");

        assert!(delete_template(db.pool(), first.id).await.unwrap());
        assert!(!delete_template(db.pool(), first.id).await.unwrap());
        assert!(list_templates(db.pool()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channels_round_trip() {
        let db = db().await;
        let draft = ChannelDraft {
            name: "Ops pager".into(),
            channel_type: ChannelType::Sms,
            target: "+15551234567".into(),
        };
        let channel = save_channel(db.pool(), &draft).await.unwrap();
        assert!(channel.enabled);

        let channels = list_channels(db.pool()).await.unwrap();
        assert_eq!(channels, vec![channel.clone()]);
        assert_eq!(channels[0].channel_type, ChannelType::Sms);

        assert!(delete_channel(db.pool(), channel.id).await.unwrap());
        assert!(list_channels(db.pool()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_is_newest_first() {
        let db = db().await;
        seed_fixtures(db.pool(), Utc::now()).await.unwrap();
        let rows: Vec<SampleRecord> = list_records(db.pool(), Collection::ApiLogs, &RecordFilter::default())
            .await
            .unwrap();
        assert!(rows.windows(2).all(|w| w[0].timestamp() >= w[1].timestamp()));
    }
}
