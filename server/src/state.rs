//! Application state

use std::sync::Arc;
use std::time::Duration;
use stockctl_database::sqlx::{Pool, Sqlite};
use stockctl_database::{Database, SqliteSettingsStore};

use crate::config::Config;
use crate::jobs::JobRegistry;

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state
///
/// This struct implements Clone to allow it to be used as Axum state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: Pool<Sqlite>,
    pub jobs: JobRegistry,
    /// Client for outbound calls such as webhook test deliveries
    pub http: reqwest::Client,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, database: &Database) -> Self {
        let jobs = JobRegistry::new(Duration::from_millis(config.job_tick_ms.max(1)));
        Self {
            config: Arc::new(config),
            pool: database.pool().clone(),
            jobs,
            http: reqwest::Client::builder()
                .timeout(OUTBOUND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn settings_store(&self) -> SqliteSettingsStore {
        SqliteSettingsStore::new(self.pool.clone())
    }
}
