//! Server-side long-running jobs
//!
//! Jobs run in the background with their own progress tracker; clients poll
//! their status and may cancel them. A finished job stays visible for
//! [`JOB_RETENTION`] and is then dropped from the registry.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stockctl_core::progress::ActionState;
use stockctl_core::records::{BackupEntry, BackupStatus};
use stockctl_core::remote::JobStatus;
use stockctl_core::{Collection, ProgressOutcome, ProgressTracker, SampleRecord, SimulatedProgress};
use stockctl_database::queries;
use stockctl_database::sqlx::{Pool, Sqlite};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

const BACKUP_STEPS: [&str; 5] = [
    "Preparing backup",
    "Backing up database",
    "Backing up files",
    "Compressing archive",
    "Finalizing",
];

/// How long a finished job can still be polled
pub const JOB_RETENTION: Duration = Duration::from_secs(600);

/// Backup parts a job can include
pub const BACKUP_PARTS: [&str; 3] = ["database", "files", "config"];

#[derive(Clone)]
struct Job {
    tracker: ProgressTracker,
}

/// Registry of running and finished jobs
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    tick: Duration,
    retention: Duration,
}

impl JobRegistry {
    pub fn new(tick: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            tick,
            retention: JOB_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    fn new_id() -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();
        format!("job_{}", suffix.to_lowercase())
    }

    /// Start a backup of the given parts; completed backups are recorded
    pub async fn start_backup(&self, pool: Pool<Sqlite>, parts: Vec<String>) -> String {
        let id = Self::new_id();
        let tracker = ProgressTracker::new();
        self.jobs
            .write()
            .await
            .insert(id.clone(), Job { tracker: tracker.clone() });

        let source = SimulatedProgress::new(&BACKUP_STEPS).with_tick(self.tick);
        let job_id = id.clone();
        let jobs = self.jobs.clone();
        let retention = self.retention;
        tokio::spawn(async move {
            let started = std::time::Instant::now();
            match tracker.run(&format!("backup {}", job_id), source).await {
                Ok(ProgressOutcome::Completed) => {
                    if let Err(e) = record_backup(&pool, &parts, started.elapsed()).await {
                        error!(job = %job_id, error = %e, "Failed to record backup");
                    }
                }
                Ok(outcome) => info!(job = %job_id, outcome = ?outcome, "Backup job ended"),
                Err(e) => error!(job = %job_id, error = %e, "Backup job could not start"),
            }

            tokio::time::sleep(retention).await;
            jobs.write().await.remove(&job_id);
            debug!(job = %job_id, "Finished job evicted");
        });

        info!(job = %id, "Backup job started");
        id
    }

    pub async fn status(&self, id: &str) -> Option<JobStatus> {
        let jobs = self.jobs.read().await;
        let snapshot = jobs.get(id)?.tracker.snapshot();
        let state = match snapshot.state {
            ActionState::Idle | ActionState::Running => "running",
            ActionState::Completed => "completed",
            ActionState::Cancelled => "cancelled",
            ActionState::Failed => "failed",
        };
        let percent = match snapshot.state {
            ActionState::Completed => 100,
            _ => snapshot.pending.as_ref().map(|p| p.percent).unwrap_or(0),
        };
        Some(JobStatus {
            percent,
            step: snapshot.pending.as_ref().map(|p| p.step).unwrap_or(0),
            state: state.to_string(),
            message: snapshot.message,
        })
    }

    /// Cancel a job; `None` if unknown, `Some(false)` if it already ended
    pub async fn cancel(&self, id: &str) -> Option<bool> {
        let jobs = self.jobs.read().await;
        Some(jobs.get(id)?.tracker.cancel())
    }
}

async fn record_backup(
    pool: &Pool<Sqlite>,
    parts: &[String],
    elapsed: Duration,
) -> stockctl_core::Result<()> {
    let backup_type = if parts.len() == BACKUP_PARTS.len() {
        "full".to_string()
    } else {
        parts.join("+")
    };
    // The id is assigned on insert
    let record = SampleRecord::Backup(BackupEntry {
        id: 0,
        name: "Manual backup".to_string(),
        backup_type,
        size_bytes: 0,
        status: BackupStatus::Success,
        created_at: Utc::now(),
        duration_secs: elapsed.as_secs(),
    });
    let id = queries::insert_record(pool, Collection::Backups, &record).await?;
    info!(id, "Backup recorded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockctl_database::Database;

    async fn pool() -> Pool<Sqlite> {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.pool().clone()
    }

    #[tokio::test]
    async fn test_backup_job_completes_and_is_recorded() {
        let pool = pool().await;
        let jobs = JobRegistry::new(Duration::from_millis(1));

        let id = jobs
            .start_backup(pool.clone(), vec!["database".to_string()])
            .await;
        let mut status = jobs.status(&id).await.unwrap();
        for _ in 0..500 {
            if status.state != "running" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            status = jobs.status(&id).await.unwrap();
        }

        assert_eq!(status.state, "completed");
        assert_eq!(status.percent, 100);
        // The record is written right after the tracker completes
        for _ in 0..100 {
            if queries::count_records(&pool, Collection::Backups).await.unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let rows = queries::list_records(&pool, Collection::Backups, &Default::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind(), Some("database"));
    }

    #[tokio::test]
    async fn test_concurrent_backups_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}/jobs.db", dir.path().display());
        let db = Database::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        let pool = db.pool().clone();
        let parts = vec!["database".to_string()];

        let (a, b) = tokio::join!(
            record_backup(&pool, &parts, Duration::from_secs(1)),
            record_backup(&pool, &parts, Duration::from_secs(2))
        );
        a.unwrap();
        b.unwrap();

        let rows = queries::list_records(&pool, Collection::Backups, &Default::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].id(), rows[1].id());
    }

    #[tokio::test]
    async fn test_finished_job_is_evicted() {
        let pool = pool().await;
        let jobs = JobRegistry::new(Duration::from_millis(1))
            .with_retention(Duration::from_millis(20));

        let id = jobs
            .start_backup(pool, vec!["config".to_string()])
            .await;
        assert!(jobs.status(&id).await.is_some());

        for _ in 0..500 {
            if jobs.status(&id).await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(jobs.status(&id).await.is_none());
        assert_eq!(jobs.job_count().await, 0);
        assert_eq!(jobs.cancel(&id).await, None);
    }

    #[tokio::test]
    async fn test_cancel_job() {
        let pool = pool().await;
        let jobs = JobRegistry::new(Duration::from_secs(60));
        let id = jobs.start_backup(pool, vec!["files".to_string()]).await;

        // Let the spawned task enter the running state
        for _ in 0..100 {
            if jobs.status(&id).await.unwrap().state == "running" {
                tokio::task::yield_now().await;
            }
            if jobs.cancel(&id).await == Some(true) {
                break;
            }
        }

        assert_eq!(jobs.status(&id).await.unwrap().state, "cancelled");
        assert_eq!(jobs.cancel("job_missing").await, None);
    }
}
