//! Task scheduler
//!
//! Runs periodic page jobs (auto-save) and previews cron schedules such as
//! the backup schedule configured on the backup page.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use stockctl_core::{Error, Result, SettingsPage};

/// How often a page with unsaved edits is auto-saved
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type TaskHandler = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

// ============================================================================
// Cron helpers
// ============================================================================

/// Parse a cron expression
///
/// Accepts the six-field form with seconds (`0 0 2 * * *`) and the classic
/// five-field form, which runs at second zero.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| Error::SchedulerError(format!("Invalid cron expression '{}': {}", expr, e)))
}

/// The next `count` fire times of a cron expression after `after`
pub fn next_occurrences(expr: &str, count: usize, after: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
    let schedule = parse_schedule(expr)?;
    Ok(schedule.after(&after).take(count).collect())
}

// ============================================================================
// Tasks
// ============================================================================

/// When a task fires
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fixed period; the first run is one period after start
    Every(Duration),
    Cron(Schedule),
}

impl Trigger {
    pub fn cron(expr: &str) -> Result<Self> {
        Ok(Trigger::Cron(parse_schedule(expr)?))
    }
}

/// Scheduled task
pub struct Task {
    pub id: String,
    pub trigger: Trigger,
    pub handler: TaskHandler,
}

async fn run_once(id: &str, handler: &TaskHandler) {
    debug!(task_id = %id, "Executing scheduled task");
    match handler().await {
        Ok(()) => debug!(task_id = %id, "Task completed successfully"),
        Err(e) => error!(task_id = %id, error = %e, "Task execution failed"),
    }
}

async fn drive(id: String, trigger: Trigger, handler: TaskHandler) {
    match trigger {
        Trigger::Every(period) => {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                run_once(&id, &handler).await;
            }
        }
        Trigger::Cron(schedule) => loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!(task_id = %id, "Schedule has no upcoming runs, stopping");
                return;
            };
            let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay).await;
            run_once(&id, &handler).await;
        },
    }
}

/// Task scheduler
pub struct Scheduler {
    tasks: Arc<RwLock<Vec<Task>>>,
    running: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(Vec::new())),
            running: Mutex::new(Vec::new()),
        }
    }

    /// Add a task to the scheduler
    ///
    /// Tasks added after [`Scheduler::start`] run from the next start.
    pub async fn add_task<F, Fut>(&self, id: impl Into<String>, trigger: Trigger, handler: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if let Trigger::Every(period) = &trigger {
            if period.is_zero() {
                return Err(Error::SchedulerError("Task period must be positive".to_string()));
            }
        }

        let id = id.into();
        info!(id = %id, trigger = ?trigger, "Scheduled task added");

        let handler: TaskHandler = Arc::new(move || Box::pin(handler()) as TaskFuture);
        let mut tasks = self.tasks.write().await;
        tasks.retain(|t| t.id != id);
        tasks.push(Task { id, trigger, handler });
        Ok(())
    }

    /// Auto-save a page on a fixed period
    ///
    /// The page skips the write itself when it has no unsaved changes.
    pub async fn add_autosave(&self, page: Arc<SettingsPage>, period: Duration) -> Result<()> {
        let id = format!("autosave:{}", page.domain());
        self.add_task(id, Trigger::Every(period), move || {
            let page = page.clone();
            async move { page.autosave().await.map(|_| ()) }
        })
        .await
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if !running.is_empty() {
            return Err(Error::SchedulerError("Scheduler already started".to_string()));
        }

        let tasks = self.tasks.read().await;
        info!(tasks = tasks.len(), "Starting scheduler");
        for task in tasks.iter() {
            running.push(tokio::spawn(drive(
                task.id.clone(),
                task.trigger.clone(),
                task.handler.clone(),
            )));
        }
        Ok(())
    }

    /// Stop every running task
    pub async fn shutdown(&self) {
        let mut running = self.running.lock().await;
        for handle in running.drain(..) {
            handle.abort();
        }
        info!("Scheduler stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
