//! Long-running action progress
//!
//! A [`ProgressTracker`] owns the `Idle -> Running -> {Completed, Cancelled,
//! Failed}` state machine and the [`PendingAction`] of the current run.
//! Updates come from a [`ProgressSource`]: either [`SimulatedProgress`]
//! (timer ticks with random increments) or [`JobPoller`] (a server job
//! status route). Cancellation takes the state lock, so once
//! [`ProgressTracker::cancel`] returns no later tick can change progress.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::remote::{JobStatus, RemoteClient, Route};
use crate::{Error, Result};

/// Default tick of simulated progress
pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

/// Lifecycle state of a long-running action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionState::Completed | ActionState::Cancelled | ActionState::Failed
        )
    }
}

/// In-flight operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingAction {
    pub label: String,
    pub step: usize,
    pub percent: u8,
    pub started_at: DateTime<Utc>,
}

/// One report from a progress source
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub step: usize,
    pub message: Option<String>,
}

/// Published view of the tracker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub state: ActionState,
    pub pending: Option<PendingAction>,
    pub message: Option<String>,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Asynchronous stream of progress reports
#[async_trait]
pub trait ProgressSource: Send {
    /// Wait for and return the next report
    async fn next_update(&mut self) -> Result<ProgressUpdate>;
}

#[async_trait]
impl ProgressSource for Box<dyn ProgressSource> {
    async fn next_update(&mut self) -> Result<ProgressUpdate> {
        (**self).next_update().await
    }
}

// ============================================================================
// Simulated source
// ============================================================================

/// Timer-driven progress with randomized increments
#[derive(Debug, Clone)]
pub struct SimulatedProgress {
    tick: Duration,
    min_step: u8,
    max_step: u8,
    steps: Vec<String>,
    fail_at: Option<u8>,
    percent: u8,
}

impl SimulatedProgress {
    pub fn new(steps: &[&str]) -> Self {
        Self {
            tick: DEFAULT_TICK,
            min_step: 5,
            max_step: 15,
            steps: steps.iter().map(|s| s.to_string()).collect(),
            fail_at: None,
            percent: 0,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Increment range per tick, in percent
    pub fn with_increments(mut self, min: u8, max: u8) -> Self {
        self.min_step = min.max(1);
        self.max_step = max.max(self.min_step);
        self
    }

    /// Fail once progress reaches `percent`
    pub fn fail_at(mut self, percent: u8) -> Self {
        self.fail_at = Some(percent);
        self
    }

    fn step_for(&self, percent: u8) -> usize {
        if self.steps.is_empty() {
            return 0;
        }
        (percent as usize * self.steps.len() / 100).min(self.steps.len() - 1)
    }
}

#[async_trait]
impl ProgressSource for SimulatedProgress {
    async fn next_update(&mut self) -> Result<ProgressUpdate> {
        tokio::time::sleep(self.tick).await;

        let increment = rand::thread_rng().gen_range(self.min_step..=self.max_step);
        self.percent = self.percent.saturating_add(increment).min(100);

        if let Some(limit) = self.fail_at {
            if self.percent >= limit {
                return Err(Error::ActionFailed(format!("Operation failed at {}%", limit)));
            }
        }

        let step = self.step_for(self.percent);
        Ok(ProgressUpdate {
            percent: self.percent,
            step,
            message: self.steps.get(step).cloned(),
        })
    }
}

// ============================================================================
// Job status poller
// ============================================================================

/// Polls a server job-status route
pub struct JobPoller<C: RemoteClient> {
    remote: C,
    job_id: String,
    interval: Duration,
    first: bool,
}

impl<C: RemoteClient> JobPoller<C> {
    pub fn new(remote: C, job_id: impl Into<String>) -> Self {
        Self {
            remote,
            job_id: job_id.into(),
            interval: Duration::from_secs(1),
            first: true,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl<C: RemoteClient> ProgressSource for JobPoller<C> {
    async fn next_update(&mut self) -> Result<ProgressUpdate> {
        if !self.first {
            tokio::time::sleep(self.interval).await;
        }
        self.first = false;

        let value = self
            .remote
            .query(&Route::JobStatus(self.job_id.clone()), &[])
            .await?;
        let status: JobStatus = serde_json::from_value(value)?;

        match status.state.as_str() {
            "failed" | "cancelled" => Err(Error::RemoteError(
                status
                    .message
                    .unwrap_or_else(|| format!("Job {} {}", self.job_id, status.state)),
            )),
            "completed" => Ok(ProgressUpdate {
                percent: 100,
                step: status.step,
                message: status.message,
            }),
            _ => Ok(ProgressUpdate {
                percent: status.percent.min(99),
                step: status.step,
                message: status.message,
            }),
        }
    }
}

// ============================================================================
// Tracker
// ============================================================================

#[derive(Debug)]
struct TrackerState {
    state: ActionState,
    pending: Option<PendingAction>,
    message: Option<String>,
    cancel: Arc<Notify>,
}

impl TrackerState {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            state: self.state,
            pending: self.pending.clone(),
            message: self.message.clone(),
        }
    }
}

/// State machine for one long-running action slot
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    inner: Arc<Mutex<TrackerState>>,
    updates: Arc<watch::Sender<ProgressSnapshot>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let state = TrackerState {
            state: ActionState::Idle,
            pending: None,
            message: None,
            cancel: Arc::new(Notify::new()),
        };
        let (updates, _) = watch::channel(state.snapshot());
        Self {
            inner: Arc::new(Mutex::new(state)),
            updates: Arc::new(updates),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &TrackerState) {
        self.updates.send_replace(state.snapshot());
    }

    pub fn state(&self) -> ActionState {
        self.lock().state
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot()
    }

    /// Current percentage, 0 when nothing is pending
    pub fn percent(&self) -> u8 {
        self.lock().pending.as_ref().map(|p| p.percent).unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ActionState::Running
    }

    /// Watch published snapshots
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.updates.subscribe()
    }

    /// Cancel the running action
    ///
    /// Returns false when nothing is running. The pending action is dropped
    /// before this returns.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        if state.state != ActionState::Running {
            return false;
        }
        state.state = ActionState::Cancelled;
        state.pending = None;
        state.message = Some("Cancelled".to_string());
        state.cancel.notify_one();
        self.publish(&state);
        info!("Action cancelled");
        true
    }

    /// Drive a source until completion, failure or cancellation
    pub async fn run<S: ProgressSource>(&self, label: &str, mut source: S) -> Result<ProgressOutcome> {
        let cancel = {
            let mut state = self.lock();
            if state.state == ActionState::Running {
                return Err(Error::Busy(label.to_string()));
            }
            state.state = ActionState::Running;
            state.pending = Some(PendingAction {
                label: label.to_string(),
                step: 0,
                percent: 0,
                started_at: Utc::now(),
            });
            state.message = None;
            state.cancel = Arc::new(Notify::new());
            self.publish(&state);
            state.cancel.clone()
        };
        info!(action = %label, "Action started");

        loop {
            let update = tokio::select! {
                biased;
                _ = cancel.notified() => return Ok(ProgressOutcome::Cancelled),
                update = source.next_update() => update,
            };

            let mut state = self.lock();
            if state.state != ActionState::Running {
                // Cancelled while the source was producing this update
                return Ok(ProgressOutcome::Cancelled);
            }

            match update {
                Ok(update) => {
                    let Some(pending) = state.pending.as_mut() else {
                        return Ok(ProgressOutcome::Cancelled);
                    };
                    // Never move backwards
                    pending.percent = pending.percent.max(update.percent.min(100));
                    pending.step = pending.step.max(update.step);
                    let percent = pending.percent;
                    if update.message.is_some() {
                        state.message = update.message;
                    }
                    debug!(action = %label, percent, "Progress");

                    if percent >= 100 {
                        state.state = ActionState::Completed;
                        self.publish(&state);
                        info!(action = %label, "Action completed");
                        return Ok(ProgressOutcome::Completed);
                    }
                    self.publish(&state);
                }
                Err(e) => {
                    let message = e.user_message();
                    state.state = ActionState::Failed;
                    state.message = Some(message.clone());
                    self.publish(&state);
                    warn!(action = %label, error = %message, "Action failed");
                    return Ok(ProgressOutcome::Failed(message));
                }
            }
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
