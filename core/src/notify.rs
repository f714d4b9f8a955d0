//! Toast notifications
//!
//! Every user-visible outcome goes through a [`Notifier`]. Toasts stack in
//! emission order and disappear after a fixed timeout unless dismissed
//! earlier through their [`ToastHandle`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Default time a toast stays visible
pub const DEFAULT_TOAST_TIMEOUT: Duration = Duration::from_secs(5);

/// Toast severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

impl Level {
    /// Bootstrap alert class for the level
    pub fn alert_class(&self) -> &'static str {
        match self {
            Level::Success => "alert-success",
            Level::Info => "alert-info",
            Level::Warning => "alert-warning",
            Level::Error => "alert-danger",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Success => "success",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        f.write_str(s)
    }
}

/// A single notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toast {
    pub id: u64,
    pub message: String,
    pub level: Level,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    toast: Toast,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    visible: Vec<Entry>,
    history: Vec<Toast>,
}

impl State {
    fn prune(&mut self, now: Instant) {
        self.visible.retain(|e| e.expires_at > now);
    }
}

/// Toast emitter shared by every page controller
#[derive(Debug, Clone)]
pub struct Notifier {
    state: Arc<Mutex<State>>,
    timeout: Duration,
    events: broadcast::Sender<Toast>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TOAST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            timeout,
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Show a toast
    pub fn notify(&self, message: impl Into<String>, level: Level) -> ToastHandle {
        let message = message.into();
        match level {
            Level::Error => error!(level = %level, "{}", message),
            Level::Warning => warn!(level = %level, "{}", message),
            Level::Success | Level::Info => info!(level = %level, "{}", message),
        }

        let now = Instant::now();
        let toast = {
            let mut state = self.lock();
            state.prune(now);
            state.next_id += 1;
            let toast = Toast {
                id: state.next_id,
                message,
                level,
                created_at: Utc::now(),
            };
            state.visible.push(Entry {
                toast: toast.clone(),
                expires_at: now + self.timeout,
            });
            state.history.push(toast.clone());
            toast
        };

        // Nobody listening is fine
        let _ = self.events.send(toast.clone());

        ToastHandle {
            id: toast.id,
            notifier: self.clone(),
        }
    }

    pub fn success(&self, message: impl Into<String>) -> ToastHandle {
        self.notify(message, Level::Success)
    }

    pub fn info(&self, message: impl Into<String>) -> ToastHandle {
        self.notify(message, Level::Info)
    }

    pub fn warning(&self, message: impl Into<String>) -> ToastHandle {
        self.notify(message, Level::Warning)
    }

    pub fn error(&self, message: impl Into<String>) -> ToastHandle {
        self.notify(message, Level::Error)
    }

    /// Toasts currently on screen, oldest first
    pub fn visible(&self) -> Vec<Toast> {
        let mut state = self.lock();
        state.prune(Instant::now());
        state.visible.iter().map(|e| e.toast.clone()).collect()
    }

    /// Every toast ever emitted, oldest first
    pub fn history(&self) -> Vec<Toast> {
        self.lock().history.clone()
    }

    /// Emitted toasts of one level
    pub fn history_at(&self, level: Level) -> Vec<Toast> {
        self.lock()
            .history
            .iter()
            .filter(|t| t.level == level)
            .cloned()
            .collect()
    }

    /// Live feed of new toasts
    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.events.subscribe()
    }

    fn dismiss(&self, id: u64) -> bool {
        let mut state = self.lock();
        state.prune(Instant::now());
        let before = state.visible.len();
        state.visible.retain(|e| e.toast.id != id);
        state.visible.len() != before
    }

    fn is_visible(&self, id: u64) -> bool {
        let mut state = self.lock();
        state.prune(Instant::now());
        state.visible.iter().any(|e| e.toast.id == id)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a shown toast
#[derive(Debug, Clone)]
pub struct ToastHandle {
    id: u64,
    notifier: Notifier,
}

impl ToastHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the toast before its timeout; false if it was already gone
    pub fn dismiss(&self) -> bool {
        self.notifier.dismiss(self.id)
    }

    pub fn is_visible(&self) -> bool {
        self.notifier.is_visible(self.id)
    }
}
