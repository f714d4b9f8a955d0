//! Core library for StockCtl
//!
//! This crate defines the settings model, the page controller and the
//! shared types used across all StockCtl components.

pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod fixtures;
pub mod form;
pub mod notify;
pub mod progress;
pub mod records;
pub mod remote;
pub mod render;
pub mod schema;
pub mod store;
pub mod types;

// Re-exports
pub use delivery::{ChannelType, DeliveryChannel, NotificationTemplate};
pub use dispatcher::{
    Action, Channel, DispatchContext, MaintenanceTask, Mode, Outcome, ProgressSettings,
    SettingsPage,
};
pub use error::{Error, Result};
pub use form::{ControlKind, ControlSpec, ControlState, FormModel};
pub use notify::{Level, Notifier, Toast, ToastHandle};
pub use progress::{
    ActionState, JobPoller, PendingAction, ProgressOutcome, ProgressSnapshot, ProgressSource,
    ProgressTracker, SimulatedProgress,
};
pub use records::{Collection, FixtureSource, RecordFilter, RecordPage, RecordSource, SampleRecord};
pub use remote::{HttpRecordSource, HttpRemote, RemoteClient, Route};
pub use render::TableView;
pub use store::{JsonFileStore, MemoryStore, SettingsStore};
pub use types::{Domain, SettingValue, SettingsBlob};
