//! Page controller and action dispatch
//!
//! A [`SettingsPage`] owns everything one admin page needs: the bound form,
//! the unsaved-changes flag, the rendered list panels and the progress slot
//! for long-running actions. Every [`Action`] runs in one of three modes
//! (local, simulated, remote) and ends with exactly one toast.

use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::delivery::{ChannelDraft, DeliveryChannel, NotificationTemplate, TemplateDraft};
use crate::form::FormModel;
use crate::notify::{Level, Notifier};
use crate::progress::{
    ProgressOutcome, ProgressSource, ProgressTracker, SimulatedProgress, DEFAULT_TICK,
};
use crate::records::{
    ApiKey, BackupEntry, BackupStatus, Collection, LogEntry, LogLevel, RecordFilter,
    RecordSource, SampleRecord,
};
use crate::remote::{response_message, RemoteClient, Route};
use crate::render::TableView;
use crate::schema::{self, BACKUP_TYPES, CHANNEL_FIELDS, TEMPLATE_FIELDS};
use crate::store::SettingsStore;
use crate::{Domain, Error, Result, SettingValue, SettingsBlob};

// ============================================================================
// Actions
// ============================================================================

/// How an action is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Mutates page state or the local store
    Local,
    /// Drives the progress tracker
    Simulated,
    /// Calls a server route
    Remote,
}

/// Notification channel that can be connection-tested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Smtp,
    Sms,
    Push,
}

impl Channel {
    fn route(&self) -> Route {
        match self {
            Channel::Smtp => Route::TestSmtp,
            Channel::Sms => Route::TestSms,
            Channel::Push => Route::TestPush,
        }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Channel::Smtp => &[
                "smtpHost",
                "smtpPort",
                "smtpUsername",
                "smtpPassword",
                "smtpEncryption",
                "fromAddress",
            ],
            Channel::Sms => &["smsProvider", "smsApiKey"],
            Channel::Push => &["pushServerKey"],
        }
    }

    pub fn required(&self) -> &'static [&'static str] {
        match self {
            Channel::Smtp => &["smtpHost", "smtpPort"],
            Channel::Sms => &["smsApiKey"],
            Channel::Push => &["pushServerKey"],
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Channel::Smtp => "SMTP",
            Channel::Sms => "SMS",
            Channel::Push => "Push",
        }
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "smtp" | "email" => Ok(Channel::Smtp),
            "sms" => Ok(Channel::Sms),
            "push" => Ok(Channel::Push),
            other => Err(Error::ValidationError(format!(
                "Unknown channel '{}', expected smtp, sms or push",
                other
            ))),
        }
    }
}

/// Maintenance task run from the maintenance page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceTask {
    ClearCache,
    OptimizeDatabase,
    RebuildIndexes,
    CleanupLogs,
}

impl MaintenanceTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceTask::ClearCache => "clear-cache",
            MaintenanceTask::OptimizeDatabase => "optimize-database",
            MaintenanceTask::RebuildIndexes => "rebuild-indexes",
            MaintenanceTask::CleanupLogs => "cleanup-logs",
        }
    }

    fn steps(&self) -> &'static [&'static str] {
        match self {
            MaintenanceTask::ClearCache => &["Flushing application cache", "Flushing view cache"],
            MaintenanceTask::OptimizeDatabase => &[
                "Analyzing tables",
                "Reclaiming free pages",
                "Updating statistics",
            ],
            MaintenanceTask::RebuildIndexes => &["Dropping stale indexes", "Rebuilding indexes"],
            MaintenanceTask::CleanupLogs => &["Scanning log files", "Removing expired entries"],
        }
    }

    /// Log category the finished task is recorded under
    fn log_kind(&self) -> &'static str {
        match self {
            MaintenanceTask::ClearCache => "cache",
            MaintenanceTask::OptimizeDatabase | MaintenanceTask::RebuildIndexes => "database",
            MaintenanceTask::CleanupLogs => "cleanup",
        }
    }

    fn done_message(&self) -> &'static str {
        match self {
            MaintenanceTask::ClearCache => "Cache cleared successfully",
            MaintenanceTask::OptimizeDatabase => "Database optimized successfully",
            MaintenanceTask::RebuildIndexes => "Indexes rebuilt successfully",
            MaintenanceTask::CleanupLogs => "Old logs cleaned up successfully",
        }
    }
}

impl FromStr for MaintenanceTask {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let all = [
            MaintenanceTask::ClearCache,
            MaintenanceTask::OptimizeDatabase,
            MaintenanceTask::RebuildIndexes,
            MaintenanceTask::CleanupLogs,
        ];
        all.into_iter()
            .find(|t| t.as_str() == s.replace('_', "-").to_ascii_lowercase())
            .ok_or_else(|| Error::ValidationError(format!("Unknown maintenance task '{}'", s)))
    }
}

/// A named page action, i.e. a button
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Persist the form to the local store
    SaveSettings,
    /// Send the form to the server, then persist locally
    SubmitSettings,
    /// Put every control back at its default
    ResetSettings,
    GenerateApiKey,
    RevokeApiKey(i64),
    DeleteWebhook(i64),
    TestWebhook(i64),
    SelectBackup(i64),
    DeleteBackup(i64),
    StartBackup,
    RestoreBackup(i64),
    RunMaintenance(MaintenanceTask),
    TestConnection(Channel),
    SendTestNotification,
    CreateTemplate,
    DeleteTemplate(i64),
    CreateChannel,
    DeleteChannel(i64),
    Filter(Collection, RecordFilter),
    Refresh(Collection),
}

impl Action {
    /// Stable name, used for in-flight tracking and logs
    pub fn name(&self) -> String {
        match self {
            Action::SaveSettings => "save-settings".into(),
            Action::SubmitSettings => "submit-settings".into(),
            Action::ResetSettings => "reset-settings".into(),
            Action::GenerateApiKey => "generate-api-key".into(),
            Action::RevokeApiKey(id) => format!("revoke-api-key:{}", id),
            Action::DeleteWebhook(id) => format!("delete-webhook:{}", id),
            Action::TestWebhook(id) => format!("test-webhook:{}", id),
            Action::SelectBackup(id) => format!("select-backup:{}", id),
            Action::DeleteBackup(id) => format!("delete-backup:{}", id),
            // One slot for every long-running action on a page
            Action::StartBackup | Action::RestoreBackup(_) | Action::RunMaintenance(_) => {
                "progress".into()
            }
            Action::TestConnection(channel) => format!("test-{}", channel.title().to_lowercase()),
            Action::SendTestNotification => "send-test-notification".into(),
            Action::CreateTemplate => "create-template".into(),
            Action::DeleteTemplate(id) => format!("delete-template:{}", id),
            Action::CreateChannel => "create-channel".into(),
            Action::DeleteChannel(id) => format!("delete-channel:{}", id),
            Action::Filter(c, _) | Action::Refresh(c) => format!("load:{}", c),
        }
    }

    /// Page the action belongs to; `None` for actions every page has
    pub fn domain(&self) -> Option<Domain> {
        match self {
            Action::GenerateApiKey
            | Action::RevokeApiKey(_)
            | Action::DeleteWebhook(_)
            | Action::TestWebhook(_) => Some(Domain::Api),
            Action::SelectBackup(_)
            | Action::DeleteBackup(_)
            | Action::StartBackup
            | Action::RestoreBackup(_) => Some(Domain::Backup),
            Action::RunMaintenance(_) => Some(Domain::Maintenance),
            Action::TestConnection(_)
            | Action::SendTestNotification
            | Action::CreateTemplate
            | Action::DeleteTemplate(_)
            | Action::CreateChannel
            | Action::DeleteChannel(_) => Some(Domain::Notifications),
            Action::Filter(c, _) | Action::Refresh(c) => Some(c.domain()),
            Action::SaveSettings | Action::SubmitSettings | Action::ResetSettings => None,
        }
    }

    /// Execution mode; record changes go to the server when one is attached
    pub fn mode(&self, remote_attached: bool) -> Mode {
        match self {
            Action::StartBackup | Action::RestoreBackup(_) | Action::RunMaintenance(_) => {
                Mode::Simulated
            }
            Action::SubmitSettings
            | Action::TestWebhook(_)
            | Action::TestConnection(_)
            | Action::SendTestNotification => Mode::Remote,
            Action::GenerateApiKey
            | Action::RevokeApiKey(_)
            | Action::DeleteWebhook(_)
            | Action::DeleteBackup(_)
            | Action::CreateTemplate
            | Action::DeleteTemplate(_)
            | Action::CreateChannel
            | Action::DeleteChannel(_)
                if remote_attached =>
            {
                Mode::Remote
            }
            _ => Mode::Local,
        }
    }

    /// Question to confirm before a destructive action runs
    pub fn confirmation_prompt(&self) -> Option<String> {
        match self {
            Action::RevokeApiKey(id) => Some(format!(
                "Revoke API key #{}? Applications using it will lose access.",
                id
            )),
            Action::DeleteWebhook(id) => Some(format!("Delete webhook #{}?", id)),
            Action::DeleteBackup(id) => Some(format!(
                "Delete backup #{}? This cannot be undone.",
                id
            )),
            Action::RestoreBackup(id) => Some(format!(
                "Restore backup #{}? Current data will be overwritten.",
                id
            )),
            Action::DeleteTemplate(id) => Some(format!("Delete notification template #{}?", id)),
            Action::DeleteChannel(id) => Some(format!(
                "Delete notification channel #{}? Nothing more will be sent to it.",
                id
            )),
            _ => None,
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.confirmation_prompt().is_some()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Per-dispatch input that is not part of the form
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    /// The user answered yes to the action's confirmation prompt
    pub confirmed: bool,
    /// Extra payload fields sent with remote actions
    pub params: SettingsBlob,
}

impl DispatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context carrying a positive confirmation
    pub fn confirmed() -> Self {
        Self {
            confirmed: true,
            ..Self::default()
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.params.insert(key, value);
        self
    }
}

/// Result of a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded(String),
    Cancelled(String),
    Failed(String),
    /// Stopped by validation before anything ran
    Rejected(String),
    /// A destructive action without confirmation; nothing ran
    Declined,
    /// The same action is already in flight; nothing ran
    Busy,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    /// Toast level, `None` when the action never ran
    pub fn level(&self) -> Option<Level> {
        match self {
            Outcome::Succeeded(_) => Some(Level::Success),
            Outcome::Cancelled(_) => Some(Level::Info),
            Outcome::Failed(_) => Some(Level::Error),
            Outcome::Rejected(_) => Some(Level::Warning),
            Outcome::Declined | Outcome::Busy => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Succeeded(m)
            | Outcome::Cancelled(m)
            | Outcome::Failed(m)
            | Outcome::Rejected(m) => Some(m),
            Outcome::Declined | Outcome::Busy => None,
        }
    }

    fn from_error(err: Error) -> Self {
        match err {
            Error::ValidationError(msg) => Outcome::Rejected(msg),
            Error::Busy(_) => Outcome::Busy,
            other => Outcome::Failed(other.user_message()),
        }
    }
}

// ============================================================================
// In-flight tracking
// ============================================================================

/// Names of actions currently running on a page
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark an action as running; `None` if it already is
    fn acquire(&self, name: &str) -> Option<InFlightGuard> {
        if !self.lock().insert(name.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

struct InFlightGuard {
    set: InFlight,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.name);
    }
}

// ============================================================================
// Progress sources
// ============================================================================

/// Tuning for simulated long-running actions
#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub tick: Duration,
    pub min_step: u8,
    pub max_step: u8,
    /// Fail once progress reaches this percentage
    pub fail_at: Option<u8>,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            min_step: 5,
            max_step: 15,
            fail_at: None,
        }
    }
}

type ProgressFactory = Arc<dyn Fn(&Action) -> Box<dyn ProgressSource> + Send + Sync>;

const BACKUP_STEPS: [&str; 5] = [
    "Preparing backup",
    "Backing up database",
    "Backing up files",
    "Compressing archive",
    "Finalizing",
];

const RESTORE_STEPS: [&str; 4] = [
    "Validating backup",
    "Restoring database",
    "Restoring files",
    "Finalizing",
];

fn simulated_factory(settings: ProgressSettings) -> ProgressFactory {
    Arc::new(move |action: &Action| {
        let steps: &[&str] = match action {
            Action::StartBackup => &BACKUP_STEPS,
            Action::RestoreBackup(_) => &RESTORE_STEPS,
            Action::RunMaintenance(task) => task.steps(),
            _ => &[],
        };
        let mut source = SimulatedProgress::new(steps)
            .with_tick(settings.tick)
            .with_increments(settings.min_step, settings.max_step);
        if let Some(percent) = settings.fail_at {
            source = source.fail_at(percent);
        }
        Box::new(source) as Box<dyn ProgressSource>
    })
}

// ============================================================================
// Page controller
// ============================================================================

#[derive(Debug, Default)]
struct PageState {
    form: FormModel,
    /// Last blob loaded from or written to the store
    saved: SettingsBlob,
    unsaved_changes: bool,
    selected_backup: Option<i64>,
    last_token: Option<String>,
    views: BTreeMap<Collection, TableView>,
    filters: BTreeMap<Collection, RecordFilter>,
    /// Records created on this page that the source does not know about
    added: BTreeMap<Collection, Vec<SampleRecord>>,
    /// Records removed on this page
    removed: BTreeMap<Collection, BTreeSet<i64>>,
    templates: Vec<NotificationTemplate>,
    channels: Vec<DeliveryChannel>,
}

impl PageState {
    fn is_removed(&self, collection: Collection, id: i64) -> bool {
        self.removed
            .get(&collection)
            .is_some_and(|ids| ids.contains(&id))
    }
}

/// Controller for one settings page
pub struct SettingsPage {
    domain: Domain,
    store: Arc<dyn SettingsStore>,
    records: Arc<dyn RecordSource>,
    remote: Option<Arc<dyn RemoteClient>>,
    notifier: Notifier,
    tracker: ProgressTracker,
    in_flight: InFlight,
    progress: ProgressFactory,
    state: Mutex<PageState>,
}

impl fmt::Debug for SettingsPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsPage")
            .field("domain", &self.domain)
            .field("store", &self.store.name())
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

impl SettingsPage {
    pub fn new(
        domain: Domain,
        store: Arc<dyn SettingsStore>,
        records: Arc<dyn RecordSource>,
        notifier: Notifier,
    ) -> Self {
        let state = PageState {
            form: schema::form_for(domain),
            ..PageState::default()
        };
        Self {
            domain,
            store,
            records,
            remote: None,
            notifier,
            tracker: ProgressTracker::new(),
            in_flight: InFlight::default(),
            progress: simulated_factory(ProgressSettings::default()),
            state: Mutex::new(state),
        }
    }

    /// Attach a server for remote actions
    pub fn with_remote(mut self, remote: Arc<dyn RemoteClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_progress(mut self, settings: ProgressSettings) -> Self {
        self.progress = simulated_factory(settings);
        self
    }

    /// Replace simulated progress with a custom source, e.g. a job poller
    pub fn with_progress_source<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Action) -> Box<dyn ProgressSource> + Send + Sync + 'static,
    {
        self.progress = Arc::new(factory);
        self
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Progress slot; clone it to cancel from another task
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Snapshot of the form
    pub fn form(&self) -> FormModel {
        self.state().form.clone()
    }

    pub fn field(&self, name: &str) -> Option<String> {
        self.state().form.value(name).map(str::to_string)
    }

    pub fn is_checked(&self, name: &str) -> Option<bool> {
        self.state().form.is_checked(name)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.state().unsaved_changes
    }

    pub fn selected_backup(&self) -> Option<i64> {
        self.state().selected_backup
    }

    /// Full secret of the most recently generated key
    pub fn last_generated_token(&self) -> Option<String> {
        self.state().last_token.clone()
    }

    /// Last persisted blob
    pub fn saved(&self) -> SettingsBlob {
        self.state().saved.clone()
    }

    pub fn view(&self, collection: Collection) -> TableView {
        self.state()
            .views
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn templates(&self) -> Vec<NotificationTemplate> {
        self.state().templates.clone()
    }

    pub fn channels(&self) -> Vec<DeliveryChannel> {
        self.state().channels.clone()
    }

    /// Collections shown on this page
    pub fn collections(&self) -> Vec<Collection> {
        Collection::ALL
            .into_iter()
            .filter(|c| c.domain() == self.domain)
            .collect()
    }

    // ------------------------------------------------------------------------
    // Form editing
    // ------------------------------------------------------------------------

    /// Edit one control and mark the page dirty
    pub fn set_field(&self, name: &str, value: impl Into<SettingValue>) -> bool {
        let mut state = self.state();
        let changed = state.form.set(name, value);
        if changed {
            state.unsaved_changes = true;
        }
        changed
    }

    /// Edit several controls at once; returns the number touched
    pub fn apply_fields(&self, blob: &SettingsBlob) -> usize {
        let mut state = self.state();
        let touched = state.form.apply(blob);
        if touched > 0 {
            state.unsaved_changes = true;
        }
        touched
    }

    fn persisted_blob(&self) -> SettingsBlob {
        self.state()
            .form
            .collect(&schema::persisted_fields(self.domain))
    }

    /// Record a completed write; edits made while it was in flight stay unsaved
    fn mark_saved(&self, blob: SettingsBlob) {
        let mut state = self.state();
        let current = state.form.collect(&schema::persisted_fields(self.domain));
        state.unsaved_changes = current != blob;
        state.saved = blob;
    }

    // ------------------------------------------------------------------------
    // Load and auto-save
    // ------------------------------------------------------------------------

    /// Populate the form and render every list panel
    ///
    /// Never fails: a broken store slot or an unreachable server falls back
    /// to defaults, logged only.
    #[instrument(skip(self), fields(domain = %self.domain))]
    pub async fn load(&self) {
        let mut blob = self.store.load(self.domain).await;

        if let Some(remote) = &self.remote {
            match self.fetch_remote_settings(remote.as_ref()).await {
                Ok(Some(remote_blob)) => {
                    if let Err(e) = self.store.save(self.domain, &remote_blob).await {
                        warn!(error = %e, "Failed to cache server settings locally");
                    }
                    blob = remote_blob;
                }
                Ok(None) => debug!("Server has no saved settings, keeping local ones"),
                Err(e) => warn!(error = %e, "Using local settings, server unavailable"),
            }
            if self.domain == Domain::Notifications {
                self.fetch_delivery(remote.as_ref()).await;
            }
        }

        {
            let mut state = self.state();
            state.form.populate(&blob);
            state.saved = blob;
            state.unsaved_changes = false;
        }

        for collection in self.collections() {
            if let Err(e) = self.refresh(collection).await {
                warn!(collection = %collection, error = %e, "Failed to load records");
            }
        }
        debug!("Page loaded");
    }

    /// Server-side settings; `None` when the server never stored any
    async fn fetch_remote_settings(
        &self,
        remote: &dyn RemoteClient,
    ) -> Result<Option<SettingsBlob>> {
        let value = remote
            .query(&Route::LoadSettings(self.domain), &[])
            .await?;
        if value.get("updated_at").is_some_and(Value::is_null) {
            return Ok(None);
        }
        let settings = value.get("settings").unwrap_or(&value);
        SettingsBlob::parse(&settings.to_string()).map(Some)
    }

    async fn fetch_delivery(&self, remote: &dyn RemoteClient) {
        match remote.query(&Route::ListTemplates, &[]).await {
            Ok(value) => match list_field::<NotificationTemplate>(&value, "templates") {
                Ok(templates) => self.state().templates = templates,
                Err(e) => warn!(error = %e, "Ignoring malformed template list"),
            },
            Err(e) => warn!(error = %e, "Failed to load notification templates"),
        }
        match remote.query(&Route::ListChannels, &[]).await {
            Ok(value) => match list_field::<DeliveryChannel>(&value, "channels") {
                Ok(channels) => self.state().channels = channels,
                Err(e) => warn!(error = %e, "Ignoring malformed channel list"),
            },
            Err(e) => warn!(error = %e, "Failed to load notification channels"),
        }
    }

    /// Persist pending edits; skipped when nothing changed
    ///
    /// Returns whether a write happened. An invalid form is left alone until
    /// the user saves it explicitly.
    pub async fn autosave(&self) -> Result<bool> {
        let (dirty, valid) = {
            let state = self.state();
            (state.unsaved_changes, state.form.validate().is_ok())
        };
        if !dirty {
            debug!(domain = %self.domain, "Auto-save skipped, no changes");
            return Ok(false);
        }
        if !valid {
            debug!(domain = %self.domain, "Auto-save skipped, form invalid");
            return Ok(false);
        }

        let blob = self.persisted_blob();
        self.store.save(self.domain, &blob).await?;
        self.mark_saved(blob);
        self.notifier.info("Changes auto-saved");
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Run an action and report its outcome as a toast
    #[instrument(skip(self, ctx), fields(domain = %self.domain, action = %action))]
    pub async fn dispatch(&self, action: Action, ctx: DispatchContext) -> Outcome {
        if action.is_destructive() && !ctx.confirmed {
            info!("Destructive action not confirmed");
            return Outcome::Declined;
        }

        let name = action.name();
        let Some(_guard) = self.in_flight.acquire(&name) else {
            debug!("Action already in flight");
            return Outcome::Busy;
        };

        let outcome = match self.execute(&action, &ctx).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::from_error(e),
        };

        if let (Some(level), Some(message)) = (outcome.level(), outcome.message()) {
            self.notifier.notify(message, level);
        }
        outcome
    }

    async fn execute(&self, action: &Action, ctx: &DispatchContext) -> Result<Outcome> {
        if let Some(domain) = action.domain() {
            if domain != self.domain {
                return Err(Error::ValidationError(format!(
                    "'{}' is not available on the {} settings page",
                    action,
                    self.domain.title()
                )));
            }
        }

        let remote = action.mode(self.remote.is_some()) == Mode::Remote;
        match action {
            Action::SaveSettings => self.save_local().await,
            Action::SubmitSettings => self.submit_remote().await,
            Action::ResetSettings => Ok(self.reset()),
            Action::GenerateApiKey => self.generate_api_key(remote).await,
            Action::RevokeApiKey(id) => {
                self.remove_record(Collection::ApiKeys, *id, "API key", remote, ctx)
                    .await
            }
            Action::DeleteWebhook(id) => {
                self.remove_record(Collection::Webhooks, *id, "Webhook", remote, ctx)
                    .await
            }
            Action::DeleteBackup(id) => {
                self.remove_record(Collection::Backups, *id, "Backup", remote, ctx)
                    .await
            }
            Action::TestWebhook(id) => self.test_webhook(*id, ctx).await,
            Action::SelectBackup(id) => self.select_backup(*id).await,
            Action::StartBackup => self.start_backup(action).await,
            Action::RestoreBackup(id) => self.restore_backup(action, *id).await,
            Action::RunMaintenance(task) => self.run_maintenance(action, *task).await,
            Action::TestConnection(channel) => self.test_connection(*channel, ctx).await,
            Action::SendTestNotification => self.send_test_notification(ctx).await,
            Action::CreateTemplate => self.create_template(remote, ctx).await,
            Action::DeleteTemplate(id) => self.delete_template(*id, remote, ctx).await,
            Action::CreateChannel => self.create_channel(remote, ctx).await,
            Action::DeleteChannel(id) => self.delete_channel(*id, remote, ctx).await,
            Action::Filter(collection, filter) => {
                self.state().filters.insert(*collection, filter.clone());
                let shown = self.refresh(*collection).await?;
                Ok(Outcome::Succeeded(format!("Showing {} {}", shown, collection)))
            }
            Action::Refresh(collection) => {
                let shown = self.refresh(*collection).await?;
                Ok(Outcome::Succeeded(format!("Loaded {} {}", shown, collection)))
            }
        }
    }

    fn remote(&self) -> Result<Arc<dyn RemoteClient>> {
        self.remote
            .clone()
            .ok_or_else(|| Error::ConfigError("no server configured".to_string()))
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    async fn save_local(&self) -> Result<Outcome> {
        self.state().form.validate()?;
        let blob = self.persisted_blob();
        self.store.save(self.domain, &blob).await?;
        self.mark_saved(blob);
        Ok(Outcome::Succeeded(format!(
            "{} settings saved successfully",
            self.domain.title()
        )))
    }

    async fn submit_remote(&self) -> Result<Outcome> {
        self.state().form.validate()?;
        let remote = self.remote()?;
        let blob = self.persisted_blob();

        let response = remote.send(&Route::SaveSettings(self.domain), &blob).await?;
        self.store.save(self.domain, &blob).await?;
        self.mark_saved(blob);

        Ok(Outcome::Succeeded(response_message(&response).unwrap_or_else(
            || format!("{} settings saved successfully", self.domain.title()),
        )))
    }

    fn reset(&self) -> Outcome {
        let mut state = self.state();
        state.form.reset();
        state.unsaved_changes = true;
        Outcome::Succeeded("Settings reset to defaults".to_string())
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    /// Re-render a list panel from the source plus local edits
    async fn refresh(&self, collection: Collection) -> Result<usize> {
        let filter = self
            .state()
            .filters
            .get(&collection)
            .cloned()
            .unwrap_or_default();
        let fetched = self.records.list_records(collection, &filter).await?;
        let now = Utc::now();

        let mut state = self.state();
        let staged = state
            .added
            .get(&collection)
            .map(|records| filter.apply(records, now))
            .unwrap_or_default();
        let mut rows: Vec<SampleRecord> = fetched
            .into_iter()
            .filter(|r| !state.is_removed(collection, r.id()))
            .filter(|r| !staged.iter().any(|s| s.id() == r.id()))
            .collect();
        rows.extend(staged);
        rows.sort_by_key(|r| std::cmp::Reverse(r.timestamp()));

        state
            .views
            .entry(collection)
            .or_default()
            .render(&rows, now);
        Ok(rows.len())
    }

    /// Every known record of a collection, ignoring filters
    async fn all_records(&self, collection: Collection) -> Result<Vec<SampleRecord>> {
        let mut records = self
            .records
            .list_records(collection, &RecordFilter::default())
            .await?;
        let state = self.state();
        records.retain(|r| !state.is_removed(collection, r.id()));
        if let Some(added) = state.added.get(&collection) {
            records.retain(|r| !added.iter().any(|a| a.id() == r.id()));
            records.extend(added.iter().cloned());
        }
        Ok(records)
    }

    async fn next_id(&self, collection: Collection) -> Result<i64> {
        let records = self
            .records
            .list_records(collection, &RecordFilter::default())
            .await?;
        let state = self.state();
        let staged = state.added.get(&collection).into_iter().flatten();
        Ok(records.iter().chain(staged).map(SampleRecord::id).max().unwrap_or(0) + 1)
    }

    fn stage(&self, collection: Collection, record: SampleRecord) {
        let mut state = self.state();
        let added = state.added.entry(collection).or_default();
        added.retain(|r| r.id() != record.id());
        added.push(record);
    }

    async fn generate_api_key(&self, remote: bool) -> Result<Outcome> {
        let (name, permission) = {
            let state = self.state();
            state.form.require(&["keyName"])?;
            let name = state.form.value("keyName").unwrap_or_default().trim().to_string();
            let permission = state.form.value("keyPermissions").unwrap_or("read").to_string();
            (name, permission)
        };

        if remote {
            let mut payload = SettingsBlob::new();
            payload.insert("keyName", name.as_str());
            payload.insert("keyPermissions", permission.as_str());
            let response = self.remote()?.send(&Route::CreateApiKey, &payload).await?;
            let token = response
                .get("token")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::RemoteError("Server did not return the new key".into()))?;
            self.state().last_token = Some(token.to_string());
            self.refresh(Collection::ApiKeys).await?;
            info!(key = %name, "API key created on server");
            return Ok(Outcome::Succeeded(response_message(&response).unwrap_or_else(
                || format!("API key '{}' generated. Copy it now, it will not be shown again.", name),
            )));
        }

        // Regenerating under the same name replaces the staged key
        let existing = self
            .state()
            .added
            .get(&Collection::ApiKeys)
            .and_then(|keys| keys.iter().find(|k| k.display_name() == name))
            .map(SampleRecord::id);
        let id = match existing {
            Some(id) => id,
            None => self.next_id(Collection::ApiKeys).await?,
        };

        let (key, token) = ApiKey::issue(id, &name, &permission, Utc::now());
        self.stage(Collection::ApiKeys, SampleRecord::ApiKey(key));
        self.state().last_token = Some(token);
        self.refresh(Collection::ApiKeys).await?;

        info!(key = %name, id, "API key generated");
        Ok(Outcome::Succeeded(format!(
            "API key '{}' generated. Copy it now, it will not be shown again.",
            name
        )))
    }

    async fn remove_record(
        &self,
        collection: Collection,
        id: i64,
        noun: &str,
        remote: bool,
        ctx: &DispatchContext,
    ) -> Result<Outcome> {
        let already_removed = self.state().is_removed(collection, id);
        if remote {
            self.remote()?
                .send(&Route::DeleteRecord(collection, id), &ctx.params)
                .await?;
        } else if !already_removed {
            let known = self
                .all_records(collection)
                .await?
                .iter()
                .any(|r| r.id() == id);
            if !known {
                return Err(Error::ActionFailed(format!("{} #{} not found", noun, id)));
            }
        }

        {
            let mut state = self.state();
            if let Some(added) = state.added.get_mut(&collection) {
                added.retain(|r| r.id() != id);
            }
            if !remote {
                state.removed.entry(collection).or_default().insert(id);
            }
            if collection == Collection::Backups && state.selected_backup == Some(id) {
                state.selected_backup = None;
            }
        }
        self.refresh(collection).await?;

        let verb = if collection == Collection::ApiKeys {
            "revoked"
        } else {
            "deleted"
        };
        Ok(Outcome::Succeeded(format!("{} #{} {}", noun, id, verb)))
    }

    async fn select_backup(&self, id: i64) -> Result<Outcome> {
        let known = self
            .all_records(Collection::Backups)
            .await?
            .iter()
            .any(|r| r.id() == id);
        if !known {
            return Err(Error::ActionFailed(format!("Backup #{} not found", id)));
        }
        self.state().selected_backup = Some(id);
        Ok(Outcome::Succeeded(format!("Backup #{} selected", id)))
    }

    // ------------------------------------------------------------------------
    // Long-running actions
    // ------------------------------------------------------------------------

    async fn start_backup(&self, action: &Action) -> Result<Outcome> {
        let types: Vec<&str> = {
            let state = self.state();
            BACKUP_TYPES
                .iter()
                .copied()
                .filter(|name| state.form.is_checked(name) == Some(true))
                .collect()
        };
        if types.is_empty() {
            return Err(Error::ValidationError(
                "Please select at least one backup type".to_string(),
            ));
        }

        let started = std::time::Instant::now();
        let source = (self.progress)(action);
        match self.tracker.run("Manual backup", source).await? {
            ProgressOutcome::Completed => {
                let id = self.next_id(Collection::Backups).await?;
                let backup_type = if types.len() == BACKUP_TYPES.len() {
                    "full".to_string()
                } else {
                    types
                        .iter()
                        .map(|t| t.trim_start_matches("backup").to_ascii_lowercase())
                        .collect::<Vec<_>>()
                        .join("+")
                };
                let size_bytes = types
                    .iter()
                    .map(|t| match *t {
                        "backupDatabase" => 512 * 1024 * 1024,
                        "backupFiles" => 1830 * 1024 * 1024,
                        _ => 1024 * 1024,
                    })
                    .sum();
                self.stage(
                    Collection::Backups,
                    SampleRecord::Backup(BackupEntry {
                        id,
                        name: "Manual backup".to_string(),
                        backup_type,
                        size_bytes,
                        status: BackupStatus::Success,
                        created_at: Utc::now(),
                        duration_secs: started.elapsed().as_secs(),
                    }),
                );
                self.refresh(Collection::Backups).await?;
                Ok(Outcome::Succeeded("Backup completed successfully".to_string()))
            }
            ProgressOutcome::Cancelled => Ok(Outcome::Cancelled("Backup cancelled".to_string())),
            ProgressOutcome::Failed(msg) => Ok(Outcome::Failed(format!("Backup failed: {}", msg))),
        }
    }

    async fn restore_backup(&self, action: &Action, id: i64) -> Result<Outcome> {
        let known = self
            .all_records(Collection::Backups)
            .await?
            .iter()
            .any(|r| r.id() == id);
        if !known {
            return Err(Error::ActionFailed(format!("Backup #{} not found", id)));
        }
        self.state().selected_backup = Some(id);

        let label = format!("Restore backup #{}", id);
        match self.tracker.run(&label, (self.progress)(action)).await? {
            ProgressOutcome::Completed => Ok(Outcome::Succeeded(format!(
                "Backup #{} restored successfully",
                id
            ))),
            ProgressOutcome::Cancelled => Ok(Outcome::Cancelled("Restore cancelled".to_string())),
            ProgressOutcome::Failed(msg) => {
                Ok(Outcome::Failed(format!("Restore failed: {}", msg)))
            }
        }
    }

    async fn run_maintenance(&self, action: &Action, task: MaintenanceTask) -> Result<Outcome> {
        match self.tracker.run(task.as_str(), (self.progress)(action)).await? {
            ProgressOutcome::Completed => {
                let id = self.next_id(Collection::MaintenanceLogs).await?;
                self.stage(
                    Collection::MaintenanceLogs,
                    SampleRecord::Log(LogEntry {
                        id,
                        kind: task.log_kind().to_string(),
                        level: LogLevel::Success,
                        method: None,
                        endpoint: None,
                        status_code: None,
                        message: task.done_message().to_string(),
                        timestamp: Utc::now(),
                    }),
                );
                self.refresh(Collection::MaintenanceLogs).await?;
                Ok(Outcome::Succeeded(task.done_message().to_string()))
            }
            ProgressOutcome::Cancelled => Ok(Outcome::Cancelled(format!(
                "Maintenance task '{}' cancelled",
                task.as_str()
            ))),
            ProgressOutcome::Failed(msg) => Ok(Outcome::Failed(format!(
                "Maintenance task '{}' failed: {}",
                task.as_str(),
                msg
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Templates and channels
    // ------------------------------------------------------------------------

    async fn create_template(&self, remote: bool, ctx: &DispatchContext) -> Result<Outcome> {
        let form = self.state().form.collect(&TEMPLATE_FIELDS);
        let draft = TemplateDraft::from_form(&form)?;
        let name = draft.name.clone();

        let template = if remote {
            let mut payload = form;
            payload.extend(&ctx.params);
            let response = self.remote()?.send(&Route::CreateTemplate, &payload).await?;
            created_item::<NotificationTemplate>(&response, "template")?
        } else {
            let state = self.state();
            let id = state
                .templates
                .iter()
                .find(|t| t.name == name)
                .map(|t| t.id)
                .unwrap_or_else(|| state.templates.iter().map(|t| t.id).max().unwrap_or(0) + 1);
            draft.into_template(id, Utc::now())
        };

        let id = template.id;
        {
            let mut state = self.state();
            state.templates.retain(|t| t.id != id && t.name != name);
            state.templates.push(template);
        }
        info!(template = %name, id, "Notification template saved");
        Ok(Outcome::Succeeded(format!("Template '{}' saved", name)))
    }

    async fn delete_template(&self, id: i64, remote: bool, ctx: &DispatchContext) -> Result<Outcome> {
        if remote {
            self.remote()?
                .send(&Route::DeleteTemplate(id), &ctx.params)
                .await?;
        } else {
            let known = self.state().templates.iter().any(|t| t.id == id);
            if !known {
                return Err(Error::ActionFailed(format!("Template #{} not found", id)));
            }
        }
        self.state().templates.retain(|t| t.id != id);
        Ok(Outcome::Succeeded(format!("Template #{} deleted", id)))
    }

    async fn create_channel(&self, remote: bool, ctx: &DispatchContext) -> Result<Outcome> {
        let form = self.state().form.collect(&CHANNEL_FIELDS);
        let draft = ChannelDraft::from_form(&form)?;
        let name = draft.name.clone();

        let channel = if remote {
            let mut payload = form;
            payload.extend(&ctx.params);
            let response = self.remote()?.send(&Route::CreateChannel, &payload).await?;
            created_item::<DeliveryChannel>(&response, "channel")?
        } else {
            let state = self.state();
            let id = state
                .channels
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.id)
                .unwrap_or_else(|| state.channels.iter().map(|c| c.id).max().unwrap_or(0) + 1);
            draft.into_channel(id, Utc::now())
        };

        let (id, kind) = (channel.id, channel.channel_type);
        {
            let mut state = self.state();
            state.channels.retain(|c| c.id != id && c.name != name);
            state.channels.push(channel);
        }
        info!(channel = %name, id, kind = %kind, "Notification channel saved");
        Ok(Outcome::Succeeded(format!("{} channel '{}' saved", kind, name)))
    }

    async fn delete_channel(&self, id: i64, remote: bool, ctx: &DispatchContext) -> Result<Outcome> {
        if remote {
            self.remote()?
                .send(&Route::DeleteChannel(id), &ctx.params)
                .await?;
        } else {
            let known = self.state().channels.iter().any(|c| c.id == id);
            if !known {
                return Err(Error::ActionFailed(format!("Channel #{} not found", id)));
            }
        }
        self.state().channels.retain(|c| c.id != id);
        Ok(Outcome::Succeeded(format!("Channel #{} deleted", id)))
    }

    // ------------------------------------------------------------------------
    // Remote tests
    // ------------------------------------------------------------------------

    async fn test_connection(&self, channel: Channel, ctx: &DispatchContext) -> Result<Outcome> {
        let mut payload = {
            let state = self.state();
            state.form.require(channel.required())?;
            state.form.collect(channel.fields())
        };
        payload.extend(&ctx.params);

        let response = self.remote()?.send(&channel.route(), &payload).await?;
        Ok(Outcome::Succeeded(response_message(&response).unwrap_or_else(
            || format!("{} connection successful", channel.title()),
        )))
    }

    async fn send_test_notification(&self, ctx: &DispatchContext) -> Result<Outcome> {
        let mut payload = {
            let state = self.state();
            state.form.require(&["testRecipient"])?;
            state.form.collect_all()
        };
        payload.extend(&ctx.params);

        let response = self
            .remote()?
            .send(&Route::SendTestNotification, &payload)
            .await?;
        Ok(Outcome::Succeeded(
            response_message(&response).unwrap_or_else(|| "Test notification sent".to_string()),
        ))
    }

    async fn test_webhook(&self, id: i64, ctx: &DispatchContext) -> Result<Outcome> {
        let response = self.remote()?.send(&Route::TestWebhook(id), &ctx.params).await?;
        Ok(Outcome::Succeeded(response_message(&response).unwrap_or_else(
            || format!("Test event delivered to webhook #{}", id),
        )))
    }
}

/// Decode `response[field]` as a list
fn list_field<T: serde::de::DeserializeOwned>(response: &Value, field: &str) -> Result<Vec<T>> {
    match response.get(field) {
        Some(items) => Ok(serde_json::from_value(items.clone())?),
        None => Ok(Vec::new()),
    }
}

/// Decode the item a create route echoes back under `field`
fn created_item<T: serde::de::DeserializeOwned>(response: &Value, field: &str) -> Result<T> {
    let item = response
        .get(field)
        .ok_or_else(|| Error::RemoteError(format!("Server did not return the new {}", field)))?;
    Ok(serde_json::from_value(item.clone())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{mask_token, FixtureSource};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Remote that answers every call with a fixed result
    struct StubRemote {
        fail_with: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
        /// Route names sent, in order
        sent: Mutex<Vec<&'static str>>,
        /// Per-route replies to `send` and `query`; other routes answer success or go offline
        replies: Vec<(&'static str, Value)>,
    }

    impl StubRemote {
        fn ok() -> Self {
            Self {
                fail_with: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                replies: Vec::new(),
            }
        }

        fn reply(mut self, route: &'static str, value: Value) -> Self {
            self.replies.push((route, value));
            self
        }

        fn reply_for(&self, route: &Route) -> Option<Value> {
            self.replies
                .iter()
                .find(|(name, _)| *name == route.name())
                .map(|(_, value)| value.clone())
        }

        fn sent(&self) -> Vec<&'static str> {
            self.sent.lock().unwrap().clone()
        }

        fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Self::ok()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self { delay, ..Self::ok() }
        }
    }

    #[async_trait]
    impl RemoteClient for StubRemote {
        async fn send(&self, route: &Route, _payload: &SettingsBlob) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push(route.name());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.fail_with {
                Some(msg) => Err(Error::RemoteError(msg.clone())),
                None => Ok(self.reply_for(route).unwrap_or_else(|| json!({"success": true}))),
            }
        }

        async fn query(&self, route: &Route, _params: &[(String, String)]) -> Result<Value> {
            self.reply_for(route)
                .ok_or_else(|| Error::RemoteError("offline".to_string()))
        }
    }

    fn fast_progress() -> ProgressSettings {
        ProgressSettings {
            tick: Duration::from_millis(10),
            min_step: 10,
            max_step: 10,
            fail_at: None,
        }
    }

    async fn page(domain: Domain, store: Arc<MemoryStore>) -> SettingsPage {
        let page = SettingsPage::new(
            domain,
            store,
            Arc::new(FixtureSource::sample()),
            Notifier::new(),
        )
        .with_progress(fast_progress());
        page.load().await;
        page
    }

    #[tokio::test]
    async fn test_saved_settings_survive_reload() {
        let store = Arc::new(MemoryStore::new());
        let first = page(Domain::Api, store.clone()).await;
        first.set_field("apiTimeout", "30");
        first.set_field("enableCORS", true);
        let outcome = first.dispatch(Action::SaveSettings, DispatchContext::new()).await;
        assert!(outcome.is_success());
        assert!(!first.has_unsaved_changes());

        let second = page(Domain::Api, store).await;
        assert_eq!(second.field("apiTimeout").as_deref(), Some("30"));
        assert_eq!(second.is_checked("enableCORS"), Some(true));
    }

    #[tokio::test]
    async fn test_generate_key_requires_name() {
        let page = page(Domain::Api, Arc::new(MemoryStore::new())).await;
        let before = page.view(Collection::ApiKeys).len();

        let outcome = page.dispatch(Action::GenerateApiKey, DispatchContext::new()).await;

        assert!(matches!(outcome, Outcome::Rejected(_)));
        assert_eq!(page.notifier().history_at(Level::Warning).len(), 1);
        assert_eq!(page.notifier().history().len(), 1);
        assert_eq!(page.view(Collection::ApiKeys).len(), before);
    }

    #[tokio::test]
    async fn test_generate_key_twice_does_not_duplicate() {
        let page = page(Domain::Api, Arc::new(MemoryStore::new())).await;
        let before = page.view(Collection::ApiKeys).len();
        page.set_field("keyName", "Warehouse Scanner");

        page.dispatch(Action::GenerateApiKey, DispatchContext::new()).await;
        page.dispatch(Action::GenerateApiKey, DispatchContext::new()).await;

        let view = page.view(Collection::ApiKeys);
        assert_eq!(view.len(), before + 1);
        let token = page.last_generated_token().unwrap();
        assert!(token.starts_with("ik_live_"));
        assert!(view.rows().iter().any(|r| r.cells[1] == mask_token(&token)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_requires_a_type() {
        let page = page(Domain::Backup, Arc::new(MemoryStore::new())).await;
        page.set_field("backupDatabase", false);

        let outcome = page.dispatch(Action::StartBackup, DispatchContext::new()).await;

        assert_eq!(
            outcome,
            Outcome::Rejected("Please select at least one backup type".to_string())
        );
        assert_eq!(page.notifier().history_at(Level::Warning).len(), 1);
        assert_eq!(page.tracker().state(), crate::progress::ActionState::Idle);
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_blob_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let mut saved = SettingsBlob::new();
        saved.insert("smtpHost", "mail.example.com");
        store.save(Domain::Notifications, &saved).await.unwrap();

        let page = page(Domain::Notifications, store.clone())
            .await
            .with_remote(Arc::new(StubRemote::failing("SMTP host unreachable")));
        page.set_field("smtpHost", "smtp.broken.test");

        let outcome = page.dispatch(Action::SubmitSettings, DispatchContext::new()).await;

        assert_eq!(outcome, Outcome::Failed("SMTP host unreachable".to_string()));
        let errors = page.notifier().history_at(Level::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "SMTP host unreachable");
        assert_eq!(page.notifier().history().len(), 1);
        assert_eq!(store.load(Domain::Notifications).await, saved);
        assert!(page.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_remote_success_persists_locally() {
        let store = Arc::new(MemoryStore::new());
        let page = page(Domain::Notifications, store.clone())
            .await
            .with_remote(Arc::new(StubRemote::ok()));
        page.set_field("smtpHost", "mail.example.com");

        let outcome = page.dispatch(Action::SubmitSettings, DispatchContext::new()).await;

        assert!(outcome.is_success());
        let stored = store.load(Domain::Notifications).await;
        assert_eq!(stored.get_text("smtpHost").as_deref(), Some("mail.example.com"));
        assert!(!stored.contains_key("testRecipient"));
        assert!(!page.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_remote_validation_makes_no_call() {
        let remote = Arc::new(StubRemote::ok());
        let page = page(Domain::Notifications, Arc::new(MemoryStore::new()))
            .await
            .with_remote(remote.clone());

        let outcome = page
            .dispatch(Action::TestConnection(Channel::Smtp), DispatchContext::new())
            .await;

        assert!(matches!(outcome, Outcome::Rejected(_)));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_destructive_action_needs_confirmation() {
        let page = page(Domain::Api, Arc::new(MemoryStore::new())).await;
        let before = page.view(Collection::ApiKeys).len();

        let outcome = page.dispatch(Action::RevokeApiKey(1), DispatchContext::new()).await;
        assert_eq!(outcome, Outcome::Declined);
        assert!(page.notifier().history().is_empty());
        assert_eq!(page.view(Collection::ApiKeys).len(), before);

        let outcome = page.dispatch(Action::RevokeApiKey(1), DispatchContext::confirmed()).await;
        assert!(outcome.is_success());
        assert_eq!(page.view(Collection::ApiKeys).len(), before - 1);
        assert!(!page.view(Collection::ApiKeys).ids().contains(&1));

        // Repeating it is harmless
        let outcome = page.dispatch(Action::RevokeApiKey(1), DispatchContext::confirmed()).await;
        assert!(outcome.is_success());
        assert_eq!(page.view(Collection::ApiKeys).len(), before - 1);
    }

    #[tokio::test]
    async fn test_unknown_record_fails() {
        let page = page(Domain::Backup, Arc::new(MemoryStore::new())).await;
        let outcome = page
            .dispatch(Action::DeleteBackup(999), DispatchContext::confirmed())
            .await;
        assert_eq!(outcome, Outcome::Failed("Backup #999 not found".to_string()));
        assert_eq!(page.notifier().history_at(Level::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_action_from_other_page_rejected() {
        let page = page(Domain::Inventory, Arc::new(MemoryStore::new())).await;
        let outcome = page.dispatch(Action::StartBackup, DispatchContext::new()).await;
        assert!(matches!(outcome, Outcome::Rejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_completes_and_appends_entry() {
        let page = page(Domain::Backup, Arc::new(MemoryStore::new())).await;
        let before = page.view(Collection::Backups).len();

        let outcome = page.dispatch(Action::StartBackup, DispatchContext::new()).await;

        assert_eq!(
            outcome,
            Outcome::Succeeded("Backup completed successfully".to_string())
        );
        assert_eq!(page.view(Collection::Backups).len(), before + 1);
        assert_eq!(page.tracker().state(), crate::progress::ActionState::Completed);
        assert_eq!(page.notifier().history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_cancel() {
        let page = page(Domain::Backup, Arc::new(MemoryStore::new())).await;
        let before = page.view(Collection::Backups).len();
        let tracker = page.tracker().clone();

        let canceller = async {
            while tracker.percent() < 30 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert!(tracker.cancel());
        };
        let (outcome, _) = tokio::join!(
            page.dispatch(Action::StartBackup, DispatchContext::new()),
            canceller
        );

        assert_eq!(outcome, Outcome::Cancelled("Backup cancelled".to_string()));
        assert_eq!(tracker.state(), crate::progress::ActionState::Cancelled);
        assert_eq!(page.notifier().history_at(Level::Info).len(), 1);
        assert_eq!(page.notifier().history().len(), 1);
        assert_eq!(page.view(Collection::Backups).len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_failure() {
        let page = SettingsPage::new(
            Domain::Maintenance,
            Arc::new(MemoryStore::new()),
            Arc::new(FixtureSource::sample()),
            Notifier::new(),
        )
        .with_progress(ProgressSettings {
            fail_at: Some(30),
            ..fast_progress()
        });
        page.load().await;

        let outcome = page
            .dispatch(
                Action::RunMaintenance(MaintenanceTask::ClearCache),
                DispatchContext::new(),
            )
            .await;

        assert_eq!(
            outcome,
            Outcome::Failed("Maintenance task 'clear-cache' failed: Operation failed at 30%".into())
        );
        assert_eq!(page.notifier().history_at(Level::Error).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_action_refused_while_in_flight() {
        let remote = Arc::new(StubRemote::slow(Duration::from_secs(2)));
        let page = page(Domain::Notifications, Arc::new(MemoryStore::new()))
            .await
            .with_remote(remote.clone());

        let (first, second) = tokio::join!(
            page.dispatch(Action::SubmitSettings, DispatchContext::new()),
            page.dispatch(Action::SubmitSettings, DispatchContext::new())
        );

        assert!(first.is_success());
        assert_eq!(second, Outcome::Busy);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert!(page.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_filter_narrows_view() {
        let page = page(Domain::Api, Arc::new(MemoryStore::new())).await;
        let all = page.view(Collection::ApiLogs).len();
        let filter = RecordFilter {
            method: Some("POST".into()),
            ..Default::default()
        };

        let outcome = page
            .dispatch(Action::Filter(Collection::ApiLogs, filter), DispatchContext::new())
            .await;

        assert!(outcome.is_success());
        let view = page.view(Collection::ApiLogs);
        assert!(view.len() < all);
        assert!(view.rows().iter().all(|r| r.cells[0] == "POST"));
    }

    #[tokio::test]
    async fn test_autosave_skips_clean_page() {
        let store = Arc::new(MemoryStore::new());
        let page = page(Domain::Notifications, store.clone()).await;

        assert!(!page.autosave().await.unwrap());
        assert!(store.get_raw("notificationSettings").is_none());

        page.set_field("smtpHost", "mail.example.com");
        assert!(page.autosave().await.unwrap());
        assert!(!page.has_unsaved_changes());
        assert!(!page.autosave().await.unwrap());
        assert_eq!(
            store
                .load(Domain::Notifications)
                .await
                .get_text("smtpHost")
                .as_deref(),
            Some("mail.example.com")
        );
    }

    #[tokio::test]
    async fn test_reset_marks_dirty() {
        let page = page(Domain::Inventory, Arc::new(MemoryStore::new())).await;
        page.set_field("lowStockThreshold", "3");
        page.dispatch(Action::SaveSettings, DispatchContext::new()).await;

        page.dispatch(Action::ResetSettings, DispatchContext::new()).await;

        assert_eq!(page.field("lowStockThreshold").as_deref(), Some("10"));
        assert!(page.has_unsaved_changes());
        assert_eq!(page.saved().get_text("lowStockThreshold").as_deref(), Some("3"));
    }

    /// Store whose writes take a while, so edits can land mid-write
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl SettingsStore for SlowStore {
        async fn load(&self, domain: Domain) -> SettingsBlob {
            self.inner.load(domain).await
        }

        async fn save(&self, domain: Domain, blob: &SettingsBlob) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(domain, blob).await
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_autosave_stays_unsaved() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(100),
        });
        let page = SettingsPage::new(
            Domain::Notifications,
            store.clone(),
            Arc::new(FixtureSource::sample()),
            Notifier::new(),
        );
        page.load().await;
        page.set_field("smtpHost", "first.example.com");

        let edit = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            page.set_field("smtpHost", "second.example.com");
        };
        let (written, _) = tokio::join!(page.autosave(), edit);

        assert!(written.unwrap());
        assert!(page.has_unsaved_changes());
        assert_eq!(
            store.load(Domain::Notifications).await.get_text("smtpHost").as_deref(),
            Some("first.example.com")
        );

        assert!(page.autosave().await.unwrap());
        assert!(!page.has_unsaved_changes());
        assert_eq!(
            store.load(Domain::Notifications).await.get_text("smtpHost").as_deref(),
            Some("second.example.com")
        );
    }

    #[tokio::test]
    async fn test_server_without_settings_keeps_local_ones() {
        let store = Arc::new(MemoryStore::new());
        let mut saved = SettingsBlob::new();
        saved.insert("smtpHost", "mail.example.com");
        store.save(Domain::Notifications, &saved).await.unwrap();

        let remote = StubRemote::ok().reply(
            "settings.load",
            json!({"success": true, "settings": {}, "updated_at": null}),
        );
        let page = SettingsPage::new(
            Domain::Notifications,
            store.clone(),
            Arc::new(FixtureSource::sample()),
            Notifier::new(),
        )
        .with_remote(Arc::new(remote));
        page.load().await;

        assert_eq!(page.field("smtpHost").as_deref(), Some("mail.example.com"));
        assert_eq!(store.load(Domain::Notifications).await, saved);
        assert!(!page.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_server_settings_replace_local_ones() {
        let store = Arc::new(MemoryStore::new());
        let mut saved = SettingsBlob::new();
        saved.insert("smtpHost", "mail.example.com");
        store.save(Domain::Notifications, &saved).await.unwrap();

        let remote = StubRemote::ok().reply(
            "settings.load",
            json!({
                "success": true,
                "settings": {"smtpHost": "relay.example.com"},
                "updated_at": "2026-01-05T10:00:00Z"
            }),
        );
        let page = SettingsPage::new(
            Domain::Notifications,
            store.clone(),
            Arc::new(FixtureSource::sample()),
            Notifier::new(),
        )
        .with_remote(Arc::new(remote));
        page.load().await;

        assert_eq!(page.field("smtpHost").as_deref(), Some("relay.example.com"));
        assert_eq!(
            store.load(Domain::Notifications).await.get_text("smtpHost").as_deref(),
            Some("relay.example.com")
        );
    }

    fn fill_template(page: &SettingsPage, name: &str) {
        page.set_field("templateName", name);
        page.set_field("templateSubject", "Stock running low");
        page.set_field("templateBody", "{{product}} has {{quantity}} left");
    }

    #[tokio::test]
    async fn test_local_templates() {
        let page = page(Domain::Notifications, Arc::new(MemoryStore::new())).await;

        let outcome = page.dispatch(Action::CreateTemplate, DispatchContext::new()).await;
        assert_eq!(
            outcome,
            Outcome::Rejected("Template Name is required".to_string())
        );

        fill_template(&page, "Low stock");
        assert!(page
            .dispatch(Action::CreateTemplate, DispatchContext::new())
            .await
            .is_success());
        assert!(page
            .dispatch(Action::CreateTemplate, DispatchContext::new())
            .await
            .is_success());
        let templates = page.templates();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].event, "low-stock");
        let id = templates[0].id;

        let outcome = page.dispatch(Action::DeleteTemplate(id), DispatchContext::new()).await;
        assert_eq!(outcome, Outcome::Declined);
        assert_eq!(page.templates().len(), 1);

        let outcome = page
            .dispatch(Action::DeleteTemplate(id), DispatchContext::confirmed())
            .await;
        assert!(outcome.is_success());
        assert!(page.templates().is_empty());

        let outcome = page
            .dispatch(Action::DeleteTemplate(id), DispatchContext::confirmed())
            .await;
        assert_eq!(outcome, Outcome::Failed(format!("Template #{} not found", id)));
    }

    #[tokio::test]
    async fn test_local_channel_checks_target() {
        let page = page(Domain::Notifications, Arc::new(MemoryStore::new())).await;
        page.set_field("channelName", "On-call SMS");
        page.set_field("channelType", "sms");
        page.set_field("channelTarget", "call me");

        let outcome = page.dispatch(Action::CreateChannel, DispatchContext::new()).await;
        assert!(matches!(outcome, Outcome::Rejected(_)));
        assert!(page.channels().is_empty());

        page.set_field("channelTarget", "+15551234567");
        let outcome = page.dispatch(Action::CreateChannel, DispatchContext::new()).await;
        assert!(outcome.is_success());
        let channels = page.channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel_type, crate::delivery::ChannelType::Sms);
        assert!(channels[0].enabled);

        assert!(Action::DeleteChannel(channels[0].id).is_destructive());
    }

    #[tokio::test]
    async fn test_remote_template_lifecycle() {
        let remote = Arc::new(
            StubRemote::ok()
                .reply(
                    "notifications.templates.list",
                    json!({"success": true, "templates": []}),
                )
                .reply(
                    "notifications.templates.create",
                    json!({
                        "success": true,
                        "template": {
                            "id": 42,
                            "name": "Low stock",
                            "event": "low-stock",
                            "subject": "Stock running low",
                            "body": "{{product}} has {{quantity}} left",
                            "created_at": "2026-01-05T10:00:00Z"
                        }
                    }),
                ),
        );
        let page = page(Domain::Notifications, Arc::new(MemoryStore::new()))
            .await
            .with_remote(remote.clone());
        fill_template(&page, "Low stock");

        let outcome = page.dispatch(Action::CreateTemplate, DispatchContext::new()).await;
        assert!(outcome.is_success());
        assert_eq!(page.templates()[0].id, 42);

        let outcome = page
            .dispatch(Action::DeleteTemplate(42), DispatchContext::confirmed())
            .await;
        assert!(outcome.is_success());
        assert!(page.templates().is_empty());
        assert_eq!(
            remote.sent(),
            vec!["notifications.templates.create", "notifications.templates.delete"]
        );
    }

    #[tokio::test]
    async fn test_load_fetches_delivery_lists() {
        let remote = StubRemote::ok()
            .reply(
                "notifications.templates.list",
                json!({"success": true, "templates": []}),
            )
            .reply(
                "notifications.channels.list",
                json!({"success": true, "channels": [{
                    "id": 3,
                    "name": "Ops email",
                    "channel_type": "email",
                    "target": "ops@example.com",
                    "enabled": true,
                    "created_at": "2026-01-05T10:00:00Z"
                }]}),
            );
        let page = page(Domain::Notifications, Arc::new(MemoryStore::new()))
            .await
            .with_remote(Arc::new(remote));
        page.load().await;

        assert!(page.templates().is_empty());
        assert_eq!(page.channels().len(), 1);
        assert_eq!(page.channels()[0].target, "ops@example.com");
    }

    #[tokio::test]
    async fn test_remote_key_generation_uses_server_token() {
        let remote = Arc::new(StubRemote::ok().reply(
            "records.api-keys.create",
            json!({"success": true, "token": "ik_live_fromserver0123456789", "message": "API key 'Scanner' created"}),
        ));
        let page = page(Domain::Api, Arc::new(MemoryStore::new()))
            .await
            .with_remote(remote.clone());
        let before = page.view(Collection::ApiKeys).len();
        page.set_field("keyName", "Scanner");

        let outcome = page.dispatch(Action::GenerateApiKey, DispatchContext::new()).await;

        assert_eq!(outcome, Outcome::Succeeded("API key 'Scanner' created".to_string()));
        assert_eq!(
            page.last_generated_token().as_deref(),
            Some("ik_live_fromserver0123456789")
        );
        assert_eq!(remote.sent(), vec!["records.api-keys.create"]);
        // Nothing staged locally; the list comes from the record source
        assert_eq!(page.view(Collection::ApiKeys).len(), before);
    }

    #[tokio::test]
    async fn test_remote_key_generation_without_token_fails() {
        let remote = Arc::new(StubRemote::ok());
        let page = page(Domain::Api, Arc::new(MemoryStore::new()))
            .await
            .with_remote(remote);
        page.set_field("keyName", "Scanner");

        let outcome = page.dispatch(Action::GenerateApiKey, DispatchContext::new()).await;

        assert!(matches!(outcome, Outcome::Failed(_)));
        assert!(page.last_generated_token().is_none());
    }

    #[test]
    fn test_maintenance_task_parse() {
        assert_eq!(
            "clear_cache".parse::<MaintenanceTask>().unwrap(),
            MaintenanceTask::ClearCache
        );
        assert!("defrag".parse::<MaintenanceTask>().is_err());
    }
}
