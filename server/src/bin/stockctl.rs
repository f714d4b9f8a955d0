//! StockCtl CLI - Command-line access to the inventory settings pages
//!
//! Every command drives the same page controller the admin console uses.
//! Settings live in a local JSON store; with `--url` set, server-side
//! actions (channel tests, remote saves, record listings) go to the server.
//! Without a server, record changes (keys, backups, templates, channels) are
//! shown but not kept.

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use stockctl_core::remote::filter_params;
use stockctl_core::render::to_csv;
use stockctl_core::schema::{persisted_fields, BACKUP_TYPES};
use stockctl_core::{
    Action, Channel, Collection, DispatchContext, Domain, FixtureSource, HttpRecordSource,
    HttpRemote, JobPoller, JsonFileStore, MaintenanceTask, Notifier, Outcome, ProgressSource,
    RecordFilter, RecordSource, RemoteClient, Route, SettingValue, SettingsBlob, SettingsPage,
    TableView,
};
use tracing::{debug, error, info};

/// StockCtl CLI - Inventory settings administration tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Server URL; without it every action runs locally
    #[arg(short, long, env = "STOCKCTL_URL")]
    url: Option<String>,

    /// CSRF token sent with mutating requests
    #[arg(short, long, env = "STOCKCTL_TOKEN")]
    token: Option<String>,

    /// Local settings store
    #[arg(
        short,
        long,
        default_value = "stockctl-settings.json",
        env = "STOCKCTL_STORE"
    )]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Settings page commands
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// List panel commands
    Records {
        #[command(subcommand)]
        command: RecordsCommands,
    },

    /// Backup commands
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// API key commands
    Keys {
        #[command(subcommand)]
        command: KeysCommands,
    },

    /// Notification channel commands
    Notify {
        #[command(subcommand)]
        command: NotifyCommands,
    },

    /// Maintenance task commands
    Maintenance {
        #[command(subcommand)]
        command: MaintenanceCommands,
    },

    /// Cron schedule commands
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommands {
    /// Show the effective settings of a page
    Show {
        /// api, backup, inventory, maintenance or notifications
        domain: Domain,
    },

    /// Change settings and save
    Set {
        domain: Domain,

        /// Assignments such as `smtpPort=465`
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Put every setting back at its default and save
    Reset { domain: Domain },
}

/// Record filters, named after the list panel's filter controls
#[derive(Args, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    status: Option<String>,

    #[arg(long)]
    method: Option<String>,

    #[arg(long = "type")]
    kind: Option<String>,

    /// all, today, 7d or 30d
    #[arg(long)]
    date_range: Option<String>,

    #[arg(long)]
    search: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> anyhow::Result<RecordFilter> {
        Ok(RecordFilter {
            status: self.status.clone(),
            method: self.method.clone(),
            kind: self.kind.clone(),
            date_range: match &self.date_range {
                Some(raw) => raw.parse()?,
                None => Default::default(),
            },
            search: self.search.clone(),
        })
    }
}

#[derive(Subcommand, Debug)]
enum RecordsCommands {
    /// Print a list panel
    List {
        /// api-keys, webhooks, backups, api-logs, maintenance-logs or metrics
        collection: Collection,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Export a list panel as CSV
    Export {
        collection: Collection,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Subcommand, Debug)]
enum BackupCommands {
    /// Run a manual backup with progress output; Ctrl-C cancels
    Run {
        #[arg(long)]
        database: bool,

        #[arg(long)]
        files: bool,

        #[arg(long)]
        config: bool,
    },

    /// Restore a backup
    Restore {
        id: i64,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete a backup
    Delete {
        id: i64,

        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommands {
    /// Generate an API key and print its token once
    Generate {
        name: String,

        /// read, read-write or admin
        #[arg(short, long, default_value = "read")]
        permissions: String,
    },

    /// Revoke an API key
    Revoke {
        id: i64,

        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum NotifyCommands {
    /// Check a delivery channel against the server
    Test {
        /// smtp, sms or push
        channel: Channel,
    },

    /// Send a test notification
    Send { recipient: String },

    /// Message templates
    Templates {
        #[command(subcommand)]
        command: TemplateCommands,
    },

    /// Delivery channels
    Channels {
        #[command(subcommand)]
        command: ChannelCommands,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateCommands {
    List,

    /// Create a template, or replace the one with the same name
    Add {
        name: String,

        /// low-stock, order-placed, order-shipped or system-alert
        #[arg(short, long, default_value = "low-stock")]
        event: String,

        #[arg(short, long)]
        subject: String,

        #[arg(short, long)]
        body: String,
    },

    Delete {
        id: i64,

        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ChannelCommands {
    List,

    /// Create a channel, or replace the one with the same name
    Add {
        name: String,

        /// email, sms, push, slack or webhook
        #[arg(short = 'T', long = "type", default_value = "email")]
        kind: String,

        /// Address, phone number, push topic or URL
        target: String,
    },

    Delete {
        id: i64,

        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum MaintenanceCommands {
    /// Run a maintenance task with progress output
    Run {
        /// clear-cache, optimize-database, rebuild-indexes or cleanup-logs
        task: MaintenanceTask,
    },
}

#[derive(Subcommand, Debug)]
enum ScheduleCommands {
    /// Show the next run times of a cron expression
    Preview {
        /// Defaults to the stored backup schedule
        cron: Option<String>,

        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
}

/// Shared handles for every command
struct Context {
    store: Arc<JsonFileStore>,
    remote: Option<Arc<HttpRemote>>,
    records: Arc<dyn RecordSource>,
}

impl Context {
    fn new(cli: &Cli) -> Self {
        let store = Arc::new(JsonFileStore::new(&cli.store));
        let remote = cli.url.as_ref().map(|url| {
            let remote = HttpRemote::new(Client::new(), url.trim_end_matches('/'));
            Arc::new(match &cli.token {
                Some(token) => remote.with_csrf_token(token),
                None => remote,
            })
        });
        let records: Arc<dyn RecordSource> = match &remote {
            Some(remote) => Arc::new(HttpRecordSource::new(remote.clone())),
            None => Arc::new(FixtureSource::sample()),
        };
        Self {
            store,
            remote,
            records,
        }
    }

    fn page(&self, domain: Domain) -> SettingsPage {
        let page = SettingsPage::new(
            domain,
            self.store.clone(),
            self.records.clone(),
            Notifier::new(),
        );
        match &self.remote {
            Some(remote) => page.with_remote(remote.clone()),
            None => page,
        }
    }

    /// A page with its settings loaded
    async fn loaded_page(&self, domain: Domain) -> SettingsPage {
        let page = self.page(domain);
        page.load().await;
        page
    }

    /// Warning for record changes that only live in this process
    fn preview_note(&self) -> Option<&'static str> {
        self.remote
            .is_none()
            .then_some("No server attached (--url); this change is not saved.")
    }

    fn warn_preview(&self) {
        if let Some(note) = self.preview_note() {
            eprintln!("Note: {}", note);
        }
    }

    fn save_action(&self) -> Action {
        if self.remote.is_some() {
            Action::SubmitSettings
        } else {
            Action::SaveSettings
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let ctx = Context::new(&cli);

    let result = match cli.command {
        Commands::Settings { command } => handle_settings(&ctx, command).await,
        Commands::Records { command } => handle_records(&ctx, command).await,
        Commands::Backup { command } => handle_backup(&ctx, command).await,
        Commands::Keys { command } => handle_keys(&ctx, command).await,
        Commands::Notify { command } => handle_notify(&ctx, command).await,
        Commands::Maintenance { command } => handle_maintenance(&ctx, command).await,
        Commands::Schedule { command } => handle_schedule(&ctx, command).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Print an outcome; anything but success or cancellation is an error
fn report(outcome: Outcome) -> anyhow::Result<()> {
    match outcome {
        Outcome::Succeeded(message) | Outcome::Cancelled(message) => {
            println!("{}", message);
            Ok(())
        }
        Outcome::Failed(message) | Outcome::Rejected(message) => anyhow::bail!(message),
        Outcome::Declined => anyhow::bail!("Aborted"),
        Outcome::Busy => anyhow::bail!("Another action is still running"),
    }
}

/// Split `key=value`
fn parse_assignment(raw: &str) -> anyhow::Result<(String, SettingValue)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Missing setting name in '{}'", raw);
    }
    Ok((key.to_string(), SettingValue::parse_loose(value.trim())))
}

/// Ask the action's confirmation question unless `--yes` was given
fn confirm(action: &Action, yes: bool) -> anyhow::Result<DispatchContext> {
    let Some(prompt) = action.confirmation_prompt() else {
        return Ok(DispatchContext::new());
    };
    if yes {
        return Ok(DispatchContext::confirmed());
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    if matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
        Ok(DispatchContext::confirmed())
    } else {
        Ok(DispatchContext::new())
    }
}

fn progress_bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) / 5;
    format!("[{}{}] {:>3}%", "#".repeat(filled), " ".repeat(20 - filled), percent)
}

/// Run a long-running action with a progress line; Ctrl-C cancels it
async fn run_with_progress(
    page: &SettingsPage,
    action: Action,
    ctx: DispatchContext,
    on_cancel: Option<(Arc<HttpRemote>, String)>,
) -> anyhow::Result<()> {
    let mut updates = page.tracker().subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if let Some(pending) = snapshot.pending {
                eprint!("\r{} {}", progress_bar(pending.percent), pending.label);
                io::stderr().flush().ok();
            }
        }
    });

    let dispatch = page.dispatch(action, ctx);
    tokio::pin!(dispatch);
    let outcome = tokio::select! {
        outcome = &mut dispatch => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling");
            page.tracker().cancel();
            if let Some((remote, job_id)) = &on_cancel {
                if let Err(e) = remote
                    .send(&Route::CancelJob(job_id.clone()), &SettingsBlob::new())
                    .await
                {
                    error!(job_id = %job_id, error = %e, "Failed to cancel server job");
                }
            }
            dispatch.await
        }
    };

    printer.abort();
    eprintln!();
    report(outcome)
}

// ============================================================================
// Commands
// ============================================================================

async fn handle_settings(ctx: &Context, command: SettingsCommands) -> anyhow::Result<()> {
    match command {
        SettingsCommands::Show { domain } => {
            let page = ctx.loaded_page(domain).await;
            let blob = page.form().collect(&persisted_fields(domain));
            println!("{}", serde_json::to_string_pretty(&blob)?);
        }
        SettingsCommands::Set {
            domain,
            assignments,
        } => {
            let page = ctx.loaded_page(domain).await;
            for raw in &assignments {
                let (key, value) = parse_assignment(raw)?;
                if !page.set_field(&key, value) {
                    anyhow::bail!("Unknown setting '{}' for {} settings", key, domain);
                }
            }
            report(page.dispatch(ctx.save_action(), DispatchContext::new()).await)?;
        }
        SettingsCommands::Reset { domain } => {
            let page = ctx.loaded_page(domain).await;
            report(page.dispatch(Action::ResetSettings, DispatchContext::new()).await)?;
            report(page.dispatch(ctx.save_action(), DispatchContext::new()).await)?;
        }
    }
    Ok(())
}

async fn handle_records(ctx: &Context, command: RecordsCommands) -> anyhow::Result<()> {
    match command {
        RecordsCommands::List { collection, filter } => {
            let records = ctx
                .records
                .list_records(collection, &filter.to_filter()?)
                .await?;
            let mut view = TableView::new();
            view.render(&records, Utc::now());
            if view.is_empty() {
                println!("No {} match the filters", collection);
            } else {
                println!("{}", view.to_text(collection));
            }
        }
        RecordsCommands::Export {
            collection,
            output,
            filter,
        } => {
            let filter = filter.to_filter()?;
            let bytes = match &ctx.remote {
                Some(remote) => {
                    remote
                        .download(&Route::ExportRecords(collection), &filter_params(&filter))
                        .await?
                }
                None => {
                    let records = ctx.records.list_records(collection, &filter).await?;
                    to_csv(collection, &records, Utc::now())?
                }
            };
            tokio::fs::write(&output, &bytes).await?;
            println!("Exported {} to {}", collection, output.display());
        }
    }
    Ok(())
}

async fn handle_backup(ctx: &Context, command: BackupCommands) -> anyhow::Result<()> {
    match command {
        BackupCommands::Run {
            database,
            files,
            config,
        } => {
            let page = ctx.page(Domain::Backup);
            page.load().await;
            // Flags override the stored backup types
            if database || files || config {
                for (name, on) in BACKUP_TYPES.iter().zip([database, files, config]) {
                    page.set_field(name, on);
                }
            }

            let Some(remote) = ctx.remote.clone() else {
                return run_with_progress(&page, Action::StartBackup, DispatchContext::new(), None)
                    .await;
            };

            // Server-side job: start it, then follow its status
            let mut payload = page.form().collect(&BACKUP_TYPES);
            payload.insert("kind", "backup");
            let response = remote.send(&Route::StartJob, &payload).await?;
            let job_id = response
                .get("job_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("Server did not return a job id"))?
                .to_string();
            debug!(job_id = %job_id, "Server backup job started");

            let poll_remote = remote.clone();
            let poll_job = job_id.clone();
            let page = ctx
                .page(Domain::Backup)
                .with_progress_source(move |_| {
                    Box::new(JobPoller::new(poll_remote.clone(), poll_job.clone()))
                        as Box<dyn ProgressSource>
                });
            page.apply_fields(&payload);
            run_with_progress(
                &page,
                Action::StartBackup,
                DispatchContext::new(),
                Some((remote, job_id)),
            )
            .await?;
        }
        BackupCommands::Restore { id, yes } => {
            let page = ctx.loaded_page(Domain::Backup).await;
            let action = Action::RestoreBackup(id);
            let dispatch_ctx = confirm(&action, yes)?;
            run_with_progress(&page, action, dispatch_ctx, None).await?;
        }
        BackupCommands::Delete { id, yes } => {
            let page = ctx.loaded_page(Domain::Backup).await;
            let action = Action::DeleteBackup(id);
            let dispatch_ctx = confirm(&action, yes)?;
            report(page.dispatch(action, dispatch_ctx).await)?;
            ctx.warn_preview();
        }
    }
    Ok(())
}

async fn handle_keys(ctx: &Context, command: KeysCommands) -> anyhow::Result<()> {
    match command {
        KeysCommands::Generate { name, permissions } => {
            let page = ctx.loaded_page(Domain::Api).await;
            page.set_field("keyName", name.as_str());
            page.set_field("keyPermissions", permissions.as_str());
            report(page.dispatch(Action::GenerateApiKey, DispatchContext::new()).await)?;
            if let Some(token) = page.last_generated_token() {
                println!("Token: {}", token);
                println!("Store it now; it will not be shown again.");
            }
            ctx.warn_preview();
        }
        KeysCommands::Revoke { id, yes } => {
            let page = ctx.loaded_page(Domain::Api).await;
            let action = Action::RevokeApiKey(id);
            let dispatch_ctx = confirm(&action, yes)?;
            report(page.dispatch(action, dispatch_ctx).await)?;
            ctx.warn_preview();
        }
    }
    Ok(())
}

async fn handle_notify(ctx: &Context, command: NotifyCommands) -> anyhow::Result<()> {
    let page = ctx.loaded_page(Domain::Notifications).await;
    match command {
        NotifyCommands::Test { channel } => {
            report(page.dispatch(Action::TestConnection(channel), DispatchContext::new()).await)
        }
        NotifyCommands::Send { recipient } => {
            page.set_field("testRecipient", recipient.as_str());
            report(page.dispatch(Action::SendTestNotification, DispatchContext::new()).await)
        }
        NotifyCommands::Templates { command } => handle_templates(ctx, &page, command).await,
        NotifyCommands::Channels { command } => handle_channels(ctx, &page, command).await,
    }
}

async fn handle_templates(
    ctx: &Context,
    page: &SettingsPage,
    command: TemplateCommands,
) -> anyhow::Result<()> {
    match command {
        TemplateCommands::List => {
            let templates = page.templates();
            if templates.is_empty() {
                println!("No templates");
            }
            for t in templates {
                println!("#{:<4} {:<24} {:<14} {}", t.id, t.name, t.event, t.subject);
            }
            return Ok(());
        }
        TemplateCommands::Add {
            name,
            event,
            subject,
            body,
        } => {
            page.set_field("templateName", name.as_str());
            page.set_field("templateEvent", event.as_str());
            page.set_field("templateSubject", subject.as_str());
            page.set_field("templateBody", body.as_str());
            report(page.dispatch(Action::CreateTemplate, DispatchContext::new()).await)?;
        }
        TemplateCommands::Delete { id, yes } => {
            let action = Action::DeleteTemplate(id);
            let dispatch_ctx = confirm(&action, yes)?;
            report(page.dispatch(action, dispatch_ctx).await)?;
        }
    }
    ctx.warn_preview();
    Ok(())
}

async fn handle_channels(
    ctx: &Context,
    page: &SettingsPage,
    command: ChannelCommands,
) -> anyhow::Result<()> {
    match command {
        ChannelCommands::List => {
            let channels = page.channels();
            if channels.is_empty() {
                println!("No channels");
            }
            for c in channels {
                let state = if c.enabled { "enabled" } else { "disabled" };
                println!(
                    "#{:<4} {:<24} {:<8} {:<9} {}",
                    c.id, c.name, c.channel_type, state, c.target
                );
            }
            return Ok(());
        }
        ChannelCommands::Add { name, kind, target } => {
            page.set_field("channelName", name.as_str());
            page.set_field("channelType", kind.as_str());
            page.set_field("channelTarget", target.as_str());
            report(page.dispatch(Action::CreateChannel, DispatchContext::new()).await)?;
        }
        ChannelCommands::Delete { id, yes } => {
            let action = Action::DeleteChannel(id);
            let dispatch_ctx = confirm(&action, yes)?;
            report(page.dispatch(action, dispatch_ctx).await)?;
        }
    }
    ctx.warn_preview();
    Ok(())
}

async fn handle_maintenance(ctx: &Context, command: MaintenanceCommands) -> anyhow::Result<()> {
    match command {
        MaintenanceCommands::Run { task } => {
            let page = ctx.loaded_page(Domain::Maintenance).await;
            run_with_progress(&page, Action::RunMaintenance(task), DispatchContext::new(), None)
                .await
        }
    }
}

async fn handle_schedule(ctx: &Context, command: ScheduleCommands) -> anyhow::Result<()> {
    match command {
        ScheduleCommands::Preview { cron, count } => {
            let expr = match cron {
                Some(expr) => expr,
                None => ctx
                    .loaded_page(Domain::Backup)
                    .await
                    .field("backupSchedule")
                    .unwrap_or_default(),
            };
            let runs = stockctl_scheduler::next_occurrences(&expr, count, Utc::now())?;
            println!("Next runs of '{}':", expr);
            for run in runs {
                println!("  {}", run.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let (key, value) = parse_assignment("smtpPort = 465").unwrap();
        assert_eq!(key, "smtpPort");
        assert_eq!(value.as_text(), "465");

        let (_, value) = parse_assignment("maintenanceMode=true").unwrap();
        assert!(value.as_bool());

        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=5").is_err());
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), format!("[{}]   0%", " ".repeat(20)));
        assert_eq!(progress_bar(50), format!("[{}{}]  50%", "#".repeat(10), " ".repeat(10)));
        assert_eq!(progress_bar(100), format!("[{}] 100%", "#".repeat(20)));
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from([
            "stockctl",
            "records",
            "list",
            "api-logs",
            "--method",
            "POST",
            "--date-range",
            "7d",
        ])
        .unwrap();
        match cli.command {
            Commands::Records {
                command: RecordsCommands::List { collection, filter },
            } => {
                assert_eq!(collection, Collection::ApiLogs);
                let filter = filter.to_filter().unwrap();
                assert_eq!(filter.method.as_deref(), Some("POST"));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["stockctl", "settings", "show", "payroll"]).is_err());
        assert!(Cli::try_parse_from(["stockctl", "notify", "test", "pigeon"]).is_err());
    }

    #[test]
    fn test_reset_is_not_confirmed() {
        let ctx = confirm(&Action::ResetSettings, false).unwrap();
        assert!(!ctx.confirmed);
        let ctx = confirm(&Action::DeleteBackup(3), true).unwrap();
        assert!(ctx.confirmed);
    }

    #[tokio::test]
    async fn test_local_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "stockctl",
            "--store",
            dir.path().join("settings.json").to_str().unwrap(),
            "settings",
            "show",
            "inventory",
        ])
        .unwrap();
        let ctx = Context::new(&cli);

        handle_settings(
            &ctx,
            SettingsCommands::Set {
                domain: Domain::Inventory,
                assignments: vec!["lowStockThreshold=3".to_string()],
            },
        )
        .await
        .unwrap();

        let page = ctx.loaded_page(Domain::Inventory).await;
        assert_eq!(page.field("lowStockThreshold").as_deref(), Some("3"));

        let err = handle_settings(
            &ctx,
            SettingsCommands::Set {
                domain: Domain::Inventory,
                assignments: vec!["colour=red".to_string()],
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Unknown setting 'colour'"));
    }

    #[test]
    fn test_preview_note_only_without_server() {
        let local = Cli::try_parse_from(["stockctl", "keys", "revoke", "3"]).unwrap();
        assert!(Context::new(&local).preview_note().is_some());

        let remote = Cli::try_parse_from([
            "stockctl",
            "--url",
            "http://localhost:8080",
            "keys",
            "revoke",
            "3",
        ])
        .unwrap();
        assert!(Context::new(&remote).preview_note().is_none());
    }

    #[tokio::test]
    async fn test_local_template_commands() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "stockctl",
            "--store",
            dir.path().join("settings.json").to_str().unwrap(),
            "notify",
            "templates",
            "add",
            "Low stock",
            "--subject",
            "Stock running low",
            "--body",
            "{{product}} has {{quantity}} left",
        ])
        .unwrap();
        let ctx = Context::new(&cli);
        let Commands::Notify { command } = cli.command else {
            panic!("expected a notify command");
        };
        handle_notify(&ctx, command).await.unwrap();

        let err = handle_notify(
            &ctx,
            NotifyCommands::Channels {
                command: ChannelCommands::Add {
                    name: "Pager".to_string(),
                    kind: "sms".to_string(),
                    target: "call me".to_string(),
                },
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not a valid sms target"));
    }
}
