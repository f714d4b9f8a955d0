//! StockCtl Server
//!
//! Settings backend for the inventory admin console, built on Axum.

use axum::Router;
use chrono::Utc;
use clap::Parser;
use stockctl_core::schema::BACKUP_TYPES;
use stockctl_core::{Domain, SettingsStore};
use stockctl_database::{queries, Database};
use stockctl_scheduler::{Scheduler, Trigger};
use tracing::{info, instrument, warn};

mod config;
mod jobs;
mod routes;
mod state;

use config::Config;
use jobs::BACKUP_PARTS;
use state::AppState;

/// StockCtl Server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to bind to (overrides the configured one)
    #[arg(short, long)]
    addr: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,
}

/// Schedule automatic backups from the stored backup settings
///
/// Returns whether a task was added. Settings changed later take effect on
/// the next start.
async fn schedule_backups(state: &AppState, scheduler: &Scheduler) -> anyhow::Result<bool> {
    let settings = state.settings_store().load(Domain::Backup).await;
    if !settings.get_bool("autoBackup").unwrap_or(false) {
        return Ok(false);
    }
    let Some(expr) = settings.get_text("backupSchedule") else {
        return Ok(false);
    };
    let trigger = match Trigger::cron(&expr) {
        Ok(trigger) => trigger,
        Err(e) => {
            warn!(schedule = %expr, error = %e, "Ignoring invalid backup schedule");
            return Ok(false);
        }
    };

    let mut parts: Vec<String> = BACKUP_TYPES
        .iter()
        .zip(BACKUP_PARTS)
        .filter(|(field, _)| settings.get_bool(field).unwrap_or(false))
        .map(|(_, part)| part.to_string())
        .collect();
    if parts.is_empty() {
        parts = BACKUP_PARTS.iter().map(|p| p.to_string()).collect();
    }

    let task_state = state.clone();
    scheduler
        .add_task("backup", trigger, move || {
            let state = task_state.clone();
            let parts = parts.clone();
            async move {
                let job_id = state.jobs.start_backup(state.pool.clone(), parts).await;
                info!(job_id = %job_id, "Scheduled backup started");
                Ok(())
            }
        })
        .await?;
    info!(schedule = %expr, "Automatic backups scheduled");
    Ok(true)
}

#[tokio::main]
#[instrument]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server=debug".into()),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse CLI args
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;
    let addr = args.addr.unwrap_or_else(|| config.bind_addr.clone());
    info!(addr = %addr, "Starting StockCtl server");

    // Open database
    let database = Database::new(&config.database_url).await?;
    database.migrate().await?;
    if config.seed_fixtures {
        let seeded = queries::seed_fixtures(database.pool(), Utc::now()).await?;
        if seeded > 0 {
            info!(records = seeded, "Loaded sample records");
        }
    }
    if config.csrf_token.is_none() {
        warn!("CSRF_TOKEN not configured - accepting all mutating requests");
    }

    // Initialize application state
    let state = AppState::new(config, &database);

    // Start scheduler
    let scheduler = Scheduler::new();
    schedule_backups(&state, &scheduler).await?;
    info!("Starting scheduler");
    scheduler.start().await?;

    // Build Axum router
    let app = Router::new()
        // API routes
        .nest("/api", routes::api_routes(state.clone()))
        // Add middleware
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }),
        )
        .layer(tower_http::compression::CompressionLayer::new())
        .layer(tower_http::cors::CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    scheduler.shutdown().await;
    database.close().await?;
    Ok(())
}
