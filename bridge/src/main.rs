//! dida-bridge - mirrors Joplin note checklists as Dida365 tasks.
//!
//! # Commands
//!
//! - `dida-bridge run`: Start the sync daemon
//! - `dida-bridge sweep`: Reconcile every checklist note once
//! - `dida-bridge sync <NOTE_ID>`: Reconcile a single note
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio::task::JoinError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use dida_bridge::config::{Config, Credentials};
use dida_bridge::{
    DidaClient, JoplinClient, Reconciler, RemoteFeed, ScanScheduler, StatusProjector, TaskCache,
};

/// dida-bridge - mirrors Joplin note checklists as Dida365 tasks.
#[derive(Parser, Debug)]
#[command(name = "dida-bridge")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    DIDA_BRIDGE_COOKIE          Dida365 session cookie (nothing runs without it)
    DIDA_BRIDGE_JOPLIN_TOKEN    Joplin Data API token
    DIDA_BRIDGE_JOPLIN_URL      Joplin Data API URL (default: http://localhost:41184)
    DIDA_BRIDGE_API_URL         Dida365 API URL (default: https://api.dida365.com)
    DIDA_BRIDGE_DEBOUNCE_MS     Edit quiescence window (default: 2500)

EXAMPLES:
    # Start the daemon and reconcile everything once at startup
    dida-bridge run --sweep

    # Reconcile one note
    dida-bridge sync 0f3c9a1e5b2d4c7f8a6e1d2c3b4a5f60
")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the sync daemon.
    ///
    /// Polls Joplin for edited notes, pushes them to Dida365 after the
    /// debounce window, and projects remote completions back into notes.
    Run {
        /// Reconcile every checklist note once at startup.
        #[arg(long)]
        sweep: bool,
    },

    /// Reconcile every checklist note once and exit.
    Sweep,

    /// Reconcile a single note and exit.
    Sync {
        /// Joplin note id.
        note_id: String,
    },
}

/// Collaborators shared by every command.
struct Engine {
    joplin: Arc<JoplinClient>,
    dida: Arc<DidaClient>,
    cache: TaskCache,
    reconciler: Reconciler,
    projector: StatusProjector,
}

impl Engine {
    fn build(config: &Config, credentials: &Credentials) -> Result<Self> {
        let joplin = Arc::new(
            JoplinClient::new(config.joplin_url.as_str(), credentials.joplin_token.as_str())
                .context("Failed to create Joplin client")?,
        );
        let dida = Arc::new(
            DidaClient::new(config.api_url.as_str(), &credentials.cookie)
                .context("Failed to create Dida365 client")?,
        );
        let cache = TaskCache::new();
        let reconciler =
            Reconciler::new(joplin.clone(), dida.clone(), cache.clone(), &config.engine);
        let projector = StatusProjector::new(joplin.clone(), cache.clone());

        Ok(Self {
            joplin,
            dida,
            cache,
            reconciler,
            projector,
        })
    }

    fn feed(&self) -> RemoteFeed {
        RemoteFeed::new(self.dida.clone(), self.cache.clone(), self.projector.clone())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = Config::from_env().context("Failed to load configuration")?;
    let Some(credentials) = config.credentials.clone() else {
        info!("DIDA_BRIDGE_COOKIE is not set, sync engine disabled");
        return Ok(());
    };

    info!(
        api_url = %config.api_url,
        joplin_url = %config.joplin_url,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let engine = Engine::build(&config, &credentials)?;
        match cli.command {
            Command::Run { sweep } => run_daemon(&config, engine, sweep).await,
            Command::Sweep => run_sweep(&config, engine).await,
            Command::Sync { note_id } => run_sync(engine, &note_id).await,
        }
    })
}

/// Runs the sync daemon until a shutdown signal arrives.
async fn run_daemon(config: &Config, engine: Engine, sweep: bool) -> Result<()> {
    info!("Starting dida-bridge");

    let scheduler = Arc::new(ScanScheduler::new(engine.reconciler.clone(), &config.engine));

    let sweep_task = sweep.then(|| {
        let scheduler = scheduler.clone();
        let feed = engine.feed();
        tokio::spawn(async move {
            match scheduler.refresh_and_sweep(&feed).await {
                Ok(report) => debug!(notes = report.notes, "Startup sweep done"),
                Err(e) => warn!(error = %e, "Startup sweep did not run to completion"),
            }
        })
    });

    // The first tick polls right away.
    let feed_task = tokio::spawn(engine.feed().run(config.poll_interval));

    let mut ticker = tokio::time::interval(config.poll_interval);
    let mut cursor = engine
        .joplin
        .poll_changes(None)
        .await
        .context("Failed to read the Joplin change log")?
        .cursor;

    info!("Bridge running. Press Ctrl+C to stop.");

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            _ = ticker.tick() => {
                cursor = forward_changes(&engine.joplin, &scheduler, cursor).await;
            }
        }
    }

    info!("Shutting down...");

    feed_task.abort();
    if let Some(task) = sweep_task {
        task.abort();
        // The aborted sweep releases its scheduler handle once it has stopped.
        if let Some(e) = abnormal_exit(task.await) {
            warn!(error = %e, "Startup sweep ended abnormally");
        }
    }
    match Arc::try_unwrap(scheduler) {
        Ok(scheduler) => scheduler.shutdown().await,
        Err(_) => warn!("Scheduler still in use, pending edits dropped"),
    }

    info!("Bridge stopped");
    Ok(())
}

/// Returns the join error of an aborted task, unless the abort itself is
/// what stopped it.
fn abnormal_exit(result: std::result::Result<(), JoinError>) -> Option<JoinError> {
    result.err().filter(|e| !e.is_cancelled())
}

/// Reads the change log from `cursor` and signals every changed note.
/// Returns the cursor to continue from.
async fn forward_changes(
    joplin: &JoplinClient,
    scheduler: &ScanScheduler,
    mut cursor: String,
) -> String {
    loop {
        let batch = match joplin.poll_changes(Some(&cursor)).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Failed to poll Joplin change log");
                return cursor;
            }
        };

        for note_id in &batch.note_ids {
            debug!(note_id = %note_id, "Note changed");
            if let Err(e) = scheduler.note_changed(note_id).await {
                warn!(note_id = %note_id, error = %e, "Failed to schedule sync");
            }
        }

        cursor = batch.cursor;
        if !batch.has_more {
            return cursor;
        }
    }
}

/// Runs a one-shot bulk reconciliation.
async fn run_sweep(config: &Config, engine: Engine) -> Result<()> {
    let feed = engine.feed();
    let scheduler = ScanScheduler::new(engine.reconciler, &config.engine);
    let report = scheduler
        .refresh_and_sweep(&feed)
        .await
        .context("Sweep aborted")?;
    scheduler.shutdown().await;

    println!(
        "Swept {} notes: {} created, {} updated, {} in sync, {} skipped, {} ignored, {} failed",
        report.notes,
        report.created,
        report.updated,
        report.in_sync,
        report.skipped,
        report.ignored,
        report.failed
    );
    Ok(())
}

/// Reconciles a single note.
async fn run_sync(engine: Engine, note_id: &str) -> Result<()> {
    engine
        .feed()
        .poll_once()
        .await
        .context("Failed to fetch remote tasks")?;

    let outcome = engine
        .reconciler
        .sync_note_by_id(note_id)
        .await
        .with_context(|| format!("Failed to sync note {note_id}"))?;

    println!("{note_id}: {outcome:?}");
    Ok(())
}

/// Initializes the tracing subscriber.
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_task_is_not_reported() {
        let task = tokio::spawn(std::future::pending::<()>());
        task.abort();
        assert!(abnormal_exit(task.await).is_none());
    }

    #[tokio::test]
    async fn finished_task_is_not_reported() {
        let task = tokio::spawn(async {});
        assert!(abnormal_exit(task.await).is_none());
    }

    #[tokio::test]
    async fn panicked_task_is_reported() {
        let task = tokio::spawn(async {
            panic!("sweep failed");
        });
        let err = abnormal_exit(task.await).expect("panic should be reported");
        assert!(err.is_panic());
    }
}
