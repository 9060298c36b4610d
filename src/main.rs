//! draftsync - drive the persistence engine from the command line.
//!
//! Loads a draft, reads change events as JSON lines from stdin, tracks each
//! one (debounced saves run while input arrives), and force-saves on EOF.
//!
//! ```text
//! echo '{"type":"content","sectionId":"hero","elementKey":"headline","oldValue":"","newValue":"Hi"}' \
//!     | draftsync draft-123 ./draftsync-data
//! ```
//!
//! Configuration is read from `<config-dir>/draftsync.yaml` with
//! `DRAFTSYNC__*` environment overrides.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use draftsync::{
    APP_NAME, AppConfig, ChangeEventInput, ConfigManager, DraftDocument, HttpDraftStore,
    InMemoryDraftStore, PersistenceManager, RemoteStore, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "draftsync", version, about = "Sync a draft with the remote draft API")]
struct Cli {
    /// Id of the draft to load and save
    draft_id: String,

    /// Directory holding draftsync.yaml
    #[arg(default_value = "draftsync-data")]
    config_dir: Utf8PathBuf,

    /// Use an in-process store instead of the HTTP API
    #[arg(long)]
    offline: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut config = config_manager.load()?;
    config.logging.debug |= cli.debug;

    let _log_guard = draftsync::logging::setup_logging(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("draftsync-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(run(cli, config));

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let store: Arc<dyn RemoteStore> = if cli.offline {
        tracing::info!("Offline mode: using in-memory store");
        Arc::new(InMemoryDraftStore::new())
    } else {
        Arc::new(HttpDraftStore::new(&config.remote).context("Failed to create HTTP client")?)
    };

    let engine = PersistenceManager::new(config.persistence, store)?;
    engine.start()?;

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!("State change: {:?}", event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("State listener lagged, skipped {} event(s)", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let loaded = engine.load_from_server(&cli.draft_id, true).await;
    if !loaded.success {
        tracing::warn!(
            "Could not load draft {} ({}); starting from an empty draft",
            cli.draft_id,
            loaded.error.as_deref().unwrap_or("unknown error")
        );
        engine.set_document(DraftDocument::new(&cli.draft_id));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ChangeEventInput>(&line) {
            Ok(input) => {
                engine.track_change(input);
            }
            Err(e) => tracing::warn!("Skipping line {}: not a change event ({})", line_no, e),
        }
    }

    let saved = engine.force_save(Some("Session end")).await;

    match &saved {
        Ok(result) if result.conflict_detected => {
            for conflict in engine.get_active_conflicts() {
                tracing::warn!(
                    "Unresolved conflict {}: {} field(s) differ from the server copy",
                    conflict.id,
                    conflict.conflicted_fields.len()
                );
            }
        }
        Ok(result) => tracing::info!("Final save done (version {:?})", result.version),
        Err(e) => tracing::error!("Final save failed: {}", e),
    }

    let status = engine.watch_status().borrow().clone();
    println!("{}", serde_json::to_string_pretty(&status)?);

    engine.log_metrics();
    engine.dispose();

    saved.map(|_| ()).context("Final save failed")
}
