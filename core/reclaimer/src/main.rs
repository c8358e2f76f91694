//! Reclamation-pass entrypoint.
//!
//! Invoked by an external periodic trigger. Loads the record collections from
//! a JSON state snapshot, runs one pass, persists the result, and prints the
//! report as JSON on stdout: `{"releasedCount": n, "releasedIds": [...]}` on
//! success, `{"error": "..."}` on failure. Logs go to stderr so the trigger
//! can parse stdout.

use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use veridoc_reclaimer::snapshot::{self, SnapshotError};
use veridoc_reclaimer::{ReclamationError, ReclamationReport, ReclamationScheduler};
use veridoc_records::{MemoryStore, RecordStore};

#[derive(Parser)]
#[command(
    name = "veridoc-reclaimer",
    about = "Releases overdue claimed documents back to the unclaimed pool"
)]
struct Args {
    /// JSON state snapshot holding the work_items and timeout_policies
    /// collections.
    #[arg(long)]
    state: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Reclamation(#[from] ReclamationError),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();
    let args = Args::parse();

    match run(&args.state).await {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(body) => println!("{body}"),
            Err(err) => {
                error!(error = %err, "failed to serialize reclamation report");
                std::process::exit(1);
            }
        },
        Err(err) => {
            error!(error = %err, "reclamation pass failed");
            println!("{}", serde_json::json!({ "error": err.to_string() }));
            std::process::exit(1);
        }
    }
}

async fn run(state_path: &Path) -> Result<ReclamationReport, RunError> {
    let store = Arc::new(MemoryStore::new());
    for (collection, records) in snapshot::load(state_path)? {
        store.seed(collection, records);
    }

    let scheduler = ReclamationScheduler::new(store.clone() as Arc<dyn RecordStore>);
    let report = scheduler.run_once().await?;

    snapshot::save(state_path, &store.dump())?;
    Ok(report)
}

fn init_logging() {
    let debug_enabled = env::var("VERIDOC_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
