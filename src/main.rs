//! Binary entry point: bring up logging and the SQLite store, hand the store
//! to the dispatcher, drive the Ratatui event loop, and close the database on
//! the way out.
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use library_manager::{default_db_path, default_log_path, run_app, App, Dispatcher, Store};

/// Overrides the database location, mostly for trying things out against a
/// scratch file.
const DB_PATH_ENV: &str = "LIBRARY_DB_PATH";

fn main() -> Result<()> {
    init_tracing(&default_log_path()?)?;

    let db_path = match std::env::var_os(DB_PATH_ENV) {
        Some(path) => PathBuf::from(path),
        None => default_db_path()?,
    };
    let store = Store::open(&db_path)
        .with_context(|| format!("failed to initialize database at {}", db_path.display()))?;

    let mut app = App::new(Dispatcher::new(store))?;
    let result = run_app(&mut app);

    let closed = app
        .into_dispatcher()
        .close()
        .context("failed to close database");
    exit_status(result, closed)
}

/// Combine the UI outcome with the close outcome. A UI failure wins; a close
/// failure behind it is only logged.
fn exit_status(result: Result<()>, closed: Result<()>) -> Result<()> {
    match (result, closed) {
        (Err(run_err), Err(close_err)) => {
            error!(error = %close_err, "failed to close database after UI error");
            Err(run_err)
        }
        (result, closed) => {
            closed?;
            info!("library manager exited");
            result
        }
    }
}

/// Log to a file: the terminal belongs to the UI while the app runs.
///
/// `RUST_LOG` overrides the default filter.
fn init_tracing(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,library_manager=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
