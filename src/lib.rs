pub mod application;
pub mod domain;
pub mod infrastructure;
mod shell;

use application::bootstrap::bootstrap_workspace;
use application::commands::AppState;
use infrastructure::error::InfraError;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "studybuddy.log";

/// Bootstraps the workspace (`STUDYBUDDY_HOME` or the current directory) and
/// serves line commands from stdin until EOF or `quit`.
pub async fn run() -> Result<(), InfraError> {
    let workspace_root = match std::env::var_os("STUDYBUDDY_HOME") {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };

    let bootstrap = bootstrap_workspace(&workspace_root)?;
    let _log_guard = init_tracing(&bootstrap.logs_dir)?;
    info!(workspace_root = %workspace_root.display(), "starting studybuddy shell");

    let state = AppState::new(workspace_root)?;
    let result = shell::run_shell(&state, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;

    let snapshot = state.timer().snapshot()?;
    if snapshot.task.is_some() {
        info!("ending bound session before exit");
        state.timer().reset()?;
    }
    state.flush_writes().await?;
    result
}

pub fn init_tracing(logs_dir: &Path) -> Result<WorkerGuard, InfraError> {
    let filter =
        EnvFilter::try_from_env("STUDYBUDDY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let appender = tracing_appender::rolling::never(logs_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|error| {
            InfraError::State(format!("failed to initialize tracing subscriber: {error}"))
        })?;

    Ok(guard)
}
