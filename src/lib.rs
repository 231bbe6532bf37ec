pub mod commands;
pub mod db;
pub mod errors;
pub mod events;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

use std::path::PathBuf;

pub use errors::{LauncherError, Result};
pub use events::{EventBus, LauncherEvent};

use db::Database;
use services::{DownloadManager, ProcessMonitor};

/// Startup options supplied by the embedding shell. Unset fields fall back to
/// platform defaults (with `LAUNCHER_*` environment overrides).
#[derive(Default)]
pub struct LauncherConfig {
    pub data_dir: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    /// Rolling file logs; shells embedding their own subscriber turn this off.
    pub file_logging: bool,
}

/// Everything the command layer needs, wired together once at startup.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub events: EventBus,
    pub downloads: DownloadManager,
    pub processes: ProcessMonitor,
}

/// Builds the application state: opens (and migrates) the database, creates
/// the install root and starts the event bus.
pub fn init(config: LauncherConfig) -> Result<AppState> {
    let data_dir = config
        .data_dir
        .unwrap_or_else(utils::paths::resolve_data_dir);

    if config.file_logging {
        let log_dir = config.log_dir.unwrap_or_else(utils::paths::resolve_log_dir);
        logging::init(&log_dir)?;
    }

    let db = db::init(&data_dir)?;
    let install_dir = config
        .install_dir
        .unwrap_or_else(utils::paths::resolve_games_dir);
    std::fs::create_dir_all(&install_dir)?;

    let events = EventBus::new();
    let downloads = DownloadManager::new(db.clone(), events.clone(), install_dir)?;
    let processes = ProcessMonitor::new(db.clone(), events.clone());

    tracing::info!("launcher core initialised, data dir {}", data_dir.display());
    Ok(AppState {
        db,
        events,
        downloads,
        processes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_creates_database_and_install_root() {
        let dir = tempfile::tempdir().unwrap();
        let install_dir = dir.path().join("Games");

        let state = init(LauncherConfig {
            data_dir: Some(dir.path().to_path_buf()),
            install_dir: Some(install_dir.clone()),
            log_dir: None,
            file_logging: false,
        })
        .unwrap();

        assert!(install_dir.is_dir());
        assert!(dir.path().join("launcher.db").exists());
        assert_eq!(state.downloads.install_dir(), install_dir);
        assert!(state.processes.list_running().is_empty());
    }
}
