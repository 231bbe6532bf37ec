use std::path::PathBuf;

use crate::db::queries::InstalledGameQueries;
use crate::errors::{LauncherError, Result};
use crate::models::{GameRef, InstalledGame, PlaytimeStat, RunningGame};
use crate::services::LaunchOutcome;
use crate::AppState;

pub async fn get_installed_games(state: &AppState) -> Result<Vec<InstalledGame>> {
    state.downloads.installed_games()
}

pub async fn is_game_installed(state: &AppState, game_id: String) -> Result<bool> {
    state.downloads.is_game_installed(&game_id)
}

/// Reconciles the library with the install root: repairs stale executable
/// paths, drops entries whose folders vanished and adopts catalog games found
/// on disk.
pub async fn scan_install_root(
    state: &AppState,
    catalog: Vec<GameRef>,
) -> Result<Vec<InstalledGame>> {
    state.downloads.scan_install_root(&catalog)
}

pub async fn select_game_executable(
    state: &AppState,
    game_id: String,
    exe_path: PathBuf,
) -> Result<()> {
    state.downloads.select_executable(&game_id, &exe_path)
}

pub async fn launch_game(state: &AppState, game_id: String) -> Result<LaunchOutcome> {
    let game = state
        .db
        .get_installed_game(&game_id)?
        .ok_or_else(|| LauncherError::NotFound(format!("installed game {game_id}")))?;
    state.processes.launch(&game)
}

pub async fn uninstall_game(state: &AppState, game_id: String) -> Result<()> {
    state.downloads.uninstall_game(&game_id)
}

/// Validates the game's install folder and hands the path back for the shell
/// to open with the OS file browser. The core never shells out itself.
pub async fn open_game_folder(state: &AppState, game_id: String) -> Result<PathBuf> {
    let game = state
        .db
        .get_installed_game(&game_id)?
        .ok_or_else(|| LauncherError::NotFound(format!("installed game {game_id}")))?;

    let path = PathBuf::from(&game.install_path);
    if !path.is_dir() {
        return Err(LauncherError::NotFound(format!(
            "install folder {}",
            game.install_path
        )));
    }
    Ok(path)
}

pub async fn get_running_games(state: &AppState) -> Result<Vec<RunningGame>> {
    Ok(state.processes.list_running())
}

pub async fn is_game_running(state: &AppState, game_id: String) -> Result<bool> {
    Ok(state.processes.is_running(&game_id))
}

pub async fn get_playtime_stats(state: &AppState) -> Result<Vec<PlaytimeStat>> {
    state.processes.playtime_stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{init, LauncherConfig};

    async fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let state = init(LauncherConfig {
            data_dir: Some(dir.path().to_path_buf()),
            install_dir: Some(dir.path().join("Games")),
            log_dir: None,
            file_logging: false,
        })
        .unwrap();
        (dir, state)
    }

    #[tokio::test]
    async fn launching_an_unknown_game_is_not_found() {
        let (_dir, state) = state().await;
        assert!(matches!(
            launch_game(&state, "missing".to_string()).await,
            Err(LauncherError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn open_folder_validates_the_install_path() {
        let (dir, state) = state().await;
        let good_dir = dir.path().join("Games").join("here");
        std::fs::create_dir_all(&good_dir).unwrap();

        for (id, path) in [("here", &good_dir), ("gone", &dir.path().join("nope"))] {
            state
                .db
                .upsert_installed_game(&InstalledGame {
                    game_id: id.to_string(),
                    game_title: id.to_string(),
                    game_slug: id.to_string(),
                    game_image: None,
                    install_path: path.display().to_string(),
                    exe_path: None,
                    installed_at: 1,
                    size_bytes: 0,
                })
                .unwrap();
        }

        assert_eq!(
            open_game_folder(&state, "here".to_string()).await.unwrap(),
            good_dir
        );
        assert!(matches!(
            open_game_folder(&state, "gone".to_string()).await,
            Err(LauncherError::NotFound(_))
        ));
        assert!(is_game_installed(&state, "here".to_string()).await.unwrap());
        assert!(!is_game_running(&state, "here".to_string()).await.unwrap());
    }
}
