use std::path::{Path, PathBuf};

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

fn env_override(var: &str) -> Option<PathBuf> {
    let value = std::env::var(var).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    ensure_dir(&PathBuf::from(trimmed))
}

pub fn resolve_data_dir() -> PathBuf {
    if let Some(dir) = env_override("LAUNCHER_DATA_DIR") {
        return dir;
    }

    if let Some(base) = dirs::data_dir() {
        let candidate = base.join("launcher-core");
        if let Some(found) = ensure_dir(&candidate) {
            return found;
        }
    }

    PathBuf::from(".")
}

/// Default install root: a `Games` folder under the platform downloads dir,
/// mirroring where users expect launcher payloads to land.
pub fn resolve_games_dir() -> PathBuf {
    if let Some(dir) = env_override("LAUNCHER_GAMES_DIR") {
        return dir;
    }

    if let Some(downloads) = dirs::download_dir() {
        let candidate = downloads.join("Games");
        if let Some(found) = ensure_dir(&candidate) {
            return found;
        }
    }

    let fallback = resolve_data_dir().join("games");
    ensure_dir(&fallback).unwrap_or(fallback)
}

pub fn resolve_log_dir() -> PathBuf {
    if let Some(dir) = env_override("LAUNCHER_LOG_DIR") {
        return dir;
    }

    let candidate = resolve_data_dir().join("logs");
    ensure_dir(&candidate).unwrap_or(candidate)
}
