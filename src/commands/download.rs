use crate::errors::Result;
use crate::models::{DownloadHistoryEntry, DownloadView, GameRef};
use crate::services::DownloadRequest;
use crate::AppState;

/// Queues a download for `game` and returns the new download id. Progress and
/// completion arrive as events.
pub async fn start_download(state: &AppState, game: GameRef, url: String) -> Result<String> {
    state.downloads.start_download(DownloadRequest { game, url }).await
}

pub async fn pause_download(state: &AppState, download_id: String) -> Result<()> {
    state.downloads.pause_download(&download_id)
}

pub async fn resume_download(state: &AppState, download_id: String) -> Result<()> {
    state.downloads.resume_download(&download_id).await
}

pub async fn cancel_download(state: &AppState, download_id: String) -> Result<()> {
    state.downloads.cancel_download(&download_id)
}

pub async fn get_downloads(state: &AppState) -> Result<Vec<DownloadView>> {
    state.downloads.list_downloads()
}

pub async fn get_download_history(state: &AppState) -> Result<Vec<DownloadHistoryEntry>> {
    state.downloads.download_history()
}

pub async fn clear_download_history(state: &AppState) -> Result<()> {
    state.downloads.clear_download_history()
}
