use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::db::queries::{
    HistoryQueries, InstalledGameQueries, PausedTransferQueries, SettingsQueries,
};
use crate::db::Database;
use crate::errors::{LauncherError, Result};
use crate::events::{EventBus, LauncherEvent};
use crate::models::{
    ArchiveKind, DownloadHistoryEntry, DownloadView, GameRef, InstalledGame, Transfer,
    TransferStatus,
};
use crate::services::archive_extractor::{discard_archive, ArchiveExtractor};
use crate::services::install_resolver;
use crate::services::link_resolver::LinkResolver;
use crate::services::transfer_engine::{
    TransferControl, TransferEngine, TransferProgress, TransferRequest, TransferResult,
};
use crate::utils::file::{self, FileManager};

const INSTALL_DIR_KEY: &str = "install_dir";
const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// Distinguishes pipeline instances that reuse a download id, so a
/// superseded pipeline can never tear down its successor's slot.
static PIPELINE_TOKEN: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
pub struct DownloadRequest {
    pub game: GameRef,
    pub url: String,
}

/// Terminal state of one pipeline run.
#[derive(Debug)]
pub enum DownloadOutcome {
    Installed {
        install_path: String,
        exe_path: Option<String>,
    },
    Paused,
    Cancelled,
}

/// The one transfer currently holding the download slot. Progress fields are
/// refreshed by the pipeline so the downloads view can read them live.
struct ActiveTransfer {
    token: u64,
    transfer: Transfer,
    control: watch::Sender<TransferControl>,
    speed_bps: f64,
    task: Option<JoinHandle<()>>,
}

/// Coordinates the whole install pipeline: link resolution, the byte
/// transfer, extraction and library registration. At most one transfer runs
/// at a time; starting a new one pushes the current one into the paused set.
#[derive(Clone)]
pub struct DownloadManager {
    db: Database,
    events: EventBus,
    resolver: LinkResolver,
    engine: TransferEngine,
    extractor: ArchiveExtractor,
    files: Arc<Mutex<FileManager>>,
    active: Arc<Mutex<Option<ActiveTransfer>>>,
}

impl DownloadManager {
    /// `default_install_dir` is used until the user picks their own root; a
    /// previously saved choice in the database wins over the default.
    pub fn new(db: Database, events: EventBus, default_install_dir: PathBuf) -> Result<Self> {
        let install_dir = match db.get_setting(INSTALL_DIR_KEY)? {
            Some(saved) => PathBuf::from(saved),
            None => default_install_dir,
        };
        let engine = TransferEngine::new()?;
        let resolver = LinkResolver::new(engine.client());
        Ok(Self {
            db,
            events,
            resolver,
            engine,
            extractor: ArchiveExtractor::new(),
            files: Arc::new(Mutex::new(FileManager::new(install_dir))),
            active: Arc::new(Mutex::new(None)),
        })
    }

    pub fn install_dir(&self) -> PathBuf {
        self.files_lock().install_dir().to_path_buf()
    }

    pub fn set_install_dir(&self, dir: PathBuf) -> Result<()> {
        self.db
            .set_setting(INSTALL_DIR_KEY, &dir.display().to_string())?;
        self.files_lock().set_install_dir(dir);
        Ok(())
    }

    /// Starts a new download and returns its id. Any transfer already holding
    /// the slot is pushed into the paused set first. The pipeline itself runs
    /// on a background task; completion and failure surface as events.
    pub async fn start_download(&self, request: DownloadRequest) -> Result<String> {
        self.preempt_active().await;

        let download_id = format!(
            "{}-{}",
            request.game.id,
            chrono::Utc::now().timestamp_millis()
        );
        let transfer = Transfer {
            download_id: download_id.clone(),
            game: request.game,
            source_url: request.url,
            archive_path: String::new(),
            archive_kind: ArchiveKind::Zip,
            total_bytes: 0,
            downloaded_bytes: 0,
            status: TransferStatus::Resolving,
            created_at: chrono::Utc::now().timestamp(),
            paused_at: None,
        };

        self.spawn_pipeline(transfer);
        Ok(download_id)
    }

    /// Resumes a paused download from its snapshot, picking up at whatever
    /// byte offset the partial archive on disk actually has.
    pub async fn resume_download(&self, download_id: &str) -> Result<()> {
        // The active transfer keeps a snapshot row too; resuming it would
        // spawn a second pipeline for the same id.
        {
            let guard = self.active_lock();
            if let Some(active) = guard.as_ref() {
                if active.transfer.download_id == download_id {
                    return Err(LauncherError::Config(format!(
                        "download {download_id} is already active"
                    )));
                }
            }
        }

        let transfer = self
            .db
            .get_paused_transfer(download_id)?
            .ok_or_else(|| LauncherError::NotFound(format!("download {download_id}")))?;

        self.preempt_active().await;
        self.spawn_pipeline(transfer);
        Ok(())
    }

    pub fn pause_download(&self, download_id: &str) -> Result<()> {
        let guard = self.active_lock();
        match guard.as_ref() {
            Some(active) if active.transfer.download_id == download_id => {
                let _ = active.control.send(TransferControl::Paused);
                Ok(())
            }
            _ => Err(LauncherError::NotFound(format!(
                "active download {download_id}"
            ))),
        }
    }

    /// Cancels an active or paused download and removes its partial archive.
    pub fn cancel_download(&self, download_id: &str) -> Result<()> {
        {
            let guard = self.active_lock();
            if let Some(active) = guard.as_ref() {
                if active.transfer.download_id == download_id {
                    let _ = active.control.send(TransferControl::Cancelled);
                    return Ok(());
                }
            }
        }

        let Some(paused) = self.db.get_paused_transfer(download_id)? else {
            return Err(LauncherError::NotFound(format!("download {download_id}")));
        };
        self.discard_partial(&paused);
        self.db.remove_paused_transfer(download_id)?;
        self.emit_status(&paused, TransferStatus::Cancelled, None);
        Ok(())
    }

    /// Active transfer first, then the paused snapshots, newest pause first.
    pub fn list_downloads(&self) -> Result<Vec<DownloadView>> {
        let mut views = Vec::new();
        let active_id = {
            let guard = self.active_lock();
            if let Some(active) = guard.as_ref() {
                views.push(view_of(&active.transfer, active.speed_bps));
                Some(active.transfer.download_id.clone())
            } else {
                None
            }
        };

        for paused in self.db.get_paused_transfers()? {
            if Some(&paused.download_id) != active_id.as_ref() {
                views.push(view_of(&paused, 0.0));
            }
        }
        Ok(views)
    }

    pub fn installed_games(&self) -> Result<Vec<InstalledGame>> {
        self.db.get_installed_games()
    }

    pub fn is_game_installed(&self, game_id: &str) -> Result<bool> {
        Ok(self.db.get_installed_game(game_id)?.is_some())
    }

    pub fn download_history(&self) -> Result<Vec<DownloadHistoryEntry>> {
        self.db.get_history()
    }

    pub fn clear_download_history(&self) -> Result<()> {
        self.db.clear_history()
    }

    /// Records a manually selected executable. The path must point at an
    /// existing file inside the game's install directory.
    pub fn select_executable(&self, game_id: &str, exe_path: &Path) -> Result<()> {
        let game = self
            .db
            .get_installed_game(game_id)?
            .ok_or_else(|| LauncherError::NotFound(format!("installed game {game_id}")))?;

        if !exe_path.is_file() {
            return Err(LauncherError::NotFound(format!(
                "executable {}",
                exe_path.display()
            )));
        }
        if !exe_path.starts_with(&game.install_path) {
            return Err(LauncherError::Config(
                "executable must live inside the game's install folder".to_string(),
            ));
        }

        self.db
            .set_exe_path(game_id, Some(&exe_path.display().to_string()))
    }

    /// Removes the game's files and its library entry. Download history and
    /// playtime are kept.
    pub fn uninstall_game(&self, game_id: &str) -> Result<()> {
        let game = self
            .db
            .get_installed_game(game_id)?
            .ok_or_else(|| LauncherError::NotFound(format!("installed game {game_id}")))?;

        let install_path = PathBuf::from(&game.install_path);
        if install_path.is_dir() {
            std::fs::remove_dir_all(&install_path)?;
        }
        self.db.remove_installed_game(game_id)?;
        tracing::info!("uninstalled {} from {}", game.game_title, game.install_path);
        Ok(())
    }

    /// Reconciles the library with what is actually on disk: entries whose
    /// folder vanished are dropped, missing executables are re-detected, and
    /// catalog games found in the install root are adopted.
    pub fn scan_install_root(&self, catalog: &[GameRef]) -> Result<Vec<InstalledGame>> {
        for game in self.db.get_installed_games()? {
            let install_path = PathBuf::from(&game.install_path);
            if !install_path.is_dir() {
                tracing::info!("install folder gone, dropping {}", game.game_title);
                self.db.remove_installed_game(&game.game_id)?;
                continue;
            }

            let exe_missing = match game.exe_path.as_deref() {
                Some(exe) => !Path::new(exe).is_file(),
                None => true,
            };
            if exe_missing {
                let found = install_resolver::locate_executable(&install_path)
                    .map(|path| path.display().to_string());
                self.db.set_exe_path(&game.game_id, found.as_deref())?;
            }
        }

        for game in catalog {
            if self.db.get_installed_game(&game.id)?.is_some() {
                continue;
            }
            let game_dir = self.files_lock().game_dir(&game.slug);
            if !game_dir.is_dir() {
                continue;
            }
            let exe_path = install_resolver::locate_executable(&game_dir)
                .map(|path| path.display().to_string());
            let size_bytes = file::dir_size(&game_dir).unwrap_or(0) as i64;
            self.db.upsert_installed_game(&InstalledGame {
                game_id: game.id.clone(),
                game_title: game.title.clone(),
                game_slug: game.slug.clone(),
                game_image: game.image.clone(),
                install_path: game_dir.display().to_string(),
                exe_path,
                installed_at: chrono::Utc::now().timestamp(),
                size_bytes,
            })?;
            tracing::info!("adopted existing install of {}", game.title);
        }

        self.db.get_installed_games()
    }

    fn spawn_pipeline(&self, transfer: Transfer) {
        let token = PIPELINE_TOKEN.fetch_add(1, Ordering::Relaxed);
        let (control, control_rx) = watch::channel(TransferControl::Running);
        {
            let mut guard = self.active_lock();
            *guard = Some(ActiveTransfer {
                token,
                transfer: transfer.clone(),
                control,
                speed_bps: 0.0,
                task: None,
            });
        }

        let manager = self.clone();
        let task = tokio::spawn(async move {
            let download_id = transfer.download_id.clone();
            let game = transfer.game.clone();
            match manager.run_pipeline(token, transfer, control_rx).await {
                Ok(DownloadOutcome::Installed {
                    install_path,
                    exe_path,
                }) => {
                    manager.events.emit(LauncherEvent::DownloadComplete {
                        download_id,
                        game_id: game.id,
                        game_title: game.title,
                        install_path,
                        exe_path,
                    });
                }
                Ok(DownloadOutcome::Paused) | Ok(DownloadOutcome::Cancelled) => {}
                Err(err) => {
                    tracing::error!("download {download_id} failed: {err}");
                    manager.events.emit(LauncherEvent::DownloadError {
                        download_id,
                        game_id: game.id,
                        error: err.to_string(),
                    });
                }
            }
        });

        let mut guard = self.active_lock();
        if let Some(active) = guard.as_mut() {
            if active.token == token {
                active.task = Some(task);
            }
        }
    }

    /// One full pipeline run for the transfer holding the slot. Failed
    /// transfers leave no paused snapshot behind, but the partial archive
    /// stays on disk.
    async fn run_pipeline(
        &self,
        token: u64,
        mut transfer: Transfer,
        control_rx: watch::Receiver<TransferControl>,
    ) -> Result<DownloadOutcome> {
        let download_id = transfer.download_id.clone();
        let result = self.drive_transfer(token, &mut transfer, control_rx).await;

        let outcome = match result {
            Ok(TransferResult::Completed { total_bytes, .. }) => {
                transfer.total_bytes = total_bytes;
                transfer.downloaded_bytes = total_bytes;
                let settings = self.db.load_settings()?;
                self.finish_install(&transfer, &settings).await
            }
            Ok(TransferResult::Paused {
                downloaded_bytes,
                total_bytes,
            }) => {
                transfer.downloaded_bytes = downloaded_bytes;
                transfer.total_bytes = total_bytes;
                transfer.status = TransferStatus::Paused;
                transfer.paused_at = Some(chrono::Utc::now().timestamp());
                self.db.upsert_paused_transfer(&transfer)?;
                self.emit_status(&transfer, TransferStatus::Paused, None);
                Ok(DownloadOutcome::Paused)
            }
            Ok(TransferResult::Cancelled) => {
                self.discard_partial(&transfer);
                self.db.remove_paused_transfer(&download_id)?;
                self.emit_status(&transfer, TransferStatus::Cancelled, None);
                Ok(DownloadOutcome::Cancelled)
            }
            Err(err) => {
                if let Err(db_err) = self.db.remove_paused_transfer(&download_id) {
                    tracing::warn!("could not drop snapshot of failed download: {db_err}");
                }
                Err(err)
            }
        };

        self.clear_active_if(token);
        outcome
    }

    /// Resolves the source link, then streams the archive, forwarding
    /// progress as events and flushing snapshots so an abnormal shutdown can
    /// resume from the last reported offset.
    async fn drive_transfer(
        &self,
        token: u64,
        transfer: &mut Transfer,
        control_rx: watch::Receiver<TransferControl>,
    ) -> Result<TransferResult> {
        self.emit_status(transfer, TransferStatus::Resolving, None);
        let resolved = self.resolver.resolve(&transfer.source_url).await?;

        transfer.archive_kind = ArchiveKind::infer(
            resolved.file_name.as_deref().unwrap_or(""),
            &resolved.direct_url,
        );
        if transfer.archive_path.is_empty() {
            let game_dir = self.files_lock().game_dir(&transfer.game.slug);
            tokio::fs::create_dir_all(&game_dir).await?;
            let file_name = format!(
                "{}.{}",
                file::sanitize_folder_name(&transfer.game.slug),
                transfer.archive_kind.extension()
            );
            transfer.archive_path = game_dir.join(file_name).display().to_string();
        }

        let destination = PathBuf::from(&transfer.archive_path);
        let resume_from = tokio::fs::metadata(&destination)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);

        transfer.status = TransferStatus::Downloading;
        transfer.downloaded_bytes = resume_from as i64;
        self.db.upsert_paused_transfer(transfer)?;
        self.set_active_snapshot(token, transfer, 0.0);
        self.emit_status(transfer, TransferStatus::Downloading, None);

        let settings = self.db.load_settings()?;
        let (progress_tx, mut progress_rx) =
            mpsc::channel::<TransferProgress>(PROGRESS_CHANNEL_CAPACITY);

        let forwarder = {
            let manager = self.clone();
            let mut snapshot = transfer.clone();
            tokio::spawn(async move {
                while let Some(update) = progress_rx.recv().await {
                    snapshot.downloaded_bytes = update.downloaded_bytes;
                    snapshot.total_bytes = update.total_bytes;
                    manager.set_active_snapshot(token, &snapshot, update.speed_bps);
                    if let Err(err) = manager.db.upsert_paused_transfer(&snapshot) {
                        tracing::warn!("could not flush transfer snapshot: {err}");
                    }
                    manager.events.emit(LauncherEvent::DownloadProgress {
                        download_id: snapshot.download_id.clone(),
                        game_id: snapshot.game.id.clone(),
                        progress: update.progress,
                        downloaded_bytes: update.downloaded_bytes,
                        total_bytes: update.total_bytes,
                        speed_bps: update.speed_bps,
                    });
                }
            })
        };

        let result = self
            .engine
            .run(
                TransferRequest {
                    url: &resolved.direct_url,
                    destination: &destination,
                    resume_from,
                    auth_token: resolved.auth_token.as_deref(),
                    speed_limit_bps: settings.download_speed,
                },
                progress_tx,
                control_rx,
            )
            .await;

        let _ = forwarder.await;
        result
    }

    /// Post-transfer half of the pipeline: integrity check, extraction,
    /// executable detection and library registration.
    async fn finish_install(
        &self,
        transfer: &Transfer,
        settings: &crate::models::Settings,
    ) -> Result<DownloadOutcome> {
        let archive = PathBuf::from(&transfer.archive_path);
        let game_dir = archive
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.files_lock().game_dir(&transfer.game.slug));

        if settings.verify_integrity {
            match file::sha256_file(&archive) {
                Ok(digest) => {
                    tracing::info!("archive sha256 for {}: {digest}", transfer.game.slug)
                }
                Err(err) => tracing::warn!("integrity hash failed: {err}"),
            }
        }

        if settings.auto_extract {
            self.emit_status(transfer, TransferStatus::Extracting, None);
            self.extractor
                .extract(&archive, &game_dir, transfer.archive_kind)
                .await?;
            if settings.delete_archive_after_extract {
                discard_archive(&archive);
            }
        }

        let exe_path =
            install_resolver::locate_executable(&game_dir).map(|path| path.display().to_string());
        if exe_path.is_none() {
            if let Err(err) = install_resolver::write_instructions(&game_dir, &transfer.game.title)
            {
                tracing::warn!("could not write launch instructions: {err}");
            }
        }

        let install_path = game_dir.display().to_string();
        let now = chrono::Utc::now().timestamp();
        self.db.upsert_installed_game(&InstalledGame {
            game_id: transfer.game.id.clone(),
            game_title: transfer.game.title.clone(),
            game_slug: transfer.game.slug.clone(),
            game_image: transfer.game.image.clone(),
            install_path: install_path.clone(),
            exe_path: exe_path.clone(),
            installed_at: now,
            size_bytes: file::dir_size(&game_dir).unwrap_or(0) as i64,
        })?;
        self.db.push_history(&DownloadHistoryEntry {
            game_id: transfer.game.id.clone(),
            game_title: transfer.game.title.clone(),
            game_slug: transfer.game.slug.clone(),
            game_image: transfer.game.image.clone(),
            install_path: install_path.clone(),
            downloaded_at: now,
        })?;
        self.db.remove_paused_transfer(&transfer.download_id)?;
        self.emit_status(transfer, TransferStatus::Installed, None);

        Ok(DownloadOutcome::Installed {
            install_path,
            exe_path,
        })
    }

    /// Pushes whatever holds the slot into the paused set and waits for that
    /// pipeline to finish tearing down, so two transfers never stream at
    /// once. The outgoing pipeline persists its own snapshot on the way out.
    async fn preempt_active(&self) {
        let task = {
            let mut guard = self.active_lock();
            match guard.as_mut() {
                Some(active) => {
                    tracing::info!(
                        "pausing {} to make room for a new download",
                        active.transfer.download_id
                    );
                    let _ = active.control.send(TransferControl::Paused);
                    active.task.take()
                }
                None => return,
            }
        };

        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!("superseded download pipeline panicked: {err}");
            }
        }
    }

    fn discard_partial(&self, transfer: &Transfer) {
        if transfer.archive_path.is_empty() {
            return;
        }
        let archive = PathBuf::from(&transfer.archive_path);
        if let Err(err) = std::fs::remove_file(&archive) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("could not delete partial archive: {err}");
            }
        }
        if let Some(parent) = archive.parent() {
            let _ = file::prune_empty_dir(parent);
        }
    }

    fn emit_status(&self, transfer: &Transfer, status: TransferStatus, message: Option<String>) {
        self.events.emit(LauncherEvent::DownloadStatus {
            download_id: transfer.download_id.clone(),
            game_id: transfer.game.id.clone(),
            status: status.as_str().to_string(),
            message,
        });
    }

    fn set_active_snapshot(&self, token: u64, transfer: &Transfer, speed_bps: f64) {
        let mut guard = self.active_lock();
        if let Some(active) = guard.as_mut() {
            if active.token == token {
                active.transfer = transfer.clone();
                active.speed_bps = speed_bps;
            }
        }
    }

    fn clear_active_if(&self, token: u64) {
        let mut guard = self.active_lock();
        if guard.as_ref().map_or(false, |active| active.token == token) {
            *guard = None;
        }
    }

    fn files_lock(&self) -> std::sync::MutexGuard<'_, FileManager> {
        match self.files.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn active_lock(&self) -> std::sync::MutexGuard<'_, Option<ActiveTransfer>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn view_of(transfer: &Transfer, speed_bps: f64) -> DownloadView {
    let progress = if transfer.total_bytes > 0 {
        transfer.downloaded_bytes as f64 / transfer.total_bytes as f64 * 100.0
    } else {
        0.0
    };
    DownloadView {
        download_id: transfer.download_id.clone(),
        game_id: transfer.game.id.clone(),
        game_title: transfer.game.title.clone(),
        game_image: transfer.game.image.clone(),
        progress,
        downloaded_bytes: transfer.downloaded_bytes,
        total_bytes: transfer.total_bytes,
        speed_bps,
        status: transfer.status,
    }
}
