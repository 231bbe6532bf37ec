use serde::{Deserialize, Serialize};

/// Game identity as supplied by the UI catalog.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GameRef {
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Resolving,
    Downloading,
    Paused,
    Extracting,
    Installed,
    Cancelled,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Resolving => "resolving",
            TransferStatus::Downloading => "downloading",
            TransferStatus::Paused => "paused",
            TransferStatus::Extracting => "extracting",
            TransferStatus::Installed => "installed",
            TransferStatus::Cancelled => "cancelled",
            TransferStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "resolving" => Some(TransferStatus::Resolving),
            "downloading" => Some(TransferStatus::Downloading),
            "paused" => Some(TransferStatus::Paused),
            "extracting" => Some(TransferStatus::Extracting),
            "installed" => Some(TransferStatus::Installed),
            "cancelled" => Some(TransferStatus::Cancelled),
            "failed" => Some(TransferStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    Zip,
    Rar,
}

impl ArchiveKind {
    /// Infers the archive kind from the payload file name and the final URL.
    /// Everything that does not look like a rar is treated as a zip.
    pub fn infer(file_name: &str, url: &str) -> Self {
        if file_name.to_ascii_lowercase().ends_with(".rar")
            || url.to_ascii_lowercase().contains(".rar")
        {
            ArchiveKind::Rar
        } else {
            ArchiveKind::Zip
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Rar => "rar",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.extension()
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "zip" => Some(ArchiveKind::Zip),
            "rar" => Some(ArchiveKind::Rar),
            _ => None,
        }
    }
}

/// One in-flight or paused download. Persisted as a snapshot so an
/// interrupted transfer resumes from its last flushed byte offset.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub download_id: String,
    pub game: GameRef,
    pub source_url: String,
    pub archive_path: String,
    pub archive_kind: ArchiveKind,
    pub total_bytes: i64,
    pub downloaded_bytes: i64,
    pub status: TransferStatus,
    pub created_at: i64,
    #[serde(default)]
    pub paused_at: Option<i64>,
}

/// UI-facing row for the downloads view, covering both the active slot and
/// the paused set.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DownloadView {
    pub download_id: String,
    pub game_id: String,
    pub game_title: String,
    pub game_image: Option<String>,
    pub progress: f64,
    pub downloaded_bytes: i64,
    pub total_bytes: i64,
    pub speed_bps: f64,
    pub status: TransferStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InstalledGame {
    pub game_id: String,
    pub game_title: String,
    pub game_slug: String,
    pub game_image: Option<String>,
    pub install_path: String,
    pub exe_path: Option<String>,
    pub installed_at: i64,
    pub size_bytes: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DownloadHistoryEntry {
    pub game_id: String,
    pub game_title: String,
    pub game_slug: String,
    pub game_image: Option<String>,
    pub install_path: String,
    pub downloaded_at: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PlaytimeStat {
    pub game_id: String,
    pub game_title: String,
    pub total_playtime: i64,
    pub last_played: i64,
    pub sessions: i64,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RunningGame {
    pub game_id: String,
    pub game_title: String,
    pub pid: u32,
    pub exe_name: String,
    pub started_at: i64,
    pub session_id: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

/// Launcher settings. The UI consumes most of these directly; the download
/// manager honours `auto_extract`, `delete_archive_after_extract`,
/// `verify_integrity` and `download_speed`.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_update: bool,
    pub notifications: bool,
    pub auto_launch: bool,
    pub minimize_to_tray: bool,
    pub hardware_acceleration: bool,
    pub theme: Theme,
    pub language: String,
    /// Download speed cap in bytes per second, 0 = unlimited.
    pub download_speed: u64,
    pub auto_extract: bool,
    pub delete_archive_after_extract: bool,
    pub verify_integrity: bool,
    pub sound_effects: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_update: true,
            notifications: true,
            auto_launch: false,
            minimize_to_tray: true,
            hardware_acceleration: true,
            theme: Theme::Dark,
            language: "en".to_string(),
            download_speed: 0,
            auto_extract: true,
            delete_archive_after_extract: true,
            verify_integrity: true,
            sound_effects: true,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub os: String,
    pub cpu: String,
    pub total_ram_gb: u64,
    pub free_ram_gb: u64,
    pub platform: String,
    pub arch: String,
}
