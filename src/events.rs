use serde::Serialize;
use tokio::sync::broadcast;

/// Events the core pushes to the UI shell. The embedding shell subscribes and
/// forwards them over its own IPC channel.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum LauncherEvent {
    #[serde(rename_all = "camelCase")]
    DownloadStatus {
        download_id: String,
        game_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DownloadProgress {
        download_id: String,
        game_id: String,
        progress: f64,
        downloaded_bytes: i64,
        total_bytes: i64,
        speed_bps: f64,
    },
    #[serde(rename_all = "camelCase")]
    DownloadComplete {
        download_id: String,
        game_id: String,
        game_title: String,
        install_path: String,
        exe_path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DownloadError {
        download_id: String,
        game_id: String,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    GameStarted { game_id: String, game_title: String },
    #[serde(rename_all = "camelCase")]
    GameStopped { game_id: String, play_time_seconds: i64 },
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast bus for [`LauncherEvent`]. Sending never blocks; events are
/// dropped when no subscriber is attached, which is fine for a UI feed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LauncherEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LauncherEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: LauncherEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
