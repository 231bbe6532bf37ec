use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::queries::PlaytimeQueries;
use crate::db::Database;
use crate::errors::{LauncherError, Result};
use crate::events::{EventBus, LauncherEvent};
use crate::models::{InstalledGame, PlaytimeStat, RunningGame};

const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// What a launch attempt produced. A missing executable is not an error; the
/// UI reacts by asking the user to pick one.
#[derive(Debug)]
pub enum LaunchOutcome {
    Launched(RunningGame),
    NeedsExecutableSelection { install_path: String },
}

/// Launches game executables and watches their processes so playtime can be
/// recorded when they exit. One session per game at a time.
#[derive(Clone)]
pub struct ProcessMonitor {
    db: Database,
    events: EventBus,
    running: Arc<Mutex<HashMap<String, RunningGame>>>,
    /// Child handles by session id, kept so exited processes get reaped.
    children: Arc<Mutex<HashMap<String, Child>>>,
    poll_interval: Duration,
}

impl ProcessMonitor {
    pub fn new(db: Database, events: EventBus) -> Self {
        Self {
            db,
            events,
            running: Arc::new(Mutex::new(HashMap::new())),
            children: Arc::new(Mutex::new(HashMap::new())),
            poll_interval: POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn with_poll_interval(db: Database, events: EventBus, poll_interval: Duration) -> Self {
        let mut monitor = Self::new(db, events);
        monitor.poll_interval = poll_interval;
        monitor
    }

    /// Spawns the game's executable from its install directory and starts a
    /// background watcher for the new process.
    pub fn launch(&self, game: &InstalledGame) -> Result<LaunchOutcome> {
        if self.is_running(&game.game_id) {
            return Err(LauncherError::Launch(format!(
                "{} is already running",
                game.game_title
            )));
        }

        let Some(exe_path) = game.exe_path.as_deref().filter(|exe| Path::new(exe).is_file())
        else {
            return Ok(LaunchOutcome::NeedsExecutableSelection {
                install_path: game.install_path.clone(),
            });
        };

        let exe = Path::new(exe_path);
        let work_dir = exe
            .parent()
            .filter(|dir| dir.is_dir())
            .unwrap_or_else(|| Path::new(&game.install_path));

        let child = Command::new(exe)
            .current_dir(work_dir)
            .spawn()
            .map_err(|err| {
                LauncherError::Launch(format!("could not start {}: {err}", exe.display()))
            })?;

        let session = RunningGame {
            game_id: game.game_id.clone(),
            game_title: game.game_title.clone(),
            pid: child.id(),
            exe_name: exe
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            started_at: chrono::Utc::now().timestamp(),
            session_id: uuid::Uuid::new_v4().to_string(),
        };

        tracing::info!(
            "launched {} (pid {}, session {})",
            session.game_title,
            session.pid,
            session.session_id
        );
        self.children_lock().insert(session.session_id.clone(), child);
        self.running_lock()
            .insert(game.game_id.clone(), session.clone());
        self.events.emit(LauncherEvent::GameStarted {
            game_id: session.game_id.clone(),
            game_title: session.game_title.clone(),
        });
        self.watch(session.clone());

        Ok(LaunchOutcome::Launched(session))
    }

    pub fn list_running(&self) -> Vec<RunningGame> {
        self.running_lock().values().cloned().collect()
    }

    pub fn is_running(&self, game_id: &str) -> bool {
        self.running_lock().contains_key(game_id)
    }

    pub fn playtime_stats(&self) -> Result<Vec<PlaytimeStat>> {
        self.db.get_playtime_stats()
    }

    /// Polls the child until it exits, then records the session. `try_wait`
    /// doubles as the reaper, so finished games do not linger as zombies.
    fn watch(&self, session: RunningGame) {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(monitor.poll_interval).await;

                let exited = {
                    let mut children = monitor.children_lock();
                    match children.get_mut(&session.session_id) {
                        Some(child) => !matches!(child.try_wait(), Ok(None)),
                        // Handle gone: someone else already tore the session down.
                        None => return,
                    }
                };
                if exited {
                    break;
                }
            }

            monitor.finish_session(&session);
        });
    }

    fn finish_session(&self, session: &RunningGame) {
        self.children_lock().remove(&session.session_id);
        {
            let mut guard = self.running_lock();
            match guard.get(&session.game_id) {
                Some(running) if running.session_id == session.session_id => {
                    guard.remove(&session.game_id);
                }
                _ => return,
            }
        }

        let seconds = (chrono::Utc::now().timestamp() - session.started_at).max(0);
        tracing::info!(
            "{} exited after {seconds}s (pid {})",
            session.game_title,
            session.pid
        );
        if let Err(err) = self
            .db
            .record_play_session(&session.game_id, &session.game_title, seconds)
        {
            tracing::warn!("could not record play session: {err}");
        }
        self.events.emit(LauncherEvent::GameStopped {
            game_id: session.game_id.clone(),
            play_time_seconds: seconds,
        });
    }

    fn running_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RunningGame>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn children_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Child>> {
        match self.children.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
