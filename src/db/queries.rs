use rusqlite::{params, OptionalExtension, Row};

use crate::db::Database;
use crate::errors::Result;
use crate::models::{
    ArchiveKind, DownloadHistoryEntry, GameRef, InstalledGame, PlaytimeStat, Settings, Transfer,
    TransferStatus,
};

const HISTORY_CAP: usize = 50;

pub trait SettingsQueries {
    fn set_setting(&self, key: &str, value: &str) -> Result<()>;
    fn get_setting(&self, key: &str) -> Result<Option<String>>;
    fn load_settings(&self) -> Result<Settings>;
    fn save_settings(&self, settings: &Settings) -> Result<()>;
}

pub trait InstalledGameQueries {
    fn upsert_installed_game(&self, game: &InstalledGame) -> Result<()>;
    fn get_installed_games(&self) -> Result<Vec<InstalledGame>>;
    fn get_installed_game(&self, game_id: &str) -> Result<Option<InstalledGame>>;
    fn remove_installed_game(&self, game_id: &str) -> Result<()>;
    fn set_exe_path(&self, game_id: &str, exe_path: Option<&str>) -> Result<()>;
}

pub trait PausedTransferQueries {
    fn upsert_paused_transfer(&self, transfer: &Transfer) -> Result<()>;
    fn get_paused_transfers(&self) -> Result<Vec<Transfer>>;
    fn get_paused_transfer(&self, download_id: &str) -> Result<Option<Transfer>>;
    fn remove_paused_transfer(&self, download_id: &str) -> Result<()>;
}

pub trait HistoryQueries {
    fn push_history(&self, entry: &DownloadHistoryEntry) -> Result<()>;
    fn get_history(&self) -> Result<Vec<DownloadHistoryEntry>>;
    fn clear_history(&self) -> Result<()>;
}

pub trait PlaytimeQueries {
    fn record_play_session(&self, game_id: &str, game_title: &str, seconds: i64) -> Result<()>;
    fn get_playtime_stats(&self) -> Result<Vec<PlaytimeStat>>;
}

fn installed_game_from_row(row: &Row<'_>) -> rusqlite::Result<InstalledGame> {
    Ok(InstalledGame {
        game_id: row.get(0)?,
        game_title: row.get(1)?,
        game_slug: row.get(2)?,
        game_image: row.get(3)?,
        install_path: row.get(4)?,
        exe_path: row.get(5)?,
        installed_at: row.get(6)?,
        size_bytes: row.get(7)?,
    })
}

fn transfer_from_row(row: &Row<'_>) -> rusqlite::Result<Transfer> {
    let kind_raw: String = row.get(7)?;
    Ok(Transfer {
        download_id: row.get(0)?,
        game: GameRef {
            id: row.get(1)?,
            title: row.get(2)?,
            slug: row.get(3)?,
            image: row.get(4)?,
        },
        source_url: row.get(5)?,
        archive_path: row.get(6)?,
        archive_kind: ArchiveKind::parse(&kind_raw).unwrap_or(ArchiveKind::Zip),
        total_bytes: row.get(8)?,
        downloaded_bytes: row.get(9)?,
        status: TransferStatus::Paused,
        created_at: row.get(10)?,
        paused_at: row.get(11)?,
    })
}

impl SettingsQueries for Database {
    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn load_settings(&self) -> Result<Settings> {
        match self.get_setting("settings")? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            None => Ok(Settings::default()),
        }
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        let raw = serde_json::to_string(settings)?;
        self.set_setting("settings", &raw)
    }
}

impl InstalledGameQueries for Database {
    fn upsert_installed_game(&self, game: &InstalledGame) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO installed_games
                (game_id, game_title, game_slug, game_image, install_path, exe_path, installed_at, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                game.game_id,
                game.game_title,
                game.game_slug,
                game.game_image,
                game.install_path,
                game.exe_path,
                game.installed_at,
                game.size_bytes,
            ],
        )?;
        Ok(())
    }

    fn get_installed_games(&self) -> Result<Vec<InstalledGame>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT game_id, game_title, game_slug, game_image, install_path, exe_path, installed_at, size_bytes
             FROM installed_games
             ORDER BY installed_at DESC",
        )?;
        let rows = stmt.query_map([], installed_game_from_row)?;
        let mut games = Vec::new();
        for row in rows {
            games.push(row?);
        }
        Ok(games)
    }

    fn get_installed_game(&self, game_id: &str) -> Result<Option<InstalledGame>> {
        let conn = self.connection()?;
        let game = conn
            .query_row(
                "SELECT game_id, game_title, game_slug, game_image, install_path, exe_path, installed_at, size_bytes
                 FROM installed_games WHERE game_id = ?1",
                params![game_id],
                installed_game_from_row,
            )
            .optional()?;
        Ok(game)
    }

    fn remove_installed_game(&self, game_id: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM installed_games WHERE game_id = ?1",
            params![game_id],
        )?;
        Ok(())
    }

    fn set_exe_path(&self, game_id: &str, exe_path: Option<&str>) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE installed_games SET exe_path = ?2 WHERE game_id = ?1",
            params![game_id, exe_path],
        )?;
        Ok(())
    }
}

impl PausedTransferQueries for Database {
    fn upsert_paused_transfer(&self, transfer: &Transfer) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO paused_downloads
                (download_id, game_id, game_title, game_slug, game_image, source_url,
                 archive_path, archive_kind, total_bytes, downloaded_bytes, created_at, paused_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                transfer.download_id,
                transfer.game.id,
                transfer.game.title,
                transfer.game.slug,
                transfer.game.image,
                transfer.source_url,
                transfer.archive_path,
                transfer.archive_kind.as_str(),
                transfer.total_bytes,
                transfer.downloaded_bytes,
                transfer.created_at,
                transfer.paused_at,
            ],
        )?;
        Ok(())
    }

    fn get_paused_transfers(&self) -> Result<Vec<Transfer>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT download_id, game_id, game_title, game_slug, game_image, source_url,
                    archive_path, archive_kind, total_bytes, downloaded_bytes,
                    created_at, paused_at
             FROM paused_downloads
             ORDER BY paused_at DESC",
        )?;
        let rows = stmt.query_map([], transfer_from_row)?;
        let mut transfers = Vec::new();
        for row in rows {
            transfers.push(row?);
        }
        Ok(transfers)
    }

    fn get_paused_transfer(&self, download_id: &str) -> Result<Option<Transfer>> {
        let conn = self.connection()?;
        let transfer = conn
            .query_row(
                "SELECT download_id, game_id, game_title, game_slug, game_image, source_url,
                        archive_path, archive_kind, total_bytes, downloaded_bytes,
                        created_at, paused_at
                 FROM paused_downloads WHERE download_id = ?1",
                params![download_id],
                transfer_from_row,
            )
            .optional()?;
        Ok(transfer)
    }

    fn remove_paused_transfer(&self, download_id: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM paused_downloads WHERE download_id = ?1",
            params![download_id],
        )?;
        Ok(())
    }
}

impl HistoryQueries for Database {
    fn push_history(&self, entry: &DownloadHistoryEntry) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO download_history
                (game_id, game_title, game_slug, game_image, install_path, downloaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.game_id,
                entry.game_title,
                entry.game_slug,
                entry.game_image,
                entry.install_path,
                entry.downloaded_at,
            ],
        )?;
        // Keep only the most recent entries.
        conn.execute(
            "DELETE FROM download_history WHERE id NOT IN
                (SELECT id FROM download_history ORDER BY downloaded_at DESC, id DESC LIMIT ?1)",
            params![HISTORY_CAP as i64],
        )?;
        Ok(())
    }

    fn get_history(&self) -> Result<Vec<DownloadHistoryEntry>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT game_id, game_title, game_slug, game_image, install_path, downloaded_at
             FROM download_history
             ORDER BY downloaded_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DownloadHistoryEntry {
                game_id: row.get(0)?,
                game_title: row.get(1)?,
                game_slug: row.get(2)?,
                game_image: row.get(3)?,
                install_path: row.get(4)?,
                downloaded_at: row.get(5)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn clear_history(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM download_history", [])?;
        Ok(())
    }
}

impl PlaytimeQueries for Database {
    fn record_play_session(&self, game_id: &str, game_title: &str, seconds: i64) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO playtime_stats (game_id, game_title, total_playtime, last_played, sessions)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT(game_id) DO UPDATE SET
                total_playtime = total_playtime + excluded.total_playtime,
                last_played = excluded.last_played,
                sessions = sessions + 1,
                game_title = excluded.game_title",
            params![game_id, game_title, seconds, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn get_playtime_stats(&self) -> Result<Vec<PlaytimeStat>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT game_id, game_title, total_playtime, last_played, sessions
             FROM playtime_stats
             ORDER BY last_played DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PlaytimeStat {
                game_id: row.get(0)?,
                game_title: row.get(1)?,
                total_playtime: row.get(2)?,
                last_played: row.get(3)?,
                sessions: row.get(4)?,
            })
        })?;
        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Theme;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = crate::db::init(dir.path()).unwrap();
        (dir, db)
    }

    fn history_entry(n: usize) -> DownloadHistoryEntry {
        DownloadHistoryEntry {
            game_id: format!("game-{n}"),
            game_title: format!("Game {n}"),
            game_slug: format!("game-{n}"),
            game_image: None,
            install_path: format!("/games/game-{n}"),
            downloaded_at: 1_700_000_000 + n as i64,
        }
    }

    #[test]
    fn history_is_capped_at_fifty_most_recent() {
        let (_dir, db) = test_db();
        for n in 0..60 {
            db.push_history(&history_entry(n)).unwrap();
        }

        let history = db.get_history().unwrap();
        assert_eq!(history.len(), 50);
        assert_eq!(history[0].game_id, "game-59");
        assert_eq!(history[49].game_id, "game-10");
    }

    #[test]
    fn installed_game_is_unique_per_game_id() {
        let (_dir, db) = test_db();
        let mut game = InstalledGame {
            game_id: "42".to_string(),
            game_title: "Example".to_string(),
            game_slug: "example".to_string(),
            game_image: None,
            install_path: "/games/example".to_string(),
            exe_path: None,
            installed_at: 1,
            size_bytes: 10,
        };
        db.upsert_installed_game(&game).unwrap();
        game.exe_path = Some("/games/example/Game.exe".to_string());
        game.installed_at = 2;
        db.upsert_installed_game(&game).unwrap();

        let games = db.get_installed_games().unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(
            games[0].exe_path.as_deref(),
            Some("/games/example/Game.exe")
        );
    }

    #[test]
    fn paused_transfer_round_trips() {
        let (_dir, db) = test_db();
        let transfer = Transfer {
            download_id: "42-1700000000000".to_string(),
            game: GameRef {
                id: "42".to_string(),
                title: "Example".to_string(),
                slug: "example".to_string(),
                image: Some("https://cdn/example.png".to_string()),
            },
            source_url: "https://host/file.zip".to_string(),
            archive_path: "/games/example/example.zip".to_string(),
            archive_kind: ArchiveKind::Rar,
            total_bytes: 1000,
            downloaded_bytes: 400,
            status: TransferStatus::Paused,
            created_at: 1_700_000_000,
            paused_at: Some(1_700_000_100),
        };
        db.upsert_paused_transfer(&transfer).unwrap();

        let loaded = db
            .get_paused_transfer("42-1700000000000")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.downloaded_bytes, 400);
        assert_eq!(loaded.archive_kind, ArchiveKind::Rar);
        assert_eq!(loaded.status, TransferStatus::Paused);
        assert_eq!(loaded.game.slug, "example");

        db.remove_paused_transfer("42-1700000000000").unwrap();
        assert!(db.get_paused_transfers().unwrap().is_empty());
    }

    #[test]
    fn play_sessions_accumulate() {
        let (_dir, db) = test_db();
        db.record_play_session("42", "Example", 120).unwrap();
        db.record_play_session("42", "Example", 30).unwrap();

        let stats = db.get_playtime_stats().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_playtime, 150);
        assert_eq!(stats[0].sessions, 2);
    }

    #[test]
    fn settings_round_trip_with_defaults() {
        let (_dir, db) = test_db();
        assert!(db.load_settings().unwrap().auto_extract);

        let mut settings = Settings::default();
        settings.theme = Theme::Light;
        settings.auto_extract = false;
        db.save_settings(&settings).unwrap();

        let loaded = db.load_settings().unwrap();
        assert_eq!(loaded.theme, Theme::Light);
        assert!(!loaded.auto_extract);
    }
}
