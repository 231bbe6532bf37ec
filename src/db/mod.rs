use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::errors::{LauncherError, Result};

pub mod queries;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(include_str!("../../migrations/001_initial.sql"))?;
        Ok(())
    }

    pub fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LauncherError::Config("database lock poisoned".to_string()))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

pub fn init(data_dir: &Path) -> Result<Database> {
    std::fs::create_dir_all(data_dir)?;
    let db = Database::new(data_dir.join("launcher.db"))?;
    db.run_migrations()?;
    Ok(db)
}
