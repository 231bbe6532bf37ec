use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Http(u16),
    #[error("Download timed out")]
    Timeout,
    #[error("Link resolution failed: {0}")]
    LinkResolution(String),
    #[error("Extraction failed: {0}")]
    Extraction(String),
    #[error("Launch failed: {0}")]
    Launch(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LauncherError>;
