//! UI-facing request surface. The embedding shell maps these onto its own
//! IPC mechanism; every command is a plain async fn over [`crate::AppState`].

pub mod download;
pub mod game;
pub mod settings;
