use std::path::PathBuf;

use sysinfo::System;

use crate::db::queries::SettingsQueries;
use crate::errors::Result;
use crate::models::{Settings, SystemInfo};
use crate::AppState;

pub async fn get_settings(state: &AppState) -> Result<Settings> {
    state.db.load_settings()
}

pub async fn save_settings(state: &AppState, settings: Settings) -> Result<()> {
    state.db.save_settings(&settings)
}

pub async fn get_install_dir(state: &AppState) -> Result<PathBuf> {
    Ok(state.downloads.install_dir())
}

pub async fn set_install_dir(state: &AppState, dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&dir)?;
    state.downloads.set_install_dir(dir)
}

const GIB: u64 = 1024 * 1024 * 1024;

pub async fn get_system_info(_state: &AppState) -> Result<SystemInfo> {
    let mut system = System::new();
    system.refresh_cpu();
    system.refresh_memory();

    Ok(SystemInfo {
        os: System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string()),
        cpu: system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().to_string())
            .unwrap_or_default(),
        total_ram_gb: system.total_memory() / GIB,
        free_ram_gb: system.available_memory() / GIB,
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    })
}
