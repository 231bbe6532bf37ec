use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Owns the install-root layout: every game gets its own subdirectory named
/// after its slug.
#[derive(Clone)]
pub struct FileManager {
    install_dir: PathBuf,
}

impl FileManager {
    pub fn new(install_dir: PathBuf) -> Self {
        Self { install_dir }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn set_install_dir(&mut self, dir: PathBuf) {
        self.install_dir = dir;
    }

    pub fn game_dir(&self, game_slug: &str) -> PathBuf {
        self.install_dir.join(sanitize_folder_name(game_slug))
    }

    pub fn dir_size(&self, path: &Path) -> io::Result<u64> {
        dir_size(path)
    }
}

pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Removes `dir` if it contains no entries. Used after cancelling a download
/// so an aborted install does not leave an empty game folder behind.
pub fn prune_empty_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() && fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
    }
    Ok(())
}

pub fn sanitize_folder_name(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => ch,
        })
        .collect::<String>()
        .trim()
        .trim_end_matches('.')
        .to_string()
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
