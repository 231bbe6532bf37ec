use std::fs;
use std::path::{Path, PathBuf};

/// Executables whose names contain one of these fragments are installers,
/// updaters or redistributable runtimes, not the game itself.
const EXCLUDED_NAME_FRAGMENTS: &[&str] = &[
    "unins", "setup", "install", "update", "redist", "vcredist", "dxsetup", "directx", "dotnet",
];

const INSTRUCTIONS_FILE: &str = "HOW_TO_LAUNCH.txt";
const MAX_SCAN_DEPTH: u32 = 2;

/// Heuristically locates the game's main executable under `root`: immediate
/// files first, then subdirectories up to depth 2. Returns the first
/// qualifying match in directory-listing order; best-effort, `None` is a
/// valid outcome that the caller resolves via manual selection.
pub fn locate_executable(root: &Path) -> Option<PathBuf> {
    scan_dir(root, 0)
}

fn scan_dir(dir: &Path, depth: u32) -> Option<PathBuf> {
    if depth > MAX_SCAN_DEPTH {
        return None;
    }

    let entries: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries.flatten().collect(),
        Err(_) => return None,
    };

    for entry in &entries {
        let path = entry.path();
        if path.is_file() && is_game_executable(&path) {
            return Some(path);
        }
    }

    for entry in &entries {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = scan_dir(&path, depth + 1) {
                return Some(found);
            }
        }
    }

    None
}

fn is_game_executable(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lowered = name.to_ascii_lowercase();
    if !lowered.ends_with(".exe") {
        return false;
    }
    !EXCLUDED_NAME_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// Drops a plain-text help file into the install root explaining manual
/// executable selection. Written once; an existing file is left alone.
pub fn write_instructions(root: &Path, game_title: &str) -> std::io::Result<()> {
    let path = root.join(INSTRUCTIONS_FILE);
    if path.exists() {
        return Ok(());
    }

    let text = format!(
        "=== How to launch ===\n\
         \n\
         Game: {game_title}\n\
         \n\
         If the launcher did not find the game's .exe automatically:\n\
         \n\
         1. Open this folder from the library view\n\
         2. Look for the game's main .exe file\n\
         3. Press Play; you will be asked to pick the .exe once\n\
         4. The selected path is saved for future launches\n"
    );
    fs::write(path, text)
}
