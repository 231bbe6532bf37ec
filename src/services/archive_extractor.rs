use std::fs::File;
use std::path::Path;
use std::process::Command;

use crate::errors::{LauncherError, Result};
use crate::models::ArchiveKind;

/// Candidate external extractor. Which tools are present on the target host
/// is unknown at build time, so candidates are data and are tried in order
/// until one exits zero.
struct ExtractorTool {
    program: &'static str,
    /// 7-Zip takes `-o<dir>`; unrar takes the destination as a trailing arg.
    seven_zip_style: bool,
}

const RAR_TOOLS: &[ExtractorTool] = &[
    ExtractorTool {
        program: "unrar",
        seven_zip_style: false,
    },
    ExtractorTool {
        program: "C:\\Program Files\\WinRAR\\UnRAR.exe",
        seven_zip_style: false,
    },
    ExtractorTool {
        program: "C:\\Program Files (x86)\\WinRAR\\UnRAR.exe",
        seven_zip_style: false,
    },
    ExtractorTool {
        program: "7z",
        seven_zip_style: true,
    },
    ExtractorTool {
        program: "C:\\Program Files\\7-Zip\\7z.exe",
        seven_zip_style: true,
    },
    ExtractorTool {
        program: "C:\\Program Files (x86)\\7-Zip\\7z.exe",
        seven_zip_style: true,
    },
];

#[derive(Clone, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Unpacks `archive` into `destination`, overwriting on conflict. Zip is
    /// handled in-process; rar goes through the external tool chain. The work
    /// runs on the blocking pool so the rest of the system stays responsive.
    pub async fn extract(
        &self,
        archive: &Path,
        destination: &Path,
        kind: ArchiveKind,
    ) -> Result<()> {
        let archive = archive.to_path_buf();
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || match kind {
            ArchiveKind::Zip => extract_zip(&archive, &destination),
            ArchiveKind::Rar => extract_rar(&archive, &destination),
        })
        .await
        .map_err(|err| LauncherError::Extraction(format!("extraction task failed: {err}")))?
    }
}

fn extract_zip(archive: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|err| LauncherError::Extraction(format!("invalid zip archive: {err}")))?;
    zip.extract(destination)
        .map_err(|err| LauncherError::Extraction(format!("zip extraction failed: {err}")))?;
    Ok(())
}

fn extract_rar(archive: &Path, destination: &Path) -> Result<()> {
    for tool in RAR_TOOLS {
        let status = Command::new(tool.program)
            .args(rar_args(tool, archive, destination))
            .status();

        match status {
            Ok(status) if status.success() => {
                tracing::info!("extracted {} with {}", archive.display(), tool.program);
                return Ok(());
            }
            Ok(status) => {
                tracing::debug!(
                    "extractor {} exited with {status}, trying next candidate",
                    tool.program
                );
            }
            // Tool not installed at this path; try the next one.
            Err(_) => continue,
        }
    }

    Err(LauncherError::Extraction(
        "no working rar extractor found; install WinRAR or 7-Zip".to_string(),
    ))
}

fn rar_args(tool: &ExtractorTool, archive: &Path, destination: &Path) -> Vec<String> {
    if tool.seven_zip_style {
        vec![
            "x".to_string(),
            "-y".to_string(),
            format!("-o{}", destination.display()),
            archive.display().to_string(),
        ]
    } else {
        vec![
            "x".to_string(),
            "-y".to_string(),
            archive.display().to_string(),
            destination.display().to_string(),
        ]
    }
}

/// Deletes the archive after a successful extraction when the settings ask
/// for it. Failure to delete is logged, never fatal.
pub fn discard_archive(archive: &Path) {
    if let Err(err) = std::fs::remove_file(archive) {
        tracing::warn!("could not delete archive {}: {err}", archive.display());
    }
}
