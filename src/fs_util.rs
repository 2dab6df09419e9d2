use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use zip::ZipArchive;

use crate::error::PrepError;
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub failed: usize,
}

/// Extracts every entry of `zip_path` below `target_dir`.
///
/// Only an archive that cannot be opened at all is an error. A failing entry
/// is logged, its partial output removed, and extraction moves on to the next
/// one.
pub fn extract_zip(
    zip_path: &Path,
    target_dir: &Path,
    sink: &dyn ProgressSink,
) -> Result<ExtractSummary, PrepError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| PrepError::Archive(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| PrepError::Archive(format!("read zip {}: {err}", zip_path.display())))?;
    fs::create_dir_all(target_dir).map_err(|err| PrepError::Filesystem(err.to_string()))?;

    let total = archive.len() as u64;
    let mut summary = ExtractSummary::default();
    for i in 0..archive.len() {
        match extract_entry(&mut archive, i, target_dir) {
            Ok(true) => summary.extracted += 1,
            Ok(false) => {}
            Err(message) => {
                tracing::warn!(archive = %zip_path.display(), entry = i, "{message}");
                summary.failed += 1;
            }
        }
        sink.event(ProgressEvent::Extract {
            done: i as u64 + 1,
            total,
        });
    }
    sink.event(ProgressEvent::Finished {
        message: format!(
            "Extracted {} files from {}",
            summary.extracted,
            zip_path.display()
        ),
        elapsed: None,
    });
    Ok(summary)
}

/// Returns whether a file was written; directories report `false`.
fn extract_entry(
    archive: &mut ZipArchive<fs::File>,
    index: usize,
    target_dir: &Path,
) -> Result<bool, String> {
    let mut entry = archive.by_index(index).map_err(|err| err.to_string())?;
    let entry_path = match entry.enclosed_name() {
        Some(path) => target_dir.join(path),
        None => return Err(format!("unsafe entry path: {}", entry.name())),
    };

    if entry.is_dir() {
        fs::create_dir_all(&entry_path).map_err(|err| err.to_string())?;
        return Ok(false);
    }

    if let Some(parent) = entry_path.parent() {
        fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }
    let mut outfile = fs::File::create(&entry_path).map_err(|err| err.to_string())?;
    if let Err(err) = io::copy(&mut entry, &mut outfile) {
        drop(outfile);
        let _ = fs::remove_file(&entry_path);
        return Err(format!("{}: {err}", entry_path.display()));
    }
    Ok(true)
}

/// Moves a file, creating the destination's parent directories. Falls back to
/// copy and remove when a rename is not possible (e.g. across devices).
pub fn move_file(from: &Path, to: &Path) -> Result<(), PrepError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|err| PrepError::Filesystem(err.to_string()))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|err| {
        PrepError::Filesystem(format!(
            "move {} -> {}: {err}",
            from.display(),
            to.display()
        ))
    })?;
    fs::remove_file(from).map_err(|err| PrepError::Filesystem(err.to_string()))
}

pub fn rename_dir_replacing(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}

/// Regular files exactly `depth` path components below `root`, sorted.
/// Hidden names are not descended into or returned.
pub fn files_at_depth(root: &Path, depth: usize) -> Result<Vec<PathBuf>, PrepError> {
    let mut level = vec![root.to_path_buf()];
    for current in 1..=depth {
        let mut next = Vec::new();
        for dir in &level {
            let entries =
                fs::read_dir(dir).map_err(|err| PrepError::Filesystem(err.to_string()))?;
            for entry in entries {
                let entry = entry.map_err(|err| PrepError::Filesystem(err.to_string()))?;
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let wanted = if current == depth {
                    path.is_file()
                } else {
                    path.is_dir()
                };
                if wanted {
                    next.push(path);
                }
            }
        }
        level = next;
    }
    level.sort();
    Ok(level)
}
