// src/workspace.rs
//
// Filesystem side of the pipeline: listing the source folder, the
// per-month archive folder, and the rename+move of processed files.

use crate::error::ArchiveError;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::info;

/// Longest filename stem we will produce when renaming to a purpose.
const MAX_STEM_CHARS: usize = 120;

/// The calendar-month period identifier, e.g. "202504". Keys the
/// archive folder and its ledger.
pub fn current_period() -> Result<String, ArchiveError> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(format_description!("[year][month]"))?)
}

/// Today's date in `yyyy-MM-dd`, stamped into each ledger row.
pub fn execution_date() -> Result<String, ArchiveError> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(format_description!("[year]-[month]-[day]"))?)
}

/// List the PDF files sitting directly in the source folder, sorted by
/// name for deterministic enumeration order. The archive subfolder and
/// anything non-PDF are skipped.
pub fn list_pdfs(source_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let entries = fs::read_dir(source_dir).map_err(|source| ArchiveError::ListSource {
        path: source_dir.to_path_buf(),
        source,
    })?;

    let mut pdfs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ArchiveError::ListSource {
            path: source_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

/// Find or create the archive subfolder for the given period inside
/// the source folder. Idempotent: re-running within the same month
/// reuses the existing folder.
pub fn find_or_create_archive(source_dir: &Path, period: &str) -> Result<PathBuf, ArchiveError> {
    let archive = source_dir.join(period);
    if archive.is_dir() {
        info!(path = %archive.display(), "Reusing existing archive folder");
        return Ok(archive);
    }
    fs::create_dir_all(&archive).map_err(|source| ArchiveError::CreateFolder {
        path: archive.clone(),
        source,
    })?;
    info!(path = %archive.display(), "Created archive folder");
    Ok(archive)
}

/// Move a processed document into the archive folder, optionally
/// renaming it to the extracted purpose. Implemented as copy to the
/// destination then remove from the source (two non-atomic steps, the
/// source is only removed after the copy succeeded).
///
/// Returns the final destination path.
pub fn relocate(
    path: &Path,
    archive_dir: &Path,
    new_stem: Option<&str>,
) -> Result<PathBuf, ArchiveError> {
    let original_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed.pdf")
        .to_string();

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("pdf")
        .to_string();

    // Rename is cosmetic; an unusable purpose falls back to the
    // original name rather than failing the move.
    let base_name = match new_stem.map(sanitize_stem) {
        Some(stem) if !stem.is_empty() => format!("{stem}.{extension}"),
        _ => original_name.clone(),
    };

    let target = unique_target(archive_dir, &base_name);

    let relocate_err = |source: std::io::Error| ArchiveError::Relocate {
        path: path.to_path_buf(),
        source,
    };
    fs::copy(path, &target).map_err(relocate_err)?;
    fs::remove_file(path).map_err(relocate_err)?;

    info!(from = %original_name, to = %target.display(), "Relocated document");
    Ok(target)
}

/// Strip characters that are unsafe in filenames and cap the length.
fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    trimmed.chars().take(MAX_STEM_CHARS).collect()
}

/// Pick a destination name that does not collide with an existing file.
fn unique_target(archive_dir: &Path, base_name: &str) -> PathBuf {
    let candidate = archive_dir.join(base_name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match base_name.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), format!(".{e}")),
        None => (base_name.to_string(), String::new()),
    };
    for n in 2.. {
        let candidate = archive_dir.join(format!("{stem} ({n}){ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("ran out of collision suffixes");
}
