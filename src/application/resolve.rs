//! Locating, verifying and placing the file a fetch produced.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::api::ytdlp::is_partial_name;
use crate::api::FetchReport;
use crate::domain::{AppError, ClipSection, CollisionPolicy};
use crate::utils::{cap_name, sanitize_filename, MAX_FILENAME_BYTES, MAX_FILENAME_CHARS};

const MAX_SUFFIX: u32 = 9999;

/// Where the finished file ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Moved(PathBuf),
    /// A non-empty file with the target name was already there.
    Existing(PathBuf),
}

pub fn target_file_name(stem: &str, extension: &str) -> String {
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, extension)
    }
}

/// Tag a clip's stem with its range so a clip and the full video never share a name.
pub fn section_stem(stem: &str, section: Option<ClipSection>) -> String {
    let Some(section) = section else {
        return stem.to_string();
    };
    let tag = format!("[{}-{}]", section.start_secs, section.end_secs);
    let base = cap_name(
        stem,
        MAX_FILENAME_CHARS.saturating_sub(tag.chars().count() + 1),
        MAX_FILENAME_BYTES.saturating_sub(tag.len() + 1),
    );
    if base.is_empty() {
        tag
    } else {
        format!("{} {}", base, tag)
    }
}

fn suffixed_file_name(stem: &str, extension: &str, n: u32) -> String {
    target_file_name(&format!("{} ({})", stem, n), extension)
}

/// Size of a regular, non-empty file at `path`, if there is one.
pub async fn non_empty_file(path: &Path) -> Option<u64> {
    let meta = fs::metadata(path).await.ok()?;
    (meta.is_file() && meta.len() > 0).then_some(meta.len())
}

/// Find the file the fetch produced inside `work_dir`.
///
/// Tries the reported manifest first, then the path re-derived from the
/// sanitized title, then a scan of `work_dir`.
pub async fn resolve_output(
    work_dir: &Path,
    report: &FetchReport,
    title: Option<&str>,
    extension: &str,
) -> Result<PathBuf, AppError> {
    for path in report.files.iter().rev() {
        if is_regular_file(path).await {
            debug!(path = %path.display(), "resolved output from manifest");
            return Ok(path.clone());
        }
        debug!(path = %path.display(), "manifest entry missing on disk");
    }

    let stem = title.map(sanitize_filename).filter(|s| !s.is_empty());

    if let Some(stem) = &stem {
        let derived = work_dir.join(target_file_name(stem, extension));
        if is_regular_file(&derived).await {
            debug!(path = %derived.display(), "resolved output from title");
            return Ok(derived);
        }
    }

    match scan_for_output(work_dir, stem.as_deref()).await? {
        Some(found) => {
            debug!(path = %found.display(), "resolved output by directory scan");
            Ok(found)
        }
        None => Err(AppError::VerificationFailed(format!(
            "no output file was produced in {}",
            work_dir.display()
        ))),
    }
}

async fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Prefer a file whose stem matches; otherwise take the largest finished file.
async fn scan_for_output(dir: &Path, stem: Option<&str>) -> Result<Option<PathBuf>, AppError> {
    let mut entries = fs::read_dir(dir).await?;
    let mut best: Option<(bool, u64, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || is_partial_name(&name) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }

        let path = entry.path();
        let matches_stem = match (stem, path.file_stem()) {
            (Some(stem), Some(file_stem)) => file_stem.to_string_lossy().starts_with(stem),
            _ => false,
        };
        let candidate = (matches_stem, meta.len(), path);
        if best
            .as_ref()
            .is_none_or(|current| (candidate.0, candidate.1) > (current.0, current.1))
        {
            best = Some(candidate);
        }
    }

    Ok(best.map(|(_, _, path)| path))
}

/// The file must exist and be non-empty. Returns its size.
pub async fn verify_file(path: &Path) -> Result<u64, AppError> {
    match fs::metadata(path).await {
        Ok(meta) if !meta.is_file() => Err(AppError::VerificationFailed(format!(
            "{} is not a regular file",
            path.display()
        ))),
        Ok(meta) if meta.len() == 0 => Err(AppError::VerificationFailed(format!(
            "{} is empty",
            path.display()
        ))),
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::VerificationFailed(format!(
            "{} is missing",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Move `source` into `dest_dir` as `stem.extension` without overwriting anything.
///
/// The destination name is reserved with an exclusive create before the
/// rename, so concurrent requests never clobber each other.
pub async fn place(
    source: &Path,
    dest_dir: &Path,
    stem: &str,
    extension: &str,
    policy: CollisionPolicy,
) -> Result<Placement, AppError> {
    for n in 0..=MAX_SUFFIX {
        let name = if n == 0 {
            target_file_name(stem, extension)
        } else {
            suffixed_file_name(stem, extension, n)
        };
        let target = dest_dir.join(&name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(reservation) => {
                drop(reservation);
                if let Err(e) = fs::rename(source, &target).await {
                    if let Err(cleanup) = fs::remove_file(&target).await {
                        warn!(path = %target.display(), error = %cleanup, "failed to release reserved name");
                    }
                    return Err(AppError::FileSystem(format!(
                        "failed to move {} to {}: {}",
                        source.display(),
                        target.display(),
                        e
                    )));
                }
                return Ok(Placement::Moved(target));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if n == 0 && policy == CollisionPolicy::Skip && non_empty_file(&target).await.is_some() {
                    debug!(path = %target.display(), "keeping existing file");
                    return Ok(Placement::Existing(target));
                }
                continue;
            }
            Err(e) => {
                return Err(AppError::FileSystem(format!(
                    "cannot create {}: {}",
                    target.display(),
                    e
                )))
            }
        }
    }

    Err(AppError::FileSystem(format!(
        "no free file name for {} in {}",
        stem,
        dest_dir.display()
    )))
}
