//! Directory scanning that feeds the feature cache.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{info, warn};

use crate::analysis::extractor::FeatureExtractor;
use crate::cache::{CacheError, FeatureCache};

/// Recognized audio file extensions, matched case-insensitively.
pub const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "wav", "flac", "ogg"];

/// Errors that abort a whole library scan. Per-file extraction failures do
/// not; those land in [`ScanReport::failed`].
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Library root is not a directory: {0}")]
    InvalidRoot(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Cache persistence failed; partial progress up to this point is
    /// already durable, but continuing would silently drop entries.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Outcome of one scan, for operators auditing cache completeness.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Identifiers newly added to the cache, in scan order.
    pub added: Vec<String>,
    /// Files whose extraction failed, with the reason; the scan went on.
    pub failed: Vec<(PathBuf, String)>,
    /// Audio files that were already cached.
    pub already_cached: usize,
    /// True when the scan stopped early because cancellation was requested.
    pub cancelled: bool,
}

impl ScanReport {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }
}

/// Scan a directory of audio files into the cache.
///
/// Enumeration is flat (no recursion) and follows directory order. The
/// song identifier is the filename without its extension; when two files
/// share a stem the first one scanned wins and the other is skipped by the
/// cache's idempotent insert. A file that fails to extract is reported and
/// skipped; the rest of the scan proceeds.
pub fn scan_directory(
    cache: &mut FeatureCache,
    extractor: &impl FeatureExtractor,
    directory: &Path,
) -> Result<ScanReport, ScanError> {
    scan_directory_with_cancel(cache, extractor, directory, &AtomicBool::new(false))
}

/// [`scan_directory`] with best-effort cancellation.
///
/// The flag is checked between files; every insertion is already durable,
/// so a cancelled scan needs no cleanup and can simply be rerun later.
pub fn scan_directory_with_cancel(
    cache: &mut FeatureCache,
    extractor: &impl FeatureExtractor,
    directory: &Path,
    cancel: &AtomicBool,
) -> Result<ScanReport, ScanError> {
    if !directory.is_dir() {
        return Err(ScanError::InvalidRoot(directory.to_path_buf()));
    }
    let entries = std::fs::read_dir(directory).map_err(|source| ScanError::Io {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut report = ScanReport::default();
    for entry in entries {
        if cancel.load(Ordering::Relaxed) {
            report.cancelled = true;
            break;
        }
        let entry = entry.map_err(|source| ScanError::Io {
            path: directory.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() || !has_audio_extension(&path) {
            continue;
        }
        let Some(song_id) = song_id_for(&path) else {
            continue;
        };
        if cache.contains(&song_id) {
            report.already_cached += 1;
            continue;
        }
        match cache.put_if_absent(&song_id, &path, extractor) {
            Ok(true) => report.added.push(song_id),
            Ok(false) => report.already_cached += 1,
            Err(CacheError::Extraction(err)) => {
                warn!("Skipping {}: {err}", path.display());
                report.failed.push((path, err.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(
        "Library scan of {} complete: {} added, {} already cached, {} failed",
        directory.display(),
        report.added.len(),
        report.already_cached,
        report.failed.len()
    );
    Ok(report)
}

/// Song identifier for an audio path: the filename minus its extension.
pub fn song_id_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}
