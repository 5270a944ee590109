//! Persistent store of start-song feature matrices.
//!
//! Each entry holds the features of a song's first `max_crossfade` seconds.
//! The store is written through to disk after every successful insertion so
//! a crash mid-scan loses at most the song being extracted. Entries keep
//! their insertion order; the match engine's tie-breaking depends on it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::analysis::extractor::{ExtractError, FeatureExtractor};
use crate::analysis::matrix::FeatureMatrix;
use crate::atomic_io::replace_file_atomic;

/// On-disk schema version; bump when the cache layout changes so stale
/// stores are detected at load instead of miscomputing silently.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Errors raised while opening, mutating, or persisting the feature cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// `max_crossfade` must be positive and finite.
    #[error("max_crossfade must be a positive number of seconds, got {0}")]
    InvalidMaxCrossfade(f32),
    /// The cache file exists but could not be read.
    #[error("Failed to read feature cache {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The cache file exists but does not parse or violates an invariant.
    /// Corruption is fatal; the store is never silently reset.
    #[error("Feature cache {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
    /// The cache was written by an incompatible version of this crate.
    #[error("Feature cache {path} has schema version {found}, expected {expected}")]
    SchemaVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    /// The cache was built under a different `max_crossfade`; its frame
    /// scaling would be silently wrong for this configuration.
    #[error(
        "Feature cache {path} was built with max_crossfade {cached}s but {configured}s is configured"
    )]
    MaxCrossfadeMismatch {
        path: PathBuf,
        cached: f32,
        configured: f32,
    },
    /// Persisting the store to disk failed.
    #[error("Failed to write feature cache {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Feature extraction failed for the song being inserted.
    #[error(transparent)]
    Extraction(#[from] ExtractError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    schema_version: u32,
    max_crossfade: f32,
    entries: Vec<CacheEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
    song_id: String,
    matrix: FeatureMatrix,
}

/// Song id to start-features map, persisted as a single JSON blob.
///
/// Mutation takes `&mut self`, so the borrow checker provides the
/// single-writer, no-concurrent-reader discipline the persistence model
/// assumes. Writes are atomic (temp file + rename).
pub struct FeatureCache {
    path: PathBuf,
    max_crossfade: f32,
    entries: Vec<CacheEntry>,
    index: HashMap<String, usize>,
}

impl FeatureCache {
    /// Open a cache at `path`, loading any existing store.
    ///
    /// A missing file starts an empty cache. An unparseable file, a schema
    /// mismatch, or a `max_crossfade` mismatch is an error; silently
    /// discarding or reinterpreting an existing store would corrupt every
    /// later frame-scaling computation.
    pub fn open(path: impl Into<PathBuf>, max_crossfade: f32) -> Result<Self, CacheError> {
        let path = path.into();
        if !max_crossfade.is_finite() || max_crossfade <= 0.0 {
            return Err(CacheError::InvalidMaxCrossfade(max_crossfade));
        }

        let mut cache = Self {
            path,
            max_crossfade,
            entries: Vec::new(),
            index: HashMap::new(),
        };
        match std::fs::read(&cache.path) {
            Ok(bytes) => cache.load_store(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CacheError::Read {
                    path: cache.path,
                    source,
                });
            }
        }
        Ok(cache)
    }

    fn load_store(&mut self, bytes: &[u8]) -> Result<(), CacheError> {
        let store: CacheFile =
            serde_json::from_slice(bytes).map_err(|err| CacheError::Corrupt {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        if store.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::SchemaVersion {
                path: self.path.clone(),
                found: store.schema_version,
                expected: CACHE_SCHEMA_VERSION,
            });
        }
        if store.max_crossfade != self.max_crossfade {
            return Err(CacheError::MaxCrossfadeMismatch {
                path: self.path.clone(),
                cached: store.max_crossfade,
                configured: self.max_crossfade,
            });
        }
        for (position, entry) in store.entries.iter().enumerate() {
            entry.matrix.validate().map_err(|message| CacheError::Corrupt {
                path: self.path.clone(),
                message,
            })?;
            if self
                .index
                .insert(entry.song_id.clone(), position)
                .is_some()
            {
                return Err(CacheError::Corrupt {
                    path: self.path.clone(),
                    message: format!("duplicate song id {:?}", entry.song_id),
                });
            }
        }
        self.entries = store.entries;
        info!(
            "Loaded {} cached start songs from {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    /// The fixed window length, in seconds, every entry was extracted with.
    pub fn max_crossfade(&self) -> f32 {
        self.max_crossfade
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, song_id: &str) -> bool {
        self.index.contains_key(song_id)
    }

    /// Cached start features for a song, if present.
    pub fn matrix(&self, song_id: &str) -> Option<&FeatureMatrix> {
        self.index
            .get(song_id)
            .map(|&position| &self.entries[position].matrix)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureMatrix)> {
        self.entries
            .iter()
            .map(|entry| (entry.song_id.as_str(), &entry.matrix))
    }

    /// Extract and store the first `max_crossfade` seconds of `source`
    /// under `song_id`, unless that id is already cached.
    ///
    /// Returns `true` when a new entry was added. The no-op path performs
    /// no extraction, so re-scanning a library is cheap and idempotent.
    /// Every successful insertion is persisted immediately.
    pub fn put_if_absent(
        &mut self,
        song_id: &str,
        source: &Path,
        extractor: &impl FeatureExtractor,
    ) -> Result<bool, CacheError> {
        if self.contains(song_id) {
            return Ok(false);
        }
        let matrix = extractor.extract(source, 0.0, self.max_crossfade)?;
        self.index.insert(song_id.to_string(), self.entries.len());
        self.entries.push(CacheEntry {
            song_id: song_id.to_string(),
            matrix,
        });
        if let Err(err) = self.persist() {
            // Keep memory and disk in agreement when the durable write fails.
            self.entries.pop();
            self.index.remove(song_id);
            return Err(err);
        }
        info!("Cached start features for {song_id}");
        Ok(true)
    }

    /// Serialize the full store and replace the cache file atomically.
    pub fn persist(&self) -> Result<(), CacheError> {
        let store = CacheFile {
            schema_version: CACHE_SCHEMA_VERSION,
            max_crossfade: self.max_crossfade,
            entries: self.entries.clone(),
        };
        let bytes = serde_json::to_vec(&store).map_err(|err| CacheError::Corrupt {
            path: self.path.clone(),
            message: format!("serialization failed: {err}"),
        })?;
        replace_file_atomic(&self.path, &bytes).map_err(|source| CacheError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
