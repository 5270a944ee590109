//! Best crossfade partner search over the cached library.
//!
//! The engine compares the tail of an end song against the cached head
//! features of every start song. Cached matrices span `max_crossfade`
//! seconds; a query for a shorter window keeps the leading
//! `floor(length * frames / max_crossfade)` columns of each cached matrix,
//! relying on the fixed time-to-frame density of the extractor. Frame
//! alignment then truncates both sides to the shorter column count, so a
//! comparison never fails on an off-by-one frame mismatch.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::analysis::extractor::{ExtractError, FeatureExtractor};
use crate::cache::FeatureCache;

/// Errors raised by a single match query. Cache state is never modified by
/// a query, so every variant leaves the library intact.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Requested crossfade length was non-positive, non-finite, or above
    /// the window length the cache was built with. Never clamped.
    #[error("Crossfade length must be in (0, {max_crossfade}] seconds, got {requested}")]
    InvalidLength { requested: f32, max_crossfade: f32 },
    /// Requested crossfade length exceeds the end song itself; the tail
    /// window would start before the beginning of the track.
    #[error("Crossfade length {requested}s exceeds end song duration {duration}s")]
    LongerThanSource { requested: f32, duration: f32 },
    /// Extracting the end song's tail failed.
    #[error(transparent)]
    Extraction(#[from] ExtractError),
}

/// Result of a query: the winning candidate, or nothing comparable.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The best-scoring start song and its cosine similarity in [-1, 1].
    Best { song_id: String, similarity: f32 },
    /// The library is empty, or no candidate produced a valid score.
    /// Distinct from any real similarity value on purpose.
    NoCandidates,
}

/// Stateless query engine over a feature cache and an extractor.
///
/// Holds shared references only; queries are read-only with respect to the
/// cache and safe to run concurrently with other readers.
pub struct MatchEngine<'a, E> {
    cache: &'a FeatureCache,
    extractor: &'a E,
}

impl<'a, E: FeatureExtractor> MatchEngine<'a, E> {
    pub fn new(cache: &'a FeatureCache, extractor: &'a E) -> Self {
        Self { cache, extractor }
    }

    /// Find the cached start song whose head best matches the tail of
    /// `end_source` over a `crossfade_length`-second overlap.
    ///
    /// Candidates are visited in cache insertion order and ties keep the
    /// first candidate seen (strict `>` on the running maximum); that
    /// order is part of the determinism contract, not an accident of map
    /// iteration. An all-zero feature vector has no defined cosine
    /// similarity and such candidates are excluded rather than scored.
    pub fn find_best_match(
        &self,
        end_source: &Path,
        crossfade_length: f32,
    ) -> Result<MatchOutcome, MatchError> {
        let max_crossfade = self.cache.max_crossfade();
        if !crossfade_length.is_finite()
            || crossfade_length <= 0.0
            || crossfade_length > max_crossfade
        {
            return Err(MatchError::InvalidLength {
                requested: crossfade_length,
                max_crossfade,
            });
        }
        if self.cache.is_empty() {
            return Ok(MatchOutcome::NoCandidates);
        }

        let duration = self.extractor.duration_seconds(end_source)?;
        if crossfade_length > duration {
            return Err(MatchError::LongerThanSource {
                requested: crossfade_length,
                duration,
            });
        }
        let tail_offset = duration - crossfade_length;
        let end = self
            .extractor
            .extract(end_source, tail_offset, crossfade_length)?;

        let mut best: Option<(&str, f32)> = None;
        for (song_id, start) in self.cache.iter() {
            let num_frames = scaled_frame_count(crossfade_length, start.frames(), max_crossfade);
            let start_subset = start.take_frames(num_frames);
            let min_frames = end.frames().min(start_subset.frames());
            let end_aligned = end.take_frames(min_frames);
            let start_aligned = start_subset.take_frames(min_frames);

            let Some(similarity) =
                cosine_similarity(end_aligned.values(), start_aligned.values())
            else {
                debug!("No valid similarity for {song_id}; excluding from search");
                continue;
            };
            let beats_best = best.map(|(_, score)| similarity > score).unwrap_or(true);
            if beats_best {
                best = Some((song_id, similarity));
            }
        }

        Ok(match best {
            Some((song_id, similarity)) => MatchOutcome::Best {
                song_id: song_id.to_string(),
                similarity,
            },
            None => MatchOutcome::NoCandidates,
        })
    }
}

/// Leading frame count of a cached matrix covering `crossfade_length` of
/// its `max_crossfade`-second window. Truncation (never rounding) is part
/// of the scoring contract; changing it would shift every score.
pub(crate) fn scaled_frame_count(
    crossfade_length: f32,
    total_frames: usize,
    max_crossfade: f32,
) -> usize {
    ((crossfade_length as f64 * total_frames as f64) / max_crossfade as f64).floor() as usize
}

/// Cosine similarity of two equal-length vectors, or `None` when either
/// norm is zero (undefined rather than NaN).
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return None;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return None;
    }
    Some((similarity as f32).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::matrix::FeatureMatrix;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Extractor serving scripted matrices keyed by file stem, with call
    /// counting to verify when extraction is and is not performed.
    struct ScriptedExtractor {
        matrices: HashMap<String, FeatureMatrix>,
        duration: f32,
        extract_calls: Cell<usize>,
    }

    impl ScriptedExtractor {
        fn new(duration: f32) -> Self {
            Self {
                matrices: HashMap::new(),
                duration,
                extract_calls: Cell::new(0),
            }
        }

        fn with(mut self, stem: &str, matrix: FeatureMatrix) -> Self {
            self.matrices.insert(stem.to_string(), matrix);
            self
        }
    }

    impl FeatureExtractor for ScriptedExtractor {
        fn extract(
            &self,
            source: &Path,
            _start_seconds: f32,
            _duration_seconds: f32,
        ) -> Result<FeatureMatrix, ExtractError> {
            self.extract_calls.set(self.extract_calls.get() + 1);
            let stem = source
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            self.matrices
                .get(stem)
                .cloned()
                .ok_or_else(|| ExtractError::Decode {
                    path: source.to_path_buf(),
                    message: "no scripted matrix".into(),
                })
        }

        fn duration_seconds(&self, _source: &Path) -> Result<f32, ExtractError> {
            Ok(self.duration)
        }
    }

    fn cache_path() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        (dir, path)
    }

    fn constant_matrix(rows: usize, frames: usize, value: f32) -> FeatureMatrix {
        FeatureMatrix::from_parts(rows, frames, vec![value; rows * frames]).unwrap()
    }

    fn ramp_matrix(rows: usize, frames: usize) -> FeatureMatrix {
        let data: Vec<f32> = (0..rows * frames).map(|i| (i % 17) as f32 - 8.0).collect();
        FeatureMatrix::from_parts(rows, frames, data).unwrap()
    }

    #[test]
    fn scaled_frame_count_truncates() {
        // 3 s of a 600-frame 10 s window is 180 frames; 3.33 s is 199.8,
        // which must truncate to 199.
        assert_eq!(scaled_frame_count(3.0, 600, 10.0), 180);
        assert_eq!(scaled_frame_count(3.33, 600, 10.0), 199);
        assert_eq!(scaled_frame_count(10.0, 600, 10.0), 600);
    }

    #[test]
    fn scaled_frame_count_is_monotonic_in_length() {
        let mut previous = 0usize;
        let mut length = 0.1_f32;
        while length <= 10.0 {
            let frames = scaled_frame_count(length, 600, 10.0);
            assert!(frames >= previous, "frames dropped at length {length}");
            previous = frames;
            length += 0.1;
        }
    }

    #[test]
    fn invalid_length_fails_without_extraction() {
        let (_dir, path) = cache_path();
        let extractor = ScriptedExtractor::new(60.0).with("song", constant_matrix(4, 10, 1.0));
        let mut cache = FeatureCache::open(&path, 10.0).unwrap();
        cache.put_if_absent("song", Path::new("song.mp3"), &extractor).unwrap();
        let calls_after_setup = extractor.extract_calls.get();

        let engine = MatchEngine::new(&cache, &extractor);
        for length in [0.0_f32, -1.0, 10.5, f32::NAN, f32::INFINITY] {
            let err = engine.find_best_match(Path::new("end.mp3"), length).unwrap_err();
            assert!(matches!(err, MatchError::InvalidLength { .. }), "length {length}");
        }
        assert_eq!(extractor.extract_calls.get(), calls_after_setup);
    }

    #[test]
    fn crossfade_longer_than_end_song_is_rejected() {
        let (_dir, path) = cache_path();
        let extractor = ScriptedExtractor::new(4.0).with("song", constant_matrix(4, 10, 1.0));
        let mut cache = FeatureCache::open(&path, 10.0).unwrap();
        cache.put_if_absent("song", Path::new("song.mp3"), &extractor).unwrap();

        let engine = MatchEngine::new(&cache, &extractor);
        let err = engine.find_best_match(Path::new("end.mp3"), 5.0).unwrap_err();
        assert!(matches!(err, MatchError::LongerThanSource { .. }));
    }

    #[test]
    fn empty_library_yields_no_candidates() {
        let (_dir, path) = cache_path();
        let extractor = ScriptedExtractor::new(60.0);
        let cache = FeatureCache::open(&path, 10.0).unwrap();

        let engine = MatchEngine::new(&cache, &extractor);
        let outcome = engine.find_best_match(Path::new("end.mp3"), 5.0).unwrap();
        assert_eq!(outcome, MatchOutcome::NoCandidates);
        assert_eq!(extractor.extract_calls.get(), 0);
    }

    #[test]
    fn matching_a_song_against_itself_scores_one() {
        let (_dir, path) = cache_path();
        let matrix = ramp_matrix(4, 40);
        let extractor = ScriptedExtractor::new(10.0)
            .with("song", matrix.clone())
            .with("end", matrix.take_frames(40));
        let mut cache = FeatureCache::open(&path, 10.0).unwrap();
        cache.put_if_absent("song", Path::new("song.mp3"), &extractor).unwrap();

        let engine = MatchEngine::new(&cache, &extractor);
        let outcome = engine.find_best_match(Path::new("end.mp3"), 10.0).unwrap();
        let MatchOutcome::Best { song_id, similarity } = outcome else {
            panic!("expected a best match");
        };
        assert_eq!(song_id, "song");
        assert!((similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identical_prefix_wins_regardless_of_other_candidates() {
        // Cached A and B are 20x600 built at max_crossfade 10; a 5 s query
        // keeps 300 frames. The end features equal A's first 300 columns.
        let (_dir, path) = cache_path();
        let a = ramp_matrix(20, 600);
        let end = a.take_frames(300);
        let b = constant_matrix(20, 600, 0.25);
        let extractor = ScriptedExtractor::new(30.0)
            .with("a", a)
            .with("b", b)
            .with("end", end);
        let mut cache = FeatureCache::open(&path, 10.0).unwrap();
        cache.put_if_absent("a", Path::new("a.mp3"), &extractor).unwrap();
        cache.put_if_absent("b", Path::new("b.mp3"), &extractor).unwrap();

        let engine = MatchEngine::new(&cache, &extractor);
        let outcome = engine.find_best_match(Path::new("end.mp3"), 5.0).unwrap();
        let MatchOutcome::Best { song_id, similarity } = outcome else {
            panic!("expected a best match");
        };
        assert_eq!(song_id, "a");
        assert!((similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_keep_the_first_cached_candidate() {
        let (_dir, path) = cache_path();
        let matrix = constant_matrix(4, 40, 0.5);
        let extractor = ScriptedExtractor::new(20.0)
            .with("second", matrix.clone())
            .with("first", matrix.clone())
            .with("end", matrix.take_frames(16));
        let mut cache = FeatureCache::open(&path, 10.0).unwrap();
        cache.put_if_absent("second", Path::new("second.mp3"), &extractor).unwrap();
        cache.put_if_absent("first", Path::new("first.mp3"), &extractor).unwrap();

        let engine = MatchEngine::new(&cache, &extractor);
        let outcome = engine.find_best_match(Path::new("end.mp3"), 4.0).unwrap();
        let MatchOutcome::Best { song_id, .. } = outcome else {
            panic!("expected a best match");
        };
        assert_eq!(song_id, "second", "insertion order breaks the tie");
    }

    #[test]
    fn zero_candidates_with_valid_scores_yields_no_candidates() {
        let (_dir, path) = cache_path();
        let extractor = ScriptedExtractor::new(20.0)
            .with("silent", constant_matrix(4, 40, 0.0))
            .with("end", constant_matrix(4, 16, 0.5));
        let mut cache = FeatureCache::open(&path, 10.0).unwrap();
        cache.put_if_absent("silent", Path::new("silent.mp3"), &extractor).unwrap();

        let engine = MatchEngine::new(&cache, &extractor);
        let outcome = engine.find_best_match(Path::new("end.mp3"), 4.0).unwrap();
        assert_eq!(outcome, MatchOutcome::NoCandidates);
    }

    #[test]
    fn mismatched_frame_counts_are_aligned_not_fatal() {
        let (_dir, path) = cache_path();
        // End extraction yields 21 frames, the cached subset only 16.
        let extractor = ScriptedExtractor::new(20.0)
            .with("song", ramp_matrix(4, 40))
            .with("end", ramp_matrix(4, 21));
        let mut cache = FeatureCache::open(&path, 10.0).unwrap();
        cache.put_if_absent("song", Path::new("song.mp3"), &extractor).unwrap();

        let engine = MatchEngine::new(&cache, &extractor);
        assert!(engine.find_best_match(Path::new("end.mp3"), 4.0).is_ok());
    }

    #[test]
    fn cosine_similarity_handles_edge_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), None);
        assert_eq!(cosine_similarity(&[], &[]), None);
        let same = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((same - 1.0).abs() < 1e-6);
        let opposite = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((opposite + 1.0).abs() < 1e-6);
    }
}
