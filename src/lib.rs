//! Crossfade partner matching for audio libraries.
//!
//! segue scores how well the tail of one track blends into the head of
//! every track in a library. Start-song features are extracted once from
//! each song's first `max_crossfade` seconds and kept in a persistent
//! cache; a query extracts the end song's tail at the requested overlap
//! length, rescales each cached matrix down to that length, and ranks
//! candidates by cosine similarity.
//!
//! ```no_run
//! use std::path::Path;
//! use segue::{FeatureCache, MatchEngine, SpectralExtractor, library};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = SpectralExtractor::new();
//! let mut cache = FeatureCache::open("start_features.json", 10.0)?;
//! library::scan_directory(&mut cache, &extractor, Path::new("songs"))?;
//!
//! let engine = MatchEngine::new(&cache, &extractor);
//! let outcome = engine.find_best_match(Path::new("current_track.mp3"), 5.0)?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod app_dirs;
mod atomic_io;
pub mod cache;
pub mod config;
pub mod library;
pub mod logging;
pub mod matcher;

pub use analysis::extractor::{ExtractError, FEATURE_ROWS, FeatureExtractor, SpectralExtractor};
pub use analysis::matrix::FeatureMatrix;
pub use cache::{CACHE_SCHEMA_VERSION, CacheError, FeatureCache};
pub use config::MatcherConfig;
pub use library::{ScanError, ScanReport, scan_directory, scan_directory_with_cancel};
pub use matcher::{MatchEngine, MatchError, MatchOutcome};
