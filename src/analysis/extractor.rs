//! Windowed feature extraction behind the [`FeatureExtractor`] seam.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::chroma::{CHROMA_BINS, ChromaFold};
use super::contrast::{CONTRAST_BANDS, ContrastBands};
use super::decode::{decode_window, probe_duration_seconds};
use super::matrix::FeatureMatrix;
use super::mel::{MFCC_COEFFS, MelBank};
use super::prep::{downmix_to_mono, resample_linear};
use super::stft::{STFT_FRAME_SIZE, STFT_HOP_SIZE, power_frames};
use super::ANALYSIS_SAMPLE_RATE;

/// Descriptor channels per frame: chroma, then MFCC, then spectral contrast.
pub const FEATURE_ROWS: usize = CHROMA_BINS + MFCC_COEFFS + CONTRAST_BANDS;

/// Errors raised while probing or extracting features from one audio file.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file could not be opened, probed, or decoded.
    #[error("Extraction failed for {path}: {message}")]
    Decode { path: PathBuf, message: String },
    /// The requested window starts past the end of the source.
    #[error(
        "Window start {start_seconds}s is beyond the end of {path} ({duration_seconds}s)"
    )]
    StartBeyondEnd {
        path: PathBuf,
        start_seconds: f32,
        duration_seconds: f32,
    },
    /// The requested window shape is not extractable.
    #[error("Window start {start}s / duration {duration}s is invalid")]
    InvalidWindow { start: f32, duration: f32 },
}

/// Produces descriptor matrices for time windows of audio sources.
///
/// Implementations must be deterministic for a given (source, offset,
/// duration, configuration) tuple; cached matrices and query-time matrices
/// are only comparable when they come from the same extractor setup.
pub trait FeatureExtractor {
    /// Extract features for `[start, start + duration)` seconds of `source`.
    fn extract(
        &self,
        source: &Path,
        start_seconds: f32,
        duration_seconds: f32,
    ) -> Result<FeatureMatrix, ExtractError>;

    /// Total duration of `source` in seconds.
    fn duration_seconds(&self, source: &Path) -> Result<f32, ExtractError>;
}

/// Production extractor: symphonia decode, mono downmix, resample to
/// 22.05 kHz, Hann STFT, and a stacked chroma + MFCC + spectral-contrast
/// matrix with [`FEATURE_ROWS`] rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralExtractor;

impl SpectralExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureExtractor for SpectralExtractor {
    fn extract(
        &self,
        source: &Path,
        start_seconds: f32,
        duration_seconds: f32,
    ) -> Result<FeatureMatrix, ExtractError> {
        if !start_seconds.is_finite()
            || !duration_seconds.is_finite()
            || start_seconds < 0.0
            || duration_seconds <= 0.0
        {
            return Err(ExtractError::InvalidWindow {
                start: start_seconds,
                duration: duration_seconds,
            });
        }
        if start_seconds > 0.0 {
            let total = self.duration_seconds(source)?;
            if start_seconds >= total {
                return Err(ExtractError::StartBeyondEnd {
                    path: source.to_path_buf(),
                    start_seconds,
                    duration_seconds: total,
                });
            }
        }

        let window = decode_window(source, start_seconds, duration_seconds)
            .map_err(|message| ExtractError::Decode {
                path: source.to_path_buf(),
                message,
            })?;
        let mono = downmix_to_mono(&window.samples, window.channels);
        let mono = resample_linear(&mono, window.sample_rate, ANALYSIS_SAMPLE_RATE);

        let chroma = ChromaFold::new(ANALYSIS_SAMPLE_RATE, STFT_FRAME_SIZE);
        let mel = MelBank::for_analysis(ANALYSIS_SAMPLE_RATE, STFT_FRAME_SIZE);
        let contrast = ContrastBands::new(ANALYSIS_SAMPLE_RATE, STFT_FRAME_SIZE);

        let spectra = power_frames(&mono, STFT_FRAME_SIZE, STFT_HOP_SIZE);
        let mut columns = Vec::with_capacity(spectra.len());
        for power in &spectra {
            let mut column = Vec::with_capacity(FEATURE_ROWS);
            column.extend(chroma.chroma(power));
            column.extend(mel.mfcc(power));
            column.extend(contrast.contrast(power));
            columns.push(column);
        }
        FeatureMatrix::from_columns(FEATURE_ROWS, &columns).map_err(|message| {
            ExtractError::Decode {
                path: source.to_path_buf(),
                message,
            }
        })
    }

    fn duration_seconds(&self, source: &Path) -> Result<f32, ExtractError> {
        probe_duration_seconds(source).map_err(|message| ExtractError::Decode {
            path: source.to_path_buf(),
            message,
        })
    }
}
