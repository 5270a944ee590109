use super::stft::frequency_to_bin;

/// Number of spectral-contrast rows contributed to the feature matrix:
/// six octave bands above 200 Hz plus the remainder up to Nyquist.
pub(crate) const CONTRAST_BANDS: usize = 7;

const CONTRAST_F_MIN_HZ: f32 = 200.0;
const QUANTILE: f32 = 0.02;
const LOG_FLOOR: f64 = 1e-10;

/// Octave-spaced band layout for peak-to-valley spectral contrast.
pub(crate) struct ContrastBands {
    ranges: Vec<(usize, usize)>,
}

impl ContrastBands {
    pub(crate) fn new(sample_rate: u32, frame_size: usize) -> Self {
        let bins = frame_size / 2 + 1;
        let mut edges = Vec::with_capacity(CONTRAST_BANDS + 1);
        edges.push(0usize);
        for octave in 0..CONTRAST_BANDS - 1 {
            let freq = CONTRAST_F_MIN_HZ * 2.0_f32.powi(octave as i32);
            edges.push(frequency_to_bin(freq, sample_rate, frame_size));
        }
        edges.push(bins);

        let mut ranges = Vec::with_capacity(CONTRAST_BANDS);
        for band in 0..CONTRAST_BANDS {
            let lo = edges[band];
            let hi = edges[band + 1].max(lo + 1).min(bins);
            ranges.push((lo.min(bins - 1), hi));
        }
        Self { ranges }
    }

    /// Per-frame contrast vector: log peak minus log valley per band.
    pub(crate) fn contrast(&self, power: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.ranges.len());
        for &(lo, hi) in &self.ranges {
            let mut band: Vec<f64> = power[lo..hi.min(power.len())]
                .iter()
                .map(|&p| p.max(0.0) as f64)
                .collect();
            if band.is_empty() {
                out.push(0.0);
                continue;
            }
            band.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let take = ((band.len() as f32 * QUANTILE).round() as usize).max(1);
            let valley: f64 = band[..take].iter().sum::<f64>() / take as f64;
            let peak: f64 = band[band.len() - take..].iter().sum::<f64>() / take as f64;
            out.push((peak.max(LOG_FLOOR).ln() - valley.max(LOG_FLOOR).ln()) as f32);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_count_is_fixed() {
        let bands = ContrastBands::new(22_050, 2048);
        let power = vec![1.0_f32; 1025];
        assert_eq!(bands.contrast(&power).len(), CONTRAST_BANDS);
    }

    #[test]
    fn flat_spectrum_has_zero_contrast() {
        let bands = ContrastBands::new(22_050, 2048);
        let power = vec![0.5_f32; 1025];
        for value in bands.contrast(&power) {
            assert!(value.abs() < 1e-9);
        }
    }

    #[test]
    fn peaky_band_has_positive_contrast() {
        let bands = ContrastBands::new(22_050, 2048);
        let mut power = vec![1e-6_f32; 1025];
        // A strong line inside the 400..800 Hz band.
        let bin = frequency_to_bin(600.0, 22_050, 2048);
        power[bin] = 1.0;
        let contrast = bands.contrast(&power);
        assert!(contrast[2] > 1.0);
    }

    #[test]
    fn silent_spectrum_is_finite() {
        let bands = ContrastBands::new(22_050, 2048);
        let contrast = bands.contrast(&vec![0.0_f32; 1025]);
        assert!(contrast.iter().all(|v| v.is_finite()));
    }
}
