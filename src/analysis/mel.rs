use super::stft::bin_frequency_hz;

/// Number of MFCC rows contributed to the feature matrix.
pub(crate) const MFCC_COEFFS: usize = 20;

const MEL_BANDS: usize = 40;
const MEL_F_MIN_HZ: f32 = 20.0;
const LOG_FLOOR: f64 = 1e-10;

/// Triangular mel filterbank with a DCT-II stage for MFCCs.
///
/// Filter weights are computed from fractional bin frequencies, so narrow
/// low-frequency filters still get non-zero weight instead of collapsing to
/// an empty integer bin range.
pub(crate) struct MelBank {
    coeffs: usize,
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelBank {
    pub(crate) fn new(sample_rate: u32, frame_size: usize, bands: usize, coeffs: usize) -> Self {
        let nyquist = sample_rate.max(1) as f32 * 0.5;
        let edges = mel_edges_hz(MEL_F_MIN_HZ, nyquist, bands);
        let bins = frame_size / 2 + 1;
        let mut filters = Vec::with_capacity(bands);
        for band in 0..bands {
            let (left, center, right) = (edges[band], edges[band + 1], edges[band + 2]);
            let mut weights = Vec::new();
            for bin in 0..bins {
                let freq = bin_frequency_hz(bin, sample_rate, frame_size);
                let weight = triangle_weight(freq, left, center, right);
                if weight > 0.0 {
                    weights.push((bin, weight));
                }
            }
            filters.push(weights);
        }
        Self { coeffs, filters }
    }

    pub(crate) fn for_analysis(sample_rate: u32, frame_size: usize) -> Self {
        Self::new(sample_rate, frame_size, MEL_BANDS, MFCC_COEFFS)
    }

    /// MFCCs for one power spectrum frame.
    pub(crate) fn mfcc(&self, power: &[f32]) -> Vec<f32> {
        let mut log_energies = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let mut sum = 0.0_f64;
            for &(bin, weight) in filter {
                sum += power.get(bin).copied().unwrap_or(0.0).max(0.0) as f64 * weight as f64;
            }
            log_energies.push(sum.max(LOG_FLOOR).ln());
        }
        dct_ii(&log_energies, self.coeffs)
    }
}

fn mel_edges_hz(f_min: f32, f_max: f32, bands: usize) -> Vec<f32> {
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max.max(f_min));
    (0..bands + 2)
        .map(|i| {
            let t = i as f32 / (bands + 1) as f32;
            mel_to_hz(mel_min + (mel_max - mel_min) * t)
        })
        .collect()
}

fn triangle_weight(freq: f32, left: f32, center: f32, right: f32) -> f32 {
    if freq <= left || freq >= right {
        return 0.0;
    }
    if freq < center {
        if center > left {
            (freq - left) / (center - left)
        } else {
            0.0
        }
    } else if right > center {
        (right - freq) / (right - center)
    } else {
        0.0
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0_f32 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0_f32 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

fn dct_ii(values: &[f64], count: usize) -> Vec<f32> {
    let n = values.len().max(1) as f64;
    let mut out = Vec::with_capacity(count);
    for k in 0..count {
        let mut sum = 0.0_f64;
        for (m, &v) in values.iter().enumerate() {
            let angle = std::f64::consts::PI * k as f64 * (m as f64 + 0.5) / n;
            sum += v * angle.cos();
        }
        out.push(sum as f32);
    }
    out
}
