use super::stft::bin_frequency_hz;

/// Number of chroma rows contributed to the feature matrix, one per pitch class.
pub(crate) const CHROMA_BINS: usize = 12;

/// Lowest frequency folded into a pitch class; below this the FFT's
/// resolution cannot separate neighboring semitones.
const CHROMA_F_MIN_HZ: f32 = 27.5;

/// Folds FFT bins onto the 12 pitch classes (index 0 = C).
pub(crate) struct ChromaFold {
    classes: Vec<Option<usize>>,
}

impl ChromaFold {
    pub(crate) fn new(sample_rate: u32, frame_size: usize) -> Self {
        let bins = frame_size / 2 + 1;
        let mut classes = Vec::with_capacity(bins);
        for bin in 0..bins {
            let freq = bin_frequency_hz(bin, sample_rate, frame_size);
            classes.push(pitch_class(freq));
        }
        Self { classes }
    }

    /// Per-frame chroma vector, max-normalized so every frame peaks at 1.
    pub(crate) fn chroma(&self, power: &[f32]) -> Vec<f32> {
        let mut sums = [0.0_f64; CHROMA_BINS];
        for (bin, &p) in power.iter().enumerate() {
            if let Some(Some(class)) = self.classes.get(bin) {
                sums[*class] += p.max(0.0) as f64;
            }
        }
        let peak = sums.iter().copied().fold(0.0_f64, f64::max);
        if peak <= 0.0 {
            return vec![0.0_f32; CHROMA_BINS];
        }
        sums.iter().map(|&s| (s / peak) as f32).collect()
    }
}

/// Pitch class of a frequency on the equal-tempered scale, A4 = 440 Hz.
fn pitch_class(freq_hz: f32) -> Option<usize> {
    if freq_hz < CHROMA_F_MIN_HZ {
        return None;
    }
    let midi = 69.0 + 12.0 * (freq_hz / 440.0).log2();
    let class = (midi.round() as i64).rem_euclid(12);
    Some(class as usize)
}
