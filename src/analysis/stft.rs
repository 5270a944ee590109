use rustfft::{FftPlanner, num_complex::Complex};

use super::prep::sanitize_sample;

/// STFT frame length in samples.
pub(crate) const STFT_FRAME_SIZE: usize = 2048;
/// Hop between successive frames. Column count of a feature matrix is the
/// number of hops covering the window, so it scales linearly with duration.
pub(crate) const STFT_HOP_SIZE: usize = 512;

pub(crate) fn hann_window(length: usize) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|n| 0.5_f32 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / denom).cos()))
        .collect()
}

/// Hann-windowed power spectra, one `frame_size / 2 + 1` bin vector per hop.
///
/// The tail frame is zero-padded. Empty input still yields a single silent
/// frame so downstream descriptor math never sees an empty spectrogram.
pub(crate) fn power_frames(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<Vec<f32>> {
    let frame_size = frame_size.max(2);
    let hop_size = hop_size.max(1);
    let bins = frame_size / 2 + 1;
    let window = hann_window(frame_size);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(frame_size);

    let mut frames = Vec::new();
    let mut buffer = vec![Complex::new(0.0_f32, 0.0_f32); frame_size];
    let mut start = 0usize;
    while start < samples.len() {
        for (i, cell) in buffer.iter_mut().enumerate() {
            let sample = samples.get(start + i).copied().unwrap_or(0.0);
            *cell = Complex::new(sanitize_sample(sample) * window[i], 0.0);
        }
        fft.process(&mut buffer);
        let mut power = Vec::with_capacity(bins);
        for bin in &buffer[..bins] {
            power.push((bin.re * bin.re + bin.im * bin.im).max(0.0));
        }
        frames.push(power);
        start += hop_size;
    }

    if frames.is_empty() {
        frames.push(vec![0.0_f32; bins]);
    }
    frames
}

/// Center frequency of an FFT bin.
pub(crate) fn bin_frequency_hz(bin: usize, sample_rate: u32, frame_size: usize) -> f32 {
    bin as f32 * sample_rate.max(1) as f32 / frame_size.max(1) as f32
}

/// Bin index for a frequency, clamped to the spectrum.
pub(crate) fn frequency_to_bin(freq_hz: f32, sample_rate: u32, frame_size: usize) -> usize {
    let sample_rate = sample_rate.max(1) as f32;
    let nyquist = sample_rate * 0.5;
    let freq = freq_hz.clamp(0.0, nyquist);
    (((freq * frame_size as f32) / sample_rate).floor() as usize).min(frame_size / 2)
}
