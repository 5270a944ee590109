use std::fs::File;
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
    io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};

/// Interleaved `f32` samples for one requested time window.
#[derive(Debug)]
pub(crate) struct DecodedWindow {
    pub(crate) samples: Vec<f32>,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u16,
}

/// Decode `[start, start + duration)` seconds of a file.
///
/// Decoding runs sequentially from the top of the stream and discards frames
/// before the window, which keeps the sample position exact across formats
/// whose seek tables are unreliable. Decoding stops as soon as the window is
/// filled.
pub(crate) fn decode_window(
    path: &Path,
    start_seconds: f32,
    duration_seconds: f32,
) -> Result<DecodedWindow, String> {
    let (mut format, mut decoder, sample_rate, channels) = open_stream(path)?;

    let skip_samples =
        (start_seconds.max(0.0) as f64 * sample_rate as f64).floor() as u64 * channels as u64;
    let want_samples =
        (duration_seconds as f64 * sample_rate as f64).ceil().max(1.0) as u64 * channels as u64;

    let mut remaining_skip = skip_samples;
    let mut samples = Vec::new();
    loop {
        if samples.len() as u64 >= want_samples {
            break;
        }
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break,
            Err(err) => {
                return Err(format!("Packet read failed for {}: {err}", path.display()));
            }
        };
        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(Error::DecodeError(_)) => continue,
            Err(err) => {
                return Err(format!("Decode failed for {}: {err}", path.display()));
            }
        };
        let spec = *audio_buf.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        let mut chunk = sample_buf.samples();
        if remaining_skip > 0 {
            let drop = (remaining_skip as usize).min(chunk.len());
            chunk = &chunk[drop..];
            remaining_skip -= drop as u64;
        }
        samples.extend_from_slice(chunk);
    }
    samples.truncate(want_samples as usize);

    if samples.is_empty() {
        return Err(format!(
            "Decoded no samples in the requested window of {}",
            path.display()
        ));
    }

    Ok(DecodedWindow {
        samples,
        sample_rate,
        channels,
    })
}

/// Total duration of an audio file in seconds.
///
/// WAV files are read via their header without decoding. Other formats use
/// the container's frame count when it is declared, falling back to a full
/// decode pass when it is not (common for bare MP3 streams).
pub(crate) fn probe_duration_seconds(path: &Path) -> Result<f32, String> {
    if path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
    {
        let reader = hound::WavReader::open(path)
            .map_err(|err| format!("WAV probe failed for {}: {err}", path.display()))?;
        let sample_rate = reader.spec().sample_rate.max(1);
        return Ok(reader.duration() as f32 / sample_rate as f32);
    }

    let (mut format, mut decoder, sample_rate, _channels) = open_stream(path)?;
    if let Some(frames) = format
        .default_track()
        .and_then(|track| track.codec_params.n_frames)
    {
        return Ok(frames as f32 / sample_rate as f32);
    }

    let mut total_frames = 0u64;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break,
            Err(err) => {
                return Err(format!("Packet read failed for {}: {err}", path.display()));
            }
        };
        match decoder.decode(&packet) {
            Ok(audio_buf) => {
                total_frames += audio_buf.frames() as u64;
            }
            Err(Error::DecodeError(_)) => continue,
            Err(err) => {
                return Err(format!("Decode failed for {}: {err}", path.display()));
            }
        }
    }
    Ok(total_frames as f32 / sample_rate as f32)
}

type OpenedStream = (
    Box<dyn symphonia::core::formats::FormatReader>,
    Box<dyn symphonia::core::codecs::Decoder>,
    u32,
    u16,
);

fn open_stream(path: &Path) -> Result<OpenedStream, String> {
    let file = File::open(path).map_err(|err| format!("Open {}: {err}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| format!("Probe failed for {}: {err}", path.display()))?;
    let format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| format!("No default track in {}", path.display()))?;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| format!("Missing sample rate in {}", path.display()))?
        .max(1);
    let channels = codec_params
        .channels
        .ok_or_else(|| format!("Missing channel count in {}", path.display()))?
        .count()
        .max(1) as u16;
    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|err| format!("No decoder for {}: {err}", path.display()))?;
    Ok((format, decoder, sample_rate, channels))
}
