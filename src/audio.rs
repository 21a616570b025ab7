//! Audio decoding for recordings.
//!
//! Two uses:
//! - reading a recording's length from its container, so usage counters and
//!   chunk planning know how long a note is
//! - decoding an oversized recording to 16 kHz mono PCM so it can be cut at
//!   sample boundaries and re-encoded as standalone WAV segments
//!
//! Decoding goes through symphonia (MP3, AAC/M4A, WAV, FLAC, Ogg Vorbis);
//! encoding uses hound.

use std::fs::File;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::debug;

/// Sample rate of re-encoded segments
pub const SEGMENT_SAMPLE_RATE: u32 = 16_000;

/// Size of the RIFF/WAVE header hound writes for 16-bit PCM
pub const WAV_HEADER_BYTES: u64 = 44;

/// Errors from probing, decoding or encoding audio
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Unsupported or unreadable audio: {0}")]
    Unsupported(String),

    #[error("No audio track found")]
    NoTrack,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SymphoniaError> for AudioError {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::IoError(e) => Self::Io(e),
            SymphoniaError::Unsupported(what) => Self::Unsupported(what.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Mono PCM at [`SEGMENT_SAMPLE_RATE`]
#[derive(Debug, Clone, Default)]
pub struct Pcm {
    pub samples: Vec<i16>,
}

impl Pcm {
    pub fn seconds(&self) -> f64 {
        self.samples.len() as f64 / f64::from(SEGMENT_SAMPLE_RATE)
    }
}

/// Length of an audio file in seconds.
///
/// Uses the container's frame count when present and otherwise walks the
/// packets without decoding them.
pub fn probe_duration(path: &Path) -> Result<f64, AudioError> {
    let file = File::open(path)?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut format = open_format(Box::new(file), &hint)?;
    let (track_id, params) = default_track(format.as_ref())?;

    if let Some(seconds) = declared_seconds(&params) {
        return Ok(seconds);
    }

    let time_base = params.time_base.ok_or(AudioError::NoTrack)?;
    let mut end_ts = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => {
                end_ts = end_ts.max(packet.ts() + packet.dur());
            }
            Ok(_) => {}
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }

    let time = time_base.calc_time(end_ts);
    Ok(time.seconds as f64 + time.frac)
}

/// Duration of a recording on disk, off the async runtime.
///
/// Files that cannot be probed have no known duration.
pub async fn read_duration(path: &Path) -> Option<f64> {
    let owned: PathBuf = path.to_path_buf();
    match tokio::task::spawn_blocking(move || probe_duration(&owned)).await {
        Ok(Ok(seconds)) => Some(seconds),
        Ok(Err(e)) => {
            debug!(path = %path.display(), error = %e, "Could not read audio duration");
            None
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Duration task failed");
            None
        }
    }
}

/// Decode an in-memory recording to mono PCM at [`SEGMENT_SAMPLE_RATE`].
///
/// `extension` and `mime_type` only guide format detection.
pub fn decode_mono(bytes: Vec<u8>, extension: Option<&str>, mime_type: &str) -> Result<Pcm, AudioError> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    if !mime_type.is_empty() {
        hint.mime_type(mime_type);
    }

    let mut format = open_format(Box::new(Cursor::new(bytes)), &hint)?;
    let (track_id, params) = default_track(format.as_ref())?;
    let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

    let mut resampler: Option<Resampler> = params.sample_rate.map(Resampler::new);
    let mut pcm = Pcm::default();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!(error = msg, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let resample = resampler.get_or_insert_with(|| Resampler::new(spec.rate));

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        for frame in buffer.samples().chunks(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            resample.push(mono, &mut pcm.samples);
        }
    }

    if pcm.samples.is_empty() {
        return Err(AudioError::Decode("no audio frames decoded".to_string()));
    }
    Ok(pcm)
}

/// Encode mono PCM as a 16-bit WAV file in memory
pub fn encode_wav(samples: &[i16]) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SEGMENT_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(
        WAV_HEADER_BYTES as usize + samples.len() * 2,
    ));
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

fn open_format(source: Box<dyn MediaSource>, hint: &Hint) -> Result<Box<dyn FormatReader>, AudioError> {
    let stream = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe().format(
        hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    Ok(probed.format)
}

fn default_track(format: &dyn FormatReader) -> Result<(u32, CodecParameters), AudioError> {
    format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| (t.id, t.codec_params.clone()))
        .ok_or(AudioError::NoTrack)
}

fn declared_seconds(params: &CodecParameters) -> Option<f64> {
    let frames = params.n_frames?;
    if let Some(time_base) = params.time_base {
        let time = time_base.calc_time(frames);
        return Some(time.seconds as f64 + time.frac);
    }
    params
        .sample_rate
        .map(|rate| frames as f64 / f64::from(rate.max(1)))
}

/// Streaming linear-interpolation resampler to [`SEGMENT_SAMPLE_RATE`]
struct Resampler {
    /// Input samples per output sample
    step: f64,
    /// Input position of the next output sample
    next: f64,
    index: u64,
    prev: Option<f32>,
}

impl Resampler {
    fn new(input_rate: u32) -> Self {
        Self {
            step: f64::from(input_rate.max(1)) / f64::from(SEGMENT_SAMPLE_RATE),
            next: 0.0,
            index: 0,
            prev: None,
        }
    }

    fn push(&mut self, sample: f32, out: &mut Vec<i16>) {
        let position = self.index as f64;
        while self.next <= position {
            let value = match self.prev {
                Some(prev) => {
                    let t = (self.next - (position - 1.0)) as f32;
                    prev + (sample - prev) * t
                }
                None => sample,
            };
            out.push(to_i16(value));
            self.next += self.step;
        }
        self.prev = Some(sample);
        self.index += 1;
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(rate: u32, channels: u16, seconds: f64) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (f64::from(rate) * seconds) as usize;
        for i in 0..frames {
            let value = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_probe_duration_of_wav_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("memo.wav");
        std::fs::write(&path, tone(8_000, 1, 2.5)).unwrap();

        let seconds = probe_duration(&path).unwrap();
        assert!((seconds - 2.5).abs() < 0.01, "got {}", seconds);
    }

    #[test]
    fn test_probe_rejects_non_audio() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("memo.m4a");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(probe_duration(&path).is_err());
    }

    #[test]
    fn test_decode_downmixes_and_resamples() {
        let pcm = decode_mono(tone(44_100, 2, 1.0), Some("wav"), "audio/wav").unwrap();
        assert!((pcm.seconds() - 1.0).abs() < 0.01, "got {}", pcm.seconds());
        assert!(pcm.samples.iter().any(|s| *s != 0));
    }

    #[test]
    fn test_encode_wav_reads_back() {
        let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16).collect();
        let bytes = encode_wav(&samples).unwrap();
        assert_eq!(bytes.len() as u64, WAV_HEADER_BYTES + 3200);

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, SEGMENT_SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.duration(), 1600);
    }

    #[test]
    fn test_resampler_upsamples_by_interpolation() {
        let mut resampler = Resampler::new(8_000);
        let mut out = Vec::new();
        resampler.push(0.0, &mut out);
        resampler.push(0.5, &mut out);
        // Positions 0.0, 0.5, 1.0
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], to_i16(0.25));
        assert_eq!(out[2], to_i16(0.5));
    }
}
