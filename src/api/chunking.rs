//! Splitting oversized recordings for upload.
//!
//! The transcription endpoint rejects uploads above 25 MB. Clips over that
//! limit are decoded and cut at sample boundaries into segments of at most
//! ten minutes, each re-encoded as a standalone 16 kHz mono WAV file no
//! larger than the byte limit. Clips within the limit are uploaded as-is.

use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ApiError, AudioClip};
use crate::audio::{self, SEGMENT_SAMPLE_RATE, WAV_HEADER_BYTES};

/// Upload size limit of the transcription endpoint
pub const MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Longest segment sent once a clip needs splitting
pub const MAX_CHUNK_SECS: u64 = 10 * 60;

/// Limits applied when planning chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLimits {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_max_chunk_secs")]
    pub max_chunk_secs: u64,
}

fn default_max_bytes() -> u64 {
    MAX_UPLOAD_BYTES
}
fn default_max_chunk_secs() -> u64 {
    MAX_CHUNK_SECS
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            max_chunk_secs: default_max_chunk_secs(),
        }
    }
}

impl ChunkLimits {
    /// Whether a clip must be split before upload
    pub fn needs_split(&self, clip: &AudioClip) -> bool {
        clip.len() as u64 > self.max_bytes
    }

    /// Most samples one re-encoded segment may hold
    pub fn max_segment_samples(&self) -> usize {
        let by_time = self.max_chunk_secs.max(1) * u64::from(SEGMENT_SAMPLE_RATE);
        let by_size = self.max_bytes.saturating_sub(WAV_HEADER_BYTES) / 2;
        by_time.min(by_size).max(1) as usize
    }
}

/// One planned segment of decoded audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub samples: Range<usize>,
    pub start: Duration,
    pub end: Duration,
}

/// Plan equal segments over `total` samples at [`SEGMENT_SAMPLE_RATE`]
pub fn plan_chunks(total: usize, limits: &ChunkLimits) -> Vec<ChunkSpan> {
    let per_chunk = limits.max_segment_samples();
    let count = total.div_ceil(per_chunk).max(1);
    let at = |sample: usize| Duration::from_secs_f64(sample as f64 / f64::from(SEGMENT_SAMPLE_RATE));

    (0..count)
        .map(|i| {
            let start = total * i / count;
            let end = total * (i + 1) / count;
            ChunkSpan {
                index: i,
                samples: start..end,
                start: at(start),
                end: at(end),
            }
        })
        .collect()
}

/// Split a clip into uploadable segments, in order.
///
/// Decodes the clip, so run it off the async runtime. Fails with
/// [`ApiError::InvalidAudio`] when an oversized clip cannot be decoded.
pub fn split_clip(clip: &AudioClip, limits: &ChunkLimits) -> Result<Vec<AudioClip>, ApiError> {
    if !limits.needs_split(clip) {
        return Ok(vec![clip.clone()]);
    }

    let (stem, ext) = match clip.file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), Some(ext.to_ascii_lowercase())),
        None => (clip.file_name.clone(), None),
    };

    let pcm = audio::decode_mono(clip.bytes.clone(), ext.as_deref(), &clip.mime_type)
        .map_err(|e| ApiError::InvalidAudio(format!("{}: {}", clip.file_name, e)))?;

    plan_chunks(pcm.samples.len(), limits)
        .into_iter()
        .map(|span| {
            let bytes = audio::encode_wav(&pcm.samples[span.samples.clone()])
                .map_err(|e| ApiError::InvalidAudio(e.to_string()))?;
            Ok(AudioClip {
                bytes,
                file_name: format!("{}.part{}.wav", stem, span.index),
                mime_type: "audio/wav".to_string(),
                duration: Some(span.end - span.start),
            })
        })
        .collect()
}

/// Concatenate chunk transcripts in chunk order
pub fn join_transcripts<I>(parts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_clip(rate: u32, seconds: f64) -> AudioClip {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..(f64::from(rate) * seconds) as usize {
            writer.write_sample(((i as f32 * 0.1).sin() * 6000.0) as i16).unwrap();
        }
        writer.finalize().unwrap();

        AudioClip {
            bytes: cursor.into_inner(),
            file_name: "memo.wav".to_string(),
            mime_type: "audio/wav".to_string(),
            duration: Some(Duration::from_secs_f64(seconds)),
        }
    }

    #[test]
    fn test_default_segment_fits_both_limits() {
        let limits = ChunkLimits::default();
        // Ten minutes of 16 kHz 16-bit mono is well under 25 MB
        assert_eq!(limits.max_segment_samples(), 600 * 16_000);
        assert!(WAV_HEADER_BYTES + 2 * limits.max_segment_samples() as u64 <= MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_plan_splits_long_audio_by_time() {
        // 35 minutes needs four segments of at most ten minutes
        let total = 35 * 60 * SEGMENT_SAMPLE_RATE as usize;
        let spans = plan_chunks(total, &ChunkLimits::default());
        assert_eq!(spans.len(), 4);

        for span in &spans {
            assert!((span.end - span.start).as_secs_f64() <= 600.0 + 1e-6);
        }
        assert_eq!(spans[0].samples.start, 0);
        assert_eq!(spans.last().unwrap().samples.end, total);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].samples.end, pair[1].samples.start);
        }
    }

    #[test]
    fn test_plan_respects_byte_limit() {
        let limits = ChunkLimits {
            max_bytes: WAV_HEADER_BYTES + 2_000,
            max_chunk_secs: 600,
        };
        let spans = plan_chunks(5_000, &limits);
        assert_eq!(spans.len(), 5);
        assert!(spans.iter().all(|s| s.samples.len() <= 1_000));
    }

    #[test]
    fn test_small_clip_is_uploaded_unchanged() {
        let clip = wav_clip(8_000, 0.5);
        let parts = split_clip(&clip, &ChunkLimits::default()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].bytes, clip.bytes);
        assert_eq!(parts[0].file_name, "memo.wav");
    }

    #[test]
    fn test_oversized_clip_splits_into_playable_segments() {
        // 3.5 s at 8 kHz is 56 KB; segments are capped at one second
        let clip = wav_clip(8_000, 3.5);
        let limits = ChunkLimits {
            max_bytes: 40_000,
            max_chunk_secs: 1,
        };

        let parts = split_clip(&clip, &limits).unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].file_name, "memo.part0.wav");
        assert_eq!(parts[3].file_name, "memo.part3.wav");

        let mut total_samples = 0u32;
        for part in &parts {
            assert!(part.len() as u64 <= limits.max_bytes);
            assert_eq!(part.mime_type, "audio/wav");
            assert!(part.duration.unwrap() <= Duration::from_secs(1));

            // Every segment is a complete file on its own
            let reader = hound::WavReader::new(Cursor::new(part.bytes.clone())).unwrap();
            assert_eq!(reader.spec().sample_rate, SEGMENT_SAMPLE_RATE);
            assert_eq!(reader.spec().channels, 1);
            total_samples += reader.duration();
        }

        let seconds = f64::from(total_samples) / f64::from(SEGMENT_SAMPLE_RATE);
        assert!((seconds - 3.5).abs() < 0.01, "got {}", seconds);
    }

    #[test]
    fn test_undecodable_oversized_clip_fails_clearly() {
        let clip = AudioClip {
            bytes: vec![7u8; 64],
            file_name: "memo.m4a".to_string(),
            mime_type: "audio/mp4".to_string(),
            duration: None,
        };
        let limits = ChunkLimits {
            max_bytes: 10,
            max_chunk_secs: 600,
        };

        let err = split_clip(&clip, &limits).unwrap_err();
        assert!(matches!(err, ApiError::InvalidAudio(_)));
        assert_eq!(err.kind(), "invalid_audio");
    }

    #[test]
    fn test_join_transcripts_keeps_order() {
        let joined = join_transcripts(vec![
            " first part ".to_string(),
            String::new(),
            "second part".to_string(),
        ]);
        assert_eq!(joined, "first part second part");
    }
}
