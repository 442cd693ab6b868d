//! Audio assembly: concatenate synthesized segments into one WAV file.
//!
//! Output is always the canonical 44-byte RIFF/WAVE header (PCM, mono,
//! 16-bit) followed by the little-endian samples of every segment in order.
//! Each `f32` sample is clamped to `[-1, 1]` and quantized as
//! `round(sample * 32767)`.
//!
//! [`decode_wav`] goes the other way for synthesizers that answer with WAV
//! bytes; it accepts any channel count and integer or float samples.

use crate::error::{AudiobookError, ServiceError};
use std::io::Cursor;
use tracing::debug;

/// Size of the RIFF + fmt + data headers written by [`encode_wav`].
pub const WAV_HEADER_LEN: usize = 44;

const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const PCM_FORMAT_TAG: u16 = 1;

/// Mono float samples produced for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Samples per second.
    pub sample_rate: u32,
}

impl AudioSegment {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}

/// The final, playable WAV byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledAudio {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub sample_count: usize,
}

impl AssembledAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.sample_count as f64 / self.sample_rate as f64
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Quantize one float sample to signed 16-bit PCM. NaN maps to 0.
pub fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Concatenate `segments` in order and encode them as a mono 16-bit WAV.
///
/// # Errors
/// - [`AudiobookError::NoAudioData`] if there are no samples at all.
/// - [`AudiobookError::InvalidSampleRate`] if a segment reports 0 Hz.
/// - [`AudiobookError::SampleRateMismatch`] if a segment's rate differs from
///   the first segment's.
pub fn encode_wav(segments: &[AudioSegment]) -> Result<AssembledAudio, AudiobookError> {
    let first = segments.first().ok_or(AudiobookError::NoAudioData)?;
    let sample_rate = first.sample_rate;

    if let Some(segment) = segments.iter().position(|s| s.sample_rate == 0) {
        return Err(AudiobookError::InvalidSampleRate { segment });
    }

    for (i, seg) in segments.iter().enumerate().skip(1) {
        if seg.sample_rate != sample_rate {
            return Err(AudiobookError::SampleRateMismatch {
                segment: i,
                expected: sample_rate,
                found: seg.sample_rate,
            });
        }
    }

    let sample_count: usize = segments.iter().map(|s| s.samples.len()).sum();
    if sample_count == 0 {
        return Err(AudiobookError::NoAudioData);
    }

    let data_len = sample_count
        .checked_mul(2)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| n.checked_add(36).is_some())
        .ok_or_else(|| {
            AudiobookError::Internal(format!(
                "{sample_count} samples exceed the 4 GiB WAV size limit"
            ))
        })?;

    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);

    // RIFF chunk
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for seg in segments {
        for &s in &seg.samples {
            wav.extend_from_slice(&quantize(s).to_le_bytes());
        }
    }

    debug!(
        "Assembled {} segments → {} samples @ {} Hz ({} bytes)",
        segments.len(),
        sample_count,
        sample_rate,
        wav.len()
    );

    Ok(AssembledAudio {
        bytes: wav,
        sample_rate,
        sample_count,
    })
}

/// Decode WAV bytes into a mono float segment.
///
/// Multi-channel audio is averaged down to one channel.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioSegment, ServiceError> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| ServiceError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| ServiceError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(|e| ServiceError::Decode(e.to_string()))?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(AudioSegment::new(samples, spec.sample_rate))
}
