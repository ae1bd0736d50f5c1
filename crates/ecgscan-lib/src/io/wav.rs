//! Minimal RIFF/WAVE reader for single-lead recordings exported as audio.
//!
//! Only uncompressed integer PCM is accepted. Samples are returned as their raw
//! integer amplitude, without rescaling.

use crate::signal::TimeSeries;
use anyhow::{Context, Result};
use log::debug;
use std::path::Path;
use thiserror::Error;

/// Sample rates produced by the supported recorders.
pub const ALLOWED_SAMPLE_RATES: [u32; 2] = [10_000, 5_000];
/// Upper bound on accepted file size (50 MiB).
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const FORMAT_PCM: u16 = 1;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;
/// Byte offset of the SubFormat GUID inside an extensible fmt chunk. Its first
/// two bytes carry the real format tag.
const SUBFORMAT_OFFSET: usize = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WavError {
    #[error("not a RIFF/WAVE file")]
    NotWave,
    #[error("missing '{0}' chunk")]
    MissingChunk(&'static str),
    #[error("malformed fmt chunk")]
    BadFormatChunk,
    #[error("unsupported audio format tag {0:#06x}, only PCM is supported")]
    UnsupportedFormat(u16),
    #[error("only mono WAV files are supported, got {0} channels")]
    NotMono(u16),
    #[error("unsupported sample rate: {0}Hz")]
    UnsupportedRate(u32),
    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),
    #[error("file is {0} bytes, limit is {}", MAX_FILE_SIZE)]
    TooLarge(u64),
    #[error("sample rate {0}Hz does not fit a 16-bit PCM header")]
    RateOutOfRange(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct WavOptions {
    /// Reject rates outside [`ALLOWED_SAMPLE_RATES`].
    pub restrict_rates: bool,
}

impl Default for WavOptions {
    fn default() -> Self {
        Self {
            restrict_rates: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Format {
    tag: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

pub fn read_wav(path: &Path, opts: &WavOptions) -> Result<TimeSeries> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    if size > MAX_FILE_SIZE {
        return Err(WavError::TooLarge(size)).with_context(|| path.display().to_string());
    }
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let ts = decode_wav(&bytes, opts)
        .with_context(|| format!("failed to parse WAV {}", path.display()))?;
    debug!(
        "decoded {} samples at {} Hz from {}",
        ts.len(),
        ts.fs,
        path.display()
    );
    Ok(ts)
}

pub fn decode_wav(bytes: &[u8], opts: &WavOptions) -> Result<TimeSeries, WavError> {
    if bytes.len() as u64 > MAX_FILE_SIZE {
        return Err(WavError::TooLarge(bytes.len() as u64));
    }
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::NotWave);
    }

    let mut format = None;
    let mut data = None;
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = read_u32(bytes, pos + 4) as usize;
        let body_start = pos + 8;
        let body_end = body_start.saturating_add(size).min(bytes.len());
        let body = &bytes[body_start..body_end];
        match id {
            b"fmt " => format = Some(parse_format(body)?),
            b"data" => data = Some(body),
            _ => {}
        }
        // chunks are word aligned
        pos = body_start.saturating_add(size).saturating_add(size & 1);
    }

    let format = format.ok_or(WavError::MissingChunk("fmt "))?;
    let data = data.ok_or(WavError::MissingChunk("data"))?;

    if format.tag != FORMAT_PCM {
        return Err(WavError::UnsupportedFormat(format.tag));
    }
    if format.channels != 1 {
        return Err(WavError::NotMono(format.channels));
    }
    if opts.restrict_rates && !ALLOWED_SAMPLE_RATES.contains(&format.sample_rate) {
        return Err(WavError::UnsupportedRate(format.sample_rate));
    }

    let samples = match format.bits_per_sample {
        8 => data.iter().map(|&b| b as f64).collect(),
        16 => data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f64)
            .collect(),
        24 => data
            .chunks_exact(3)
            .map(|c| (i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8) as f64)
            .collect(),
        32 => data
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        other => return Err(WavError::UnsupportedBitDepth(other)),
    };

    Ok(TimeSeries::new(format.sample_rate as f64, samples))
}

fn parse_format(body: &[u8]) -> Result<Format, WavError> {
    if body.len() < 16 {
        return Err(WavError::BadFormatChunk);
    }
    let tag = match read_u16(body, 0) {
        FORMAT_EXTENSIBLE if body.len() < SUBFORMAT_OFFSET + 16 => {
            return Err(WavError::BadFormatChunk)
        }
        FORMAT_EXTENSIBLE => read_u16(body, SUBFORMAT_OFFSET),
        tag => tag,
    };
    Ok(Format {
        tag,
        channels: read_u16(body, 2),
        sample_rate: read_u32(body, 4),
        bits_per_sample: read_u16(body, 14),
    })
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Header byte rate of a mono 16-bit stream at `sample_rate`.
pub fn pcm16_byte_rate(sample_rate: u32) -> Result<u32, WavError> {
    sample_rate
        .checked_mul(2)
        .ok_or(WavError::RateOutOfRange(sample_rate))
}

/// Encode mono 16-bit PCM. Used to produce fixtures and demo recordings.
pub fn encode_pcm16(sample_rate: u32, samples: &[i16]) -> Result<Vec<u8>, WavError> {
    let byte_rate = pcm16_byte_rate(sample_rate)?;
    let too_large = || WavError::TooLarge(44 + samples.len() as u64 * 2);
    let data_len = samples
        .len()
        .checked_mul(2)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| n.checked_add(36).is_some())
        .ok_or_else(too_large)?;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pcm16_mono() {
        let bytes = encode_pcm16(10_000, &[0, 1, -1, i16::MAX, i16::MIN]).unwrap();
        let ts = decode_wav(&bytes, &WavOptions::default()).unwrap();
        assert_eq!(ts.fs, 10_000.0);
        assert_eq!(ts.data, vec![0.0, 1.0, -1.0, 32767.0, -32768.0]);
    }

    #[test]
    fn skips_unknown_chunks() {
        let plain = encode_pcm16(5_000, &[7, 8]).unwrap();
        let mut bytes = plain[..36].to_vec();
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 0]);
        bytes.extend_from_slice(&plain[36..]);
        let ts = decode_wav(&bytes, &WavOptions::default()).unwrap();
        assert_eq!(ts.data, vec![7.0, 8.0]);
    }

    #[test]
    fn rejects_unlisted_rate_unless_relaxed() {
        let bytes = encode_pcm16(44_100, &[1, 2, 3]).unwrap();
        assert_eq!(
            decode_wav(&bytes, &WavOptions::default()).unwrap_err(),
            WavError::UnsupportedRate(44_100)
        );
        let relaxed = WavOptions {
            restrict_rates: false,
        };
        assert_eq!(decode_wav(&bytes, &relaxed).unwrap().fs, 44_100.0);
    }

    #[test]
    fn rejects_stereo() {
        let mut bytes = encode_pcm16(10_000, &[1, 2, 3, 4]).unwrap();
        bytes[22..24].copy_from_slice(&2u16.to_le_bytes());
        assert_eq!(
            decode_wav(&bytes, &WavOptions::default()).unwrap_err(),
            WavError::NotMono(2)
        );
    }

    #[test]
    fn rejects_non_wave_and_missing_data() {
        assert_eq!(
            decode_wav(b"not a wav file at all", &WavOptions::default()).unwrap_err(),
            WavError::NotWave
        );
        let bytes = encode_pcm16(10_000, &[]).unwrap();
        assert_eq!(
            decode_wav(&bytes[..36], &WavOptions::default()).unwrap_err(),
            WavError::MissingChunk("data")
        );
    }

    #[test]
    fn truncated_data_keeps_whole_samples() {
        let bytes = encode_pcm16(10_000, &[5, 6, 7]).unwrap();
        let ts = decode_wav(&bytes[..bytes.len() - 1], &WavOptions::default()).unwrap();
        assert_eq!(ts.data, vec![5.0, 6.0]);
    }

    #[test]
    fn read_wav_from_disk() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), encode_pcm16(5_000, &[3, -3]).unwrap()).unwrap();
        let ts = read_wav(file.path(), &WavOptions::default()).unwrap();
        assert_eq!(ts.fs, 5_000.0);
        assert_eq!(ts.len(), 2);
    }

    /// Extensible fmt chunk (40 bytes) with the given SubFormat tag and sample payload.
    fn extensible(sub_format: u16, bits: u16, payload: &[u8]) -> Vec<u8> {
        let block_align = bits / 8;
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&FORMAT_EXTENSIBLE.to_le_bytes());
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&10_000u32.to_le_bytes());
        fmt.extend_from_slice(&(10_000u32 * block_align as u32).to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&bits.to_le_bytes());
        fmt.extend_from_slice(&22u16.to_le_bytes());
        fmt.extend_from_slice(&bits.to_le_bytes());
        fmt.extend_from_slice(&4u32.to_le_bytes());
        fmt.extend_from_slice(&sub_format.to_le_bytes());
        fmt.extend_from_slice(&[
            0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
        ]);
        assert_eq!(fmt.len(), 40);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((4 + 8 + fmt.len() + 8 + payload.len()) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
        out.extend_from_slice(&fmt);
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn extensible_float_is_rejected() {
        let payload: Vec<u8> = [0.5f32, -0.25]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(
            decode_wav(&extensible(3, 32, &payload), &WavOptions::default()).unwrap_err(),
            WavError::UnsupportedFormat(3)
        );
    }

    #[test]
    fn extensible_pcm_is_decoded() {
        let payload: Vec<u8> = [12i16, -12]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let ts = decode_wav(&extensible(FORMAT_PCM, 16, &payload), &WavOptions::default()).unwrap();
        assert_eq!(ts.data, vec![12.0, -12.0]);
    }

    #[test]
    fn truncated_extensible_fmt_is_malformed() {
        let mut bytes = extensible(FORMAT_PCM, 16, &[]);
        // shrink fmt to 18 bytes (cbSize present, no extension)
        bytes[16..20].copy_from_slice(&18u32.to_le_bytes());
        bytes.drain(20 + 18..20 + 40);
        assert_eq!(
            decode_wav(&bytes, &WavOptions::default()).unwrap_err(),
            WavError::BadFormatChunk
        );
    }

    #[test]
    fn encoder_rejects_overflowing_rate() {
        assert_eq!(
            encode_pcm16(3_000_000_000, &[1]).unwrap_err(),
            WavError::RateOutOfRange(3_000_000_000)
        );
        assert_eq!(pcm16_byte_rate(10_000).unwrap(), 20_000);
    }
}
