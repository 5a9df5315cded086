//! # Audio Decoding and Normalization
//!
//! Turns arbitrary inbound audio bytes into a canonical mono f32 sample
//! stream at a fixed sample rate, ready for the STT adapter.
//!
//! ## Decode Strategy:
//! 1. If the bytes carry a RIFF/WAVE header, parse the container: 16-bit
//!    PCM only, channels downmixed to mono, resampled to the target rate.
//! 2. Otherwise treat the bytes as headerless 16-bit little-endian mono PCM
//!    already at the target rate. An odd trailing byte is trimmed.
//!
//! Failure at any point is an `AudioDecode` error, which is fatal to the
//! turn: no later pipeline stage runs on undecodable audio.

use crate::error::PipelineError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::{debug, warn};

/// Decode and normalize inbound audio bytes.
///
/// ## Parameters:
/// - **data**: raw bytes from the WebSocket binary frame
/// - **target_rate**: canonical sample rate in Hz (16000 for the pipeline)
///
/// ## Returns:
/// - **Ok(Vec<f32>)**: mono samples in [-1.0, 1.0] at `target_rate`
/// - **Err(PipelineError::AudioDecode)**: bytes could not be interpreted
pub fn normalize(data: &[u8], target_rate: u32) -> Result<Vec<f32>, PipelineError> {
    if data.is_empty() {
        return Err(PipelineError::AudioDecode("audio data is empty".to_string()));
    }

    if is_wav(data) {
        let (samples, channels, rate) = parse_wav(data)?;
        let mono = downmix_to_mono(&samples, channels);
        let mono = resample_linear(&mono, rate, target_rate);
        debug!(
            channels,
            source_rate = rate,
            target_rate,
            samples = mono.len(),
            "Decoded WAV audio"
        );
        Ok(mono)
    } else {
        let samples = parse_raw_pcm(data)?;
        debug!(samples = samples.len(), "Decoded raw PCM audio");
        Ok(samples)
    }
}

/// Convert normalized samples back into 16-bit little-endian PCM bytes.
///
/// Used by the STT adapter, which ships audio to the remote service as
/// base64-encoded PCM.
pub fn samples_to_pcm_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }
    bytes
}

fn is_wav(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

/// Parse a WAV container into interleaved i16 samples.
///
/// ## Supported Format:
/// PCM (format tag 1), 16-bit. The fmt chunk must precede the data chunk.
/// Returns (samples, channels, sample_rate).
fn parse_wav(data: &[u8]) -> Result<(Vec<i16>, u16, u32), PipelineError> {
    let mut pos = 12; // past "RIFF<size>WAVE"
    let mut format: Option<(u16, u16, u32)> = None; // (tag, channels, rate)

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = u32::from_le_bytes([
            data[pos + 4],
            data[pos + 5],
            data[pos + 6],
            data[pos + 7],
        ]) as usize;
        let body_start = pos + 8;
        let body_end = body_start.saturating_add(chunk_size).min(data.len());

        match chunk_id {
            b"fmt " => {
                if chunk_size < 16 {
                    return Err(PipelineError::AudioDecode(
                        "WAV fmt chunk too short".to_string(),
                    ));
                }
                let body = &data[body_start..body_end];
                let mut cursor = Cursor::new(body);
                let tag = cursor.read_u16::<LittleEndian>().map_err(wav_err)?;
                let channels = cursor.read_u16::<LittleEndian>().map_err(wav_err)?;
                let rate = cursor.read_u32::<LittleEndian>().map_err(wav_err)?;
                cursor.read_u32::<LittleEndian>().map_err(wav_err)?; // byte rate
                cursor.read_u16::<LittleEndian>().map_err(wav_err)?; // block align
                let bit_depth = cursor.read_u16::<LittleEndian>().map_err(wav_err)?;

                if tag != 1 {
                    return Err(PipelineError::AudioDecode(format!(
                        "unsupported WAV format tag: {} (PCM only)",
                        tag
                    )));
                }
                if bit_depth != 16 {
                    return Err(PipelineError::AudioDecode(format!(
                        "unsupported WAV bit depth: {} (16-bit only)",
                        bit_depth
                    )));
                }
                if channels == 0 || rate == 0 {
                    return Err(PipelineError::AudioDecode(
                        "WAV fmt chunk has zero channels or sample rate".to_string(),
                    ));
                }
                format = Some((tag, channels, rate));
            }
            b"data" => {
                let (_, channels, rate) = format.ok_or_else(|| {
                    PipelineError::AudioDecode("WAV data chunk before fmt chunk".to_string())
                })?;
                let body = &data[body_start..body_end];
                let samples = read_i16_samples(body);
                if samples.is_empty() {
                    return Err(PipelineError::AudioDecode(
                        "WAV data chunk contains no samples".to_string(),
                    ));
                }
                return Ok((samples, channels, rate));
            }
            _ => {} // skip LIST, fact, and other chunks
        }

        // Chunks are word-aligned; odd sizes are padded with one byte
        pos = body_start + chunk_size + (chunk_size % 2);
    }

    Err(PipelineError::AudioDecode(
        "WAV container has no data chunk".to_string(),
    ))
}

/// Interpret headerless bytes as 16-bit little-endian mono PCM.
fn parse_raw_pcm(data: &[u8]) -> Result<Vec<f32>, PipelineError> {
    let mut data = data;
    if data.len() % 2 != 0 {
        // Browser recorders occasionally flush an odd byte; trim it rather
        // than failing the whole turn.
        warn!(len = data.len(), "Raw PCM byte length is odd, trimming last byte");
        data = &data[..data.len() - 1];
    }

    if data.is_empty() {
        return Err(PipelineError::AudioDecode(
            "no PCM samples after trimming".to_string(),
        ));
    }

    let samples = read_i16_samples(data);
    Ok(samples.iter().map(|&s| s as f32 / 32768.0).collect())
}

fn wav_err(err: std::io::Error) -> PipelineError {
    PipelineError::AudioDecode(format!("WAV header read failed: {}", err))
}

fn read_i16_samples(data: &[u8]) -> Vec<i16> {
    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }
    samples
}

/// Average interleaved channels down to mono, normalized to [-1.0, 1.0].
fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.iter().map(|&s| s as f32 / 32768.0).collect();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| s as f32 / 32768.0).sum();
            sum / channels as f32
        })
        .collect()
}

/// Linear-interpolation resampler.
///
/// Speech content survives linear interpolation well enough for STT, and
/// the common case (client already at the canonical rate) is a no-op.
fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let position = i as f64 * ratio;
        let index = position.floor() as usize;
        let frac = (position - index as f64) as f32;
        let current = samples[index.min(samples.len() - 1)];
        let next = samples[(index + 1).min(samples.len() - 1)];
        out.push(current + (next - current) * frac);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal valid WAV container around the given samples.
    fn wav_bytes(samples: &[i16], channels: u16, rate: u32) -> Vec<u8> {
        let data_len = samples.len() * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&(data_len as u32).to_le_bytes());
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(normalize(&[], 16000).is_err());
    }

    #[test]
    fn test_raw_pcm_roundtrip() {
        let samples = vec![0i16, 16384, -16384, 32767, -32768];
        let mut bytes = Vec::new();
        for sample in &samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        let decoded = normalize(&bytes, 16000).unwrap();
        assert_eq!(decoded.len(), samples.len());
        assert!((decoded[1] - 0.5).abs() < 0.001);
        assert!((decoded[2] + 0.5).abs() < 0.001);
    }

    #[test]
    fn test_raw_pcm_odd_length_trimmed() {
        // 5 bytes = 2 samples plus a dangling byte
        let bytes = vec![0u8, 0, 0, 64, 7];
        let decoded = normalize(&bytes, 16000).unwrap();
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn test_wav_mono_passthrough() {
        let samples = vec![100i16; 1600];
        let bytes = wav_bytes(&samples, 1, 16000);
        let decoded = normalize(&bytes, 16000).unwrap();
        assert_eq!(decoded.len(), 1600);
    }

    #[test]
    fn test_wav_stereo_downmix() {
        // Left channel 0.5, right channel -0.5 -> mono 0.0
        let mut samples = Vec::new();
        for _ in 0..100 {
            samples.push(16384i16);
            samples.push(-16384i16);
        }
        let bytes = wav_bytes(&samples, 2, 16000);
        let decoded = normalize(&bytes, 16000).unwrap();
        assert_eq!(decoded.len(), 100);
        assert!(decoded.iter().all(|s| s.abs() < 0.001));
    }

    #[test]
    fn test_wav_resampled_to_target() {
        let samples = vec![100i16; 48000];
        let bytes = wav_bytes(&samples, 1, 48000);
        let decoded = normalize(&bytes, 16000).unwrap();
        // One second of 48kHz audio becomes one second at 16kHz
        assert_eq!(decoded.len(), 16000);
    }

    #[test]
    fn test_wav_rejects_unsupported_bit_depth() {
        let mut bytes = wav_bytes(&[0i16; 10], 1, 16000);
        // Patch bit depth field (offset 34) to 24-bit
        bytes[34] = 24;
        assert!(normalize(&bytes, 16000).is_err());
    }

    #[test]
    fn test_pcm_bytes_roundtrip() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0, -1.0];
        let bytes = samples_to_pcm_bytes(&samples);
        assert_eq!(bytes.len(), 10);

        let decoded = parse_raw_pcm(&bytes).unwrap();
        for (original, restored) in samples.iter().zip(decoded.iter()) {
            assert!((original - restored).abs() < 0.001);
        }
    }
}
