//! Float ⇄ 16-bit PCM quantization and the base64 transport wrapping.
//!
//! Wire layout: little-endian `i16`, mono, no header. Packets are base64
//! (standard alphabet, padded) so they can ride in text protocol frames.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::models::audio_models::EncodedPacket;
use crate::models::error::EngineError;

/// Magnitude of one quantization step in the float domain.
pub const QUANTIZATION_STEP: f32 = 1.0 / 32768.0;

/// Quantize one float sample.
///
/// Clamps to `[-1, 1]` first, then scales both signs by 32768. `-1.0`
/// maps to `i16::MIN`; positive full scale saturates to `i16::MAX`
/// (a deliberate 1 LSB departure from a `* 32767` scale for positives),
/// so decoding with `/32768` stays within one step everywhere.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (clamped * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[inline]
pub fn dequantize(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Convert f32 samples to 16-bit PCM (little-endian bytes).
///
/// Output length = `samples.len() * 2` bytes.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        data.extend_from_slice(&quantize(sample).to_le_bytes());
    }
    data
}

/// Reinterpret little-endian 16-bit PCM bytes as float samples.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>, EngineError> {
    if bytes.len() % 2 != 0 {
        return Err(EngineError::MalformedPacket(format!(
            "odd PCM byte length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| dequantize(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

/// Quantize and wrap samples for the outbound callback.
pub fn encode_packet(samples: &[f32]) -> EncodedPacket {
    EncodedPacket::new(STANDARD.encode(encode_pcm16(samples)))
}

/// Unwrap and dequantize an inbound packet.
pub fn decode_packet(packet: &EncodedPacket) -> Result<Vec<f32>, EngineError> {
    let bytes = STANDARD
        .decode(packet.as_str().trim())
        .map_err(|e| EngineError::MalformedPacket(format!("invalid base64: {}", e)))?;
    decode_pcm16(&bytes)
}
