//! Float to 16-bit PCM conversion
//!
//! Samples are clamped to [-1.0, 1.0] and scaled asymmetrically: negative
//! values by 32768, non-negative values by 32767, truncated toward zero.
//! NaN is defined to encode as 0 (the float-to-int cast saturates NaN to 0).

/// Bytes per encoded sample (signed 16-bit)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Convert one normalized sample to a signed 16-bit value
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode normalized samples as signed 16-bit little-endian PCM
///
/// Output is always `samples.len() * 2` bytes.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &s in samples {
        out.extend_from_slice(&sample_to_i16(s).to_le_bytes());
    }
    out
}

/// Decode signed 16-bit little-endian PCM back to normalized samples
///
/// Uses the same asymmetric scale as the encoder. A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| {
            let v = i16::from_le_bytes([pair[0], pair[1]]);
            if v < 0 {
                v as f32 / 32768.0
            } else {
                v as f32 / 32767.0
            }
        })
        .collect()
}
