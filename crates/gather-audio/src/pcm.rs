//! PCM16 wire codec.
//!
//! Outbound frames are float samples converted to signed 16-bit little-endian
//! PCM and base64-encoded. Inbound chunks go the other way. The scale factors
//! are asymmetric (`* 32767` out, `/ 32768` in) to match the endpoint.

use crate::error::AudioError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Sample rate of outbound (microphone) audio.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of inbound (synthesized) audio.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per outbound frame.
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// MIME type announced for outbound frames.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Converts a float sample to PCM16, clamping to `[-1, 1]` first.
pub fn float_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Converts a PCM16 sample to a normalized float.
pub fn pcm16_to_float(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Encodes float samples as base64 PCM16 LE.
pub fn encode_pcm16(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }
    STANDARD.encode(bytes)
}

/// Decodes a base64 PCM16 LE payload into normalized float samples.
///
/// # Errors
///
/// Returns [`AudioError::PlaybackDecode`] for invalid base64, an empty
/// payload, or an odd byte count.
pub fn decode_pcm16(data: &str) -> Result<Vec<f32>, AudioError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| AudioError::PlaybackDecode(format!("invalid base64: {}", e)))?;

    if bytes.is_empty() {
        return Err(AudioError::PlaybackDecode("empty audio chunk".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(AudioError::PlaybackDecode(format!(
            "odd PCM16 byte count: {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| pcm16_to_float(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSB: f32 = 1.0 / 32768.0;

    #[test]
    fn out_of_range_samples_clamp() {
        assert_eq!(float_to_pcm16(1.7), 32767);
        assert_eq!(float_to_pcm16(-3.0), -32767);
        assert_eq!(float_to_pcm16(f32::INFINITY), 32767);
        assert_eq!(float_to_pcm16(f32::NEG_INFINITY), -32767);
        assert_eq!(float_to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn conversion_rounds_to_nearest() {
        assert_eq!(float_to_pcm16(0.0), 0);
        assert_eq!(float_to_pcm16(0.5), 16384);
        assert_eq!(float_to_pcm16(-0.5), -16384);
        assert_eq!(float_to_pcm16(0.1), 3277);
    }

    #[test]
    fn frame_round_trip_within_one_lsb() {
        let input = [0.0, 0.1, -0.1, 0.25, -0.25, 0.5, -0.5, 1.0, -1.0, 1.7, -3.0];
        let decoded = decode_pcm16(&encode_pcm16(&input)).unwrap();

        assert_eq!(decoded.len(), input.len());
        for (original, back) in input.iter().zip(&decoded) {
            let expected = original.clamp(-1.0, 1.0);
            assert!(
                (expected - back).abs() <= LSB + f32::EPSILON,
                "{} decoded as {}",
                original,
                back
            );
        }
    }

    #[test]
    fn encoding_is_little_endian() {
        let encoded = encode_pcm16(&[pcm16_to_float(1)]);
        // 1/32768 * 32767 rounds to 1 -> bytes [0x01, 0x00]
        assert_eq!(STANDARD.decode(encoded).unwrap(), vec![0x01, 0x00]);
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert!(matches!(
            decode_pcm16("not base64!!"),
            Err(AudioError::PlaybackDecode(_))
        ));
        assert!(matches!(decode_pcm16(""), Err(AudioError::PlaybackDecode(_))));
        let odd = STANDARD.encode([1u8, 2, 3]);
        assert!(matches!(
            decode_pcm16(&odd),
            Err(AudioError::PlaybackDecode(_))
        ));
    }

    #[test]
    fn decode_scales_by_32768() {
        let payload = STANDARD.encode([0x00, 0x80, 0x00, 0x40]);
        assert_eq!(decode_pcm16(&payload).unwrap(), vec![-1.0, 0.5]);
    }
}
