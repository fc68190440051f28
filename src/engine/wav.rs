//! WAV encoding and decoding
//!
//! `encode_wav` is the byte encoder used for downloads: a 16-bit PCM WAV
//! image written through hound into memory. Reading also goes through
//! hound.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::AudioBuffer;
use crate::error::{Result, SamplecraftError};

/// Bit depth of encoded downloads
pub const BITS_PER_SAMPLE: u16 = 16;

/// Convert one float sample to a signed 16-bit value
///
/// Negative values scale by 32768, non-negative by 32767, then round to
/// the nearest step, so [`i16_to_float`] recovers the input within half a
/// step.
#[inline]
pub fn float_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled.round() as i16
}

/// Inverse of [`float_to_i16`]
#[inline]
pub fn i16_to_float(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

fn encode_err(e: hound::Error) -> SamplecraftError {
    SamplecraftError::EncoderFailed {
        reason: format!("Failed to write WAV: {}", e),
    }
}

/// Encode a decoded buffer as a 16-bit PCM WAV file image
///
/// The output is `44 + frames * channels * 2` bytes. Channels are expected
/// to have equal length; a short channel is padded with silence.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_err)?;
    for frame in 0..buffer.len() {
        for channel in &buffer.samples {
            let sample = channel.get(frame).copied().unwrap_or(0.0);
            writer.write_sample(float_to_i16(sample)).map_err(encode_err)?;
        }
    }
    writer.finalize().map_err(encode_err)?;

    Ok(cursor.into_inner())
}

/// Decode a WAV file image into an [`AudioBuffer`]
///
/// 16-bit data is mapped back with [`i16_to_float`] so that
/// `decode_wav(&encode_wav(b)?)` stays within half a quantization step.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| SamplecraftError::DecodeFailed {
        reason: format!("Failed to read WAV header: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;

    AudioBuffer::from_interleaved(&interleaved, channels, spec.sample_rate)
}

fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let decode_err = |e: hound::Error| SamplecraftError::DecodeFailed {
        reason: format!("Failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_err),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(i16_to_float))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_err),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_err),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_err),
        (SampleFormat::Int, bits) => Err(SamplecraftError::UnsupportedFormat {
            format: format!("{}-bit integer WAV", bits),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::generate_test_tone;
    use test_case::test_case;

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    #[test_case(1.0, 32767 ; "full scale positive")]
    #[test_case(-1.0, -32768 ; "full scale negative")]
    #[test_case(0.0, 0 ; "silence")]
    #[test_case(2.5, 32767 ; "clamped positive")]
    #[test_case(-7.0, -32768 ; "clamped negative")]
    #[test_case(0.5, 16384 ; "half positive rounds")]
    #[test_case(0.1, 3277 ; "rounds to nearest")]
    #[test_case(-0.5, -16384 ; "half negative")]
    fn test_float_to_i16(input: f32, expected: i16) {
        assert_eq!(float_to_i16(input), expected);
    }

    const HEADER_LEN: usize = 44;

    #[test]
    fn test_header_fields_stereo() {
        let buffer = AudioBuffer::from_channels(vec![vec![0.0; 10], vec![0.0; 10]], 44100).unwrap();
        let bytes = encode_wav(&buffer).unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 10 * 2 * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4), 36 + 40);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), 1);
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 24), 44100);
        assert_eq!(u32_at(&bytes, 28), 44100 * 4);
        assert_eq!(u16_at(&bytes, 32), 4);
        assert_eq!(u16_at(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), 40);
    }

    #[test]
    fn test_samples_are_interleaved() {
        let buffer =
            AudioBuffer::from_channels(vec![vec![1.0, 0.0], vec![-1.0, 0.5]], 8000).unwrap();
        let bytes = encode_wav(&buffer).unwrap();
        let data = &bytes[HEADER_LEN..];
        let samples: Vec<i16> = data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![32767, -32768, 0, 16384]);
    }

    #[test]
    fn test_empty_buffer_is_header_only() {
        let buffer = AudioBuffer::from_channels(vec![Vec::new()], 22050).unwrap();
        let bytes = encode_wav(&buffer).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(u32_at(&bytes, 40), 0);
    }

    #[test]
    fn test_decode_roundtrip_within_quantization() {
        let original = generate_test_tone(440.0, 0.1, 44100);
        let decoded = decode_wav(&encode_wav(&original).unwrap()).unwrap();

        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.channel(0).iter().zip(decoded.channel(0)) {
            assert!((a - b).abs() <= 1.0 / 32768.0);
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_wav(b"definitely not a wav file");
        assert!(matches!(result, Err(SamplecraftError::DecodeFailed { .. })));
    }
}
