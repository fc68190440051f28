//! Compressed source decoding
//!
//! Sample sources arrive as encoded bytes (the audio proxy forwards
//! `audio/mpeg`). They are probed and decoded with symphonia into an
//! [`AudioBuffer`] at the file's native sample rate.

use std::io::Cursor;

use log::debug;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::buffer::{AudioBuffer, MAX_CHANNELS};
use crate::error::{Result, SamplecraftError};

fn decode_failed(reason: impl Into<String>, source: Option<Error>) -> SamplecraftError {
    SamplecraftError::DecodeFailed {
        reason: reason.into(),
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

/// Decode an encoded audio file image
///
/// # Arguments
/// * `bytes` - Complete file contents
/// * `extension_hint` - Optional file extension ("mp3", "wav", ...) to speed up probing
///
/// # Errors
/// * `DecodeFailed` - the container or codec is unrecognized or corrupt
/// * `UnsupportedFormat` - more than two channels
/// * `EmptyAudio` - the stream decodes to zero frames
pub fn decode_audio_bytes(bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<AudioBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_failed("unrecognized audio container", Some(e)))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| decode_failed("no audio track", None))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_failed("unsupported codec", Some(e)))?;

    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());
    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(Error::ResetRequired) => break,
            Err(e) => return Err(decode_failed("failed to read packet", Some(e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count());

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(sample_buf.samples());
            }
            // Corrupt frames are skipped, matching how browsers tolerate damaged MP3s
            Err(Error::DecodeError(reason)) => {
                debug!("Skipping undecodable packet: {}", reason);
                continue;
            }
            Err(e) => return Err(decode_failed("decoder failure", Some(e))),
        }
    }

    let channels = channels.ok_or_else(|| decode_failed("unknown channel count", None))?;
    let sample_rate = sample_rate.ok_or_else(|| decode_failed("unknown sample rate", None))?;

    if channels == 0 || channels > MAX_CHANNELS {
        return Err(SamplecraftError::UnsupportedFormat {
            format: format!("{}-channel audio (only mono/stereo supported)", channels),
        });
    }
    if interleaved.is_empty() {
        return Err(SamplecraftError::EmptyAudio);
    }

    let buffer = AudioBuffer::from_interleaved(&interleaved, channels, sample_rate)?;
    debug!(
        "Decoded {} frames, {} ch @ {} Hz ({:.3}s)",
        buffer.len(),
        buffer.channels(),
        buffer.sample_rate,
        buffer.duration_secs()
    );
    Ok(buffer)
}
