//! Capture codecs
//!
//! A capture is recorded into a compressed stream by a [`CaptureEncoder`]
//! and turned back into PCM by a [`CaptureDecoder`]. The built-in codec
//! writes IMA-ADPCM (4 bits per sample) into a live WebM stream: the
//! leading chunk holds the EBML header, an unknown-size Segment, Info and
//! Tracks; every later chunk is one Cluster with a single SimpleBlock.
//!
//! SimpleBlock payload (little endian):
//!
//! ```text
//! frames u16 | per channel { predictor i16 | step_index u8 | reserved u8 }
//!            | per channel { ceil(frames / 2) bytes of nibbles, low nibble first }
//! ```

use crate::capture::ebml::{self, Reader};
use crate::engine::buffer::AudioBuffer;
use crate::engine::wav::{float_to_i16, i16_to_float};
use crate::error::{Result, SamplecraftError};

/// Matroska codec ID of the ADPCM track
pub const ADPCM_CODEC_ID: &str = "A_SAMPLECRAFT/IMA_ADPCM";

/// MIME type and extension of the compressed capture
pub const WEBM_MIME_TYPE: &str = "audio/webm";
pub const WEBM_EXTENSION: &str = "webm";

const CHANNEL_HEADER_LEN: usize = 4;
const TRACK_NUMBER: u64 = 1;
/// Cluster timestamps are in milliseconds
const TIMESTAMP_SCALE_NS: u64 = 1_000_000;
const SIMPLE_BLOCK_KEYFRAME: u8 = 0x80;
const SIMPLE_BLOCK_LACING: u8 = 0x06;
const MUXER_NAME: &str = concat!("samplecraft ", env!("CARGO_PKG_VERSION"));

/// Largest packet the u16 frame count can describe
pub const MAX_PACKET_FRAMES: usize = u16::MAX as usize;

const INDEX_TABLE: [i32; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Turns raw capture blocks into compressed chunks
pub trait CaptureEncoder: Send {
    /// MIME type of the produced stream
    fn mime_type(&self) -> &str;

    /// File extension used when the stream is delivered as-is
    fn extension(&self) -> &str;

    /// Begin a new stream; returns the leading chunk (may be empty)
    fn start(&mut self, channels: usize, sample_rate: u32) -> Result<Vec<u8>>;

    /// Encode one block; returns every chunk completed by it
    fn encode(&mut self, block: &[Vec<f32>]) -> Result<Vec<Vec<u8>>>;

    /// Flush buffered frames; returns the trailing chunk (may be empty)
    fn finish(&mut self) -> Result<Vec<u8>>;
}

/// Turns an assembled compressed capture back into PCM
pub trait CaptureDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer>;
}

#[derive(Debug, Clone, Copy, Default)]
struct AdpcmState {
    predictor: i32,
    index: i32,
}

impl AdpcmState {
    /// Apply one nibble to the predictor; shared by encoder and decoder
    fn apply(&mut self, nibble: u8) -> i16 {
        let step = STEP_TABLE[self.index as usize];
        let mut delta = step >> 3;
        if nibble & 4 != 0 {
            delta += step;
        }
        if nibble & 2 != 0 {
            delta += step >> 1;
        }
        if nibble & 1 != 0 {
            delta += step >> 2;
        }
        if nibble & 8 != 0 {
            self.predictor -= delta;
        } else {
            self.predictor += delta;
        }
        self.predictor = self.predictor.clamp(i16::MIN as i32, i16::MAX as i32);
        self.index = (self.index + INDEX_TABLE[nibble as usize]).clamp(0, 88);
        self.predictor as i16
    }

    fn encode(&mut self, sample: i16) -> u8 {
        let step = STEP_TABLE[self.index as usize];
        let mut diff = sample as i32 - self.predictor;
        let mut nibble = 0u8;
        if diff < 0 {
            nibble = 8;
            diff = -diff;
        }
        if diff >= step {
            nibble |= 4;
            diff -= step;
        }
        if diff >= step >> 1 {
            nibble |= 2;
            diff -= step >> 1;
        }
        if diff >= step >> 2 {
            nibble |= 1;
        }
        self.apply(nibble);
        nibble
    }
}

/// IMA-ADPCM encoder producing a live WebM stream
#[derive(Debug, Clone)]
pub struct ImaAdpcmEncoder {
    packet_frames: usize,
    states: Vec<AdpcmState>,
    pending: Vec<Vec<i16>>,
    sample_rate: u32,
    frames_written: u64,
    started: bool,
}

impl ImaAdpcmEncoder {
    pub fn new(packet_frames: usize) -> Self {
        Self {
            packet_frames: packet_frames.clamp(2, MAX_PACKET_FRAMES),
            states: Vec::new(),
            pending: Vec::new(),
            sample_rate: 0,
            frames_written: 0,
            started: false,
        }
    }

    fn pending_frames(&self) -> usize {
        self.pending.first().map(|ch| ch.len()).unwrap_or(0)
    }

    fn encode_packet(&mut self, frames: usize) -> Vec<u8> {
        let channels = self.pending.len();
        let nibble_bytes = frames.div_ceil(2);
        let mut packet =
            Vec::with_capacity(2 + channels * (CHANNEL_HEADER_LEN + nibble_bytes));
        packet.extend_from_slice(&(frames as u16).to_le_bytes());

        for state in &self.states {
            packet.extend_from_slice(&(state.predictor as i16).to_le_bytes());
            packet.push(state.index as u8);
            packet.push(0);
        }

        for (state, samples) in self.states.iter_mut().zip(self.pending.iter_mut()) {
            let taken: Vec<i16> = samples.drain(..frames).collect();
            for pair in taken.chunks(2) {
                let lo = state.encode(pair[0]);
                let hi = pair.get(1).map(|&s| state.encode(s)).unwrap_or(0);
                packet.push(lo | (hi << 4));
            }
        }

        packet
    }

    /// One Cluster holding `frames` frames as a single keyframe block
    fn emit_cluster(&mut self, frames: usize) -> Vec<u8> {
        let packet = self.encode_packet(frames);
        let timestamp_ms = self.frames_written * 1000 / u64::from(self.sample_rate.max(1));
        self.frames_written += frames as u64;

        let mut block = Vec::with_capacity(packet.len() + 4);
        ebml::write_size(&mut block, TRACK_NUMBER);
        block.extend_from_slice(&0i16.to_be_bytes());
        block.push(SIMPLE_BLOCK_KEYFRAME);
        block.extend_from_slice(&packet);

        let mut body = Vec::with_capacity(block.len() + 16);
        ebml::uint_element(&mut body, ebml::TIMESTAMP, timestamp_ms);
        ebml::element(&mut body, ebml::SIMPLE_BLOCK, &block);

        let mut cluster = Vec::with_capacity(body.len() + 8);
        ebml::element(&mut cluster, ebml::CLUSTER, &body);
        cluster
    }

    fn stream_header(channels: usize, sample_rate: u32) -> Vec<u8> {
        let mut ebml_header = Vec::new();
        ebml::uint_element(&mut ebml_header, ebml::EBML_VERSION, 1);
        ebml::uint_element(&mut ebml_header, ebml::EBML_READ_VERSION, 1);
        ebml::uint_element(&mut ebml_header, ebml::EBML_MAX_ID_LENGTH, 4);
        ebml::uint_element(&mut ebml_header, ebml::EBML_MAX_SIZE_LENGTH, 8);
        ebml::string_element(&mut ebml_header, ebml::DOC_TYPE, "webm");
        ebml::uint_element(&mut ebml_header, ebml::DOC_TYPE_VERSION, 4);
        ebml::uint_element(&mut ebml_header, ebml::DOC_TYPE_READ_VERSION, 2);

        let mut info = Vec::new();
        ebml::uint_element(&mut info, ebml::TIMESTAMP_SCALE, TIMESTAMP_SCALE_NS);
        ebml::string_element(&mut info, ebml::MUXING_APP, MUXER_NAME);
        ebml::string_element(&mut info, ebml::WRITING_APP, MUXER_NAME);

        let mut audio = Vec::new();
        ebml::float_element(&mut audio, ebml::SAMPLING_FREQUENCY, f64::from(sample_rate));
        ebml::uint_element(&mut audio, ebml::CHANNELS, channels as u64);

        let mut entry = Vec::new();
        ebml::uint_element(&mut entry, ebml::TRACK_NUMBER, TRACK_NUMBER);
        ebml::uint_element(&mut entry, ebml::TRACK_UID, TRACK_NUMBER);
        ebml::uint_element(&mut entry, ebml::TRACK_TYPE, ebml::TRACK_TYPE_AUDIO);
        ebml::string_element(&mut entry, ebml::CODEC_ID, ADPCM_CODEC_ID);
        ebml::element(&mut entry, ebml::AUDIO, &audio);

        let mut tracks = Vec::new();
        ebml::element(&mut tracks, ebml::TRACK_ENTRY, &entry);

        let mut out = Vec::new();
        ebml::element(&mut out, ebml::EBML, &ebml_header);
        ebml::write_id(&mut out, ebml::SEGMENT);
        ebml::write_unknown_size(&mut out);
        ebml::element(&mut out, ebml::INFO, &info);
        ebml::element(&mut out, ebml::TRACKS, &tracks);
        out
    }
}

impl Default for ImaAdpcmEncoder {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl CaptureEncoder for ImaAdpcmEncoder {
    fn mime_type(&self) -> &str {
        WEBM_MIME_TYPE
    }

    fn extension(&self) -> &str {
        WEBM_EXTENSION
    }

    fn start(&mut self, channels: usize, sample_rate: u32) -> Result<Vec<u8>> {
        if channels == 0 || channels > u8::MAX as usize {
            return Err(SamplecraftError::EncoderFailed {
                reason: format!("cannot encode {} channels", channels),
            });
        }
        if sample_rate == 0 {
            return Err(SamplecraftError::EncoderFailed {
                reason: "sample rate must be positive".to_string(),
            });
        }
        self.states = vec![AdpcmState::default(); channels];
        self.pending = vec![Vec::with_capacity(self.packet_frames); channels];
        self.sample_rate = sample_rate;
        self.frames_written = 0;
        self.started = true;

        Ok(Self::stream_header(channels, sample_rate))
    }

    fn encode(&mut self, block: &[Vec<f32>]) -> Result<Vec<Vec<u8>>> {
        if !self.started {
            return Err(SamplecraftError::EncoderFailed {
                reason: "encode called before start".to_string(),
            });
        }
        if block.len() != self.pending.len() {
            return Err(SamplecraftError::EncoderFailed {
                reason: format!(
                    "block has {} channels, stream has {}",
                    block.len(),
                    self.pending.len()
                ),
            });
        }

        for (pending, channel) in self.pending.iter_mut().zip(block) {
            pending.extend(channel.iter().map(|&s| float_to_i16(s)));
        }

        let mut chunks = Vec::new();
        while self.pending_frames() >= self.packet_frames {
            chunks.push(self.emit_cluster(self.packet_frames));
        }
        Ok(chunks)
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        if !self.started {
            return Ok(Vec::new());
        }
        self.started = false;
        let frames = self.pending_frames();
        if frames == 0 {
            return Ok(Vec::new());
        }
        Ok(self.emit_cluster(frames))
    }
}

/// Decoder for [`ImaAdpcmEncoder`] streams
#[derive(Debug, Clone, Copy, Default)]
pub struct ImaAdpcmDecoder;

fn corrupt(reason: impl Into<String>) -> SamplecraftError {
    SamplecraftError::CaptureDecodeFailed {
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AudioTrack {
    number: u64,
    channels: usize,
    sample_rate: u32,
}

fn parse_track_entry(data: &[u8]) -> Result<Option<AudioTrack>> {
    let mut number = None;
    let mut track_type = None;
    let mut codec = String::new();
    let mut channels = 1;
    let mut sample_rate = None;

    let mut reader = Reader::new(data);
    while let Some(child) = reader.next_element()? {
        match child.id {
            ebml::TRACK_NUMBER => number = Some(ebml::read_uint(child.data)?),
            ebml::TRACK_TYPE => track_type = Some(ebml::read_uint(child.data)?),
            ebml::CODEC_ID => codec = ebml::read_string(child.data),
            ebml::AUDIO => {
                let mut audio = Reader::new(child.data);
                while let Some(field) = audio.next_element()? {
                    match field.id {
                        ebml::SAMPLING_FREQUENCY => sample_rate = Some(ebml::read_float(field.data)?),
                        ebml::CHANNELS => channels = ebml::read_uint(field.data)? as usize,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    if track_type != Some(ebml::TRACK_TYPE_AUDIO) {
        return Ok(None);
    }
    if codec != ADPCM_CODEC_ID {
        return Err(corrupt(format!("unsupported codec '{}'", codec)));
    }
    let number = number.ok_or_else(|| corrupt("audio track without a number"))?;
    let sample_rate = sample_rate
        .filter(|r| r.is_finite() && *r >= 1.0 && *r <= f64::from(u32::MAX))
        .ok_or_else(|| corrupt("audio track without a valid sampling frequency"))?;
    if channels == 0 {
        return Err(corrupt("audio track declares zero channels"));
    }

    Ok(Some(AudioTrack {
        number,
        channels,
        sample_rate: sample_rate.round() as u32,
    }))
}

fn parse_tracks(data: &[u8]) -> Result<Option<AudioTrack>> {
    let mut reader = Reader::new(data);
    while let Some(entry) = reader.next_element()? {
        if entry.id == ebml::TRACK_ENTRY {
            if let Some(track) = parse_track_entry(entry.data)? {
                return Ok(Some(track));
            }
        }
    }
    Ok(None)
}

/// Payload of a SimpleBlock on `track`, or `None` for other tracks
fn block_payload(data: &[u8], track: u64) -> Result<Option<&[u8]>> {
    let (number, len) = ebml::read_vint(data)?;
    let header_end = len + 3;
    if data.len() < header_end {
        return Err(corrupt("truncated block header"));
    }
    if number != Some(track) {
        return Ok(None);
    }
    if data[len + 2] & SIMPLE_BLOCK_LACING != 0 {
        return Err(corrupt("laced blocks are not supported"));
    }
    Ok(Some(&data[header_end..]))
}

/// Decode one ADPCM packet, appending to `samples`
fn decode_packet(packet: &[u8], samples: &mut [Vec<f32>]) -> Result<()> {
    let channels = samples.len();
    if packet.len() < 2 {
        return Err(corrupt("truncated packet header"));
    }
    let frames = u16::from_le_bytes([packet[0], packet[1]]) as usize;
    let headers_end = 2 + channels * CHANNEL_HEADER_LEN;
    let nibble_bytes = frames.div_ceil(2);
    if packet.len() != headers_end + channels * nibble_bytes {
        return Err(corrupt(format!(
            "packet of {} bytes does not hold {} frames",
            packet.len(),
            frames
        )));
    }

    let states = packet[2..headers_end]
        .chunks_exact(CHANNEL_HEADER_LEN)
        .map(|h| AdpcmState {
            predictor: i16::from_le_bytes([h[0], h[1]]) as i32,
            index: (h[2] as i32).min(88),
        });

    let data = packet[headers_end..].chunks_exact(nibble_bytes.max(1));
    for ((mut state, nibbles), out) in states.zip(data).zip(samples.iter_mut()) {
        for (i, &byte) in nibbles.iter().enumerate() {
            out.push(i16_to_float(state.apply(byte & 0x0f)));
            if i * 2 + 1 < frames {
                out.push(i16_to_float(state.apply(byte >> 4)));
            }
        }
    }
    Ok(())
}

impl CaptureDecoder for ImaAdpcmDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer> {
        let mut top = Reader::new(bytes);
        let header = top
            .next_element()?
            .filter(|e| e.id == ebml::EBML)
            .ok_or_else(|| corrupt("missing EBML header"))?;
        let doc_type = Reader::new(header.data)
            .find(ebml::DOC_TYPE)?
            .map(|e| ebml::read_string(e.data))
            .unwrap_or_default();
        if doc_type != "webm" && doc_type != "matroska" {
            return Err(corrupt(format!("unexpected document type '{}'", doc_type)));
        }
        let segment = top
            .next_element()?
            .filter(|e| e.id == ebml::SEGMENT)
            .ok_or_else(|| corrupt("missing Segment"))?;

        let mut track: Option<AudioTrack> = None;
        let mut samples: Vec<Vec<f32>> = Vec::new();

        let mut children = Reader::new(segment.data);
        while let Some(child) = children.next_element()? {
            match child.id {
                ebml::TRACKS if track.is_none() => {
                    track = parse_tracks(child.data)?;
                    if let Some(t) = track {
                        samples = vec![Vec::new(); t.channels];
                    }
                }
                ebml::CLUSTER => {
                    let t = track.ok_or_else(|| corrupt("Cluster before Tracks"))?;
                    let mut blocks = Reader::new(child.data);
                    while let Some(block) = blocks.next_element()? {
                        if block.id != ebml::SIMPLE_BLOCK {
                            continue;
                        }
                        if let Some(packet) = block_payload(block.data, t.number)? {
                            decode_packet(packet, &mut samples)?;
                        }
                    }
                }
                _ => {}
            }
        }

        let track = track.ok_or_else(|| corrupt("no ADPCM audio track"))?;
        AudioBuffer::from_channels(samples, track.sample_rate)
            .map_err(|e| corrupt(format!("invalid decoded audio: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::generate_test_tone;

    fn encode_all(encoder: &mut ImaAdpcmEncoder, buffer: &AudioBuffer, block: usize) -> Vec<Vec<u8>> {
        let mut chunks = vec![encoder.start(buffer.channels(), buffer.sample_rate).unwrap()];
        let mut start = 0;
        while start < buffer.len() {
            let end = (start + block).min(buffer.len());
            let slice: Vec<Vec<f32>> = buffer.samples.iter().map(|c| c[start..end].to_vec()).collect();
            chunks.extend(encoder.encode(&slice).unwrap());
            start = end;
        }
        chunks.push(encoder.finish().unwrap());
        chunks
    }

    #[test]
    fn test_tone_survives_codec() {
        let tone = generate_test_tone(440.0, 0.5, 48000);
        let mut encoder = ImaAdpcmEncoder::new(1000);
        let stream: Vec<u8> = encode_all(&mut encoder, &tone, 128).concat();

        let decoded = ImaAdpcmDecoder.decode(&stream).unwrap();
        assert_eq!(decoded.len(), tone.len());
        assert_eq!(decoded.sample_rate, 48000);

        // Skip the adaptation ramp at the start
        let max_err = tone.channel(0)[200..]
            .iter()
            .zip(&decoded.channel(0)[200..])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_err < 0.05, "max error {}", max_err);
    }

    #[test]
    fn test_compresses_roughly_four_to_one() {
        let tone = generate_test_tone(440.0, 1.0, 48000);
        let mut encoder = ImaAdpcmEncoder::new(4096);
        let stream: Vec<u8> = encode_all(&mut encoder, &tone, 512).concat();
        let pcm16_len = tone.len() * 2;
        assert!(stream.len() * 3 < pcm16_len, "{} vs {}", stream.len(), pcm16_len);
    }

    #[test]
    fn test_odd_frame_counts_and_stereo() {
        let buffer = AudioBuffer::from_channels(
            vec![vec![0.25; 7], vec![-0.25; 7]],
            8000,
        )
        .unwrap();
        let mut encoder = ImaAdpcmEncoder::new(4);
        let chunks = encode_all(&mut encoder, &buffer, 3);
        // header, one full packet of 4, trailing packet of 3
        assert_eq!(chunks.iter().filter(|c| !c.is_empty()).count(), 3);

        let decoded = ImaAdpcmDecoder.decode(&chunks.concat()).unwrap();
        assert_eq!(decoded.channels(), 2);
        assert_eq!(decoded.len(), 7);
    }

    #[test]
    fn test_encode_before_start_fails() {
        let mut encoder = ImaAdpcmEncoder::default();
        assert!(encoder.encode(&[vec![0.0; 4]]).is_err());
        assert!(encoder.finish().unwrap().is_empty());
    }

    #[test]
    fn test_decoder_rejects_truncated_stream() {
        let tone = generate_test_tone(440.0, 0.1, 8000);
        let mut encoder = ImaAdpcmEncoder::new(256);
        let stream: Vec<u8> = encode_all(&mut encoder, &tone, 256).concat();

        let err = ImaAdpcmDecoder.decode(&stream[..stream.len() - 3]).unwrap_err();
        assert_eq!(err.error_code(), "CAPTURE_DECODE_FAILED");
        assert!(ImaAdpcmDecoder.decode(b"RIFF....").is_err());
    }

    #[test]
    fn test_stream_is_webm() {
        let mut encoder = ImaAdpcmEncoder::new(64);
        let header = encoder.start(2, 22050).unwrap();
        assert_eq!(&header[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert_eq!(encoder.extension(), "webm");
        assert_eq!(encoder.mime_type(), "audio/webm");

        let mut top = Reader::new(&header);
        let ebml_header = top.next_element().unwrap().unwrap();
        let doc = Reader::new(ebml_header.data).find(ebml::DOC_TYPE).unwrap().unwrap();
        assert_eq!(ebml::read_string(doc.data), "webm");

        let segment = top.next_element().unwrap().unwrap();
        assert_eq!(segment.id, ebml::SEGMENT);
        let tracks = Reader::new(segment.data).find(ebml::TRACKS).unwrap().unwrap();
        let track = parse_tracks(tracks.data).unwrap().unwrap();
        assert_eq!(
            track,
            AudioTrack {
                number: 1,
                channels: 2,
                sample_rate: 22050
            }
        );
    }

    #[test]
    fn test_cluster_timestamps_advance() {
        let tone = generate_test_tone(440.0, 0.1, 8000);
        let mut encoder = ImaAdpcmEncoder::new(400);
        let chunks = encode_all(&mut encoder, &tone, 400);

        let timestamps: Vec<u64> = chunks[1..]
            .iter()
            .filter(|c| !c.is_empty())
            .map(|c| {
                let cluster = Reader::new(c).next_element().unwrap().unwrap();
                assert_eq!(cluster.id, ebml::CLUSTER);
                let ts = Reader::new(cluster.data).find(ebml::TIMESTAMP).unwrap().unwrap();
                ebml::read_uint(ts.data).unwrap()
            })
            .collect();
        assert_eq!(timestamps, vec![0, 50]);
    }

    #[test]
    fn test_decoder_rejects_foreign_codec() {
        let mut encoder = ImaAdpcmEncoder::new(64);
        let mut stream = encoder.start(1, 8000).unwrap();
        let at = stream
            .windows(ADPCM_CODEC_ID.len())
            .position(|w| w == ADPCM_CODEC_ID.as_bytes())
            .unwrap();
        // Same length keeps every element size valid
        stream[at..at + ADPCM_CODEC_ID.len()].copy_from_slice(b"A_OPUS\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0");

        let err = ImaAdpcmDecoder.decode(&stream).unwrap_err();
        assert!(err.to_string().contains("A_OPUS"));
    }
}
