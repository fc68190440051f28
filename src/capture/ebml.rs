//! Minimal EBML writer and reader
//!
//! Covers the subset of EBML the capture container needs: master and
//! binary elements, unsigned integers, floats, strings and the
//! unknown-size Segment a live recorder emits before it knows its length.

use crate::error::{Result, SamplecraftError};

// EBML header
pub const EBML: u32 = 0x1A45_DFA3;
pub const EBML_VERSION: u32 = 0x4286;
pub const EBML_READ_VERSION: u32 = 0x42F7;
pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
pub const DOC_TYPE: u32 = 0x4282;
pub const DOC_TYPE_VERSION: u32 = 0x4287;
pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

// Segment level
pub const SEGMENT: u32 = 0x1853_8067;
pub const INFO: u32 = 0x1549_A966;
pub const TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
pub const MUXING_APP: u32 = 0x4D80;
pub const WRITING_APP: u32 = 0x5741;
pub const TRACKS: u32 = 0x1654_AE6B;
pub const CLUSTER: u32 = 0x1F43_B675;

// Tracks
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_UID: u32 = 0x73C5;
pub const TRACK_TYPE: u32 = 0x83;
pub const CODEC_ID: u32 = 0x86;
pub const AUDIO: u32 = 0xE1;
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
pub const CHANNELS: u32 = 0x9F;

// Clusters
pub const TIMESTAMP: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;

/// Matroska track type for audio
pub const TRACK_TYPE_AUDIO: u64 = 2;

/// Eight-byte size with every value bit set: "until the parent ends"
const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

fn corrupt(reason: impl Into<String>) -> SamplecraftError {
    SamplecraftError::CaptureDecodeFailed {
        reason: reason.into(),
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Write an element ID; IDs carry their own length marker
pub fn write_id(out: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(3);
    out.extend_from_slice(&bytes[skip..]);
}

/// Write a data size as the shortest variable-length integer
pub fn write_size(out: &mut Vec<u8>, size: u64) {
    // A length of n bytes holds 7n value bits; all ones is reserved
    let len = (1..=8usize)
        .find(|&n| size < (1u64 << (7 * n)) - 1)
        .unwrap_or(8);
    let marked = size | (1u64 << (7 * len));
    out.extend_from_slice(&marked.to_be_bytes()[8 - len..]);
}

pub fn write_unknown_size(out: &mut Vec<u8>) {
    out.extend_from_slice(&UNKNOWN_SIZE);
}

/// Binary or master element with a known payload
pub fn element(out: &mut Vec<u8>, id: u32, payload: &[u8]) {
    write_id(out, id);
    write_size(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

pub fn uint_element(out: &mut Vec<u8>, id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    element(out, id, &bytes[skip..]);
}

pub fn float_element(out: &mut Vec<u8>, id: u32, value: f64) {
    element(out, id, &value.to_be_bytes());
}

pub fn string_element(out: &mut Vec<u8>, id: u32, value: &str) {
    element(out, id, value.as_bytes());
}

// ============================================================================
// Reading
// ============================================================================

/// One parsed element; `data` is its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub id: u32,
    pub data: &'a [u8],
}

/// Sequential reader over sibling elements
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

fn vint_len(first: u8) -> Result<usize> {
    if first == 0 {
        return Err(corrupt("invalid variable-length integer"));
    }
    Ok(first.leading_zeros() as usize + 1)
}

/// Read a variable-length integer with its marker removed
///
/// Returns `None` for the reserved unknown value.
pub fn read_vint(bytes: &[u8]) -> Result<(Option<u64>, usize)> {
    let first = *bytes.first().ok_or_else(|| corrupt("truncated size"))?;
    let len = vint_len(first)?;
    if bytes.len() < len {
        return Err(corrupt("truncated size"));
    }
    let mut value = u64::from(first & (0xFF >> len));
    for &b in &bytes[1..len] {
        value = (value << 8) | u64::from(b);
    }
    let all_ones = (1u64 << (7 * len)) - 1;
    Ok((if value == all_ones { None } else { Some(value) }, len))
}

fn read_id(bytes: &[u8]) -> Result<(u32, usize)> {
    let first = *bytes.first().ok_or_else(|| corrupt("truncated element ID"))?;
    let len = vint_len(first)?;
    if len > 4 {
        return Err(corrupt("element ID longer than four bytes"));
    }
    if bytes.len() < len {
        return Err(corrupt("truncated element ID"));
    }
    let id = bytes[..len].iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    Ok((id, len))
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Next sibling, or `None` once the input is exhausted
    ///
    /// An unknown-size element extends to the end of the input.
    pub fn next_element(&mut self) -> Result<Option<Element<'a>>> {
        let rest = &self.bytes[self.pos..];
        if rest.is_empty() {
            return Ok(None);
        }
        let (id, id_len) = read_id(rest)?;
        let (size, size_len) = read_vint(&rest[id_len..])?;
        let start = id_len + size_len;

        let end = match size {
            Some(size) => {
                let end = usize::try_from(size)
                    .ok()
                    .and_then(|s| start.checked_add(s))
                    .ok_or_else(|| corrupt("element size overflows"))?;
                if end > rest.len() {
                    return Err(corrupt(format!("truncated element 0x{:X}", id)));
                }
                end
            }
            None => rest.len(),
        };

        self.pos += end;
        Ok(Some(Element {
            id,
            data: &rest[start..end],
        }))
    }

    /// First child with the given ID
    pub fn find(mut self, id: u32) -> Result<Option<Element<'a>>> {
        while let Some(element) = self.next_element()? {
            if element.id == id {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }
}

pub fn read_uint(data: &[u8]) -> Result<u64> {
    if data.len() > 8 {
        return Err(corrupt("integer element longer than eight bytes"));
    }
    Ok(data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

pub fn read_float(data: &[u8]) -> Result<f64> {
    match data.len() {
        4 => Ok(f64::from(f32::from_be_bytes([data[0], data[1], data[2], data[3]]))),
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(data);
            Ok(f64::from_be_bytes(raw))
        }
        n => Err(corrupt(format!("float element of {} bytes", n))),
    }
}

/// Strings may be padded with trailing zero bytes
pub fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, &[0x80] ; "zero")]
    #[test_case(126, &[0xFE] ; "largest one byte")]
    #[test_case(127, &[0x40, 0x7F] ; "reserved pattern moves to two bytes")]
    #[test_case(300, &[0x41, 0x2C] ; "two bytes")]
    fn test_write_size(size: u64, expected: &[u8]) {
        let mut out = Vec::new();
        write_size(&mut out, size);
        assert_eq!(out, expected);
        assert_eq!(read_vint(&out).unwrap(), (Some(size), expected.len()));
    }

    #[test]
    fn test_ids_keep_their_marker() {
        let mut out = Vec::new();
        write_id(&mut out, EBML);
        write_id(&mut out, TRACK_ENTRY);
        assert_eq!(out, vec![0x1A, 0x45, 0xDF, 0xA3, 0xAE]);
    }

    #[test]
    fn test_unknown_size_runs_to_end() {
        let mut out = Vec::new();
        write_id(&mut out, SEGMENT);
        write_unknown_size(&mut out);
        uint_element(&mut out, TIMESTAMP, 1000);

        let mut reader = Reader::new(&out);
        let segment = reader.next_element().unwrap().unwrap();
        assert_eq!(segment.id, SEGMENT);
        let child = Reader::new(segment.data).find(TIMESTAMP).unwrap().unwrap();
        assert_eq!(read_uint(child.data).unwrap(), 1000);
        assert!(reader.next_element().unwrap().is_none());
    }

    #[test]
    fn test_scalar_elements() {
        let mut out = Vec::new();
        float_element(&mut out, SAMPLING_FREQUENCY, 44100.0);
        string_element(&mut out, DOC_TYPE, "webm");
        uint_element(&mut out, CHANNELS, 0);

        let mut reader = Reader::new(&out);
        let rate = reader.next_element().unwrap().unwrap();
        assert_eq!(read_float(rate.data).unwrap(), 44100.0);
        let doc = reader.next_element().unwrap().unwrap();
        assert_eq!(read_string(doc.data), "webm");
        let channels = reader.next_element().unwrap().unwrap();
        assert_eq!(channels.data, &[0]);
    }

    #[test]
    fn test_truncated_element_is_rejected() {
        let mut out = Vec::new();
        element(&mut out, SIMPLE_BLOCK, &[1, 2, 3, 4]);
        out.pop();
        assert!(Reader::new(&out).next_element().is_err());
        assert!(Reader::new(&[0x00, 0x81]).next_element().is_err());
    }
}
