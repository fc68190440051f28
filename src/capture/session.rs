//! Capture session state and the file handed to the user

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;

/// MIME type of the transcoded download
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// One bounded recording of the graph output
#[derive(Debug, Clone)]
pub struct CaptureSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    title: String,
    chunks: Vec<Vec<u8>>,
    active: bool,
    expected_duration_ms: f64,
    /// Loop setting to restore when the session ends
    prior_loop: bool,
    /// Clock time at which capture stops
    deadline: f64,
}

impl CaptureSession {
    pub fn new(title: impl Into<String>, expected_duration_ms: f64, prior_loop: bool, now: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            title: title.into(),
            chunks: Vec::new(),
            active: true,
            expected_duration_ms,
            prior_loop,
            deadline: now + expected_duration_ms / 1000.0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn expected_duration_ms(&self) -> f64 {
        self.expected_duration_ms
    }

    pub fn prior_loop(&self) -> bool {
        self.prior_loop
    }

    pub fn deadline(&self) -> f64 {
        self.deadline
    }

    /// Append a fragment; empty fragments are dropped
    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    pub fn captured_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// All fragments in capture order as one blob
    pub fn assemble(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    /// End the session and release its fragments
    pub fn close(&mut self) {
        self.active = false;
        self.chunks.clear();
    }
}

/// A file offered for download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFile {
    pub file_name: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl DownloadFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// `"{title}_edited.{extension}"`
    pub fn edited_name(title: &str, extension: &str) -> String {
        format!("{}_edited.{}", title, extension)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True for the uncompressed WAV path, false for a raw capture fallback
    pub fn is_transcoded(&self) -> bool {
        self.mime_type == WAV_MIME_TYPE
    }

    /// Hex SHA-256 of the contents
    pub fn sha256(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }

    /// Write into `dir`; path separators in the name become underscores
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let safe: String = self
            .file_name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        let path = dir.join(safe);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_deadline_from_expected_duration() {
        let session = CaptureSession::new("beat", 2500.0, true, 10.0);
        assert!(session.is_active());
        assert!(session.prior_loop());
        assert_eq!(session.deadline(), 12.5);
    }

    #[test]
    fn test_chunks_assemble_in_order() {
        let mut session = CaptureSession::new("beat", 100.0, false, 0.0);
        session.push_chunk(vec![1, 2]);
        session.push_chunk(Vec::new());
        session.push_chunk(vec![3]);
        assert_eq!(session.chunks().len(), 2);
        assert_eq!(session.assemble(), vec![1, 2, 3]);
        assert_eq!(session.captured_bytes(), 3);

        session.close();
        assert!(!session.is_active());
        assert!(session.chunks().is_empty());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = CaptureSession::new("a", 0.0, false, 0.0);
        let b = CaptureSession::new("a", 0.0, false, 0.0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_download_file() {
        let file = DownloadFile::new(DownloadFile::edited_name("Kick", "wav"), WAV_MIME_TYPE, b"abc".to_vec());
        assert_eq!(file.file_name, "Kick_edited.wav");
        assert!(file.is_transcoded());
        assert_eq!(
            file.sha256(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_write_to_sanitizes_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = DownloadFile::new("a/b_edited.webm", "audio/webm", vec![7; 4]);
        let path = file.write_to(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "a_b_edited.webm");
        assert_eq!(std::fs::read(path).unwrap(), vec![7; 4]);
        assert!(!file.is_transcoded());
    }
}
