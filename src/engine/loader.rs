//! Sample assets and how their audio bytes are fetched
//!
//! The editor receives a [`SampleAsset`] from the surrounding page. Its
//! audio is fetched through a same-origin proxy (`GET /proxy-audio?url=...`)
//! in production, or read straight from disk for local work.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplecraftError};

/// The audio + title being edited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleAsset {
    pub title: String,
    pub audio_source_url: String,
}

impl SampleAsset {
    pub fn new(title: impl Into<String>, audio_source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            audio_source_url: audio_source_url.into(),
        }
    }

    /// File extension of the source URL, used as a decoder hint
    pub fn extension_hint(&self) -> Option<&str> {
        let path = self
            .audio_source_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let (_, ext) = path.rsplit_once('.')?;
        if ext.is_empty() || ext.contains('/') {
            None
        } else {
            Some(ext)
        }
    }
}

/// Fetches the encoded audio bytes of an asset
pub trait SampleLoader: Send + Sync {
    fn load(&self, asset: &SampleAsset) -> Result<Vec<u8>>;
}

/// Reads `audio_source_url` as a local path or `file://` URL
#[derive(Debug, Clone, Default)]
pub struct FileSampleLoader {
    root: Option<PathBuf>,
}

impl FileSampleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let raw = url.strip_prefix("file://").unwrap_or(url);
        let path = Path::new(raw);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl SampleLoader for FileSampleLoader {
    fn load(&self, asset: &SampleAsset) -> Result<Vec<u8>> {
        let path = self.resolve(&asset.audio_source_url);
        std::fs::read(&path).map_err(|e| SamplecraftError::FetchFailed {
            url: path.display().to_string(),
            reason: e.to_string(),
            source: Some(Box::new(e)),
        })
    }
}

/// In-memory loader keyed by source URL
#[derive(Debug, Clone, Default)]
pub struct MemorySampleLoader {
    entries: Vec<(String, Vec<u8>)>,
}

impl MemorySampleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        let url = url.into();
        self.entries.retain(|(u, _)| *u != url);
        self.entries.push((url, bytes));
    }
}

impl SampleLoader for MemorySampleLoader {
    fn load(&self, asset: &SampleAsset) -> Result<Vec<u8>> {
        self.entries
            .iter()
            .find(|(url, _)| *url == asset.audio_source_url)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| SamplecraftError::FetchFailed {
                url: asset.audio_source_url.clone(),
                reason: "not found".to_string(),
                source: None,
            })
    }
}

/// Fetches audio through the `/proxy-audio` endpoint
#[derive(Debug, Clone)]
pub struct ProxySampleLoader {
    proxy_base_url: String,
    #[cfg_attr(not(feature = "remote"), allow(dead_code))]
    timeout_ms: u64,
}

impl ProxySampleLoader {
    pub fn new(proxy_base_url: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            proxy_base_url: proxy_base_url.into(),
            timeout_ms,
        }
    }

    pub fn url_for(&self, asset: &SampleAsset) -> String {
        crate::remote::proxy_audio_url(&self.proxy_base_url, &asset.audio_source_url)
    }
}

impl SampleLoader for ProxySampleLoader {
    #[cfg(feature = "remote")]
    fn load(&self, asset: &SampleAsset) -> Result<Vec<u8>> {
        let url = self.url_for(asset);
        let fetch_failed = |reason: String| SamplecraftError::FetchFailed {
            url: url.clone(),
            reason,
            source: None,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| fetch_failed(e.to_string()))?;

        let response = client
            .get(&url)
            .send()
            .map_err(|e| fetch_failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_failed(format!("proxy returned {}", response.status())));
        }

        let bytes = response.bytes().map_err(|e| fetch_failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    #[cfg(not(feature = "remote"))]
    fn load(&self, _asset: &SampleAsset) -> Result<Vec<u8>> {
        Err(SamplecraftError::RemoteUnavailable {
            operation: "proxy audio fetch (build with --features remote)".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_hint() {
        let asset = SampleAsset::new("a", "https://cdn.example.com/x/beat.mp3?sig=abc");
        assert_eq!(asset.extension_hint(), Some("mp3"));
        let asset = SampleAsset::new("a", "https://cdn.example.com/x/beat");
        assert_eq!(asset.extension_hint(), None);
    }

    #[test]
    fn test_asset_json_shape() {
        let asset: SampleAsset =
            serde_json::from_str(r#"{"title":"Drums","audioSourceUrl":"u.mp3"}"#).unwrap();
        assert_eq!(asset, SampleAsset::new("Drums", "u.mp3"));
    }

    #[test]
    fn test_file_loader_reports_missing_file() {
        let loader = FileSampleLoader::new();
        let err = loader
            .load(&SampleAsset::new("x", "/nonexistent/sample.mp3"))
            .unwrap_err();
        assert_eq!(err.error_code(), "FETCH_FAILED");
    }

    #[test]
    fn test_file_loader_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("s.wav"), b"abc").unwrap();
        let loader = FileSampleLoader::with_root(dir.path());
        let bytes = loader.load(&SampleAsset::new("s", "file://s.wav")).unwrap();
        assert_eq!(bytes, b"abc");
    }

    #[test]
    fn test_memory_loader() {
        let mut loader = MemorySampleLoader::new();
        loader.insert("mem://a", vec![1, 2, 3]);
        assert_eq!(loader.load(&SampleAsset::new("a", "mem://a")).unwrap(), vec![1, 2, 3]);
        assert!(loader.load(&SampleAsset::new("b", "mem://b")).is_err());
    }

    #[test]
    fn test_proxy_url() {
        let loader = ProxySampleLoader::new("http://localhost:3000", 1000);
        let url = loader.url_for(&SampleAsset::new("a", "https://x.io/a b.mp3"));
        assert_eq!(
            url,
            "http://localhost:3000/proxy-audio?url=https%3A%2F%2Fx.io%2Fa+b.mp3"
        );
    }
}
