//! Community endpoint response shapes
//!
//! The editor only consumes three shapes: `{ samples: [...] }` from
//! "fetch samples", `{ likes: [...] }` from "fetch user likes" and
//! `{ likes_count }` from "like".

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::loader::SampleAsset;

/// A shared sample as listed in the community feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunitySample {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub prompt: Option<String>,
    pub audio_url: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl CommunitySample {
    /// Asset handed to the editor when this sample is opened
    pub fn to_asset(&self) -> SampleAsset {
        SampleAsset::new(self.title.clone(), self.audio_url.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplesResponse {
    pub samples: Vec<CommunitySample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub sample_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikesResponse {
    pub likes: Vec<Like>,
}

impl LikesResponse {
    pub fn liked_sample_ids(&self) -> HashSet<&str> {
        self.likes.iter().map(|l| l.sample_id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeCountResponse {
    pub likes_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_shape() {
        let json = r#"{"samples":[{"id":"s1","title":"Kick","audio_url":"https://x/k.mp3","likes_count":3,"created_at":"2024-05-01T10:00:00Z"}]}"#;
        let parsed: SamplesResponse = serde_json::from_str(json).unwrap();
        let sample = &parsed.samples[0];
        assert_eq!(sample.likes_count, 3);
        assert!(sample.created_at.is_some());
        assert_eq!(sample.to_asset(), SampleAsset::new("Kick", "https://x/k.mp3"));
    }

    #[test]
    fn test_likes_shape() {
        let parsed: LikesResponse =
            serde_json::from_str(r#"{"likes":[{"sample_id":"a"},{"sample_id":"b","user_id":"u"}]}"#)
                .unwrap();
        let ids = parsed.liked_sample_ids();
        assert!(ids.contains("a") && ids.contains("b"));

        let count: LikeCountResponse = serde_json::from_str(r#"{"likes_count":12}"#).unwrap();
        assert_eq!(count.likes_count, 12);
    }
}
