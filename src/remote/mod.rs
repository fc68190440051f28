//! Remote collaborators
//!
//! - [`generation`]: the `POST /generate` job client and its response mapping
//! - [`community`]: response shapes of the community endpoints
//! - [`proxy_audio_url`]: same-origin proxy URLs for sample audio
//! - [`job_url`]: status URLs on the generation service

pub mod community;
pub mod generation;

pub use community::{CommunitySample, LikeCountResponse, LikesResponse, SamplesResponse};
pub use generation::{
    generate_samples, GenerateRequest, GenerateResponse, GeneratedSample, GenerationBackend,
    GenerationReply, JobStatus, MockGenerationBackend, PollOptions,
};

#[cfg(feature = "remote")]
pub use generation::HttpGenerationBackend;

use url::{form_urlencoded, Url};

use crate::error::{Result, SamplecraftError};

/// `{base}/proxy-audio?url=<encoded upstream url>`
pub fn proxy_audio_url(proxy_base_url: &str, upstream_url: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("url", upstream_url)
        .finish();
    format!("{}/proxy-audio?{}", proxy_base_url.trim_end_matches('/'), query)
}

/// `{base}/jobs/{id}` with the job ID escaped as a single path segment
pub fn job_url(base_url: &str, job_id: &str) -> Result<Url> {
    let invalid = |reason: String| SamplecraftError::RemoteError {
        message: format!("invalid service URL {}: {}", base_url, reason),
    };
    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(["jobs", job_id]);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_audio_url() {
        assert_eq!(
            proxy_audio_url("https://app.example/", "https://gen.example/out/1.mp3"),
            "https://app.example/proxy-audio?url=https%3A%2F%2Fgen.example%2Fout%2F1.mp3"
        );
    }

    #[test]
    fn test_proxy_audio_url_escapes_query_characters() {
        assert_eq!(
            proxy_audio_url("/api", "https://x.io/a b.mp3?sig=1&t=é"),
            "/api/proxy-audio?url=https%3A%2F%2Fx.io%2Fa+b.mp3%3Fsig%3D1%26t%3D%C3%A9"
        );
    }

    #[test]
    fn test_job_url_keeps_id_in_one_segment() {
        let url = job_url("http://localhost:8000/", "a/b c").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/jobs/a%2Fb%20c");

        let nested = job_url("http://gen.example/v1", "42").unwrap();
        assert_eq!(nested.as_str(), "http://gen.example/v1/jobs/42");

        assert!(matches!(
            job_url("not a url", "1"),
            Err(SamplecraftError::RemoteError { .. })
        ));
    }
}
