//! Sample generation client
//!
//! `POST /generate { prompt }` submits one job per variant to the upstream
//! generation service, polls every job until it reaches a terminal state
//! and maps the outcome onto the response the page expects:
//!
//! - every job succeeded: 200
//! - some jobs failed: 200 with a `warning`
//! - every job failed: 500 with the per-job status

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{Result, SamplecraftError};

/// Body of `POST /generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

/// One generated sample in the response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSample {
    /// URL of the generated audio
    pub audio: String,
    pub title: String,
    pub prompt: String,
}

/// Response body of `POST /generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub samples: Vec<GeneratedSample>,
    pub original_prompt: String,
    pub corrected_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// HTTP status plus body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReply {
    pub status: u16,
    pub body: GenerateResponse,
}

/// State of one upstream job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded { audio_url: String },
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. } | JobStatus::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded { .. } => "succeeded",
            JobStatus::Failed { .. } => "failed",
        }
    }
}

/// Upstream generation service
pub trait GenerationBackend: Send + Sync {
    /// Submit one variant; returns the job id
    fn submit(&self, prompt: &str, variant: usize) -> Result<String>;

    fn poll(&self, job_id: &str) -> Result<JobStatus>;

    /// Prompt actually sent upstream
    fn correct_prompt(&self, prompt: &str) -> Result<String> {
        Ok(prompt.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Polling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub variants: usize,
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            variants: 2,
            interval: Duration::from_millis(2000),
            max_polls: 90,
        }
    }
}

impl From<&RemoteConfig> for PollOptions {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
            ..Self::default()
        }
    }
}

fn sample_title(prompt: &str, variant: usize) -> String {
    let words: Vec<&str> = prompt.split_whitespace().take(4).collect();
    let base = if words.is_empty() {
        "Sample".to_string()
    } else {
        words.join(" ")
    };
    format!("{} #{}", base, variant + 1)
}

/// Run a generation request to completion
///
/// # Errors
/// * `InvalidParameter` - empty prompt
/// * `GenerationFailed` - every job failed or timed out (maps to 500)
pub fn generate_samples(
    backend: &dyn GenerationBackend,
    request: &GenerateRequest,
    options: PollOptions,
) -> Result<GenerationReply> {
    if request.prompt.trim().is_empty() {
        return Err(SamplecraftError::InvalidParameter {
            param: "prompt".to_string(),
            value: "<empty>".to_string(),
            expected: "text description of the sample".to_string(),
        });
    }

    let corrected = backend.correct_prompt(&request.prompt)?;

    let mut jobs: Vec<(String, Option<JobStatus>)> = Vec::with_capacity(options.variants);
    for variant in 0..options.variants.max(1) {
        match backend.submit(&corrected, variant) {
            Ok(id) => jobs.push((id, None)),
            Err(e) => {
                warn!("Submitting variant {} failed: {}", variant, e);
                jobs.push((
                    format!("variant-{}", variant),
                    Some(JobStatus::Failed {
                        reason: e.to_string(),
                    }),
                ));
            }
        }
    }

    let mut polls = 0;
    while jobs.iter().any(|(_, s)| s.is_none()) && polls < options.max_polls {
        if polls > 0 && !options.interval.is_zero() {
            std::thread::sleep(options.interval);
        }
        polls += 1;

        for (id, status) in jobs.iter_mut().filter(|(_, s)| s.is_none()) {
            match backend.poll(id) {
                Ok(s) if s.is_terminal() => {
                    debug!(job = %id, status = s.label(), "Job finished");
                    *status = Some(s);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(job = %id, "Polling failed: {}", e);
                    *status = Some(JobStatus::Failed {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    let mut samples = Vec::new();
    let mut failures = Vec::new();
    for (variant, (id, status)) in jobs.into_iter().enumerate() {
        match status {
            Some(JobStatus::Succeeded { audio_url }) => samples.push(GeneratedSample {
                audio: audio_url,
                title: sample_title(&corrected, variant),
                prompt: corrected.clone(),
            }),
            Some(other) => failures.push((id, other.label().to_string())),
            None => failures.push((id, "timeout".to_string())),
        }
    }

    if samples.is_empty() {
        return Err(SamplecraftError::GenerationFailed { jobs: failures });
    }

    let warning = if failures.is_empty() {
        None
    } else {
        Some(format!(
            "{} of {} samples failed to generate",
            failures.len(),
            failures.len() + samples.len()
        ))
    };

    Ok(GenerationReply {
        status: 200,
        body: GenerateResponse {
            success: true,
            samples,
            original_prompt: request.prompt.clone(),
            corrected_prompt: corrected,
            warning,
        },
    })
}

/// Status and JSON body for a failed generation request
pub fn failure_response(error: &SamplecraftError) -> (u16, serde_json::Value) {
    match error {
        SamplecraftError::GenerationFailed { jobs } => (
            500,
            serde_json::json!({
                "success": false,
                "error": error.to_string(),
                "jobs": jobs
                    .iter()
                    .map(|(id, status)| serde_json::json!({ "id": id, "status": status }))
                    .collect::<Vec<_>>(),
            }),
        ),
        SamplecraftError::InvalidParameter { .. } => (
            400,
            serde_json::json!({ "success": false, "error": error.to_string() }),
        ),
        _ => (
            500,
            serde_json::json!({ "success": false, "error": error.to_string() }),
        ),
    }
}

/// Scripted backend: each variant walks through its status sequence
#[derive(Debug, Default)]
pub struct MockGenerationBackend {
    scripts: Mutex<HashMap<String, VecDeque<JobStatus>>>,
    plans: Vec<Vec<JobStatus>>,
}

impl MockGenerationBackend {
    /// `plans[variant]` is the sequence of statuses its job reports; the
    /// last entry repeats
    pub fn new(plans: Vec<Vec<JobStatus>>) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            plans,
        }
    }
}

impl GenerationBackend for MockGenerationBackend {
    fn submit(&self, _prompt: &str, variant: usize) -> Result<String> {
        let plan = self.plans.get(variant).cloned().ok_or_else(|| SamplecraftError::RemoteError {
            message: format!("no plan for variant {}", variant),
        })?;
        let id = format!("job-{}", variant);
        let mut scripts = self.scripts.lock().map_err(|_| SamplecraftError::RemoteError {
            message: "mock state poisoned".to_string(),
        })?;
        scripts.insert(id.clone(), plan.into());
        Ok(id)
    }

    fn poll(&self, job_id: &str) -> Result<JobStatus> {
        let mut scripts = self.scripts.lock().map_err(|_| SamplecraftError::RemoteError {
            message: "mock state poisoned".to_string(),
        })?;
        let script = scripts
            .get_mut(job_id)
            .ok_or_else(|| SamplecraftError::RemoteError {
                message: format!("unknown job {}", job_id),
            })?;
        let status = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        Ok(status.unwrap_or(JobStatus::Pending))
    }
}

/// Generation service over HTTP
///
/// `POST {base}/jobs { prompt, variant }` returns `{ job_id }`;
/// `GET {base}/jobs/{id}` returns a [`JobStatus`].
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpGenerationBackend {
    base_url: String,
    timeout_ms: u64,
}

#[cfg(feature = "remote")]
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[cfg(feature = "remote")]
impl HttpGenerationBackend {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_ms,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(config.generation_url.clone(), config.timeout_ms)
    }

    fn client(&self) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| SamplecraftError::RemoteError {
                message: e.to_string(),
            })
    }

    fn remote_error(&self, e: reqwest::Error) -> SamplecraftError {
        let message = if e.is_timeout() {
            format!("request to {} timed out after {}ms", self.base_url, self.timeout_ms)
        } else if e.is_connect() {
            format!("cannot connect to {}: {}", self.base_url, e)
        } else {
            e.to_string()
        };
        SamplecraftError::RemoteError { message }
    }
}

#[cfg(feature = "remote")]
impl GenerationBackend for HttpGenerationBackend {
    fn submit(&self, prompt: &str, variant: usize) -> Result<String> {
        let url = format!("{}/jobs", self.base_url);
        let response = self
            .client()?
            .post(&url)
            .json(&serde_json::json!({ "prompt": prompt, "variant": variant }))
            .send()
            .map_err(|e| self.remote_error(e))?;
        if !response.status().is_success() {
            return Err(SamplecraftError::RemoteError {
                message: format!("job submission returned {}", response.status()),
            });
        }
        let body: SubmitResponse = response.json().map_err(|e| self.remote_error(e))?;
        Ok(body.job_id)
    }

    fn poll(&self, job_id: &str) -> Result<JobStatus> {
        let url = super::job_url(&self.base_url, job_id)?;
        let response = self
            .client()?
            .get(url)
            .send()
            .map_err(|e| self.remote_error(e))?;
        if !response.status().is_success() {
            return Err(SamplecraftError::RemoteError {
                message: format!("job status returned {}", response.status()),
            });
        }
        response.json().map_err(|e| self.remote_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fast() -> PollOptions {
        PollOptions {
            variants: 2,
            interval: Duration::ZERO,
            max_polls: 10,
        }
    }

    fn done(url: &str) -> JobStatus {
        JobStatus::Succeeded {
            audio_url: url.to_string(),
        }
    }

    fn failed() -> JobStatus {
        JobStatus::Failed {
            reason: "model error".to_string(),
        }
    }

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn test_all_jobs_succeed() {
        let backend = MockGenerationBackend::new(vec![
            vec![JobStatus::Pending, JobStatus::Running, done("a.mp3")],
            vec![JobStatus::Running, done("b.mp3")],
        ]);
        let reply = generate_samples(&backend, &request("  lofi   drums "), fast()).unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body.warning, None);
        assert_eq!(reply.body.corrected_prompt, "lofi drums");
        assert_eq!(reply.body.original_prompt, "  lofi   drums ");
        assert_eq!(
            reply.body.samples,
            vec![
                GeneratedSample {
                    audio: "a.mp3".to_string(),
                    title: "lofi drums #1".to_string(),
                    prompt: "lofi drums".to_string(),
                },
                GeneratedSample {
                    audio: "b.mp3".to_string(),
                    title: "lofi drums #2".to_string(),
                    prompt: "lofi drums".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_one_failure_is_a_warning() {
        let backend = MockGenerationBackend::new(vec![vec![done("a.mp3")], vec![failed()]]);
        let reply = generate_samples(&backend, &request("bass"), fast()).unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body.samples.len(), 1);
        assert_eq!(reply.body.warning.as_deref(), Some("1 of 2 samples failed to generate"));
    }

    #[test]
    fn test_total_failure_is_500_with_job_status() {
        let backend = MockGenerationBackend::new(vec![vec![failed()], vec![JobStatus::Pending]]);
        let err = generate_samples(&backend, &request("pads"), fast()).unwrap_err();
        match &err {
            SamplecraftError::GenerationFailed { jobs } => assert_eq!(
                jobs,
                &vec![
                    ("job-0".to_string(), "failed".to_string()),
                    ("job-1".to_string(), "timeout".to_string()),
                ]
            ),
            other => panic!("unexpected {:?}", other),
        }

        let (status, body) = failure_response(&err);
        assert_eq!(status, 500);
        assert_eq!(body["jobs"][1]["status"], "timeout");
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let backend = MockGenerationBackend::new(vec![]);
        let err = generate_samples(&backend, &request("   "), fast()).unwrap_err();
        assert_eq!(failure_response(&err).0, 400);
    }

    #[test]
    fn test_response_json_shape() {
        let response = GenerateResponse {
            success: true,
            samples: vec![],
            original_prompt: "a".to_string(),
            corrected_prompt: "a".to_string(),
            warning: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["originalPrompt"], "a");
        assert!(json.get("warning").is_none());

        let status: JobStatus =
            serde_json::from_str(r#"{"status":"succeeded","audio_url":"x.mp3"}"#).unwrap();
        assert_eq!(status, done("x.mp3"));
    }
}
