//! Error handling for Samplecraft
//!
//! Every failure in the editor core is scoped to the current sample or
//! capture session. Errors carry a stable code, a recoverability flag and
//! user-facing text so the editor session can turn them into UI signals.

use thiserror::Error;

/// Result type alias for Samplecraft operations
pub type Result<T> = std::result::Result<T, SamplecraftError>;

/// Main error type for Samplecraft operations
#[derive(Error, Debug)]
pub enum SamplecraftError {
    // Load Errors
    #[error("Failed to fetch sample audio from {url}: {reason}")]
    FetchFailed {
        url: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to decode sample audio: {reason}")]
    DecodeFailed {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    // Graph / Transport Errors
    #[error("No sample is loaded and ready for playback")]
    GraphNotReady,

    #[error("Invalid parameter '{param}': {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Capture Errors
    #[error("Capture unavailable: {reason}")]
    CaptureUnavailable { reason: String },

    #[error("A capture session is already active")]
    CaptureInProgress,

    #[error("Capture encoder failed: {reason}")]
    EncoderFailed { reason: String },

    #[error("Captured audio could not be decoded: {reason}")]
    CaptureDecodeFailed { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Remote Errors
    #[error("Remote service error: {message}")]
    RemoteError { message: String },

    #[error("Remote support not compiled: {operation}")]
    RemoteUnavailable { operation: String },

    #[error("Generation failed for every job: {}", summarize_jobs(.jobs))]
    GenerationFailed { jobs: Vec<(String, String)> },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn summarize_jobs(jobs: &[(String, String)]) -> String {
    jobs.iter()
        .map(|(id, status)| format!("{}={}", id, status))
        .collect::<Vec<_>>()
        .join(", ")
}

impl SamplecraftError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SamplecraftError::FetchFailed { .. } => "FETCH_FAILED",
            SamplecraftError::DecodeFailed { .. } => "DECODE_FAILED",
            SamplecraftError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            SamplecraftError::EmptyAudio => "EMPTY_AUDIO",
            SamplecraftError::GraphNotReady => "GRAPH_NOT_READY",
            SamplecraftError::InvalidParameter { .. } => "INVALID_PARAMETER",
            SamplecraftError::CaptureUnavailable { .. } => "CAPTURE_UNAVAILABLE",
            SamplecraftError::CaptureInProgress => "CAPTURE_IN_PROGRESS",
            SamplecraftError::EncoderFailed { .. } => "ENCODER_FAILED",
            SamplecraftError::CaptureDecodeFailed { .. } => "CAPTURE_DECODE_FAILED",
            SamplecraftError::InvalidConfig { .. } => "INVALID_CONFIG",
            SamplecraftError::RemoteError { .. } => "REMOTE_ERROR",
            SamplecraftError::RemoteUnavailable { .. } => "REMOTE_UNAVAILABLE",
            SamplecraftError::GenerationFailed { .. } => "GENERATION_FAILED",
            SamplecraftError::Io(_) => "IO_ERROR",
            SamplecraftError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable by retrying the user action
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SamplecraftError::InvalidConfig { .. } | SamplecraftError::RemoteUnavailable { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SamplecraftError::FetchFailed { .. } => vec![
                "Check your network connection",
                "The sample may have expired upstream - try generating it again",
            ],
            SamplecraftError::DecodeFailed { .. } | SamplecraftError::UnsupportedFormat { .. } => {
                vec![
                    "The sample file may be corrupted - try reloading it",
                    "Supported formats: MP3, WAV, AAC, FLAC",
                ]
            }
            SamplecraftError::GraphNotReady => vec![
                "Wait for the sample to finish loading",
                "Reload the sample if loading failed",
            ],
            SamplecraftError::CaptureUnavailable { .. } => vec![
                "Load a sample before downloading",
                "Check that audio output is available",
            ],
            SamplecraftError::CaptureInProgress => {
                vec!["Wait for the current download to finish"]
            }
            SamplecraftError::GenerationFailed { .. } => {
                vec!["Try a different prompt", "Try again in a few minutes"]
            }
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            SamplecraftError::FetchFailed { .. } | SamplecraftError::DecodeFailed { .. } => {
                "This sample couldn't be loaded. Playback and download are disabled until it loads."
                    .to_string()
            }
            SamplecraftError::GraphNotReady => "The sample isn't ready yet.".to_string(),
            SamplecraftError::CaptureUnavailable { reason } => {
                format!("Download couldn't start: {}", reason)
            }
            SamplecraftError::CaptureInProgress => {
                "A download is already being prepared.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
