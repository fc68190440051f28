//! Editor configuration
//!
//! Tunable constants of the editor core. Values are loaded from JSON
//! (missing fields fall back to defaults) and can be overridden with
//! `SAMPLECRAFT_*` environment variables.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::AnalyserSettings;
use crate::engine::buffer::DEFAULT_SAMPLE_RATE;
use crate::error::{Result, SamplecraftError};

/// Audio context settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Context sample rate in Hz
    pub sample_rate: u32,
    /// Frames rendered per graph pull
    pub render_quantum: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            render_quantum: 128,
        }
    }
}

/// Pitch shift stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchShiftConfig {
    pub window_size_secs: f32,
    /// Offset between the two read taps as a fraction of the window
    pub overlap: f32,
}

impl Default for PitchShiftConfig {
    fn default() -> Self {
        Self {
            window_size_secs: 0.1,
            overlap: 0.5,
        }
    }
}

/// Analysis tap settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let defaults = AnalyserSettings::default();
        Self {
            fft_size: defaults.fft_size,
            smoothing: defaults.smoothing,
            min_decibels: defaults.min_decibels,
            max_decibels: defaults.max_decibels,
        }
    }
}

impl AnalysisConfig {
    pub fn analyser_settings(&self) -> AnalyserSettings {
        AnalyserSettings {
            fft_size: self.fft_size,
            smoothing: self.smoothing,
            min_decibels: self.min_decibels,
            max_decibels: self.max_decibels,
        }
    }
}

/// Capture pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Extra capture time after the tempo-adjusted duration (encoder flush latency)
    pub margin_ms: f64,
    /// Frames per emitted capture packet
    pub packet_frames: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            margin_ms: 500.0,
            packet_frames: 4096,
        }
    }
}

/// Frequency-reactive deformation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformationConfig {
    /// Spatial noise frequency (k)
    pub noise_frequency: f32,
    /// Temporal noise frequency (ω)
    pub time_frequency: f32,
    /// Base displacement strength
    pub strength: f32,
    /// Boost gain applied to normalized energy
    pub gain: f32,
    /// Normalized energy below this leaves boost at 1
    pub deadband: f32,
    /// Per-frame interpolation factor toward the target boost (1 = none)
    pub boost_smoothing: f32,
    /// Resting spin speed in rad/s
    pub base_spin: f32,
    /// Exponential decay rate of extra spin, per second
    pub spin_decay: f32,
    pub bob_amplitude: f32,
    pub bob_frequency: f32,
    pub wobble_amplitude: f32,
    /// Highlight color approach rate, per second
    pub color_rate: f32,
    pub idle_color: [f32; 3],
    pub hover_color: [f32; 3],
    /// Icosphere subdivision level of the reference mesh
    pub mesh_detail: u32,
}

impl Default for DeformationConfig {
    fn default() -> Self {
        Self {
            noise_frequency: 1.5,
            time_frequency: 0.4,
            strength: 0.12,
            gain: 1.5,
            deadband: 0.05,
            boost_smoothing: 0.2,
            base_spin: 0.25,
            spin_decay: 1.5,
            bob_amplitude: 0.08,
            bob_frequency: 1.2,
            wobble_amplitude: 0.06,
            color_rate: 4.0,
            idle_color: [0.35, 0.35, 0.85],
            hover_color: [0.75, 0.35, 1.0],
            mesh_detail: 3,
        }
    }
}

/// Remote service endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub proxy_base_url: String,
    pub generation_url: String,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: "http://localhost:3000".to_string(),
            generation_url: "http://localhost:8000".to_string(),
            poll_interval_ms: 2000,
            max_polls: 90,
            timeout_ms: 30_000,
        }
    }
}

/// Complete editor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub audio: AudioConfig,
    pub pitch_shift: PitchShiftConfig,
    pub analysis: AnalysisConfig,
    pub capture: CaptureConfig,
    pub deformation: DeformationConfig,
    pub remote: RemoteConfig,
}

fn invalid(reason: impl Into<String>) -> SamplecraftError {
    SamplecraftError::InvalidConfig {
        reason: reason.into(),
    }
}

impl EditorConfig {
    /// Load a JSON config file; absent fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: EditorConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `SAMPLECRAFT_*` environment overrides in place
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("SAMPLECRAFT_PROXY_URL") {
            self.remote.proxy_base_url = url;
        }
        if let Ok(url) = env::var("SAMPLECRAFT_GENERATION_URL") {
            self.remote.generation_url = url;
        }
        if let Ok(raw) = env::var("SAMPLECRAFT_CAPTURE_MARGIN_MS") {
            self.capture.margin_ms = raw
                .parse()
                .map_err(|_| invalid(format!("SAMPLECRAFT_CAPTURE_MARGIN_MS={}", raw)))?;
        }
        if let Ok(raw) = env::var("SAMPLECRAFT_SAMPLE_RATE") {
            self.audio.sample_rate = raw
                .parse()
                .map_err(|_| invalid(format!("SAMPLECRAFT_SAMPLE_RATE={}", raw)))?;
        }
        self.validate()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate must be positive"));
        }
        if self.audio.render_quantum == 0 {
            return Err(invalid("audio.render_quantum must be positive"));
        }
        if self.pitch_shift.window_size_secs <= 0.0 {
            return Err(invalid("pitch_shift.window_size_secs must be positive"));
        }
        if !(self.pitch_shift.overlap > 0.0 && self.pitch_shift.overlap < 1.0) {
            return Err(invalid("pitch_shift.overlap must be inside (0, 1)"));
        }
        if !self.analysis.fft_size.is_power_of_two() || self.analysis.fft_size < 32 {
            return Err(invalid("analysis.fft_size must be a power of two >= 32"));
        }
        if !(0.0..1.0).contains(&self.analysis.smoothing) {
            return Err(invalid("analysis.smoothing must be inside [0, 1)"));
        }
        if self.analysis.min_decibels >= self.analysis.max_decibels {
            return Err(invalid("analysis.min_decibels must be below max_decibels"));
        }
        if self.capture.margin_ms < 0.0 {
            return Err(invalid("capture.margin_ms must not be negative"));
        }
        if self.capture.packet_frames == 0 {
            return Err(invalid("capture.packet_frames must be positive"));
        }
        if !(self.deformation.boost_smoothing > 0.0 && self.deformation.boost_smoothing <= 1.0) {
            return Err(invalid("deformation.boost_smoothing must be inside (0, 1]"));
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        EditorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("editor.json");
        std::fs::write(&path, r#"{ "capture": { "margin_ms": 250.0 } }"#).unwrap();

        let config = EditorConfig::load(&path).unwrap();
        assert_eq!(config.capture.margin_ms, 250.0);
        assert_eq!(config.capture.packet_frames, 4096);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_rejects_bad_fft_size() {
        let mut config = EditorConfig::default();
        config.analysis.fft_size = 300;
        assert_eq!(config.validate().unwrap_err().error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_rejects_bad_overlap() {
        let mut config = EditorConfig::default();
        config.pitch_shift.overlap = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EditorConfig::default();
        let json = config.to_json_pretty().unwrap();
        let parsed: EditorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
