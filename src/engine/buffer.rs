//! Audio Buffer Management
//!
//! Decoded audio lives in non-interleaved 32-bit float buffers. The same
//! type carries decoded sample sources, rendered graph output and decoded
//! captures.

use crate::error::{Result, SamplecraftError};

// ============================================================================
// Constants
// ============================================================================

/// Default context sample rate (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Maximum number of channels the editor graph carries
pub const MAX_CHANNELS: usize = 2;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of an audio buffer in dB
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.channels() * buffer.len();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of an audio buffer in dB
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Decoded multi-channel audio
///
/// Stores audio as non-interleaved 32-bit floating point samples, one
/// `Vec<f32>` per channel. All channels always have the same length.
///
/// # Example
/// ```
/// use samplecraft::engine::buffer::AudioBuffer;
///
/// let buffer = AudioBuffer::silent(48000, 2, 48000);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer of `frames` frames
    pub fn silent(frames: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; frames]; channels],
            sample_rate,
        }
    }

    /// Create a buffer from per-channel sample vectors
    ///
    /// # Errors
    /// * `UnsupportedFormat` - zero channels or more than two
    /// * `InvalidParameter` - channels of unequal length or a zero sample rate
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() || samples.len() > MAX_CHANNELS {
            return Err(SamplecraftError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono/stereo supported)", samples.len()),
            });
        }
        if sample_rate == 0 {
            return Err(SamplecraftError::InvalidParameter {
                param: "sample_rate".to_string(),
                value: "0".to_string(),
                expected: "a positive sample rate".to_string(),
            });
        }

        let len = samples[0].len();
        if let Some(bad) = samples.iter().position(|ch| ch.len() != len) {
            return Err(SamplecraftError::InvalidParameter {
                param: "samples".to_string(),
                value: format!("channel {} has {} frames", bad, samples[bad].len()),
                expected: format!("{} frames in every channel", len),
            });
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 || interleaved.len() % channels != 0 {
            return Err(SamplecraftError::InvalidParameter {
                param: "interleaved".to_string(),
                value: format!("{} samples", interleaved.len()),
                expected: format!("a multiple of {} channels", channels),
            });
        }

        let frames = interleaved.len() / channels;
        let mut samples = vec![Vec::with_capacity(frames); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Self::from_channels(samples, sample_rate)
    }

    /// Return a copy with every channel played back to front
    pub fn reversed(&self) -> Self {
        Self {
            samples: self
                .samples
                .iter()
                .map(|ch| ch.iter().rev().copied().collect())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of frames (samples per channel)
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no frames)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the natural duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }
}

/// Generate a mono sine tone, useful for exercising the graph
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    let samples = (0..num_samples)
        .map(|i| 0.5 * (angular_freq * i as f32).sin())
        .collect();

    AudioBuffer {
        samples: vec![samples],
        sample_rate,
    }
}

// ============================================================================
// Tests
// ============================================================================
