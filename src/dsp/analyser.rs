//! Analysis tap DSP
//!
//! Keeps the most recent `fft_size` samples of a mono downmix and derives
//! smoothed frequency magnitudes from them the way a browser analyser
//! node does: Blackman window, magnitude scaled by 1/N, exponential
//! smoothing over time, then dB mapped onto 0..=255 between
//! `min_decibels` and `max_decibels`.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Analyser tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserSettings {
    /// FFT length, a power of two
    pub fft_size: usize,
    /// Time smoothing constant in [0, 1)
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Spectrum + waveform analyser
pub struct Analyser {
    settings: AnalyserSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    /// Ring of the latest samples, oldest first once `filled`
    history: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    decibels: Vec<f32>,
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Analyser {
    pub fn new(settings: AnalyserSettings) -> Self {
        let n = settings.fft_size.max(32).next_power_of_two();
        let settings = AnalyserSettings {
            fft_size: n,
            smoothing: settings.smoothing.clamp(0.0, 0.99),
            ..settings
        };

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);

        // Blackman window
        let window = (0..n)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Self {
            settings,
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); n],
            history: vec![0.0; n],
            write_pos: 0,
            smoothed: vec![0.0; n / 2],
            bytes: vec![0; n / 2],
            decibels: vec![settings.min_decibels; n / 2],
        }
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    /// Number of frequency bins (half the FFT size)
    pub fn frequency_bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// Feed one block; channels are averaged into the history ring
    pub fn push(&mut self, block: &[Vec<f32>]) {
        let channels = block.len();
        if channels == 0 {
            return;
        }
        let frames = block[0].len();
        let n = self.history.len();
        for frame in 0..frames {
            let mixed = block.iter().map(|ch| ch[frame]).sum::<f32>() / channels as f32;
            self.history[self.write_pos] = mixed;
            self.write_pos = (self.write_pos + 1) % n;
        }
    }

    /// Recompute the spectrum from the current history
    pub fn update(&mut self) {
        let n = self.history.len();
        for i in 0..n {
            let sample = self.history[(self.write_pos + i) % n];
            self.scratch[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.settings.smoothing;
        let range = self.settings.max_decibels - self.settings.min_decibels;
        for k in 0..n / 2 {
            let magnitude = self.scratch[k].norm() / n as f32;
            self.smoothed[k] = tau * self.smoothed[k] + (1.0 - tau) * magnitude;

            let db = if self.smoothed[k] > 0.0 {
                20.0 * self.smoothed[k].log10()
            } else {
                f32::NEG_INFINITY
            };
            self.decibels[k] = db.max(self.settings.min_decibels);

            let scaled = 255.0 / range * (db - self.settings.min_decibels);
            self.bytes[k] = if scaled.is_finite() {
                scaled.clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
    }

    /// Frequency magnitudes mapped to 0..=255
    pub fn frequency_data(&self) -> &[u8] {
        &self.bytes
    }

    /// Frequency magnitudes in dB, floored at `min_decibels`
    pub fn frequency_decibels(&self) -> &[f32] {
        &self.decibels
    }

    /// Latest `fft_size` samples, oldest first
    pub fn waveform_data(&self) -> Vec<f32> {
        let n = self.history.len();
        (0..n).map(|i| self.history[(self.write_pos + i) % n]).collect()
    }

    /// Forget history and smoothing state
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
        self.bytes.iter_mut().for_each(|b| *b = 0);
        self.decibels
            .iter_mut()
            .for_each(|d| *d = self.settings.min_decibels);
        self.write_pos = 0;
    }
}

/// Arithmetic mean of byte frequency data
pub fn mean_magnitude(data: &[u8]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|&b| b as f32).sum::<f32>() / data.len() as f32
}
