//! Delay-line pitch shifter
//!
//! Changes pitch without changing duration. Two read taps sweep through a
//! short delay line with a sawtooth whose rate follows the pitch ratio;
//! the taps are offset by `overlap` of a window and crossfaded with a
//! sin² window so the seam of each sweep is never heard at full level.

use std::f32::consts::PI;

/// Semitone range accepted by the shifter
pub const MIN_SEMITONES: i32 = -12;
pub const MAX_SEMITONES: i32 = 12;

/// Convert a semitone offset to a frequency ratio
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    2.0_f32.powf(semitones / 12.0)
}

/// Circular delay line with fractional reads
#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(4)],
            write_pos: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Read `delay` samples behind the most recent write, linearly interpolated
    fn read(&self, delay: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(0.0, (len - 2) as f32);
        let newest = (self.write_pos + len - 1) % len;
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;

        let a = self.buffer[(newest + len - whole) % len];
        let b = self.buffer[(newest + len - whole - 1) % len];
        a + frac * (b - a)
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }
}

/// Multi-channel pitch shifter
#[derive(Debug, Clone)]
pub struct PitchShifter {
    semitones: i32,
    ratio: f32,
    window_samples: f32,
    overlap: f32,
    /// Sawtooth phase in [0, 1)
    phase: f32,
    lines: Vec<DelayLine>,
}

impl PitchShifter {
    /// Create a shifter
    ///
    /// # Arguments
    /// * `channels` - Number of channels processed
    /// * `sample_rate` - Context sample rate in Hz
    /// * `window_size_secs` - Length of one sweep window
    /// * `overlap` - Offset between the two taps as a fraction of the window (0..1)
    pub fn new(channels: usize, sample_rate: u32, window_size_secs: f32, overlap: f32) -> Self {
        let window_samples = (window_size_secs * sample_rate as f32).max(8.0);
        let line_len = window_samples.ceil() as usize + 4;
        Self {
            semitones: 0,
            ratio: 1.0,
            window_samples,
            overlap: overlap.clamp(0.05, 0.95),
            phase: 0.0,
            lines: (0..channels).map(|_| DelayLine::new(line_len)).collect(),
        }
    }

    /// Set the shift in semitones, clamped to [-12, 12]
    pub fn set_semitones(&mut self, semitones: i32) {
        self.semitones = semitones.clamp(MIN_SEMITONES, MAX_SEMITONES);
        self.ratio = semitones_to_ratio(self.semitones as f32);
    }

    pub fn semitones(&self) -> i32 {
        self.semitones
    }

    pub fn window_samples(&self) -> f32 {
        self.window_samples
    }

    pub fn channels(&self) -> usize {
        self.lines.len()
    }

    /// Clear delay lines and restart the sweep
    pub fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::clear);
        self.phase = 0.0;
    }

    #[inline]
    fn tap_gain(phase: f32) -> f32 {
        let s = (PI * phase).sin();
        s * s
    }

    /// Process a block in place; `block[ch]` holds one channel
    ///
    /// At zero semitones the signal passes through untouched while the
    /// delay lines keep filling, so a later shift starts from real history.
    pub fn process(&mut self, block: &mut [Vec<f32>]) {
        let frames = block.first().map(|ch| ch.len()).unwrap_or(0);

        if self.semitones == 0 {
            for (line, channel) in self.lines.iter_mut().zip(block.iter()) {
                channel.iter().for_each(|&s| line.push(s));
            }
            return;
        }

        // Delay shrinks when pitching up and grows when pitching down
        let phase_step = (1.0 - self.ratio) / self.window_samples;

        for frame in 0..frames {
            let phase_a = self.phase;
            let phase_b = (self.phase + self.overlap).fract();
            let gain_a = Self::tap_gain(phase_a);
            let gain_b = Self::tap_gain(phase_b);
            let norm = (gain_a + gain_b).max(1e-6);

            for (line, channel) in self.lines.iter_mut().zip(block.iter_mut()) {
                let input = channel[frame];
                line.push(input);
                let a = line.read(phase_a * self.window_samples);
                let b = line.read(phase_b * self.window_samples);
                channel[frame] = (a * gain_a + b * gain_b) / norm;
            }

            self.phase = (self.phase + phase_step).rem_euclid(1.0);
        }
    }
}
