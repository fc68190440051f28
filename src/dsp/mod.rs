//! Signal processing stages used by the editor graph

mod analyser;
mod pitch_shift;

pub use analyser::{mean_magnitude, Analyser, AnalyserSettings};
pub use pitch_shift::{semitones_to_ratio, PitchShifter, MAX_SEMITONES, MIN_SEMITONES};
