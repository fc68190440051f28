//! Samplecraft - Sample Editor Engine
//!
//! The audio editing and rendering core of a sample editor:
//! 1. Audio graph - Source -> PitchShift -> {output, analysis tap, recording tap}
//! 2. Transport - play/stop/loop against a tempo-adjusted duration
//! 3. Capture & transcode - record the live output, deliver it as WAV
//! 4. Reactive visual - noise-deformed mesh driven by the analysis tap
//!
//! # Architecture
//!
//! [`editor::EditorSession`] owns every component for one editor view and is
//! driven by a single per-frame `tick()` against an injected clock:
//! - `engine`: buffers, WAV codec, decoding, graph, transport, loading
//! - `dsp`: pitch shifter and FFT analyser
//! - `capture`: capture codec, sessions and the capture pipeline
//! - `visual`: simplex noise, mesh and the frequency-reactive deformer
//! - `remote`: generation client and community response shapes

pub mod capture;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod editor;
pub mod engine;
pub mod error;
pub mod remote;
pub mod visual;

pub use config::EditorConfig;
pub use editor::{ControlState, EditorEvent, EditorSession};
pub use error::{Result, SamplecraftError};
