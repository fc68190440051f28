//! Audio Engine Module
//!
//! Core audio engine including:
//! - Audio buffers, WAV encoding and source decoding
//! - Sample loading
//! - The node graph and its manager
//! - Transport state machine

pub mod buffer;
pub mod clock;
pub mod decode;
pub mod graph;
pub mod loader;
pub mod transport;
pub mod wav;

pub use buffer::{generate_test_tone, AudioBuffer};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use decode::decode_audio_bytes;
pub use graph::{
    AudioContext, AudioGraph, AudioGraphManager, AudioOutput, BufferedOutput, NodeKind,
    NodeProbe, NullOutput, PlaybackParams,
};
pub use loader::{FileSampleLoader, MemorySampleLoader, ProxySampleLoader, SampleAsset, SampleLoader};
pub use transport::{PlaybackState, StopReason, TransportController, TransportEvent, TransportState};
pub use wav::{decode_wav, encode_wav};
