//! Capture & transcode
//!
//! - [`codec`]: compressed capture encoding/decoding
//! - [`ebml`]: the WebM container primitives used by the codec
//! - [`session`]: session state and download files
//! - [`pipeline`]: the capture state machine driven by the editor tick

pub mod codec;
pub mod ebml;
pub mod pipeline;
pub mod session;

pub use codec::{CaptureDecoder, CaptureEncoder, ImaAdpcmDecoder, ImaAdpcmEncoder, WEBM_MIME_TYPE};
pub use pipeline::{CaptureOutcome, CapturePipeline};
pub use session::{CaptureSession, DownloadFile, WAV_MIME_TYPE};
