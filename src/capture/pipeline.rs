//! Capture and transcode
//!
//! Records the graph output for one tempo-adjusted pass of the sample,
//! then turns the compressed capture into a WAV download. When the
//! capture cannot be decoded the compressed blob itself is delivered.

use tracing::{debug, info, warn};

use crate::capture::codec::{CaptureDecoder, CaptureEncoder, ImaAdpcmDecoder, ImaAdpcmEncoder};
use crate::capture::session::{CaptureSession, DownloadFile, WAV_MIME_TYPE};
use crate::config::CaptureConfig;
use crate::engine::graph::AudioGraphManager;
use crate::engine::transport::{StopReason, TransportController};
use crate::engine::wav::encode_wav;
use crate::error::{Result, SamplecraftError};

/// How a finished capture was delivered
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Decoded and re-encoded as WAV
    Transcoded(DownloadFile),
    /// Decode failed; the compressed capture is delivered as-is
    Fallback {
        file: DownloadFile,
        reason: String,
    },
    /// The encoder failed mid-capture; nothing to deliver
    Failed(SamplecraftError),
}

impl CaptureOutcome {
    pub fn file(&self) -> Option<&DownloadFile> {
        match self {
            CaptureOutcome::Transcoded(file) => Some(file),
            CaptureOutcome::Fallback { file, .. } => Some(file),
            CaptureOutcome::Failed(_) => None,
        }
    }

    pub fn into_file(self) -> Option<DownloadFile> {
        match self {
            CaptureOutcome::Transcoded(file) => Some(file),
            CaptureOutcome::Fallback { file, .. } => Some(file),
            CaptureOutcome::Failed(_) => None,
        }
    }
}

/// Drives at most one [`CaptureSession`] at a time
pub struct CapturePipeline {
    encoder: Box<dyn CaptureEncoder>,
    decoder: Box<dyn CaptureDecoder>,
    margin_ms: f64,
    session: Option<CaptureSession>,
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("margin_ms", &self.margin_ms)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl CapturePipeline {
    pub fn new(encoder: Box<dyn CaptureEncoder>, decoder: Box<dyn CaptureDecoder>, margin_ms: f64) -> Self {
        Self {
            encoder,
            decoder,
            margin_ms: margin_ms.max(0.0),
            session: None,
        }
    }

    /// Built-in ADPCM codec with the configured margin and packet size
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            Box::new(ImaAdpcmEncoder::new(config.packet_frames)),
            Box::new(ImaAdpcmDecoder),
            config.margin_ms,
        )
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().map(|s| s.is_active()).unwrap_or(false)
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn margin_ms(&self) -> f64 {
        self.margin_ms
    }

    /// Open a session, force loop off and play from the start
    ///
    /// Nothing about playback is touched when this fails.
    pub fn begin(
        &mut self,
        graph: &mut AudioGraphManager,
        transport: &mut TransportController,
        title: &str,
        now: f64,
    ) -> Result<()> {
        if self.is_active() {
            return Err(SamplecraftError::CaptureInProgress);
        }
        if !graph.is_ready() {
            return Err(SamplecraftError::CaptureUnavailable {
                reason: "no sample is loaded".to_string(),
            });
        }

        let (channels, sample_rate) = graph.open_recording()?;
        let header = match self.encoder.start(channels, sample_rate) {
            Ok(header) => header,
            Err(e) => {
                graph.close_recording();
                return Err(e);
            }
        };

        let params = graph.params();
        transport.set_loop(graph, false);
        transport.stop(graph, StopReason::Requested);
        if let Err(e) = transport.play(graph, now) {
            transport.set_loop(graph, params.looping);
            graph.close_recording();
            return Err(e);
        }

        let expected_ms = graph.total_duration() / params.tempo * 1000.0 + self.margin_ms;
        let mut session = CaptureSession::new(title, expected_ms, params.looping, now);
        session.push_chunk(header);

        info!(
            session = %session.id(),
            expected_ms,
            "Capture started for '{}'",
            title
        );
        self.session = Some(session);
        Ok(())
    }

    /// Collect encoded chunks; finalize once the deadline has passed
    pub fn poll(
        &mut self,
        graph: &mut AudioGraphManager,
        transport: &mut TransportController,
        now: f64,
    ) -> Option<CaptureOutcome> {
        let deadline = self.session.as_ref().filter(|s| s.is_active())?.deadline();

        if let Err(e) = self.encode_pending(graph) {
            warn!("Capture encoder failed: {}", e);
            self.finish_session(graph, transport);
            return Some(CaptureOutcome::Failed(e));
        }

        if now < deadline {
            return None;
        }
        Some(self.finalize(graph, transport))
    }

    /// Abandon the active session; returns whether one was active
    pub fn cancel(&mut self, graph: &mut AudioGraphManager, transport: &mut TransportController) -> bool {
        if !self.is_active() {
            return false;
        }
        // Flush encoder state so the next session starts clean
        if let Err(e) = self.encoder.finish() {
            debug!("Discarding encoder error on cancel: {}", e);
        }
        self.finish_session(graph, transport);
        debug!("Capture cancelled");
        true
    }

    fn encode_pending(&mut self, graph: &mut AudioGraphManager) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        for block in graph.drain_recording() {
            for chunk in self.encoder.encode(&block)? {
                session.push_chunk(chunk);
            }
        }
        Ok(())
    }

    fn finalize(&mut self, graph: &mut AudioGraphManager, transport: &mut TransportController) -> CaptureOutcome {
        // A failed flush loses the tail of the capture; deliver nothing
        let tail = match self.encoder.finish() {
            Ok(tail) => tail,
            Err(e) => {
                warn!("Capture encoder failed to flush: {}", e);
                self.finish_session(graph, transport);
                return CaptureOutcome::Failed(e);
            }
        };
        let (title, blob) = match self.session.as_mut() {
            Some(session) => {
                session.push_chunk(tail);
                (session.title().to_string(), session.assemble())
            }
            None => (String::new(), Vec::new()),
        };

        let transcoded = self
            .decoder
            .decode(&blob)
            .and_then(|buffer| encode_wav(&buffer));
        let outcome = match transcoded {
            Ok(wav) => {
                info!(bytes = wav.len(), "Capture transcoded to WAV");
                CaptureOutcome::Transcoded(DownloadFile::new(
                    DownloadFile::edited_name(&title, "wav"),
                    WAV_MIME_TYPE,
                    wav,
                ))
            }
            Err(e) => {
                warn!("Capture transcode failed, delivering compressed capture: {}", e);
                CaptureOutcome::Fallback {
                    file: DownloadFile::new(
                        DownloadFile::edited_name(&title, self.encoder.extension()),
                        self.encoder.mime_type(),
                        blob,
                    ),
                    reason: e.to_string(),
                }
            }
        };

        self.finish_session(graph, transport);
        info!("Capture finished");
        outcome
    }

    /// Stop playback, restore loop, release the session
    fn finish_session(&mut self, graph: &mut AudioGraphManager, transport: &mut TransportController) {
        graph.close_recording();
        transport.stop(graph, StopReason::CaptureFinished);
        if let Some(mut session) = self.session.take() {
            transport.set_loop(graph, session.prior_loop());
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PitchShiftConfig;
    use crate::dsp::AnalyserSettings;
    use crate::engine::buffer::{generate_test_tone, AudioBuffer};
    use crate::engine::graph::{AudioContext, NullOutput, PlaybackParams};
    use crate::engine::wav::decode_wav;

    const RATE: u32 = 8000;

    struct FailingDecoder;

    impl CaptureDecoder for FailingDecoder {
        fn decode(&self, _bytes: &[u8]) -> Result<AudioBuffer> {
            Err(SamplecraftError::CaptureDecodeFailed {
                reason: "unsupported container".to_string(),
            })
        }
    }

    /// Encodes normally but cannot flush its trailing packet
    struct BrokenFlush(ImaAdpcmEncoder);

    impl CaptureEncoder for BrokenFlush {
        fn mime_type(&self) -> &str {
            self.0.mime_type()
        }

        fn extension(&self) -> &str {
            self.0.extension()
        }

        fn start(&mut self, channels: usize, sample_rate: u32) -> Result<Vec<u8>> {
            self.0.start(channels, sample_rate)
        }

        fn encode(&mut self, block: &[Vec<f32>]) -> Result<Vec<Vec<u8>>> {
            self.0.encode(block)
        }

        fn finish(&mut self) -> Result<Vec<u8>> {
            Err(SamplecraftError::EncoderFailed {
                reason: "device lost".to_string(),
            })
        }
    }

    fn graph_with(duration: f32, params: PlaybackParams) -> AudioGraphManager {
        let mut graph = AudioGraphManager::new(
            AudioContext::new(RATE),
            Box::new(NullOutput),
            PitchShiftConfig::default(),
            AnalyserSettings::default(),
            128,
        );
        graph
            .build_from_buffer(generate_test_tone(440.0, duration, RATE), params)
            .unwrap();
        graph
    }

    fn pipeline(decoder: Box<dyn CaptureDecoder>) -> CapturePipeline {
        CapturePipeline::new(Box::new(ImaAdpcmEncoder::new(512)), decoder, 100.0)
    }

    /// Run ticks of 1/50 s until the pipeline reports an outcome
    fn run(
        pipeline: &mut CapturePipeline,
        graph: &mut AudioGraphManager,
        transport: &mut TransportController,
        now: &mut f64,
    ) -> CaptureOutcome {
        for _ in 0..1000 {
            *now += 0.02;
            graph.render((0.02 * RATE as f64) as usize);
            transport.tick(graph, *now);
            if let Some(outcome) = pipeline.poll(graph, transport, *now) {
                return outcome;
            }
        }
        panic!("capture never finished");
    }

    #[test]
    fn test_capture_transcodes_to_wav() {
        let params = PlaybackParams {
            looping: true,
            ..PlaybackParams::default()
        };
        let mut graph = graph_with(0.5, params);
        let mut transport = TransportController::new();
        let mut pipeline = pipeline(Box::new(ImaAdpcmDecoder));
        let mut now = 0.0;

        pipeline.begin(&mut graph, &mut transport, "Snare", now).unwrap();
        assert!(pipeline.is_active());
        assert!(transport.is_playing());
        assert!(!graph.params().looping);
        assert!((pipeline.session().unwrap().expected_duration_ms() - 600.0).abs() < 1e-9);

        let outcome = run(&mut pipeline, &mut graph, &mut transport, &mut now);
        let file = outcome.into_file().unwrap();
        assert_eq!(file.file_name, "Snare_edited.wav");
        assert!(file.is_transcoded());

        let decoded = decode_wav(&file.bytes).unwrap();
        assert_eq!(decoded.sample_rate, RATE);
        assert!(decoded.duration_secs() >= 0.5);

        assert!(!pipeline.is_active());
        assert!(!transport.is_playing());
        assert!(graph.params().looping);
        assert!(!graph.graph().unwrap().recording().is_streaming());
    }

    #[test]
    fn test_decode_failure_falls_back_to_compressed_blob() {
        let mut graph = graph_with(0.3, PlaybackParams::default());
        let mut transport = TransportController::new();
        let mut pipeline = pipeline(Box::new(FailingDecoder));
        let mut now = 0.0;

        pipeline.begin(&mut graph, &mut transport, "Hat", now).unwrap();
        let outcome = run(&mut pipeline, &mut graph, &mut transport, &mut now);

        match outcome {
            CaptureOutcome::Fallback { file, reason } => {
                assert_eq!(file.file_name, "Hat_edited.webm");
                assert_eq!(file.mime_type, "audio/webm");
                assert!(!file.is_empty());
                assert!(file.bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]));
                assert!(reason.contains("unsupported container"));
            }
            other => panic!("expected fallback, got {:?}", other),
        }
        assert!(!transport.is_playing());
        assert!(!graph.params().looping);
    }

    #[test]
    fn test_second_begin_rejected() {
        let mut graph = graph_with(1.0, PlaybackParams::default());
        let mut transport = TransportController::new();
        let mut pipeline = pipeline(Box::new(ImaAdpcmDecoder));

        pipeline.begin(&mut graph, &mut transport, "A", 0.0).unwrap();
        let id = pipeline.session().unwrap().id();
        let deadline = pipeline.session().unwrap().deadline();

        let err = pipeline.begin(&mut graph, &mut transport, "B", 0.5).unwrap_err();
        assert_eq!(err.error_code(), "CAPTURE_IN_PROGRESS");
        let session = pipeline.session().unwrap();
        assert_eq!(session.id(), id);
        assert_eq!(session.title(), "A");
        assert_eq!(session.deadline(), deadline);
        assert!(transport.is_playing());
    }

    #[test]
    fn test_begin_without_graph_touches_nothing() {
        let mut graph = AudioGraphManager::new(
            AudioContext::new(RATE),
            Box::new(NullOutput),
            PitchShiftConfig::default(),
            AnalyserSettings::default(),
            128,
        );
        let mut transport = TransportController::new();
        let mut pipeline = pipeline(Box::new(ImaAdpcmDecoder));

        let err = pipeline.begin(&mut graph, &mut transport, "A", 0.0).unwrap_err();
        assert_eq!(err.error_code(), "CAPTURE_UNAVAILABLE");
        assert!(!pipeline.is_active());
        assert!(!transport.is_playing());
    }

    #[test]
    fn test_expected_duration_uses_tempo() {
        let params = PlaybackParams {
            tempo: 2.0,
            ..PlaybackParams::default()
        };
        let mut graph = graph_with(1.0, params);
        let mut transport = TransportController::new();
        let mut pipeline = pipeline(Box::new(ImaAdpcmDecoder));
        pipeline.begin(&mut graph, &mut transport, "A", 3.0).unwrap();
        let session = pipeline.session().unwrap();
        assert!((session.expected_duration_ms() - 600.0).abs() < 1e-9);
        assert!((session.deadline() - 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_cancel_restores_state() {
        let params = PlaybackParams {
            looping: true,
            ..PlaybackParams::default()
        };
        let mut graph = graph_with(1.0, params);
        let mut transport = TransportController::new();
        let mut pipeline = pipeline(Box::new(ImaAdpcmDecoder));

        pipeline.begin(&mut graph, &mut transport, "A", 0.0).unwrap();
        assert!(pipeline.cancel(&mut graph, &mut transport));
        assert!(!pipeline.cancel(&mut graph, &mut transport));
        assert!(!transport.is_playing());
        assert!(graph.params().looping);

        // A fresh session can start afterwards
        pipeline.begin(&mut graph, &mut transport, "B", 1.0).unwrap();
        assert_eq!(pipeline.session().unwrap().title(), "B");
    }

    #[test]
    fn test_flush_failure_is_not_delivered() {
        let params = PlaybackParams {
            looping: true,
            ..PlaybackParams::default()
        };
        let mut graph = graph_with(0.5, params);
        let mut transport = TransportController::new();
        let mut pipeline = CapturePipeline::new(
            Box::new(BrokenFlush(ImaAdpcmEncoder::new(512))),
            Box::new(ImaAdpcmDecoder),
            100.0,
        );
        let mut now = 0.0;

        pipeline.begin(&mut graph, &mut transport, "Kick", now).unwrap();
        let outcome = run(&mut pipeline, &mut graph, &mut transport, &mut now);

        match outcome {
            CaptureOutcome::Failed(e) => assert_eq!(e.error_code(), "ENCODER_FAILED"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!pipeline.is_active());
        assert!(!transport.is_playing());
        assert!(graph.params().looping);
    }
}
