//! Editor session
//!
//! One [`EditorSession`] is the owned scope of an editor view: it holds the
//! graph manager, transport, capture pipeline and the reactive visual, and
//! is the boundary where every failure becomes an [`EditorEvent`].
//!
//! The host calls [`EditorSession::tick`] once per frame. Each tick renders
//! exactly as many audio frames as the clock advanced, then updates the
//! transport, the capture pipeline and the deformation, in that order.
//! Controls that start playback or change its rate first render the frames
//! owed up to the current instant, so a later tick only renders what came
//! after them.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capture::{CaptureOutcome, CapturePipeline, DownloadFile};
use crate::config::EditorConfig;
use crate::engine::clock::Clock;
use crate::engine::graph::{AudioContext, AudioGraphManager, AudioOutput, PlaybackParams};
use crate::engine::loader::{SampleAsset, SampleLoader};
use crate::engine::transport::{PlaybackState, StopReason, TransportController, TransportEvent};
use crate::error::{Result, SamplecraftError};
use crate::visual::{FrequencyDeformer, Mesh};

/// UI-facing signals
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    Loaded { title: String, duration: f64 },
    LoadFailed { code: String, message: String },
    PlaybackStarted,
    PlaybackStopped(StopReason),
    LoopWrapped,
    CaptureStarted,
    /// A file is ready to offer; `is_transcoded()` tells WAV from fallback
    DownloadReady(DownloadFile),
    CaptureFinished,
    Error { code: String, message: String },
}

impl EditorEvent {
    fn error(e: &SamplecraftError) -> Self {
        EditorEvent::Error {
            code: e.error_code().to_string(),
            message: e.friendly_message(),
        }
    }
}

/// Which controls the view should enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlState {
    pub play: bool,
    pub stop: bool,
    pub download: bool,
    pub tempo: bool,
    pub pitch: bool,
    pub reverse: bool,
    pub looping: bool,
}

/// `m:ss` time display
pub fn format_time(secs: f64) -> String {
    let total = if secs.is_finite() { secs.max(0.0) as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}

pub struct EditorSession {
    config: EditorConfig,
    clock: Arc<dyn Clock>,
    loader: Arc<dyn SampleLoader>,
    graph: AudioGraphManager,
    transport: TransportController,
    capture: CapturePipeline,
    deformer: FrequencyDeformer,
    mesh: Mesh,
    asset: Option<SampleAsset>,
    last_tick: f64,
    /// Clock time the graph has been rendered up to
    rendered_until: f64,
    /// Fractional frames carried between renders
    frame_remainder: f64,
    events: Vec<EditorEvent>,
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("asset", &self.asset)
            .field("graph", &self.graph)
            .field("transport", &self.transport)
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

impl EditorSession {
    /// Create a session with its own audio context
    pub fn new(
        config: EditorConfig,
        loader: Arc<dyn SampleLoader>,
        clock: Arc<dyn Clock>,
        output: Box<dyn AudioOutput>,
    ) -> Result<Self> {
        config.validate()?;

        let graph = AudioGraphManager::new(
            AudioContext::new(config.audio.sample_rate),
            output,
            config.pitch_shift.clone(),
            config.analysis.analyser_settings(),
            config.audio.render_quantum,
        );
        let capture = CapturePipeline::from_config(&config.capture);
        let deformer = FrequencyDeformer::new(config.deformation.clone(), fastrand::u64(..));
        let mesh = Mesh::icosphere(1.0, config.deformation.mesh_detail);
        let last_tick = clock.now();

        Ok(Self {
            config,
            clock,
            loader,
            graph,
            transport: TransportController::new(),
            capture,
            deformer,
            mesh,
            asset: None,
            last_tick,
            rendered_until: last_tick,
            frame_remainder: 0.0,
            events: Vec::new(),
        })
    }

    /// Replace the default capture pipeline
    pub fn with_capture(mut self, capture: CapturePipeline) -> Self {
        self.capture = capture;
        self
    }

    /// Replace the visual with a seeded one
    pub fn with_deformer_seed(mut self, seed: u64) -> Self {
        self.deformer = FrequencyDeformer::new(self.config.deformation.clone(), seed);
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn asset(&self) -> Option<&SampleAsset> {
        self.asset.as_ref()
    }

    pub fn graph(&self) -> &AudioGraphManager {
        &self.graph
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn deformer(&self) -> &FrequencyDeformer {
        &self.deformer
    }

    pub fn capture(&self) -> &CapturePipeline {
        &self.capture
    }

    pub fn is_ready(&self) -> bool {
        self.graph.is_ready()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.transport.snapshot(&self.graph)
    }

    /// `"elapsed / duration"` as shown next to the transport
    pub fn time_display(&self) -> String {
        let state = self.playback_state();
        format!(
            "{} / {}",
            format_time(state.elapsed_time),
            format_time(state.displayed_duration())
        )
    }

    pub fn controls(&self) -> ControlState {
        let ready = self.graph.is_ready();
        let capturing = self.capture.is_active();
        ControlState {
            play: ready && !self.transport.is_playing(),
            stop: ready && !capturing && self.transport.is_playing(),
            download: ready && !capturing,
            tempo: ready && !capturing,
            pitch: ready && !capturing,
            reverse: ready && !capturing,
            looping: ready && !capturing,
        }
    }

    /// Events queued since the last tick
    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Asset lifecycle
    // ========================================================================

    /// Load `asset`, replacing whatever was loaded before
    pub fn load(&mut self, asset: SampleAsset) {
        self.load_with(asset, PlaybackParams::default());
    }

    pub fn load_with(&mut self, asset: SampleAsset, params: PlaybackParams) {
        self.teardown();

        match self.graph.build(&asset, params, self.loader.as_ref()) {
            Ok(()) => {
                let duration = self.graph.total_duration();
                info!(title = %asset.title, duration, "Sample loaded");
                self.events.push(EditorEvent::Loaded {
                    title: asset.title.clone(),
                    duration,
                });
            }
            Err(e) => {
                warn!(title = %asset.title, "Sample failed to load: {}", e);
                self.events.push(EditorEvent::LoadFailed {
                    code: e.error_code().to_string(),
                    message: e.friendly_message(),
                });
            }
        }
        self.asset = Some(asset);
    }

    /// Cancel capture, stop playback and dispose the graph
    ///
    /// Runs on close, on asset replacement and on drop. Safe to repeat.
    pub fn teardown(&mut self) {
        let was_playing = self.transport.is_playing();
        if self.capture.cancel(&mut self.graph, &mut self.transport) {
            self.events.push(EditorEvent::CaptureFinished);
        }
        self.transport.stop(&mut self.graph, StopReason::Teardown);
        if was_playing {
            self.events.push(EditorEvent::PlaybackStopped(StopReason::Teardown));
        }
        self.graph.dispose();
        self.asset = None;
    }

    /// Close the view
    pub fn close(&mut self) {
        debug!("Editor session closing");
        self.teardown();
    }

    // ========================================================================
    // Controls
    // ========================================================================

    pub fn play(&mut self) {
        let now = self.clock.now();
        self.render_until(now);
        match self.transport.play(&mut self.graph, now) {
            Ok(Some(event)) => self.push_transport(event),
            Ok(None) => {}
            Err(e) => {
                warn!("Play failed: {}", e);
                self.graph.stop_source();
                self.transport.force_stopped();
                self.events.push(EditorEvent::error(&e));
            }
        }
    }

    pub fn stop(&mut self) {
        if self.reject_during_capture() {
            return;
        }
        if let Some(event) = self.transport.stop(&mut self.graph, StopReason::Requested) {
            self.push_transport(event);
        }
    }

    pub fn set_tempo(&mut self, factor: f64) {
        if self.reject_during_capture() {
            return;
        }
        let now = self.clock.now();
        self.render_until(now);
        if let Err(e) = self.transport.set_tempo(&mut self.graph, factor, now) {
            self.events.push(EditorEvent::error(&e));
        }
    }

    pub fn set_pitch(&mut self, semitones: i32) {
        if self.reject_during_capture() {
            return;
        }
        if let Err(e) = self.transport.set_pitch(&mut self.graph, semitones) {
            self.events.push(EditorEvent::error(&e));
        }
    }

    pub fn set_reverse(&mut self, reverse: bool) {
        if self.reject_during_capture() {
            return;
        }
        if let Some(event) = self.transport.set_reverse(&mut self.graph, reverse) {
            self.push_transport(event);
        }
    }

    pub fn set_loop(&mut self, looping: bool) {
        if self.reject_during_capture() {
            return;
        }
        self.transport.set_loop(&mut self.graph, looping);
    }

    pub fn set_hovered(&mut self, hovered: bool) {
        self.deformer.set_hovered(hovered);
    }

    /// Start capturing a download of the edited sample
    pub fn request_download(&mut self) {
        let now = self.clock.now();
        let title = self
            .asset
            .as_ref()
            .map(|a| a.title.clone())
            .unwrap_or_default();

        self.render_until(now);
        let was_playing = self.transport.is_playing();
        match self.capture.begin(&mut self.graph, &mut self.transport, &title, now) {
            Ok(()) => {
                if was_playing {
                    self.events.push(EditorEvent::PlaybackStopped(StopReason::Requested));
                }
                self.events.push(EditorEvent::CaptureStarted);
                self.events.push(EditorEvent::PlaybackStarted);
            }
            Err(e) => {
                warn!("Download request rejected: {}", e);
                self.events.push(EditorEvent::error(&e));
            }
        }
    }

    // ========================================================================
    // Frame loop
    // ========================================================================

    /// Advance one frame; returns the events raised since the last call
    pub fn tick(&mut self) -> Vec<EditorEvent> {
        let now = self.clock.now();
        let dt = (now - self.last_tick).max(0.0);
        self.last_tick = now;
        self.render_until(now);

        if let Some(event) = self.transport.tick(&mut self.graph, now) {
            self.push_transport(event);
        }

        let was_playing = self.transport.is_playing();
        if let Some(outcome) = self.capture.poll(&mut self.graph, &mut self.transport, now) {
            if was_playing && !self.transport.is_playing() {
                self.events
                    .push(EditorEvent::PlaybackStopped(StopReason::CaptureFinished));
            }
            match outcome {
                CaptureOutcome::Transcoded(file) | CaptureOutcome::Fallback { file, .. } => {
                    self.events.push(EditorEvent::DownloadReady(file));
                }
                CaptureOutcome::Failed(e) => self.events.push(EditorEvent::error(&e)),
            }
            self.events.push(EditorEvent::CaptureFinished);
        }

        let data = self.graph.analysis_tap().map(|tap| tap.frequency_data());
        self.deformer.frame(&mut self.mesh, data, dt as f32);

        self.take_events()
    }

    /// Render the audio owed between the last render and `now`
    fn render_until(&mut self, now: f64) {
        let dt = (now - self.rendered_until).max(0.0);
        self.rendered_until = self.rendered_until.max(now);

        let exact = dt * self.config.audio.sample_rate as f64 + self.frame_remainder;
        let frames = exact.floor();
        self.frame_remainder = exact - frames;
        self.graph.render(frames as usize);
    }

    /// The capture records one fixed edit; controls wait until it finishes
    fn reject_during_capture(&mut self) -> bool {
        if !self.capture.is_active() {
            return false;
        }
        debug!("Control ignored while a capture is running");
        self.events
            .push(EditorEvent::error(&SamplecraftError::CaptureInProgress));
        true
    }

    fn push_transport(&mut self, event: TransportEvent) {
        self.events.push(match event {
            TransportEvent::Started => EditorEvent::PlaybackStarted,
            TransportEvent::Stopped(reason) => EditorEvent::PlaybackStopped(reason),
            TransportEvent::LoopWrapped => EditorEvent::LoopWrapped,
        });
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::generate_test_tone;
    use crate::engine::clock::ManualClock;
    use crate::engine::graph::NullOutput;
    use crate::engine::loader::MemorySampleLoader;
    use crate::engine::wav::encode_wav;

    fn session() -> (EditorSession, ManualClock) {
        let mut loader = MemorySampleLoader::new();
        loader.insert("tone.wav", encode_wav(&generate_test_tone(440.0, 0.5, 8000)).unwrap());
        loader.insert("broken.mp3", b"not audio".to_vec());

        let mut config = EditorConfig::default();
        config.audio.sample_rate = 8000;
        config.deformation.mesh_detail = 1;

        let clock = ManualClock::new();
        let session = EditorSession::new(
            config,
            Arc::new(loader),
            Arc::new(clock.clone()),
            Box::new(NullOutput),
        )
        .unwrap()
        .with_deformer_seed(1);
        (session, clock)
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.9), "1:05");
        assert_eq!(format_time(f64::NAN), "0:00");
    }

    #[test]
    fn test_controls_disabled_until_loaded() {
        let (mut session, _clock) = session();
        assert_eq!(session.controls(), ControlState::default());

        session.load(SampleAsset::new("Tone", "tone.wav"));
        let controls = session.controls();
        assert!(controls.play && controls.download && !controls.stop);
        assert_eq!(
            session.take_events(),
            vec![EditorEvent::Loaded {
                title: "Tone".to_string(),
                duration: 0.5
            }]
        );
    }

    #[test]
    fn test_load_failure_disables_controls() {
        let (mut session, _clock) = session();
        session.load(SampleAsset::new("Broken", "broken.mp3"));
        assert!(!session.is_ready());
        assert_eq!(session.controls(), ControlState::default());
        assert!(matches!(
            session.take_events().as_slice(),
            [EditorEvent::LoadFailed { .. }]
        ));

        session.play();
        assert!(matches!(
            session.take_events().as_slice(),
            [EditorEvent::Error { code, .. }] if code == "GRAPH_NOT_READY"
        ));
        assert!(!session.playback_state().is_playing);
    }

    #[test]
    fn test_tick_renders_clock_advance() {
        let (mut session, clock) = session();
        session.load(SampleAsset::new("Tone", "tone.wav"));
        session.play();
        session.take_events();

        clock.advance(0.25);
        assert!(session.tick().is_empty());
        let position = session.graph().graph().unwrap().source().position_secs();
        assert!((position - 0.25).abs() < 1e-9);
        assert_eq!(session.time_display(), "0:00 / 0:00");

        clock.advance(0.3);
        assert_eq!(
            session.tick(),
            vec![EditorEvent::PlaybackStopped(StopReason::Ended)]
        );
    }

    #[test]
    fn test_play_between_ticks_starts_fresh() {
        let (mut session, clock) = session();
        session.load(SampleAsset::new("Tone", "tone.wav"));
        session.tick();
        session.take_events();

        clock.advance(0.2);
        session.play();
        assert_eq!(session.take_events(), vec![EditorEvent::PlaybackStarted]);

        clock.advance(0.35);
        assert!(session.tick().is_empty());
        assert!(session.playback_state().is_playing);
        let position = session.graph().graph().unwrap().source().position_secs();
        assert!((position - 0.35).abs() < 1e-3);
    }

    #[test]
    fn test_edits_locked_while_capturing() {
        let (mut session, clock) = session();
        session.load(SampleAsset::new("Tone", "tone.wav"));
        session.take_events();
        session.request_download();
        session.take_events();

        clock.advance(0.1);
        session.tick();
        let controls = session.controls();
        assert!(!controls.tempo && !controls.reverse && !controls.looping && !controls.stop);

        session.set_tempo(0.5);
        session.set_loop(true);
        session.stop();
        let events = session.take_events();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| matches!(e, EditorEvent::Error { code, .. } if code == "CAPTURE_IN_PROGRESS")));
        assert_eq!(session.graph().params().tempo, 1.0);
        assert!(!session.graph().params().looping);
        assert!(session.playback_state().is_playing);

        for _ in 0..120 {
            clock.advance(1.0 / 60.0);
            session.tick();
            if !session.capture().is_active() {
                break;
            }
        }
        assert!(!session.capture().is_active());
        assert!(session.controls().tempo);
    }

    #[test]
    fn test_download_roundtrip_through_ticks() {
        let (mut session, clock) = session();
        session.load(SampleAsset::new("Tone", "tone.wav"));
        session.set_loop(true);
        session.take_events();

        session.request_download();
        assert!(!session.controls().download);
        session.request_download();
        let events = session.take_events();
        assert!(events.contains(&EditorEvent::CaptureStarted));
        assert!(events
            .iter()
            .any(|e| matches!(e, EditorEvent::Error { code, .. } if code == "CAPTURE_IN_PROGRESS")));

        let mut ready = None;
        for _ in 0..120 {
            clock.advance(1.0 / 60.0);
            for event in session.tick() {
                if let EditorEvent::DownloadReady(file) = event {
                    ready = Some(file);
                }
            }
            if ready.is_some() {
                break;
            }
        }

        let file = ready.unwrap();
        assert_eq!(file.file_name, "Tone_edited.wav");
        assert!(session.playback_state().looping);
        assert!(!session.playback_state().is_playing);
        assert!(session.controls().download);
    }

    #[test]
    fn test_reload_disposes_previous_graph() {
        let (mut session, _clock) = session();
        session.load(SampleAsset::new("Tone", "tone.wav"));
        let probes = session.graph().graph().unwrap().probes();
        session.load(SampleAsset::new("Tone again", "tone.wav"));
        assert!(probes.iter().all(|p| p.is_disposed()));
        assert_eq!(session.graph().context().live_nodes(), 4);
    }

    #[test]
    fn test_close_cancels_capture_and_disposes() {
        let (mut session, _clock) = session();
        session.load(SampleAsset::new("Tone", "tone.wav"));
        session.request_download();
        session.take_events();

        session.close();
        let events = session.take_events();
        assert!(events.contains(&EditorEvent::CaptureFinished));
        assert!(!session.capture().is_active());
        assert_eq!(session.graph().context().live_nodes(), 0);

        session.close();
        assert!(session.take_events().is_empty());
    }

    #[test]
    fn test_deformation_runs_without_playback() {
        let (mut session, clock) = session();
        clock.advance(0.1);
        session.tick();
        assert!(session.deformer().base_positions().is_some());
        assert!((session.deformer().time() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_tempo_reports_error() {
        let (mut session, _clock) = session();
        session.load(SampleAsset::new("Tone", "tone.wav"));
        session.take_events();
        session.set_tempo(0.0);
        assert!(matches!(
            session.take_events().as_slice(),
            [EditorEvent::Error { code, .. }] if code == "INVALID_PARAMETER"
        ));
    }
}
