//! Transport state machine
//!
//! Play/stop/loop scheduling on top of the [`AudioGraphManager`]. Elapsed
//! time is measured against a clock reference captured when playback
//! starts and is compared with the tempo-adjusted duration
//! `total_duration / tempo` on every [`TransportController::tick`].

use std::fmt;

use log::debug;

use crate::engine::graph::AudioGraphManager;
use crate::error::{Result, SamplecraftError};

/// Transport states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Playing => write!(f, "Playing"),
        }
    }
}

/// Why playback left the Playing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop request
    Requested,
    /// Natural end without loop
    Ended,
    /// Reverse toggled while playing
    ReverseChanged,
    /// Graph disposed underneath playback
    Teardown,
    /// Capture pipeline finished with playback
    CaptureFinished,
}

/// Transitions reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Started,
    Stopped(StopReason),
    /// Natural end with loop enabled; playback continues
    LoopWrapped,
}

/// Snapshot of everything the time display and controls need
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub elapsed_time: f64,
    /// Natural duration of the source buffer
    pub total_duration: f64,
    pub tempo_factor: f64,
    pub pitch_semitones: i32,
    pub reversed: bool,
    pub looping: bool,
}

impl PlaybackState {
    /// Duration shown to the user: `total_duration / tempo_factor`
    pub fn displayed_duration(&self) -> f64 {
        displayed_duration(self.total_duration, self.tempo_factor)
    }
}

fn displayed_duration(total: f64, tempo: f64) -> f64 {
    if tempo > 0.0 {
        total / tempo
    } else {
        0.0
    }
}

/// Play/stop/loop controller
///
/// # Example
/// ```
/// use samplecraft::engine::transport::TransportController;
/// let transport = TransportController::new();
/// assert!(!transport.is_playing());
/// assert_eq!(transport.elapsed(), 0.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransportController {
    state: TransportState,
    /// Clock time that corresponds to elapsed = 0
    start_ref: f64,
    elapsed: f64,
}

impl TransportController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Elapsed playback time in seconds of displayed (tempo-adjusted) time
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn snapshot(&self, graph: &AudioGraphManager) -> PlaybackState {
        let params = graph.params();
        PlaybackState {
            is_playing: self.is_playing(),
            elapsed_time: self.elapsed,
            total_duration: graph.total_duration(),
            tempo_factor: params.tempo,
            pitch_semitones: params.pitch,
            reversed: params.reverse,
            looping: params.looping,
        }
    }

    /// Stopped -> Playing; requires a ready graph
    ///
    /// A play request while already playing is ignored.
    pub fn play(&mut self, graph: &mut AudioGraphManager, now: f64) -> Result<Option<TransportEvent>> {
        if self.is_playing() {
            return Ok(None);
        }
        if !graph.is_ready() {
            return Err(SamplecraftError::GraphNotReady);
        }
        if let Err(e) = graph.start_source() {
            self.force_stopped();
            return Err(e);
        }

        self.state = TransportState::Playing;
        self.start_ref = now;
        self.elapsed = 0.0;
        debug!("Transport: Stopped -> Playing at {:.3}", now);
        Ok(Some(TransportEvent::Started))
    }

    /// Playing -> Stopped; returns `None` when already stopped
    pub fn stop(&mut self, graph: &mut AudioGraphManager, reason: StopReason) -> Option<TransportEvent> {
        graph.stop_source();
        if !self.is_playing() {
            return None;
        }
        self.force_stopped();
        debug!("Transport: Playing -> Stopped ({:?})", reason);
        Some(TransportEvent::Stopped(reason))
    }

    /// Per-frame update of elapsed time, natural end and loop wrap
    pub fn tick(&mut self, graph: &mut AudioGraphManager, now: f64) -> Option<TransportEvent> {
        if !self.is_playing() {
            return None;
        }
        if !graph.is_ready() {
            self.force_stopped();
            debug!("Transport: Playing -> Stopped (graph gone)");
            return Some(TransportEvent::Stopped(StopReason::Teardown));
        }

        let params = graph.params();
        let duration = displayed_duration(graph.total_duration(), params.tempo);
        let elapsed = (now - self.start_ref).max(0.0);
        let reached_end = elapsed >= duration || (!params.looping && !graph.source_playing());

        if !reached_end {
            self.elapsed = elapsed;
            return None;
        }

        if params.looping {
            self.start_ref = now;
            self.elapsed = 0.0;
            debug!("Transport: loop wrap at {:.3}", now);
            Some(TransportEvent::LoopWrapped)
        } else {
            self.stop(graph, StopReason::Ended)
        }
    }

    /// Change tempo without interrupting playback
    ///
    /// Elapsed time is rescaled so the playhead keeps its place in the
    /// source audio.
    pub fn set_tempo(&mut self, graph: &mut AudioGraphManager, factor: f64, now: f64) -> Result<()> {
        let old = graph.params().tempo;
        graph.set_tempo(factor)?;
        let new = graph.params().tempo;

        if self.is_playing() && old != new {
            let duration = displayed_duration(graph.total_duration(), new);
            let elapsed = ((now - self.start_ref).max(0.0) * old / new).min(duration);
            self.start_ref = now - elapsed;
            self.elapsed = elapsed;
            debug!("Transport: tempo {} -> {}, elapsed {:.3}", old, new, elapsed);
        }
        Ok(())
    }

    pub fn set_pitch(&mut self, graph: &mut AudioGraphManager, semitones: i32) -> Result<()> {
        graph.set_pitch(semitones)
    }

    /// Toggle reverse; playback stops first if running
    pub fn set_reverse(&mut self, graph: &mut AudioGraphManager, reverse: bool) -> Option<TransportEvent> {
        let event = if self.is_playing() && graph.params().reverse != reverse {
            self.stop(graph, StopReason::ReverseChanged)
        } else {
            None
        };
        graph.set_reverse(reverse);
        event
    }

    pub fn set_loop(&mut self, graph: &mut AudioGraphManager, looping: bool) {
        graph.set_loop(looping);
    }

    /// Return to Stopped without touching the graph
    pub fn force_stopped(&mut self) {
        self.state = TransportState::Stopped;
        self.elapsed = 0.0;
    }
}
