//! Audio graph for one loaded sample
//!
//! An [`AudioContext`] is the arena every node registers with. A built
//! [`AudioGraph`] holds exactly four nodes wired as
//!
//! ```text
//! Source -> PitchShift -> { destination, AnalysisTap, RecordingTap }
//! ```
//!
//! The [`AudioGraphManager`] owns the context, the destination and at most
//! one graph. `build` and `dispose` are the only ways the topology changes;
//! the parameter setters mutate live nodes in place.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::config::PitchShiftConfig;
use crate::dsp::{Analyser, AnalyserSettings, PitchShifter, MAX_SEMITONES, MIN_SEMITONES};
use crate::engine::buffer::AudioBuffer;
use crate::engine::decode::decode_audio_bytes;
use crate::engine::loader::{SampleAsset, SampleLoader};
use crate::error::{Result, SamplecraftError};

/// Kinds of node a graph is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Source,
    PitchShift,
    AnalysisTap,
    RecordingTap,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Source => write!(f, "Source"),
            NodeKind::PitchShift => write!(f, "PitchShift"),
            NodeKind::AnalysisTap => write!(f, "AnalysisTap"),
            NodeKind::RecordingTap => write!(f, "RecordingTap"),
        }
    }
}

/// Registration of one node in its context; released on dispose or drop
#[derive(Debug)]
pub struct NodeHandle {
    kind: NodeKind,
    disposed: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
}

impl NodeHandle {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Release the node; repeated calls are no-ops
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Observer that outlives the node
    pub fn probe(&self) -> NodeProbe {
        NodeProbe {
            kind: self.kind,
            disposed: Arc::clone(&self.disposed),
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Read-only view of a node's disposal state
#[derive(Debug, Clone)]
pub struct NodeProbe {
    kind: NodeKind,
    disposed: Arc<AtomicBool>,
}

impl NodeProbe {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Node arena for one editor view
#[derive(Debug)]
pub struct AudioContext {
    sample_rate: u32,
    live: Arc<AtomicUsize>,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Nodes registered and not yet disposed
    pub fn live_nodes(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn register(&self, kind: NodeKind) -> NodeHandle {
        self.live.fetch_add(1, Ordering::SeqCst);
        NodeHandle {
            kind,
            disposed: Arc::new(AtomicBool::new(false)),
            live: Arc::clone(&self.live),
        }
    }
}

// ============================================================================
// Destination
// ============================================================================

/// Where the graph's direct output goes
pub trait AudioOutput: Send {
    fn write(&mut self, block: &[Vec<f32>]);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn write(&mut self, _block: &[Vec<f32>]) {}
}

/// Collects output in memory; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct BufferedOutput {
    channels: Arc<Mutex<Vec<Vec<f32>>>>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames collected so far
    pub fn frames(&self) -> usize {
        self.channels
            .lock()
            .map(|c| c.first().map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Take the collected output, leaving the buffer empty
    pub fn take(&self) -> Vec<Vec<f32>> {
        self.channels
            .lock()
            .map(|mut c| std::mem::take(&mut *c))
            .unwrap_or_default()
    }
}

impl AudioOutput for BufferedOutput {
    fn write(&mut self, block: &[Vec<f32>]) {
        if let Ok(mut channels) = self.channels.lock() {
            if channels.len() != block.len() {
                *channels = vec![Vec::new(); block.len()];
            }
            for (dst, src) in channels.iter_mut().zip(block) {
                dst.extend_from_slice(src);
            }
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// Buffer player with playback rate, reverse and loop
#[derive(Debug)]
pub struct SourceNode {
    handle: NodeHandle,
    forward: AudioBuffer,
    backward: AudioBuffer,
    playback_rate: f64,
    reverse: bool,
    looping: bool,
    /// Read position in buffer frames
    position: f64,
    playing: bool,
    ended: bool,
}

impl SourceNode {
    fn new(handle: NodeHandle, buffer: AudioBuffer, params: &PlaybackParams) -> Self {
        let backward = buffer.reversed();
        Self {
            handle,
            forward: buffer,
            backward,
            playback_rate: params.tempo,
            reverse: params.reverse,
            looping: params.looping,
            position: 0.0,
            playing: false,
            ended: false,
        }
    }

    pub fn channels(&self) -> usize {
        self.forward.channels()
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// True once a non-looping pass reached the end of the buffer
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Playback position in seconds of source audio
    pub fn position_secs(&self) -> f64 {
        self.position / self.forward.sample_rate as f64
    }

    fn start(&mut self) {
        self.position = 0.0;
        self.playing = true;
        self.ended = false;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.position = 0.0;
    }

    /// Fill `out` with the next frames resampled to `context_rate`
    fn render(&mut self, out: &mut [Vec<f32>], context_rate: u32) {
        let buffer = if self.reverse {
            &self.backward
        } else {
            &self.forward
        };
        let len = buffer.len();
        let frames = out.first().map(Vec::len).unwrap_or(0);
        let step = self.playback_rate * buffer.sample_rate as f64 / context_rate as f64;

        for frame in 0..frames {
            if self.playing && self.position >= len as f64 {
                if self.looping && len > 0 {
                    self.position %= len as f64;
                } else {
                    self.playing = false;
                    self.ended = true;
                }
            }
            if !self.playing {
                out.iter_mut().for_each(|ch| ch[frame] = 0.0);
                continue;
            }

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let next = if index + 1 < len {
                Some(index + 1)
            } else if self.looping {
                Some(0)
            } else {
                None
            };
            for (dst, src) in out.iter_mut().zip(&buffer.samples) {
                let a = src[index];
                let b = next.map(|i| src[i]).unwrap_or(a);
                dst[frame] = a + frac * (b - a);
            }
            self.position += step;
        }
    }
}

/// Pitch shift stage
#[derive(Debug)]
pub struct PitchShiftNode {
    handle: NodeHandle,
    shifter: PitchShifter,
}

impl PitchShiftNode {
    pub fn semitones(&self) -> i32 {
        self.shifter.semitones()
    }
}

/// Read-only frequency/waveform branch
#[derive(Debug)]
pub struct AnalysisTap {
    handle: NodeHandle,
    analyser: Analyser,
}

impl AnalysisTap {
    /// Byte frequency data as of the last render
    pub fn frequency_data(&self) -> &[u8] {
        self.analyser.frequency_data()
    }

    pub fn waveform_data(&self) -> Vec<f32> {
        self.analyser.waveform_data()
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.analyser.frequency_bin_count()
    }
}

/// Branch routed to a capturable stream
///
/// While a stream is open every rendered block is queued until drained.
#[derive(Debug)]
pub struct RecordingTap {
    handle: NodeHandle,
    streaming: bool,
    queue: VecDeque<Vec<Vec<f32>>>,
}

impl RecordingTap {
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn open(&mut self) {
        self.queue.clear();
        self.streaming = true;
    }

    fn close(&mut self) {
        self.streaming = false;
        self.queue.clear();
    }

    fn push(&mut self, block: &[Vec<f32>]) {
        if self.streaming {
            self.queue.push_back(block.to_vec());
        }
    }

    fn drain(&mut self) -> Vec<Vec<Vec<f32>>> {
        self.queue.drain(..).collect()
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Live parameters of the loaded sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackParams {
    /// Playback rate, > 0
    pub tempo: f64,
    /// Pitch shift in semitones, within [-12, 12]
    pub pitch: i32,
    pub reverse: bool,
    pub looping: bool,
}

impl Default for PlaybackParams {
    fn default() -> Self {
        Self {
            tempo: 1.0,
            pitch: 0,
            reverse: false,
            looping: false,
        }
    }
}

impl PlaybackParams {
    pub fn validate(&self) -> Result<()> {
        validate_tempo(self.tempo)?;
        validate_pitch(self.pitch)
    }
}

fn validate_tempo(tempo: f64) -> Result<()> {
    if tempo.is_finite() && tempo > 0.0 {
        Ok(())
    } else {
        Err(SamplecraftError::InvalidParameter {
            param: "tempo".to_string(),
            value: tempo.to_string(),
            expected: "finite factor > 0".to_string(),
        })
    }
}

fn validate_pitch(semitones: i32) -> Result<()> {
    if (MIN_SEMITONES..=MAX_SEMITONES).contains(&semitones) {
        Ok(())
    } else {
        Err(SamplecraftError::InvalidParameter {
            param: "pitch".to_string(),
            value: semitones.to_string(),
            expected: format!("{}..={} semitones", MIN_SEMITONES, MAX_SEMITONES),
        })
    }
}

/// The four nodes built for one sample
#[derive(Debug)]
pub struct AudioGraph {
    source: SourceNode,
    pitch_shift: PitchShiftNode,
    analysis: AnalysisTap,
    recording: RecordingTap,
    total_duration: f64,
}

impl AudioGraph {
    pub fn source(&self) -> &SourceNode {
        &self.source
    }

    pub fn pitch_shift(&self) -> &PitchShiftNode {
        &self.pitch_shift
    }

    pub fn analysis(&self) -> &AnalysisTap {
        &self.analysis
    }

    pub fn recording(&self) -> &RecordingTap {
        &self.recording
    }

    /// Natural duration of the source buffer in seconds
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Probes for all four nodes
    pub fn probes(&self) -> Vec<NodeProbe> {
        vec![
            self.source.handle.probe(),
            self.pitch_shift.handle.probe(),
            self.analysis.handle.probe(),
            self.recording.handle.probe(),
        ]
    }

    fn dispose(&mut self) {
        self.source.stop();
        self.recording.close();
        self.source.handle.dispose();
        self.pitch_shift.handle.dispose();
        self.analysis.handle.dispose();
        self.recording.handle.dispose();
    }
}

/// Owner of the context, the destination and the current graph
pub struct AudioGraphManager {
    context: AudioContext,
    output: Box<dyn AudioOutput>,
    graph: Option<AudioGraph>,
    pitch_config: PitchShiftConfig,
    analysis_settings: AnalyserSettings,
    render_quantum: usize,
    scratch: Vec<Vec<f32>>,
}

impl fmt::Debug for AudioGraphManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGraphManager")
            .field("context", &self.context)
            .field("graph", &self.graph)
            .field("render_quantum", &self.render_quantum)
            .finish_non_exhaustive()
    }
}

impl AudioGraphManager {
    pub fn new(
        context: AudioContext,
        output: Box<dyn AudioOutput>,
        pitch_config: PitchShiftConfig,
        analysis_settings: AnalyserSettings,
        render_quantum: usize,
    ) -> Self {
        Self {
            context,
            output,
            graph: None,
            pitch_config,
            analysis_settings,
            render_quantum: render_quantum.max(1),
            scratch: Vec::new(),
        }
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn graph(&self) -> Option<&AudioGraph> {
        self.graph.as_ref()
    }

    /// A graph is built and its audio decoded
    pub fn is_ready(&self) -> bool {
        self.graph.is_some()
    }

    /// Natural duration of the loaded sample, 0 when nothing is built
    pub fn total_duration(&self) -> f64 {
        self.graph.as_ref().map(|g| g.total_duration).unwrap_or(0.0)
    }

    /// Current live parameters; defaults when nothing is built
    pub fn params(&self) -> PlaybackParams {
        match &self.graph {
            Some(graph) => PlaybackParams {
                tempo: graph.source.playback_rate,
                pitch: graph.pitch_shift.semitones(),
                reverse: graph.source.reverse,
                looping: graph.source.looping,
            },
            None => PlaybackParams::default(),
        }
    }

    pub fn analysis_tap(&self) -> Option<&AnalysisTap> {
        self.graph.as_ref().map(|g| &g.analysis)
    }

    /// Fetch, decode and build a graph for `asset`
    ///
    /// The previous graph is disposed before anything else happens. On a
    /// fetch or decode failure no graph is left behind.
    pub fn build(
        &mut self,
        asset: &SampleAsset,
        params: PlaybackParams,
        loader: &dyn SampleLoader,
    ) -> Result<()> {
        self.dispose();
        params.validate()?;

        let buffer = loader
            .load(asset)
            .and_then(|bytes| decode_audio_bytes(bytes, asset.extension_hint()));
        match buffer {
            Ok(buffer) => self.build_from_buffer(buffer, params),
            Err(e) => {
                warn!("Failed to load '{}': {}", asset.title, e);
                Err(e)
            }
        }
    }

    /// Build a graph around already decoded audio
    pub fn build_from_buffer(&mut self, buffer: AudioBuffer, params: PlaybackParams) -> Result<()> {
        self.dispose();
        params.validate()?;
        if buffer.is_empty() {
            return Err(SamplecraftError::EmptyAudio);
        }

        let channels = buffer.channels();
        let sample_rate = self.context.sample_rate;
        let total_duration = buffer.duration_secs();

        let source = SourceNode::new(self.context.register(NodeKind::Source), buffer, &params);

        let mut shifter = PitchShifter::new(
            channels,
            sample_rate,
            self.pitch_config.window_size_secs,
            self.pitch_config.overlap,
        );
        shifter.set_semitones(params.pitch);
        let pitch_shift = PitchShiftNode {
            handle: self.context.register(NodeKind::PitchShift),
            shifter,
        };

        let analysis = AnalysisTap {
            handle: self.context.register(NodeKind::AnalysisTap),
            analyser: Analyser::new(self.analysis_settings),
        };

        let recording = RecordingTap {
            handle: self.context.register(NodeKind::RecordingTap),
            streaming: false,
            queue: VecDeque::new(),
        };

        self.scratch = vec![vec![0.0; self.render_quantum]; channels];
        self.graph = Some(AudioGraph {
            source,
            pitch_shift,
            analysis,
            recording,
            total_duration,
        });

        debug!(
            "Built graph: {} ch, {:.3}s, live nodes {}",
            channels,
            total_duration,
            self.context.live_nodes()
        );
        Ok(())
    }

    /// Tear down the current graph; safe when nothing is built
    pub fn dispose(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.dispose();
            debug!("Disposed graph, live nodes {}", self.context.live_nodes());
        }
    }

    pub fn set_tempo(&mut self, factor: f64) -> Result<()> {
        validate_tempo(factor)?;
        if let Some(graph) = self.graph.as_mut() {
            graph.source.playback_rate = factor;
        }
        Ok(())
    }

    pub fn set_pitch(&mut self, semitones: i32) -> Result<()> {
        validate_pitch(semitones)?;
        if let Some(graph) = self.graph.as_mut() {
            graph.pitch_shift.shifter.set_semitones(semitones);
        }
        Ok(())
    }

    /// Swap playback direction; the source restarts from its beginning
    pub fn set_reverse(&mut self, reverse: bool) {
        if let Some(graph) = self.graph.as_mut() {
            if graph.source.reverse != reverse {
                graph.source.reverse = reverse;
                graph.source.position = 0.0;
            }
        }
    }

    pub fn set_loop(&mut self, looping: bool) {
        if let Some(graph) = self.graph.as_mut() {
            graph.source.looping = looping;
        }
    }

    /// Start the source from the beginning
    pub fn start_source(&mut self) -> Result<()> {
        let graph = self.graph.as_mut().ok_or(SamplecraftError::GraphNotReady)?;
        graph.source.start();
        graph.pitch_shift.shifter.reset();
        Ok(())
    }

    pub fn stop_source(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.source.stop();
        }
    }

    pub fn source_playing(&self) -> bool {
        self.graph
            .as_ref()
            .map(|g| g.source.is_playing())
            .unwrap_or(false)
    }

    /// Open the recording tap's stream; returns (channels, sample rate)
    pub fn open_recording(&mut self) -> Result<(usize, u32)> {
        let graph = self.graph.as_mut().ok_or(SamplecraftError::GraphNotReady)?;
        graph.recording.open();
        Ok((graph.source.channels(), self.context.sample_rate))
    }

    /// Blocks queued on the recording stream since the last drain
    pub fn drain_recording(&mut self) -> Vec<Vec<Vec<f32>>> {
        self.graph
            .as_mut()
            .map(|g| g.recording.drain())
            .unwrap_or_default()
    }

    pub fn close_recording(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.recording.close();
        }
    }

    /// Pull `frames` frames through the graph
    ///
    /// Renders in quanta of `render_quantum`. The analysis tap is updated
    /// once at the end. Returns the frames rendered (0 without a graph).
    pub fn render(&mut self, frames: usize) -> usize {
        let Some(graph) = self.graph.as_mut() else {
            return 0;
        };

        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(self.render_quantum);
            for channel in self.scratch.iter_mut() {
                channel.resize(n, 0.0);
            }

            graph.source.render(&mut self.scratch, self.context.sample_rate);
            graph.pitch_shift.shifter.process(&mut self.scratch);

            self.output.write(&self.scratch);
            graph.analysis.analyser.push(&self.scratch);
            graph.recording.push(&self.scratch);

            remaining -= n;
        }

        if frames > 0 {
            graph.analysis.analyser.update();
        }
        frames
    }
}

impl Drop for AudioGraphManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
