//! CLI Command Implementations
//!
//! Headless runs of the editor: a [`ManualClock`] is stepped at 60 frames
//! per second so a capture completes as fast as the machine can render it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use walkdir::WalkDir;

use crate::capture::DownloadFile;
use crate::config::EditorConfig;
use crate::editor::{format_time, EditorEvent, EditorSession};
use crate::engine::buffer::{calculate_peak, calculate_rms, AudioBuffer};
use crate::engine::clock::ManualClock;
use crate::engine::decode::decode_audio_bytes;
use crate::engine::graph::{NullOutput, PlaybackParams};
use crate::engine::loader::{FileSampleLoader, SampleAsset};
use crate::error::{Result, SamplecraftError};

const FRAME_SECS: f64 = 1.0 / 60.0;

/// Extensions picked up by `batch`
const AUDIO_EXTENSIONS: [&str; 5] = ["wav", "mp3", "flac", "aac", "m4a"];

/// Load the config file if given, then apply environment overrides
pub fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    match path {
        Some(path) => {
            let mut config = EditorConfig::load(path)?;
            config.apply_env()?;
            Ok(config)
        }
        None => EditorConfig::from_env(),
    }
}

fn title_for(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample".to_string())
}

/// Run one file through load + capture and return the download
pub fn render_to_download(
    input: &Path,
    title: &str,
    params: PlaybackParams,
    config: &EditorConfig,
) -> Result<DownloadFile> {
    let clock = ManualClock::new();
    let mut session = EditorSession::new(
        config.clone(),
        Arc::new(FileSampleLoader::new()),
        Arc::new(clock.clone()),
        Box::new(NullOutput),
    )?;

    session.load_with(
        SampleAsset::new(title, input.to_string_lossy().into_owned()),
        params,
    );
    for event in session.take_events() {
        if let EditorEvent::LoadFailed { code, message } = event {
            return Err(SamplecraftError::DecodeFailed {
                reason: format!("{} ({})", message, code),
                source: None,
            });
        }
    }

    session.request_download();
    for event in session.take_events() {
        if let EditorEvent::Error { message, .. } = event {
            return Err(SamplecraftError::CaptureUnavailable { reason: message });
        }
    }

    let budget = session
        .capture()
        .session()
        .map(|s| s.expected_duration_ms() / 1000.0)
        .unwrap_or(0.0);
    let max_frames = (budget / FRAME_SECS).ceil() as usize + 60;

    for _ in 0..max_frames {
        clock.advance(FRAME_SECS);
        for event in session.tick() {
            match event {
                EditorEvent::DownloadReady(file) => return Ok(file),
                EditorEvent::Error { code, message } => {
                    return Err(SamplecraftError::EncoderFailed {
                        reason: format!("{} ({})", message, code),
                    })
                }
                _ => {}
            }
        }
    }

    Err(SamplecraftError::CaptureUnavailable {
        reason: "capture did not finish".to_string(),
    })
}

/// Render one file and write the result into `output`.
pub fn render(
    input: &Path,
    output: &Path,
    title: Option<&str>,
    params: PlaybackParams,
    config: &EditorConfig,
) -> Result<PathBuf> {
    let title = title.map(str::to_string).unwrap_or_else(|| title_for(input));
    info!("Rendering '{}' from {}", title, input.display());

    std::fs::create_dir_all(output)?;
    let file = render_to_download(input, &title, params, config)?;
    let path = file.write_to(output)?;

    if !file.is_transcoded() {
        warn!("Capture could not be transcoded; wrote the compressed capture instead");
    }
    println!("Wrote {} ({} bytes)", path.display(), file.len());
    println!("sha256: {}", file.sha256());
    Ok(path)
}

/// Render every audio file under `dir`.
pub fn batch(dir: &Path, output: &Path, params: PlaybackParams, config: &EditorConfig) -> Result<usize> {
    info!("Batch rendering {}", dir.display());

    let inputs: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();

    if inputs.is_empty() {
        println!("No audio files found in {}", dir.display());
        return Ok(0);
    }

    let mut rendered = 0;
    for input in &inputs {
        match render(input, output, None, params, config) {
            Ok(_) => rendered += 1,
            Err(e) => warn!("Skipping {}: {}", input.display(), e),
        }
    }

    println!("Rendered {}/{} files", rendered, inputs.len());
    Ok(rendered)
}

/// Print format, duration and levels of an audio file.
pub fn inspect(input: &Path) -> Result<()> {
    let bytes = std::fs::read(input)?;
    let hint = input.extension().and_then(|e| e.to_str());
    let buffer = decode_audio_bytes(bytes, hint)?;

    println!("File:        {}", input.display());
    println!("Channels:    {}", buffer.channels());
    println!("Sample rate: {} Hz", buffer.sample_rate);
    println!("Frames:      {}", buffer.len());
    println!(
        "Duration:    {} ({:.3}s)",
        format_time(buffer.duration_secs()),
        buffer.duration_secs()
    );
    println!("{}", format_levels(&buffer));
    Ok(())
}

/// Peak and RMS lines; both levels are already in dBFS
fn format_levels(buffer: &AudioBuffer) -> String {
    format!(
        "Peak:        {:.1} dBFS\nRMS:         {:.1} dBFS",
        calculate_peak(buffer),
        calculate_rms(buffer)
    )
}

/// Print the effective configuration as JSON.
pub fn print_config(config: &EditorConfig) -> Result<()> {
    println!("{}", config.to_json_pretty()?);
    Ok(())
}

/// Generate samples from a prompt and print the response.
#[cfg(feature = "remote")]
pub fn generate(prompt: &str, config: &EditorConfig) -> Result<()> {
    use crate::remote::generation::{failure_response, generate_samples, HttpGenerationBackend};
    use crate::remote::{GenerateRequest, PollOptions};

    let backend = HttpGenerationBackend::from_config(&config.remote);
    let request = GenerateRequest {
        prompt: prompt.to_string(),
    };

    match generate_samples(&backend, &request, PollOptions::from(&config.remote)) {
        Ok(reply) => {
            if let Some(warning) = &reply.body.warning {
                warn!("{}", warning);
            }
            println!("{}", serde_json::to_string_pretty(&reply.body)?);
            Ok(())
        }
        Err(e) => {
            let (status, body) = failure_response(&e);
            println!("{} {}", status, serde_json::to_string_pretty(&body)?);
            Err(e)
        }
    }
}
