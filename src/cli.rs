// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for frame transcoding
//!
//! This module provides command-line functionality for:
//! - Extracting still frames from a video
//! - Encoding a directory of frames into an MP4
//! - Listing hardware encoders
//! - Showing and writing the media config

use chrono::Local;
use frame_transcoder::GstCodecRegistry;
use frame_transcoder::config::{ExtractConfig, MediaConfig, default_config_path};
use frame_transcoder::constants::{BitratePreset, format_bitrate};
use frame_transcoder::events::{
    CancellationToken, EventReceiver, SessionOutcome, TranscodeEvent, event_channel,
};
use frame_transcoder::media::encoders::{VideoCodec, detect_hardware_encoders, hardware_spec};
use frame_transcoder::pipelines::photo::{FrameExtractor, evenly_spaced_timestamps};
use frame_transcoder::pipelines::video::encoder_selection::resolve_bitrate;
use frame_transcoder::pipelines::video::{
    collect_frame_files, encode_frames as run_encode, load_rgba,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Default folder name for extracted frames and encoded videos
const DEFAULT_SAVE_FOLDER: &str = "frame-transcoder";

/// Options for the `extract` command
pub struct ExtractOptions {
    pub input: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub times: Vec<f64>,
    pub every: Option<f64>,
    pub count: usize,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

/// Options for the `encode` command
pub struct EncodeOptions {
    pub frames: PathBuf,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub mime: Option<String>,
    pub bitrate: Option<u32>,
    pub preset: Option<BitratePreset>,
    pub fps: Option<u32>,
    pub keyframe_interval: Option<u32>,
}

/// Extract frames from a video file
pub fn extract_frames(options: ExtractOptions) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    if !options.input.is_file() {
        return Err(format!("Input file not found: {}", options.input.display()).into());
    }

    let timestamps = requested_timestamps(options.every, options.count, &options.times)?;

    let output_dir = options.output_dir.unwrap_or_else(|| {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        get_default_frames_dir().join(format!("frames_{}", timestamp))
    });
    std::fs::create_dir_all(&output_dir)?;

    println!("Input: {}", options.input.display());
    println!(
        "Extracting {} frames at {}x{} into {}",
        timestamps.len(),
        options.width,
        options.height,
        output_dir.display()
    );

    let extractor = FrameExtractor::new(ExtractConfig {
        width: options.width,
        height: options.height,
        photo_quality: options.quality.clamp(1, 100),
        ..ExtractConfig::default()
    });

    let cancel = install_cancel_handler()?;
    let (events, receiver) = event_channel();
    let input = options.input;

    let rt = tokio::runtime::Runtime::new()?;
    let (report, ()) = rt.block_on(async {
        // The render surface owns its GL context, so the whole run stays on one thread
        let task = tokio::task::spawn_blocking(move || {
            extractor.run(&input, &timestamps, &output_dir, &cancel, Some(events))
        });
        futures::join!(task, print_events(receiver))
    });

    let report = report??;
    match report.outcome {
        SessionOutcome::Completed => println!("Saved {} frames", report.frames.len()),
        SessionOutcome::Cancelled => println!(
            "Cancelled after {} frames; saved frames were kept",
            report.frames.len()
        ),
    }
    Ok(())
}

/// Encode a directory of frames into an MP4 file
pub fn encode_frames(options: EncodeOptions) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    let frames = collect_frame_files(&options.frames)?;
    let Some(first) = frames.first() else {
        return Err(format!("No image files in {}", options.frames.display()).into());
    };
    let (width, _) = load_rgba(first)?.dimensions();

    let mut config = match options.config {
        Some(path) => MediaConfig::load(&path)?,
        None => MediaConfig::load_or_default()?,
    };
    if let Some(mime) = options.mime {
        config.mime_type = mime;
    }
    if let Some(fps) = options.fps {
        config.frame_rate = fps;
    }
    if let Some(interval) = options.keyframe_interval {
        config.i_frame_interval = interval;
    }
    config.bit_rate = resolve_bitrate(options.bitrate, options.preset, width, config.bit_rate);
    config.validate()?;

    let output = match options.output {
        Some(path) => path,
        None => {
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            let extension = VideoCodec::from_mime(&config.mime_type)
                .map_or("mp4", |codec| codec.file_extension());
            get_default_video_dir().join(format!("video_{}.{}", timestamp, extension))
        }
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    println!("Frames: {} from {}", frames.len(), options.frames.display());
    println!(
        "Encoding {} at {} fps, {}",
        config.mime_type,
        config.frame_rate,
        format_bitrate(config.bit_rate)
    );
    println!("Output: {}", output.display());
    println!("Press Ctrl+C to cancel");

    let cancel = install_cancel_handler()?;
    let (events, receiver) = event_channel();

    let rt = tokio::runtime::Runtime::new()?;
    let (outcome, ()) = rt.block_on(async {
        futures::join!(
            run_encode(
                GstCodecRegistry::new(),
                frames,
                output.clone(),
                config,
                cancel,
                Some(events),
            ),
            print_events(receiver)
        )
    });

    match outcome? {
        SessionOutcome::Completed => println!("Video saved: {}", output.display()),
        SessionOutcome::Cancelled => println!("Encoding cancelled; no file was written"),
    }
    Ok(())
}

/// List installed hardware encoders
pub fn list_encoders() -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    let encoders = detect_hardware_encoders();
    if encoders.is_empty() {
        println!("No hardware encoders found.");
        return Ok(());
    }

    println!("Available hardware encoders:");
    println!();
    for encoder in &encoders {
        let layouts: Vec<String> = encoder
            .color_formats
            .iter()
            .map(|layout| format!("{:?}", layout))
            .collect();
        let display_name = hardware_spec(&encoder.name).map_or("", |spec| spec.display_name);
        println!("  {} - {} ({})", encoder.name, display_name, encoder.mime);
        if !layouts.is_empty() {
            println!("      Input layouts: {}", layouts.join(", "));
        }
    }
    Ok(())
}

/// Print the active media config, or write the defaults to disk
pub fn show_config(
    write_default: bool,
    path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = path
        .or_else(default_config_path)
        .ok_or("Could not determine the config directory")?;

    if write_default {
        MediaConfig::default().save(&path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = if path.exists() {
        MediaConfig::load(&path)?
    } else {
        println!("No config at {}, showing defaults", path.display());
        MediaConfig::default()
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Print session events until every sender is dropped
async fn print_events(mut receiver: EventReceiver) {
    while let Some(event) = receiver.recv().await {
        match event {
            TranscodeEvent::Progress(progress) => {
                print!("\r  {:3}%", progress.percent);
                if let Some(message) = progress.message {
                    print!(" {}", message);
                }
                let _ = std::io::stdout().flush();
            }
            TranscodeEvent::Complete(progress) => {
                println!(
                    "\r  100% done in {:.1}s",
                    progress.elapsed.as_secs_f64()
                );
            }
            TranscodeEvent::Error(err) => {
                println!();
                eprintln!("Error: {}", err);
            }
        }
    }
}

/// Timestamps from `--every`/`--count`, or else from `--times`
fn requested_timestamps(
    every: Option<f64>,
    count: usize,
    times: &[f64],
) -> Result<Vec<Duration>, String> {
    let timestamps = match every {
        Some(every) => {
            let interval = Duration::try_from_secs_f64(every)
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or("--every must be a positive number of seconds")?;
            evenly_spaced_timestamps(interval, count)
        }
        None => times
            .iter()
            .map(|t| Duration::try_from_secs_f64(*t))
            .collect::<Result<_, _>>()
            .map_err(|_| "Timestamps must be non-negative seconds")?,
    };
    if timestamps.is_empty() {
        return Err("No timestamps given; use --times or --every".into());
    }
    Ok(timestamps)
}

/// Cancel the returned token on Ctrl+C
fn install_cancel_handler() -> Result<CancellationToken, Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        handler_token.cancel();
    })?;
    Ok(cancel)
}

/// Get default directory for extracted frames
fn get_default_frames_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}

/// Get default video directory
fn get_default_video_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}
