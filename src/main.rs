// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use frame_transcoder::constants::BitratePreset;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "frame-transcoder")]
#[command(about = "Extract still frames from video and encode frames back to video")]
#[command(version = frame_transcoder::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract frames from a video as JPEG files
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for frame files (default: ~/Pictures/frame-transcoder/frames_TIMESTAMP)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Comma separated timestamps in seconds
        #[arg(short, long, value_delimiter = ',', conflicts_with = "every")]
        times: Vec<f64>,

        /// Extract a frame every N seconds, starting at zero
        #[arg(short, long)]
        every: Option<f64>,

        /// Number of frames to extract with --every
        #[arg(short, long, default_value = "10")]
        count: usize,

        /// Output frame width
        #[arg(long, default_value = "1280")]
        width: u32,

        /// Output frame height
        #[arg(long, default_value = "720")]
        height: u32,

        /// JPEG quality (1-100)
        #[arg(short, long, default_value = "100")]
        quality: u8,
    },

    /// Encode a directory of frames into an MP4 file
    Encode {
        /// Directory of frame images, encoded in file name order
        #[arg(short, long)]
        frames: PathBuf,

        /// Output file (default: ~/Videos/frame-transcoder/video_TIMESTAMP.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON media config (default: the user config file, if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output mime type (video/avc or video/hevc)
        #[arg(long)]
        mime: Option<String>,

        /// Bitrate in bits per second
        #[arg(short, long, conflicts_with = "preset")]
        bitrate: Option<u32>,

        /// Bitrate preset scaled by frame width
        #[arg(short, long, value_enum)]
        preset: Option<PresetArg>,

        /// Frames per second
        #[arg(long)]
        fps: Option<u32>,

        /// Seconds between keyframes
        #[arg(long)]
        keyframe_interval: Option<u32>,
    },

    /// List hardware encoders and the input layouts they accept
    Encoders,

    /// Show or write the media config file
    Config {
        /// Write the default configuration to the config file
        #[arg(long)]
        write_default: bool,

        /// Config file to use instead of the default location
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    Low,
    Medium,
    High,
}

impl From<PresetArg> for BitratePreset {
    fn from(preset: PresetArg) -> Self {
        match preset {
            PresetArg::Low => BitratePreset::Low,
            PresetArg::Medium => BitratePreset::Medium,
            PresetArg::High => BitratePreset::High,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=frame_transcoder=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            input,
            output_dir,
            times,
            every,
            count,
            width,
            height,
            quality,
        } => cli::extract_frames(cli::ExtractOptions {
            input,
            output_dir,
            times,
            every,
            count,
            width,
            height,
            quality,
        }),
        Commands::Encode {
            frames,
            output,
            config,
            mime,
            bitrate,
            preset,
            fps,
            keyframe_interval,
        } => cli::encode_frames(cli::EncodeOptions {
            frames,
            output,
            config,
            mime,
            bitrate,
            preset: preset.map(BitratePreset::from),
            fps,
            keyframe_interval,
        }),
        Commands::Encoders => cli::list_encoders(),
        Commands::Config {
            write_default,
            path,
        } => cli::show_config(write_default, path),
    }
}
