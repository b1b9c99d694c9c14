// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Target bitrate level, scaled by frame width
///
/// An explicit bitrate in the media configuration takes precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitratePreset {
    Low,
    #[default]
    Medium,
    High,
}

/// Minimum width and the Low, Medium and High rates in kbps, widest first
const BITRATE_STEPS_KBPS: [(u32, [u32; 3]); 5] = [
    (3840, [15_000, 30_000, 50_000]),
    (2560, [8_000, 16_000, 32_000]),
    (1920, [4_000, 8_000, 16_000]),
    (1280, [2_500, 5_000, 10_000]),
    (0, [1_000, 2_000, 4_000]),
];

impl BitratePreset {
    /// Bits per second for frames `width` pixels wide
    pub fn bitrate_bps(&self, width: u32) -> u32 {
        let level = *self as usize;
        let kbps = BITRATE_STEPS_KBPS
            .iter()
            .find(|(min_width, _)| width >= *min_width)
            .map_or(0, |(_, rates)| rates[level]);
        kbps * 1000
    }
}

/// Format bitrate for display (e.g., "8 Mbps" or "2.5 Mbps")
pub fn format_bitrate(bps: u32) -> String {
    let mbps = bps as f64 / 1_000_000.0;
    if mbps == mbps.floor() {
        format!("{} Mbps", mbps as u32)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// Hardware encode loop constants
pub mod encode {
    use super::Duration;

    /// Offset added to every presentation timestamp, in microseconds
    pub const BASE_PTS_OFFSET_US: u64 = 132;

    /// Bounded wait for a free encoder input slot (soft retry on expiry)
    pub const INPUT_SLOT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Wait for one output poll per submitted frame
    pub const OUTPUT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

    /// Upper bound for draining buffered frames after end-of-stream
    pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

    /// Maximum input size recorded on the output format handed to the muxer
    pub const MAX_INPUT_SIZE: u32 = 3000 * 3000;

    /// Decoded frames buffered between the decode and submit stages
    pub const PIPELINE_CHANNEL_CAPACITY: usize = 2;

    /// Frames the encoder may hold queued before an input slot blocks
    pub const MAX_QUEUED_INPUT_FRAMES: u64 = 4;

    /// Consecutive input-slot timeouts before the encoder is considered stuck
    pub const MAX_INPUT_RETRIES: u32 = 20;
}

/// Frame extraction constants
pub mod extraction {
    use super::Duration;

    /// Fatal wait for the decoder to deliver a frame
    pub const FRAME_TIMEOUT: Duration = Duration::from_secs(3);

    /// Default JPEG quality for extracted frames
    pub const DEFAULT_PHOTO_QUALITY: u8 = 100;

    /// Default output size when the caller does not pick one
    pub const DEFAULT_WIDTH: u32 = 1280;
    pub const DEFAULT_HEIGHT: u32 = 720;

    /// File name for the frame at `index`; lexicographic order is presentation order
    pub fn frame_file_name(index: usize) -> String {
        format!("frame_{:05}.jpg", index)
    }
}

/// Timing constants
pub mod timing {
    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Pipeline paused/preroll timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Interval between bus polls
    pub const BUS_POLL_INTERVAL_MS: u64 = 100;
}

/// Supported still image formats for the encode path
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
