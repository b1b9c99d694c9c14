// SPDX-License-Identifier: MPL-2.0

//! Frame Transcoder - video frame extraction and hardware video encoding
//!
//! This library converts in both directions between video files and still
//! frames:
//!
//! - **Extraction**: decode a video, draw each requested frame onto an
//!   offscreen GPU surface, read it back and save it as JPEG
//! - **Encoding**: convert RGB frames to YUV, feed a hardware encoder and
//!   mux the result into an MP4 file
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`gpu`]: EGL surface, frame handoff and pixel readback
//! - [`shaders`]: the textured-quad shader program
//! - [`media`]: encoder interfaces, GStreamer decoders and encoders, YUV conversion
//! - [`pipelines`]: extraction and encode drivers
//! - [`events`]: progress events and cancellation
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```ignore
//! use frame_transcoder::{CancellationToken, GstCodecRegistry, MediaConfig, encode_frames};
//!
//! let outcome = encode_frames(
//!     GstCodecRegistry::new(),
//!     frames,
//!     "out.mp4".into(),
//!     MediaConfig::default(),
//!     CancellationToken::new(),
//!     None,
//! )
//! .await?;
//! ```

pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod gpu;
pub mod media;
pub mod pipelines;
pub mod shaders;

// Re-export commonly used types
pub use config::{ExtractConfig, MediaConfig};
pub use constants::BitratePreset;
pub use errors::{TranscodeError, TranscodeResult};
pub use events::{CancellationToken, SessionOutcome, TranscodeEvent};
pub use media::encoders::GstCodecRegistry;
pub use pipelines::photo::{FrameExtractor, StillImageWriter};
pub use pipelines::video::{HardwareEncodeSession, encode_frames};
