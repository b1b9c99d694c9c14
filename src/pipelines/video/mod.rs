// SPDX-License-Identifier: MPL-2.0

//! Hardware video encoding
//!
//! - [`session`]: the encode state machine and its teardown
//! - [`encoder_selection`]: settings and input layout for the chosen encoder
//! - [`muxer`]: MP4 container writer
//! - [`transcode`]: async driver feeding image files through a session

pub mod encoder_selection;
pub mod muxer;
pub mod session;
pub mod transcode;

pub use muxer::GstMuxer;
pub use session::{FrameSubmission, HardwareEncodeSession, SessionState, presentation_time_us};
pub use transcode::{collect_frame_files, encode_frames, load_rgba};
