// SPDX-License-Identifier: MPL-2.0

//! Hardware encoder discovery and configuration
//!
//! Only hardware encoders are considered, in priority order
//! VA-API > NVIDIA > Intel QSV > AMD AMF > V4L2. Each encoder reports the raw
//! YUV layouts its sink pad accepts so the session can pick one before any
//! frame is converted.

pub mod detection;
pub mod registry;
pub mod video;

// Re-export commonly used types
pub use detection::detect_hardware_encoders;
pub use registry::GstCodecRegistry;
pub use video::{GstVideoEncoder, VideoCodec, hardware_spec};
