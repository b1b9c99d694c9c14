// SPDX-License-Identifier: MPL-2.0

//! Media processing utilities for encoding, decoding, and color conversion
//!
//! # Color Space Conversion
//!
//! Hardware encoders take YUV 4:2:0 input in one of four layouts. The
//! [`formats`] module converts RGB(A) frames into whichever layout the
//! chosen encoder accepts.
//!
//! # Video Encoding
//!
//! The [`codec`] module defines the buffer-exchange interface the encode
//! session drives; [`encoders`] implements it over GStreamer hardware
//! encoders (VA-API, NVENC, QSV, AMF, V4L2).
//!
//! # Modules
//!
//! - [`codec`]: encoder, muxer and registry traits
//! - [`decoders`]: decoded video frames as a GPU frame source
//! - [`encoders`]: hardware encoder detection and configuration
//! - [`formats`]: RGB to YUV conversion

pub mod codec;
pub mod decoders;
pub mod encoders;
pub mod formats;

// Re-export commonly used types
pub use codec::{CodecInfo, CodecRegistry, EncoderSettings, Muxer, VideoEncoder};
pub use decoders::GstFrameSource;
pub use formats::{YuvLayout, convert_rgb_to_yuv};
