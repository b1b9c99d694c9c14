// SPDX-License-Identifier: MPL-2.0

//! Pixel format utilities
//!
//! This module provides the RGB to YUV 4:2:0 conversions that feed hardware
//! encoders.

pub mod yuv;

pub use yuv::{YuvLayout, convert_rgb_to_yuv, yuv420_frame_size};
