// SPDX-License-Identifier: GPL-3.0-only

//! Video decoding for frame extraction
//!
//! The decoder side of the render path: a GStreamer pipeline that decodes
//! the input at requested timestamps and hands frames to the GPU surface.

mod frame_source;

pub use frame_source::GstFrameSource;
