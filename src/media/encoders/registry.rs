// SPDX-License-Identifier: MPL-2.0

//! GStreamer-backed codec registry

use super::detection::probe_encoder;
use super::video::{GstVideoEncoder, HARDWARE_ENCODERS, VideoCodec};
use crate::errors::TranscodeResult;
use crate::media::codec::{CodecInfo, CodecRegistry, EncoderSettings, Muxer, VideoEncoder};
use crate::pipelines::video::muxer::GstMuxer;
use std::path::Path;
use tracing::info;

/// Finds hardware encoders among installed GStreamer elements
#[derive(Debug, Default, Clone, Copy)]
pub struct GstCodecRegistry;

impl GstCodecRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl CodecRegistry for GstCodecRegistry {
    fn find_encoder(&self, mime: &str) -> Option<CodecInfo> {
        let codec = VideoCodec::from_mime(mime)?;
        let found = HARDWARE_ENCODERS
            .iter()
            .filter(|spec| spec.codec == codec)
            .find_map(probe_encoder);

        if let Some(info) = &found {
            info!(encoder = %info.name, mime, "Selected hardware encoder");
        }
        found
    }

    fn create_encoder(
        &self,
        codec: &CodecInfo,
        settings: &EncoderSettings,
    ) -> TranscodeResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(GstVideoEncoder::new(codec, settings)?))
    }

    fn create_muxer(&self, output_path: &Path) -> TranscodeResult<Box<dyn Muxer>> {
        Ok(Box::new(GstMuxer::new(output_path)?))
    }
}
