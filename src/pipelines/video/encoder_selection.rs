// SPDX-License-Identifier: MPL-2.0

//! Encoder settings for an encode session
//!
//! Turns the user's [`MediaConfig`] and the chosen hardware encoder into the
//! concrete [`EncoderSettings`] the encoder is created with, including the
//! raw YUV layout frames are converted into.

use crate::config::MediaConfig;
use crate::constants::BitratePreset;
use crate::errors::{TranscodeError, TranscodeResult};
use crate::media::codec::{CodecInfo, EncoderSettings};
use crate::media::formats::YuvLayout;
use tracing::{debug, info};

/// Resolve the settings for `codec` encoding `width x height` frames
///
/// # Returns
/// * `Ok(EncoderSettings)` - Settings with the preferred supported layout
/// * `Err(TranscodeError::InvalidFrame)` - Zero or odd dimensions
pub fn encoder_settings(
    config: &MediaConfig,
    codec: &CodecInfo,
    width: u32,
    height: u32,
) -> TranscodeResult<EncoderSettings> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(TranscodeError::InvalidFrame(format!(
            "Encoder input must have even, non-zero dimensions, got {}x{}",
            width, height
        )));
    }

    let layout = YuvLayout::select(&codec.color_formats);
    if codec.color_formats.is_empty() {
        debug!(encoder = %codec.name, "Encoder advertises no known layout, using semi-planar");
    }
    info!(
        encoder = %codec.name,
        ?layout,
        advertised = ?codec.color_formats,
        "Selected input layout"
    );

    Ok(EncoderSettings {
        mime: config.mime_type.clone(),
        width,
        height,
        bit_rate: config.bit_rate,
        frame_rate: config.frame_rate,
        i_frame_interval: config.i_frame_interval,
        layout,
    })
}

/// Bitrate for the command line: an explicit value wins over a preset
pub fn resolve_bitrate(
    explicit_bps: Option<u32>,
    preset: Option<BitratePreset>,
    width: u32,
    fallback_bps: u32,
) -> u32 {
    match (explicit_bps, preset) {
        (Some(bps), _) => bps,
        (None, Some(preset)) => preset.bitrate_bps(width),
        (None, None) => fallback_bps,
    }
}
