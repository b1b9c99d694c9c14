// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! [`MediaConfig`] carries the four encode options callers may set
//! (`mimeType`, `bitRate`, `frameRate`, `iFrameInterval`) and is persisted as
//! JSON. [`ExtractConfig`] holds the knobs for the frame extraction driver.

use crate::constants::extraction;
use crate::errors::{TranscodeError, TranscodeResult};
use crate::media::encoders::VideoCodec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Directory name under the user config dir
const CONFIG_DIR_NAME: &str = "frame-transcoder";

/// Config file name
const CONFIG_FILE_NAME: &str = "config.json";

/// Encoder settings for the hardware encode session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaConfig {
    /// Output mime type (`video/avc` or `video/hevc`)
    pub mime_type: String,
    /// Target bitrate in bits per second
    pub bit_rate: u32,
    /// Frames per second of the produced stream
    pub frame_rate: u32,
    /// Seconds between keyframes
    pub i_frame_interval: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            mime_type: VideoCodec::H264.mime_type().to_string(),
            bit_rate: 1_000_000,
            frame_rate: 30,
            i_frame_interval: 1,
        }
    }
}

impl MediaConfig {
    /// Check that the values can drive an encoder
    pub fn validate(&self) -> TranscodeResult<()> {
        if self.frame_rate == 0 {
            return Err(TranscodeError::Config(
                "frameRate must be greater than zero".into(),
            ));
        }
        if self.bit_rate == 0 {
            return Err(TranscodeError::Config(
                "bitRate must be greater than zero".into(),
            ));
        }
        if VideoCodec::from_mime(&self.mime_type).is_none() {
            return Err(TranscodeError::Config(format!(
                "Unsupported mime type: {}",
                self.mime_type
            )));
        }
        Ok(())
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> TranscodeResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TranscodeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: MediaConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        debug!(path = %path.display(), ?config, "Loaded media config");
        Ok(config)
    }

    /// Load the config at the default location, falling back to defaults
    /// when no file exists yet
    pub fn load_or_default() -> TranscodeResult<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Write the config as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> TranscodeResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved media config");
        Ok(())
    }
}

/// Settings for the frame extraction driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Render surface width
    pub width: u32,
    /// Render surface height
    pub height: u32,
    /// JPEG quality (0-100)
    pub photo_quality: u8,
    /// Fatal wait for each decoded frame
    pub frame_timeout: Duration,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            width: extraction::DEFAULT_WIDTH,
            height: extraction::DEFAULT_HEIGHT,
            photo_quality: extraction::DEFAULT_PHOTO_QUALITY,
            frame_timeout: extraction::FRAME_TIMEOUT,
        }
    }
}

/// Default config file location: `<config dir>/frame-transcoder/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MediaConfig = serde_json::from_str(r#"{"frameRate": 24}"#).unwrap();
        assert_eq!(config.frame_rate, 24);
        assert_eq!(config.mime_type, "video/avc");
        assert_eq!(config.bit_rate, 1_000_000);
        assert_eq!(config.i_frame_interval, 1);
    }

    #[test]
    fn test_validate_rejects_zero_frame_rate() {
        let config = MediaConfig {
            frame_rate: 0,
            ..MediaConfig::default()
        };
        assert!(matches!(config.validate(), Err(TranscodeError::Config(_))));
    }
}
