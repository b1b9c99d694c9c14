// SPDX-License-Identifier: GPL-3.0-only

//! Still image encoding for extracted frames
//!
//! Readback buffers are RGBA8; JPEG has no alpha channel, so the alpha byte
//! is dropped before compression. The blocking variant is used on the render
//! thread, the async one when called from a tokio context.

use crate::errors::{TranscodeError, TranscodeResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// JPEG writer with a fixed quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StillImageWriter {
    quality: u8,
}

impl StillImageWriter {
    /// Create a writer; `quality` is clamped into the encoder's 1-100 range
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Compress an RGBA buffer to JPEG and write it to `path`
    ///
    /// The parent directory must already exist.
    ///
    /// # Arguments
    /// * `buffer` - RGBA8 pixels, exactly `width * height * 4` bytes
    /// * `width`, `height` - Image size
    /// * `path` - Destination file, overwritten if present
    ///
    /// # Returns
    /// * `Ok(())` - File written and closed
    /// * `Err(TranscodeError::ImageWrite)` - Bad buffer, encode or I/O failure
    pub fn save(&self, buffer: &[u8], width: u32, height: u32, path: &Path) -> TranscodeResult<()> {
        let data = Self::encode_jpeg(buffer, width, height, self.quality)
            .map_err(|e| TranscodeError::image_write(path, e))?;

        std::fs::write(path, &data).map_err(|e| TranscodeError::image_write(path, e))?;

        debug!(path = %path.display(), size = data.len(), "Frame saved");
        Ok(())
    }

    /// [`save`](Self::save) on a blocking worker thread
    pub async fn save_async(
        &self,
        buffer: Vec<u8>,
        width: u32,
        height: u32,
        path: PathBuf,
    ) -> TranscodeResult<PathBuf> {
        info!(path = %path.display(), width, height, "Saving frame");
        let writer = *self;
        tokio::task::spawn_blocking(move || {
            writer.save(&buffer, width, height, &path)?;
            Ok(path)
        })
        .await
        .map_err(|e| TranscodeError::Io(format!("Save task error: {}", e)))?
    }

    /// Encode RGBA pixels as JPEG
    fn encode_jpeg(rgba: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, String> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(format!(
                "Buffer holds {} bytes, expected {} for {}x{} RGBA",
                rgba.len(),
                expected,
                width,
                height
            ));
        }

        let rgb: Vec<u8> = rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
        encoder
            .encode(&rgb, width, height, image::ExtendedColorType::Rgb8)
            .map_err(|e| format!("JPEG encoding failed: {}", e))?;

        Ok(buffer)
    }
}

impl Default for StillImageWriter {
    fn default() -> Self {
        Self::new(crate::constants::extraction::DEFAULT_PHOTO_QUALITY)
    }
}
