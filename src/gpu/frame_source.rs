// SPDX-License-Identifier: GPL-3.0-only

//! Decoded frames arriving on a GPU texture
//!
//! An [`ExternalFrameSource`] is the receiving end of a decoder's output
//! stream. The decoder signals the shared [`FrameSync`] from its own thread;
//! the render thread then calls
//! [`update_tex_image`](ExternalFrameSource::update_tex_image) to latch the
//! newest buffer into the bound texture and reads the matching source
//! transform.

use super::frame_sync::FrameSync;
use super::gl::{GlApi, consts};
use crate::errors::TranscodeResult;
use std::sync::Arc;
use std::time::Duration;

/// Column-major 4x4 matrix
pub type Mat4 = [f32; 16];

/// Identity transform
pub const IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Vertical flip in texture space: `t' = 1 - t`
pub const FLIP_Y: Mat4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, -1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 1.0, 0.0, 1.0,
];

/// Index of the vertical scale in a column-major matrix
const SCALE_Y: usize = 5;

/// Index of the vertical translation in a column-major matrix
const TRANSLATE_Y: usize = 13;

/// Flip a source transform vertically
///
/// `scaleY' = -scaleY`, `translateY' = 1 - translateY`; all other elements
/// are untouched. Without `invert_y` the matrix is returned as is.
pub fn apply_invert_y(mut matrix: Mat4, invert_y: bool) -> Mat4 {
    if invert_y {
        matrix[SCALE_Y] = -matrix[SCALE_Y];
        matrix[TRANSLATE_Y] = 1.0 - matrix[TRANSLATE_Y];
    }
    matrix
}

/// Texture binding point a frame source writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    /// `GL_TEXTURE_EXTERNAL_OES`, backed by a decoder-owned image
    External,
    /// Regular `GL_TEXTURE_2D`, filled by uploading decoded pixels
    Texture2d,
}

impl TextureTarget {
    /// GL enum for binding
    pub fn gl_enum(&self) -> u32 {
        match self {
            TextureTarget::External => consts::TEXTURE_EXTERNAL_OES,
            TextureTarget::Texture2d => consts::TEXTURE_2D,
        }
    }

    /// GLSL sampler type sampling this target
    pub fn sampler_type(&self) -> &'static str {
        match self {
            TextureTarget::External => "samplerExternalOES",
            TextureTarget::Texture2d => "sampler2D",
        }
    }

    /// Extension directive the fragment shader needs, if any
    pub fn extension_directive(&self) -> Option<&'static str> {
        match self {
            TextureTarget::External => Some("#extension GL_OES_EGL_image_external : require"),
            TextureTarget::Texture2d => None,
        }
    }
}

/// Receiver for a decoder's output frames
pub trait ExternalFrameSource {
    /// Binding point for the frame texture
    fn texture_target(&self) -> TextureTarget;

    /// Handoff the decoder signals when a frame is queued
    fn frame_sync(&self) -> Arc<FrameSync>;

    /// Copy the most recently queued frame into `texture`
    ///
    /// `texture` is bound to [`texture_target`](Self::texture_target) on the
    /// active unit when this is called.
    fn update_tex_image<G: GlApi>(&mut self, gl: &G, texture: G::Texture) -> TranscodeResult<()>;

    /// Texture-coordinate transform for the latched frame
    fn transform_matrix(&self) -> Mat4;
}

/// A frame source the caller can position
pub trait SeekableFrameSource: ExternalFrameSource {
    /// Ask the decoder for the frame at `timestamp`
    ///
    /// Returns once the request is issued; arrival is signalled through
    /// [`frame_sync`](ExternalFrameSource::frame_sync). Any stale signal is
    /// cleared first.
    fn request_frame(&mut self, timestamp: Duration) -> TranscodeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_y_flips_scale_and_translation() {
        let mut m = IDENTITY;
        m[5] = 0.75;
        m[13] = 0.125;
        m[0] = 0.5;
        let flipped = apply_invert_y(m, true);
        assert_eq!(flipped[5], -0.75);
        assert_eq!(flipped[13], 0.875);
        assert_eq!(flipped[0], 0.5);
        assert_eq!(apply_invert_y(m, false), m);
    }

    #[test]
    fn test_flip_of_flip_is_identity() {
        assert_eq!(apply_invert_y(FLIP_Y, true), IDENTITY);
    }
}
