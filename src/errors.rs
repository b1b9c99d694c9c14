// SPDX-License-Identifier: MPL-2.0

//! Error types for the transcoder
//!
//! Every failure in the render/readback path and the encode loop maps onto a
//! single [`TranscodeError`]. All variants are fatal to the session that
//! produced them; the only retried condition (a busy encoder input slot) is
//! not an error at all and surfaces as
//! [`FrameSubmission::Retry`](crate::pipelines::video::FrameSubmission).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using TranscodeError
pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Shader pipeline stage, used to attribute compile failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Main transcoder error type
#[derive(Debug, Clone, Error)]
pub enum TranscodeError {
    /// Display, config, context or surface acquisition failed
    #[error("Render surface initialization failed: {message} (code {code:#x})")]
    SurfaceInit { code: i32, message: String },

    /// Binding context and surface to the calling thread failed
    #[error("Failed to bind rendering context: {0}")]
    ContextBind(String),

    /// A GPU call left an error pending
    #[error("GPU error after {operation}: {code:#06x}")]
    Gpu { operation: String, code: u32 },

    /// No decoded frame arrived within the wait budget
    #[error("Timed out waiting for a decoded frame after {0:?}")]
    FrameTimeout(std::time::Duration),

    /// A shader stage failed to compile
    #[error("Failed to compile {stage} shader: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    /// The shader program failed to link
    #[error("Failed to link shader program: {log}")]
    ProgramLink { log: String },

    /// Compressing or writing a still image failed
    #[error("Failed to write image {path}: {message}")]
    ImageWrite { path: PathBuf, message: String },

    /// Reading a still image for the encode path failed
    #[error("Failed to decode image {path}: {message}")]
    ImageDecode { path: PathBuf, message: String },

    /// The decode pipeline feeding the render surface failed
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// No hardware encoder advertises the requested mime type
    #[error("No hardware encoder found for {0}")]
    NoCodecFound(String),

    /// Creating or configuring the encoder failed
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    /// A buffer-exchange call on a running encoder failed
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Creating the multiplexer failed
    #[error("Muxer initialization failed: {0}")]
    MuxerInit(String),

    /// Writing to or finalizing the container failed
    #[error("Muxer error: {0}")]
    Muxer(String),

    /// Encoded data arrived before the output format was known
    #[error("Encoded data arrived before the muxer was started")]
    MuxerNotStarted,

    /// A frame does not match the session's dimensions or layout rules
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// An operation was called in the wrong lifecycle state
    #[error("Operation {operation} not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// The resource was already released
    #[error("{0} used after release")]
    UseAfterRelease(&'static str),

    /// A frame-available signal arrived while a previous one was unconsumed
    #[error("Frame-available signal received while a previous frame was still pending")]
    ProtocolViolation,

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl TranscodeError {
    /// Build an `ImageWrite` error for `path`
    pub fn image_write(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        TranscodeError::ImageWrite {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Build an `ImageDecode` error for `path`
    pub fn image_decode(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        TranscodeError::ImageDecode {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for TranscodeError {
    fn from(err: std::io::Error) -> Self {
        TranscodeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TranscodeError {
    fn from(err: serde_json::Error) -> Self {
        TranscodeError::Config(err.to_string())
    }
}

impl From<gstreamer::glib::Error> for TranscodeError {
    fn from(err: gstreamer::glib::Error) -> Self {
        TranscodeError::Encoder(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = TranscodeError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "0:1: syntax error".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to compile fragment shader: 0:1: syntax error"
        );

        let err = TranscodeError::Gpu {
            operation: "glDrawArrays".into(),
            code: 0x0502,
        };
        assert_eq!(err.to_string(), "GPU error after glDrawArrays: 0x0502");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(TranscodeError::from(io), TranscodeError::Io(_)));
    }
}
