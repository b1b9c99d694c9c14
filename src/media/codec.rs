// SPDX-License-Identifier: GPL-3.0-only

//! Hardware encoder and container multiplexer interfaces
//!
//! The encode session drives an encoder through an asynchronous
//! buffer-exchange protocol:
//!
//! 1. acquire an input slot with a bounded wait, fill it, queue it with a
//!    presentation timestamp
//! 2. poll the output side, which reports "try again", a one-time
//!    "format changed" carrying the final stream format, or an encoded buffer
//! 3. hand encoded buffers to the muxer and release them back to the encoder
//!
//! The GStreamer implementations live in [`crate::media::encoders`] and
//! [`crate::pipelines::video::muxer`].

use crate::errors::TranscodeResult;
use crate::media::formats::YuvLayout;
use std::path::Path;
use std::time::Duration;

/// A hardware encoder that can produce a given mime type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    /// Backend-specific encoder name
    pub name: String,
    /// Output mime type, e.g. `video/avc`
    pub mime: String,
    /// Raw input layouts the encoder advertises, in the encoder's own order
    pub color_formats: Vec<YuvLayout>,
    pub is_hardware: bool,
}

/// Settings an encoder is configured with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    /// Bits per second
    pub bit_rate: u32,
    pub frame_rate: u32,
    /// Seconds between keyframes
    pub i_frame_interval: u32,
    /// Raw layout the session converts frames into
    pub layout: YuvLayout,
}

/// Final stream format reported once by the encoder before any data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Largest sample the muxer must accept
    pub max_input_size: u32,
    /// Serialized backend caps, when the backend negotiates them
    pub caps: Option<String>,
}

/// Flags attached to an encoded buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    pub key_frame: bool,
    /// Stream headers already carried by the output format
    pub codec_config: bool,
    pub end_of_stream: bool,
}

/// One encoded buffer on loan from the encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBuffer {
    /// Slot to return with [`VideoEncoder::release_output_buffer`]
    pub index: usize,
    pub data: Vec<u8>,
    pub pts_us: u64,
    /// Decode time; differs from `pts_us` once frames are reordered
    pub dts_us: Option<u64>,
    pub flags: BufferFlags,
}

/// Result of one output poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputStatus {
    /// Nothing ready within the poll timeout
    TryAgainLater,
    /// The output format is final; register the track now
    FormatChanged(OutputFormat),
    /// Encoded data (possibly empty, possibly end-of-stream)
    Buffer(EncodedBuffer),
    /// Backend-specific status the session does not understand
    Unexpected(i32),
}

/// Timing and flags for one container sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    pub pts_us: u64,
    /// Falls back to `pts_us` when the encoder reports none
    pub dts_us: Option<u64>,
    pub key_frame: bool,
}

/// A running hardware encoder
pub trait VideoEncoder: Send {
    /// Begin accepting input
    fn start(&mut self) -> TranscodeResult<()>;

    /// Wait up to `timeout` for a free input slot
    ///
    /// `Ok(None)` means no slot became free; the caller retries later.
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> TranscodeResult<Option<usize>>;

    /// Fill slot `index` with one raw frame (or an empty end-of-stream marker)
    fn queue_input_buffer(
        &mut self,
        index: usize,
        data: &[u8],
        pts_us: u64,
        end_of_stream: bool,
    ) -> TranscodeResult<()>;

    /// Poll the output side once, waiting up to `timeout`
    fn dequeue_output_buffer(&mut self, timeout: Duration) -> TranscodeResult<OutputStatus>;

    /// Return an output slot after its data was consumed
    fn release_output_buffer(&mut self, index: usize) -> TranscodeResult<()>;

    fn stop(&mut self) -> TranscodeResult<()>;

    /// Free all encoder resources; the encoder is unusable afterwards
    fn release(&mut self);
}

/// A container writer with one video track
pub trait Muxer: Send {
    /// Register the track described by `format`, returning its index
    fn add_track(&mut self, format: &OutputFormat) -> TranscodeResult<usize>;

    /// Open the output; no samples may be written before this
    fn start(&mut self) -> TranscodeResult<()>;

    fn write_sample(&mut self, track: usize, data: &[u8], info: SampleInfo)
    -> TranscodeResult<()>;

    /// Finalize the container
    fn stop(&mut self) -> TranscodeResult<()>;

    fn release(&mut self);
}

/// Discovery and construction of encoders and muxers
pub trait CodecRegistry: Send {
    /// First hardware encoder producing `mime`, if any
    fn find_encoder(&self, mime: &str) -> Option<CodecInfo>;

    /// Create and configure an encoder; it is started by the caller
    fn create_encoder(
        &self,
        codec: &CodecInfo,
        settings: &EncoderSettings,
    ) -> TranscodeResult<Box<dyn VideoEncoder>>;

    /// Create a muxer writing to `output_path`
    fn create_muxer(&self, output_path: &Path) -> TranscodeResult<Box<dyn Muxer>>;
}
