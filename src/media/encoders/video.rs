// SPDX-License-Identifier: MPL-2.0

//! Hardware video encoders driven through GStreamer
//!
//! Each encoder runs as a small pipeline:
//!
//! ```text
//! appsrc (raw YUV) ! <hw encoder> ! <parser> ! capsfilter (au aligned) ! appsink
//! ```
//!
//! The session pushes converted frames into the appsrc and polls encoded
//! access units out of the appsink, which maps onto the input-slot /
//! output-buffer exchange of [`VideoEncoder`].

use crate::constants::encode;
use crate::errors::{TranscodeError, TranscodeResult};
use crate::media::codec::{
    BufferFlags, CodecInfo, EncodedBuffer, EncoderSettings, OutputFormat, OutputStatus,
    VideoEncoder,
};
use crate::media::formats::YuvLayout;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Video codecs the session can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264/AVC (best compatibility)
    H264,
    /// HEVC/H.265 (better compression)
    HEVC,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 2] = [VideoCodec::H264, VideoCodec::HEVC];

    /// Mime type used in configuration files
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "video/avc",
            VideoCodec::HEVC => "video/hevc",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.mime_type() == mime)
    }

    /// Parser element placed after the encoder
    pub fn parser_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264parse",
            VideoCodec::HEVC => "h265parse",
        }
    }

    /// Caps the parser output is constrained to, so every sample is one
    /// complete access unit in the form MP4 stores
    pub fn parsed_caps(&self) -> gst::Caps {
        match self {
            VideoCodec::H264 => gst::Caps::builder("video/x-h264")
                .field("stream-format", "avc")
                .field("alignment", "au")
                .build(),
            VideoCodec::HEVC => gst::Caps::builder("video/x-h265")
                .field("stream-format", "hvc1")
                .field("alignment", "au")
                .build(),
        }
    }

    /// File extension of the container the muxer writes
    pub fn file_extension(&self) -> &'static str {
        "mp4"
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "H.264"),
            VideoCodec::HEVC => write!(f, "H.265"),
        }
    }
}

/// A hardware encoder element the registry knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareEncoderSpec {
    pub element_name: &'static str,
    pub display_name: &'static str,
    pub codec: VideoCodec,
}

/// Hardware encoders in priority order; software encoders are never used
pub const HARDWARE_ENCODERS: &[HardwareEncoderSpec] = &[
    spec("vah264enc", "VA-API H.264", VideoCodec::H264),
    spec("vaapih264enc", "VA-API H.264 (legacy)", VideoCodec::H264),
    spec("nvh264enc", "NVIDIA H.264", VideoCodec::H264),
    spec("qsvh264enc", "Intel QSV H.264", VideoCodec::H264),
    spec("amfh264enc", "AMD AMF H.264", VideoCodec::H264),
    spec("v4l2h264enc", "V4L2 H.264", VideoCodec::H264),
    spec("vah265enc", "VA-API H.265", VideoCodec::HEVC),
    spec("vaapih265enc", "VA-API H.265 (legacy)", VideoCodec::HEVC),
    spec("nvh265enc", "NVIDIA H.265", VideoCodec::HEVC),
    spec("qsvh265enc", "Intel QSV H.265", VideoCodec::HEVC),
    spec("amfh265enc", "AMD AMF H.265", VideoCodec::HEVC),
    spec("v4l2h265enc", "V4L2 H.265", VideoCodec::HEVC),
];

const fn spec(
    element_name: &'static str,
    display_name: &'static str,
    codec: VideoCodec,
) -> HardwareEncoderSpec {
    HardwareEncoderSpec {
        element_name,
        display_name,
        codec,
    }
}

/// Look up the table entry for an element name
pub fn hardware_spec(element_name: &str) -> Option<&'static HardwareEncoderSpec> {
    HARDWARE_ENCODERS
        .iter()
        .find(|s| s.element_name == element_name)
}

/// Set an integer property if the element has it
///
/// Encoders disagree on the integer width of the same property, so the value
/// goes through the string parser, which converts to whatever type the
/// property declares.
fn set_number_if_present(element: &gst::Element, name: &str, value: u64) -> bool {
    if element.find_property(name).is_some() {
        element.set_property_from_str(name, &value.to_string());
        true
    } else {
        false
    }
}

fn set_enum_if_present(element: &gst::Element, name: &str, value: &str) -> bool {
    if element.find_property(name).is_some() {
        element.set_property_from_str(name, value);
        true
    } else {
        false
    }
}

/// Configure rate control and keyframe spacing for a hardware encoder
pub fn configure_video_encoder(
    encoder: &gst::Element,
    encoder_name: &str,
    settings: &EncoderSettings,
) {
    let bitrate_kbps = (settings.bit_rate / 1000).max(1) as u64;
    let gop = (settings.frame_rate as u64 * settings.i_frame_interval as u64).max(1);

    match encoder_name {
        // VA-API encoders (legacy gstreamer-vaapi plugin)
        "vaapih264enc" | "vaapih265enc" => {
            set_enum_if_present(encoder, "rate-control", "cbr");
            set_number_if_present(encoder, "bitrate", bitrate_kbps);
            set_number_if_present(encoder, "keyframe-period", gop);
            debug!(bitrate_kbps, gop, "Configured VA-API (legacy) encoder");
        }

        // VA-API encoders (new plugin)
        "vah264enc" | "vah265enc" => {
            set_enum_if_present(encoder, "rate-control", "cbr");
            set_number_if_present(encoder, "bitrate", bitrate_kbps);
            set_number_if_present(encoder, "key-int-max", gop);
            debug!(bitrate_kbps, gop, "Configured VA-API encoder");
        }

        "nvh264enc" | "nvh265enc" => {
            set_number_if_present(encoder, "bitrate", bitrate_kbps);
            set_enum_if_present(encoder, "rc-mode", "cbr");
            set_number_if_present(encoder, "gop-size", gop);
            debug!(bitrate_kbps, gop, "Configured NVIDIA encoder");
        }

        "qsvh264enc" | "qsvh265enc" => {
            set_number_if_present(encoder, "bitrate", bitrate_kbps);
            set_number_if_present(encoder, "gop-size", gop);
            debug!(bitrate_kbps, gop, "Configured Intel QSV encoder");
        }

        "amfh264enc" | "amfh265enc" => {
            set_number_if_present(encoder, "bitrate", bitrate_kbps);
            set_enum_if_present(encoder, "rate-control", "cbr");
            set_number_if_present(encoder, "gop-size", gop);
            debug!(bitrate_kbps, gop, "Configured AMD AMF encoder");
        }

        // V4L2 encoders take bitrate through extra-controls, if at all
        "v4l2h264enc" | "v4l2h265enc" => {
            debug!("Using V4L2 encoder with default configuration");
        }

        _ => {
            debug!(encoder = %encoder_name, "Unknown encoder type, using default configuration");
        }
    }
}

/// Appsrc back-pressure shared with the need-data/enough-data callbacks
#[derive(Debug, Default)]
struct InputGate {
    accepting: Mutex<bool>,
    changed: Condvar,
}

impl InputGate {
    fn set(&self, accepting: bool) {
        let mut guard = self
            .accepting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = accepting;
        self.changed.notify_all();
    }

    fn wait_accepting(&self, timeout: Duration) -> bool {
        let guard = self
            .accepting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |accepting| !*accepting)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard
    }
}

/// Raw input description matching the appsrc caps
///
/// GStreamer rounds plane rows up to 4 bytes, so for widths that are not a
/// multiple of 8 the buffers it expects are larger than a packed frame.
fn input_video_info(settings: &EncoderSettings) -> TranscodeResult<gst_video::VideoInfo> {
    let format = settings
        .layout
        .caps_format()
        .map(gst_video::VideoFormat::from_string)
        .filter(|f| *f != gst_video::VideoFormat::Unknown)
        .ok_or_else(|| {
            TranscodeError::EncoderInit(format!(
                "Layout {:?} has no raw caps format",
                settings.layout
            ))
        })?;

    gst_video::VideoInfo::builder(format, settings.width, settings.height)
        .fps(gst::Fraction::new(settings.frame_rate as i32, 1))
        .build()
        .map_err(|e| TranscodeError::EncoderInit(format!("Invalid input format: {}", e)))
}

/// Row length and row count of each plane of a packed frame
fn packed_planes(layout: YuvLayout, width: usize, height: usize) -> Option<Vec<(usize, usize)>> {
    match layout {
        YuvLayout::SemiPlanar => Some(vec![(width, height), (width, height / 2)]),
        YuvLayout::Planar => Some(vec![
            (width, height),
            (width / 2, height / 2),
            (width / 2, height / 2),
        ]),
        YuvLayout::PackedSemiPlanar | YuvLayout::PackedPlanar => None,
    }
}

/// Copy a packed frame into the plane offsets and strides of `info`
fn pad_to_video_info(
    data: &[u8],
    layout: YuvLayout,
    info: &gst_video::VideoInfo,
) -> TranscodeResult<Vec<u8>> {
    let planes = packed_planes(layout, info.width() as usize, info.height() as usize)
        .ok_or_else(|| TranscodeError::Encoder(format!("Cannot pad {:?} frames", layout)))?;

    let packed: usize = planes.iter().map(|(row, rows)| row * rows).sum();
    if data.len() != packed {
        return Err(TranscodeError::Encoder(format!(
            "Frame of {} bytes, expected {} for {}x{} {:?}",
            data.len(),
            packed,
            info.width(),
            info.height(),
            layout
        )));
    }

    let strides = info.stride();
    let offsets = info.offset();
    let mut padded = vec![0u8; info.size()];
    let mut src = 0;

    for (plane, &(row, rows)) in planes.iter().enumerate() {
        let (Some(&stride), Some(&offset)) = (strides.get(plane), offsets.get(plane)) else {
            return Err(TranscodeError::Encoder(format!(
                "{} has no plane {}",
                info.format(),
                plane
            )));
        };
        let stride = stride as usize;
        for y in 0..rows {
            let dst = offset + y * stride;
            let target = padded.get_mut(dst..dst + row).ok_or_else(|| {
                TranscodeError::Encoder(format!("Plane {} row {} out of bounds", plane, y))
            })?;
            target.copy_from_slice(&data[src..src + row]);
            src += row;
        }
    }

    Ok(padded)
}

/// A hardware encoder pipeline
pub struct GstVideoEncoder {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    appsink: gst_app::AppSink,
    gate: Arc<InputGate>,
    settings: EncoderSettings,
    input_info: gst_video::VideoInfo,
    frame_duration: gst::ClockTime,
    next_input_slot: usize,
    next_output_slot: usize,
    outstanding_output: Option<usize>,
    /// Sample pulled while reporting the format change, handed out next
    pending_sample: Option<gst::Sample>,
    format_reported: bool,
    eos_reported: bool,
    released: bool,
}

impl GstVideoEncoder {
    /// Build (but do not start) the encoder pipeline for `codec`
    pub fn new(codec: &CodecInfo, settings: &EncoderSettings) -> TranscodeResult<Self> {
        gst::init().map_err(|e| TranscodeError::EncoderInit(format!("GStreamer init: {}", e)))?;

        let video_codec = VideoCodec::from_mime(&settings.mime)
            .ok_or_else(|| TranscodeError::NoCodecFound(settings.mime.clone()))?;
        let input_info = input_video_info(settings)?;

        info!(
            encoder = %codec.name,
            codec = %video_codec,
            width = settings.width,
            height = settings.height,
            layout = ?settings.layout,
            "Creating hardware encoder pipeline"
        );

        let build_err = |what: &str, e: gst::glib::BoolError| {
            TranscodeError::EncoderInit(format!("Failed to create {}: {}", what, e))
        };

        let input_caps = input_info
            .to_caps()
            .map_err(|e| build_err("input caps", e))?;

        let frame_bytes = input_info.size() as u64;
        let appsrc = gst_app::AppSrc::builder()
            .caps(&input_caps)
            .format(gst::Format::Time)
            .is_live(false)
            .max_bytes(frame_bytes * encode::MAX_QUEUED_INPUT_FRAMES)
            .block(false)
            .build();

        let encoder = gst::ElementFactory::make(&codec.name)
            .build()
            .map_err(|e| build_err(&codec.name, e))?;
        configure_video_encoder(&encoder, &codec.name, settings);

        let parser = gst::ElementFactory::make(video_codec.parser_name())
            .build()
            .map_err(|e| build_err(video_codec.parser_name(), e))?;
        set_number_if_present(&parser, "config-interval", 0);

        let capsfilter = gst::ElementFactory::make("capsfilter")
            .property("caps", video_codec.parsed_caps())
            .build()
            .map_err(|e| build_err("capsfilter", e))?;

        let appsink = gst_app::AppSink::builder()
            .sync(false)
            .build();

        let pipeline = gst::Pipeline::new();
        pipeline
            .add_many([
                appsrc.upcast_ref::<gst::Element>(),
                &encoder,
                &parser,
                &capsfilter,
                appsink.upcast_ref::<gst::Element>(),
            ])
            .map_err(|e| TranscodeError::EncoderInit(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many([
            appsrc.upcast_ref::<gst::Element>(),
            &encoder,
            &parser,
            &capsfilter,
            appsink.upcast_ref::<gst::Element>(),
        ])
        .map_err(|e| TranscodeError::EncoderInit(format!("Failed to link encoder: {}", e)))?;

        let gate = Arc::new(InputGate::default());
        let need = Arc::clone(&gate);
        let enough = Arc::clone(&gate);
        appsrc.set_callbacks(
            gst_app::AppSrcCallbacks::builder()
                .need_data(move |_, _| need.set(true))
                .enough_data(move |_| enough.set(false))
                .build(),
        );

        let frame_duration = gst::ClockTime::from_nseconds(
            1_000_000_000 / settings.frame_rate.max(1) as u64,
        );

        Ok(Self {
            pipeline,
            appsrc,
            appsink,
            gate,
            settings: settings.clone(),
            input_info,
            frame_duration,
            next_input_slot: 0,
            next_output_slot: 0,
            outstanding_output: None,
            pending_sample: None,
            format_reported: false,
            eos_reported: false,
            released: false,
        })
    }

    fn ensure_live(&self) -> TranscodeResult<()> {
        if self.released {
            Err(TranscodeError::UseAfterRelease("GstVideoEncoder"))
        } else {
            Ok(())
        }
    }

    /// Surface an error posted on the bus since the last poll
    fn check_bus(&self) -> TranscodeResult<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(err) = msg.view() {
                return Err(TranscodeError::Encoder(format!(
                    "{} ({:?})",
                    err.error(),
                    err.debug()
                )));
            }
        }
        Ok(())
    }

    fn output_format(&self, sample: &gst::Sample) -> OutputFormat {
        let caps = sample.caps();
        let structure = caps.and_then(|c| c.structure(0));
        let width = structure
            .and_then(|s| s.get::<i32>("width").ok())
            .map(|w| w as u32)
            .unwrap_or(self.settings.width);
        let height = structure
            .and_then(|s| s.get::<i32>("height").ok())
            .map(|h| h as u32)
            .unwrap_or(self.settings.height);

        OutputFormat {
            mime: self.settings.mime.clone(),
            width,
            height,
            frame_rate: self.settings.frame_rate,
            max_input_size: encode::MAX_INPUT_SIZE,
            caps: caps.map(|c| c.to_string()),
        }
    }

    fn encoded_buffer(&mut self, sample: &gst::Sample) -> TranscodeResult<EncodedBuffer> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| TranscodeError::Encoder("Sample without buffer".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|e| TranscodeError::Encoder(format!("Failed to map buffer: {}", e)))?;

        let index = self.next_output_slot;
        self.next_output_slot += 1;
        self.outstanding_output = Some(index);

        let flags = buffer.flags();
        Ok(EncodedBuffer {
            index,
            data: map.as_slice().to_vec(),
            pts_us: buffer.pts().map(|t| t.useconds()).unwrap_or(0),
            dts_us: buffer.dts().map(|t| t.useconds()),
            flags: BufferFlags {
                key_frame: !flags.contains(gst::BufferFlags::DELTA_UNIT),
                // avc/hvc1 carry parameter sets in the caps, never in-band
                codec_config: false,
                end_of_stream: false,
            },
        })
    }
}

impl VideoEncoder for GstVideoEncoder {
    fn start(&mut self) -> TranscodeResult<()> {
        self.ensure_live()?;
        self.gate.set(true);
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| TranscodeError::EncoderInit(format!("Failed to start encoder: {}", e)))?;
        info!(layout = ?self.settings.layout, "Encoder pipeline playing");
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, timeout: Duration) -> TranscodeResult<Option<usize>> {
        self.ensure_live()?;
        self.check_bus()?;
        if !self.gate.wait_accepting(timeout) {
            return Ok(None);
        }
        let slot = self.next_input_slot % encode::MAX_QUEUED_INPUT_FRAMES as usize;
        self.next_input_slot += 1;
        Ok(Some(slot))
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        data: &[u8],
        pts_us: u64,
        end_of_stream: bool,
    ) -> TranscodeResult<()> {
        self.ensure_live()?;

        if !data.is_empty() {
            let padded = pad_to_video_info(data, self.settings.layout, &self.input_info)?;
            let mut buffer = gst::Buffer::from_slice(padded);
            if let Some(buffer) = buffer.get_mut() {
                buffer.set_pts(gst::ClockTime::from_useconds(pts_us));
                buffer.set_duration(self.frame_duration);
            }
            self.appsrc
                .push_buffer(buffer)
                .map_err(|e| TranscodeError::Encoder(format!("Input slot {}: {:?}", index, e)))?;
        }

        if end_of_stream {
            self.appsrc
                .end_of_stream()
                .map_err(|e| TranscodeError::Encoder(format!("End of stream: {:?}", e)))?;
            debug!("Queued end of stream");
        }
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> TranscodeResult<OutputStatus> {
        self.ensure_live()?;
        self.check_bus()?;

        if let Some(sample) = self.pending_sample.take() {
            return Ok(OutputStatus::Buffer(self.encoded_buffer(&sample)?));
        }

        let wait = gst::ClockTime::from_mseconds(timeout.as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(wait) else {
            if self.appsink.is_eos() && !self.eos_reported {
                self.eos_reported = true;
                let index = self.next_output_slot;
                self.next_output_slot += 1;
                return Ok(OutputStatus::Buffer(EncodedBuffer {
                    index,
                    data: Vec::new(),
                    pts_us: 0,
                    dts_us: None,
                    flags: BufferFlags {
                        end_of_stream: true,
                        ..BufferFlags::default()
                    },
                }));
            }
            return Ok(OutputStatus::TryAgainLater);
        };

        if !self.format_reported {
            self.format_reported = true;
            let format = self.output_format(&sample);
            self.pending_sample = Some(sample);
            return Ok(OutputStatus::FormatChanged(format));
        }

        Ok(OutputStatus::Buffer(self.encoded_buffer(&sample)?))
    }

    fn release_output_buffer(&mut self, index: usize) -> TranscodeResult<()> {
        self.ensure_live()?;
        match self.outstanding_output {
            Some(outstanding) if outstanding == index => {
                self.outstanding_output = None;
            }
            _ => debug!(index, "Released output slot that was not outstanding"),
        }
        Ok(())
    }

    fn stop(&mut self) -> TranscodeResult<()> {
        self.ensure_live()?;
        self.gate.set(false);
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| TranscodeError::Encoder(format!("Failed to stop encoder: {}", e)))?;
        debug!("Encoder pipeline stopped");
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.pending_sample = None;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to reset encoder pipeline on release");
        }
        debug!("Encoder released");
    }
}

impl Drop for GstVideoEncoder {
    fn drop(&mut self) {
        self.release();
    }
}
