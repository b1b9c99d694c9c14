// SPDX-License-Identifier: MPL-2.0

//! MP4 muxing of encoded access units
//!
//! ```text
//! appsrc (encoded caps) ! mp4mux ! filesink
//! ```
//!
//! Nothing touches the filesystem until [`Muxer::start`]: the filesink opens
//! its file on the first state change, so a muxer that is created and then
//! released leaves no file behind.

use crate::constants::timing;
use crate::errors::{TranscodeError, TranscodeResult};
use crate::media::codec::{Muxer, OutputFormat, SampleInfo};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Single-track MP4 writer
pub struct GstMuxer {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    output_path: PathBuf,
    track_added: bool,
    started: bool,
    released: bool,
}

impl GstMuxer {
    /// Build the muxing pipeline for `output_path`
    pub fn new(output_path: &Path) -> TranscodeResult<Self> {
        gst::init().map_err(|e| TranscodeError::MuxerInit(format!("GStreamer init: {}", e)))?;
        info!(path = %output_path.display(), "Creating muxer");

        let location = output_path.to_str().ok_or_else(|| {
            TranscodeError::MuxerInit(format!("Non UTF-8 output path {}", output_path.display()))
        })?;

        let appsrc = gst_app::AppSrc::builder()
            .format(gst::Format::Time)
            .is_live(false)
            .build();

        let muxer = gst::ElementFactory::make("mp4mux")
            .build()
            .map_err(|e| TranscodeError::MuxerInit(format!("Failed to create mp4mux: {}", e)))?;

        // Non-streamable output gets duration and index written for seeking
        if muxer.has_property("streamable") {
            muxer.set_property("streamable", false);
        }

        let filesink = gst::ElementFactory::make("filesink")
            .property("location", location)
            .build()
            .map_err(|e| TranscodeError::MuxerInit(format!("Failed to create filesink: {}", e)))?;

        let pipeline = gst::Pipeline::new();
        pipeline
            .add_many([appsrc.upcast_ref::<gst::Element>(), &muxer, &filesink])
            .map_err(|e| TranscodeError::MuxerInit(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many([appsrc.upcast_ref::<gst::Element>(), &muxer, &filesink])
            .map_err(|e| TranscodeError::MuxerInit(format!("Failed to link muxer: {}", e)))?;

        debug!("Muxer and filesink created");
        Ok(Self {
            pipeline,
            appsrc,
            output_path: output_path.to_path_buf(),
            track_added: false,
            started: false,
            released: false,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn ensure_live(&self) -> TranscodeResult<()> {
        if self.released {
            Err(TranscodeError::UseAfterRelease("GstMuxer"))
        } else {
            Ok(())
        }
    }

    /// Block until the pipeline reports end-of-stream or an error
    fn wait_for_eos(&self, timeout: Duration) -> TranscodeResult<()> {
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| TranscodeError::Muxer("No bus on pipeline".into()))?;
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let Some(msg) =
                bus.timed_pop(gst::ClockTime::from_mseconds(timing::BUS_POLL_INTERVAL_MS))
            else {
                continue;
            };
            match msg.view() {
                gst::MessageView::Eos(_) => return Ok(()),
                gst::MessageView::Error(err) => {
                    return Err(TranscodeError::Muxer(format!(
                        "Finalizing failed: {}",
                        err.error()
                    )));
                }
                _ => {}
            }
        }
        Err(TranscodeError::Muxer(format!(
            "No end-of-stream within {:?}",
            timeout
        )))
    }
}

/// Decode timestamp for a sample, which mp4mux requires to be monotonic
fn decode_time(info: &SampleInfo) -> gst::ClockTime {
    gst::ClockTime::from_useconds(info.dts_us.unwrap_or(info.pts_us))
}

impl Muxer for GstMuxer {
    fn add_track(&mut self, format: &OutputFormat) -> TranscodeResult<usize> {
        self.ensure_live()?;
        if self.track_added || self.started {
            return Err(TranscodeError::InvalidState {
                operation: "add_track",
                state: if self.started { "started" } else { "track added" },
            });
        }

        let caps_str = format
            .caps
            .as_deref()
            .ok_or_else(|| TranscodeError::Muxer("Output format carries no caps".into()))?;
        let caps: gst::Caps = caps_str
            .parse()
            .map_err(|e| TranscodeError::Muxer(format!("Invalid caps {}: {}", caps_str, e)))?;
        self.appsrc.set_caps(Some(&caps));
        self.appsrc
            .set_property("max-bytes", format.max_input_size as u64 * 4);

        self.track_added = true;
        info!(
            mime = %format.mime,
            width = format.width,
            height = format.height,
            "Video track added"
        );
        Ok(0)
    }

    fn start(&mut self) -> TranscodeResult<()> {
        self.ensure_live()?;
        if !self.track_added {
            return Err(TranscodeError::InvalidState {
                operation: "start",
                state: "no track",
            });
        }
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| TranscodeError::MuxerInit(format!("Failed to start muxer: {}", e)))?;
        self.started = true;
        info!(path = %self.output_path.display(), "Muxer started");
        Ok(())
    }

    fn write_sample(
        &mut self,
        track: usize,
        data: &[u8],
        info: SampleInfo,
    ) -> TranscodeResult<()> {
        self.ensure_live()?;
        if !self.started {
            return Err(TranscodeError::MuxerNotStarted);
        }
        if track != 0 {
            return Err(TranscodeError::Muxer(format!("Unknown track {}", track)));
        }

        let mut buffer = gst::Buffer::from_slice(data.to_vec());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_useconds(info.pts_us));
            buffer.set_dts(decode_time(&info));
            if !info.key_frame {
                buffer.set_flags(gst::BufferFlags::DELTA_UNIT);
            }
        }
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| TranscodeError::Muxer(format!("Failed to write sample: {:?}", e)))?;
        Ok(())
    }

    fn stop(&mut self) -> TranscodeResult<()> {
        self.ensure_live()?;
        if !self.started {
            return Err(TranscodeError::MuxerNotStarted);
        }
        self.started = false;

        let finalized = self
            .appsrc
            .end_of_stream()
            .map_err(|e| TranscodeError::Muxer(format!("Failed to send end of stream: {:?}", e)))
            .and_then(|_| self.wait_for_eos(Duration::from_secs(timing::STOP_TIMEOUT_SECS)));

        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to stop muxer pipeline");
        }
        finalized?;
        info!(path = %self.output_path.display(), "Container finalized");
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to reset muxer pipeline on release");
        }
        debug!("Muxer released");
    }
}

impl Drop for GstMuxer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_time_prefers_encoder_dts() {
        let reordered = SampleInfo {
            pts_us: 100_132,
            dts_us: Some(33_465),
            key_frame: false,
        };
        assert_eq!(decode_time(&reordered), gst::ClockTime::from_useconds(33_465));

        let in_order = SampleInfo {
            pts_us: 66_798,
            dts_us: None,
            key_frame: true,
        };
        assert_eq!(decode_time(&in_order), gst::ClockTime::from_useconds(66_798));
    }
}
