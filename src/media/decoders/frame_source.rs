// SPDX-License-Identifier: GPL-3.0-only

//! Decoded video frames delivered to the render surface
//!
//! A paused GStreamer pipeline decodes the input and scales it to the
//! surface size in RGBA:
//!
//! ```text
//! uridecodebin ! videoconvert ! videoscale ! video/x-raw,format=RGBA,WxH ! appsink
//! ```
//!
//! Each accurate flushing seek makes the appsink preroll exactly one new
//! frame. The preroll callback runs on GStreamer's streaming thread; it parks
//! the sample and signals the shared [`FrameSync`]. The render thread later
//! uploads the parked sample into a `GL_TEXTURE_2D`.

use crate::constants::timing;
use crate::errors::{TranscodeError, TranscodeResult};
use crate::gpu::frame_source::{
    ExternalFrameSource, FLIP_Y, Mat4, SeekableFrameSource, TextureTarget,
};
use crate::gpu::frame_sync::FrameSync;
use crate::gpu::gl::{GlApi, consts};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type ParkedSample = Arc<Mutex<Option<gst::Sample>>>;

/// Frame source backed by a paused GStreamer decode pipeline
pub struct GstFrameSource {
    pipeline: gst::Pipeline,
    parked: ParkedSample,
    frame_sync: Arc<FrameSync>,
    width: u32,
    height: u32,
}

impl GstFrameSource {
    /// Open `path` and preroll the first frame at `width x height`
    pub fn open(path: &Path, width: u32, height: u32) -> TranscodeResult<Self> {
        gst::init().map_err(|e| TranscodeError::Decoder(format!("GStreamer init failed: {}", e)))?;

        let absolute = std::fs::canonicalize(path)?;
        let uri = gst::glib::filename_to_uri(&absolute, None)
            .map_err(|e| TranscodeError::Decoder(format!("Invalid input path: {}", e)))?;

        let pipeline_str = format!(
            "uridecodebin uri=\"{}\" ! videoconvert ! videoscale ! \
             video/x-raw,format=RGBA,width={},height={},pixel-aspect-ratio=1/1 ! \
             appsink name=sink sync=false max-buffers=1",
            uri, width, height
        );
        debug!(pipeline = %pipeline_str, "Creating decode pipeline");

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| TranscodeError::Decoder(format!("Failed to create pipeline: {}", e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| TranscodeError::Decoder("Failed to downcast to Pipeline".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| TranscodeError::Decoder("Failed to find appsink".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| TranscodeError::Decoder("Failed to downcast to AppSink".into()))?;

        let parked: ParkedSample = Arc::new(Mutex::new(None));
        let frame_sync = Arc::new(FrameSync::new());
        install_callbacks(&appsink, Arc::clone(&parked), Arc::clone(&frame_sync));

        pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| TranscodeError::Decoder(format!("Failed to pause pipeline: {:?}", e)))?;

        let source = Self {
            pipeline,
            parked,
            frame_sync,
            width,
            height,
        };
        source.wait_for_async_done(Duration::from_secs(timing::START_TIMEOUT_SECS))?;

        info!(path = %path.display(), width, height, "Decode pipeline prerolled");
        Ok(source)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Stream duration, once the pipeline has prerolled
    pub fn duration(&self) -> Option<Duration> {
        self.pipeline
            .query_duration::<gst::ClockTime>()
            .map(|d| Duration::from_nanos(d.nseconds()))
    }

    fn wait_for_async_done(&self, timeout: Duration) -> TranscodeResult<()> {
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| TranscodeError::Decoder("No bus on pipeline".into()))?;
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            let Some(msg) =
                bus.timed_pop(gst::ClockTime::from_mseconds(timing::BUS_POLL_INTERVAL_MS))
            else {
                continue;
            };
            match msg.view() {
                gst::MessageView::Error(err) => {
                    return Err(TranscodeError::Decoder(format!(
                        "Pipeline error: {}",
                        err.error()
                    )));
                }
                gst::MessageView::AsyncDone(_) => return Ok(()),
                _ => {}
            }
        }
        Err(TranscodeError::Decoder(format!(
            "Pipeline did not preroll within {:?}",
            timeout
        )))
    }

    /// Fail if the decoder posted an error since the last check
    fn check_bus(&self) -> TranscodeResult<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error])
            && let gst::MessageView::Error(err) = msg.view()
        {
            return Err(TranscodeError::Decoder(err.error().to_string()));
        }
        Ok(())
    }
}

fn install_callbacks(appsink: &gst_app::AppSink, parked: ParkedSample, frame_sync: Arc<FrameSync>) {
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_preroll(move |sink| {
                let sample = sink.pull_preroll().map_err(|_| gst::FlowError::Eos)?;
                *parked.lock().unwrap_or_else(|p| p.into_inner()) = Some(sample);
                if let Err(e) = frame_sync.signal() {
                    warn!(error = %e, "Decoder signalled a frame before the last was consumed");
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
}

impl ExternalFrameSource for GstFrameSource {
    fn texture_target(&self) -> TextureTarget {
        TextureTarget::Texture2d
    }

    fn frame_sync(&self) -> Arc<FrameSync> {
        Arc::clone(&self.frame_sync)
    }

    fn update_tex_image<G: GlApi>(&mut self, gl: &G, _texture: G::Texture) -> TranscodeResult<()> {
        let sample = self
            .parked
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .ok_or_else(|| TranscodeError::Decoder("No decoded frame parked".into()))?;

        let caps = sample
            .caps()
            .ok_or_else(|| TranscodeError::Decoder("Sample without caps".into()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| TranscodeError::Decoder(format!("Bad sample caps: {}", e)))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| TranscodeError::Decoder("Sample without buffer".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|e| TranscodeError::Decoder(format!("Failed to map buffer: {}", e)))?;

        let width = info.width() as usize;
        let height = info.height() as usize;
        let stride = info.stride()[0] as usize;
        let pixels = tightly_packed_rgba(map.as_slice(), width, height, stride)?;

        gl.tex_image_rgba(consts::TEXTURE_2D, width as i32, height as i32, &pixels);
        Ok(())
    }

    fn transform_matrix(&self) -> Mat4 {
        // Uploaded rows are top-down, GL samples bottom-up
        FLIP_Y
    }
}

impl SeekableFrameSource for GstFrameSource {
    fn request_frame(&mut self, timestamp: Duration) -> TranscodeResult<()> {
        self.check_bus()?;
        self.frame_sync.reset();
        self.parked.lock().unwrap_or_else(|p| p.into_inner()).take();

        let position = gst::ClockTime::from_nseconds(timestamp.as_nanos() as u64);
        self.pipeline
            .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE, position)
            .map_err(|e| TranscodeError::Decoder(format!("Seek to {:?} failed: {}", timestamp, e)))?;
        debug!(?timestamp, "Requested frame");
        Ok(())
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = ?e, "Failed to stop decode pipeline");
        }
    }
}

/// Drop row padding so rows are exactly `width * 4` bytes
fn tightly_packed_rgba(
    data: &[u8],
    width: usize,
    height: usize,
    stride: usize,
) -> TranscodeResult<Cow<'_, [u8]>> {
    let row = width * 4;
    if stride < row || data.len() < stride * (height.saturating_sub(1)) + row {
        return Err(TranscodeError::Decoder(format!(
            "Frame of {} bytes too small for {}x{} RGBA with stride {}",
            data.len(),
            width,
            height,
            stride
        )));
    }
    if stride == row {
        return Ok(Cow::Borrowed(&data[..row * height]));
    }
    let mut packed = Vec::with_capacity(row * height);
    for y in 0..height {
        packed.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    Ok(Cow::Owned(packed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_rows_are_borrowed() {
        let data = vec![7u8; 2 * 2 * 4];
        let packed = tightly_packed_rgba(&data, 2, 2, 8).unwrap();
        assert!(matches!(packed, Cow::Borrowed(_)));
        assert_eq!(packed.len(), 16);
    }

    #[test]
    fn test_padded_rows_are_repacked() {
        // 1x2 image, stride 8: each row has 4 pixel bytes then 4 padding bytes
        let data = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8];
        let packed = tightly_packed_rgba(&data, 1, 2, 8).unwrap();
        assert_eq!(&*packed, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_short_frame_is_rejected() {
        assert!(tightly_packed_rgba(&[0u8; 10], 2, 2, 8).is_err());
    }
}
