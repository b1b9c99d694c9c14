// SPDX-License-Identifier: GPL-3.0-only

//! Hardware encode session
//!
//! Lifecycle:
//!
//! ```text
//! Idle --configure--> Configured --start--> Running --finish--> Completed
//!                                              |  \--cancel--> Cancelled
//!                                              \----error----> Failed
//! ```
//!
//! While running, every [`submit_frame`](HardwareEncodeSession::submit_frame)
//! converts one RGBA frame to the chosen YUV layout, tries once to hand it to
//! the encoder and then polls the encoder's output side once. The muxer is
//! started by the encoder's one-time format change, never before.
//!
//! Teardown runs exactly once from whichever terminal transition happens
//! first: encoder stop and release, then muxer stop (only if started) and
//! release. Cancelled or failed sessions leave no output file.

use super::encoder_selection::encoder_settings;
use crate::config::MediaConfig;
use crate::constants::encode;
use crate::errors::{TranscodeError, TranscodeResult};
use crate::events::{
    CancellationToken, EventSender, ProgressReporter, SessionOutcome, TranscodeEvent,
};
use crate::media::codec::{
    CodecInfo, CodecRegistry, EncoderSettings, Muxer, OutputStatus, SampleInfo, VideoEncoder,
};
use crate::media::formats::{YuvLayout, convert_rgb_to_yuv};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Presentation time of the frame at `index`, in microseconds
pub fn presentation_time_us(index: u64, frame_rate: u32) -> u64 {
    encode::BASE_PTS_OFFSET_US + index * 1_000_000 / frame_rate.max(1) as u64
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configured,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Configured => "configured",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// What happened to a submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSubmission {
    /// The frame is inside the encoder and was counted
    Queued,
    /// No input slot freed up in time; submit the same frame again
    Retry,
    /// Cancellation was observed and the session has torn down
    Cancelled,
}

/// One encode from RGBA frames to a single-track container
pub struct HardwareEncodeSession<R: CodecRegistry> {
    registry: R,
    state: SessionState,
    events: Option<EventSender>,
    cancel: Option<CancellationToken>,
    codec: Option<CodecInfo>,
    settings: Option<EncoderSettings>,
    encoder: Option<Box<dyn VideoEncoder>>,
    muxer: Option<Box<dyn Muxer>>,
    muxer_started: bool,
    track_index: Option<usize>,
    output_path: Option<PathBuf>,
    reporter: Option<ProgressReporter>,
    /// Frames accepted by the encoder; also the next frame's index
    frame_index: u64,
    total_frames: usize,
    samples_written: usize,
    torn_down: bool,
}

impl<R: CodecRegistry> HardwareEncodeSession<R> {
    pub fn new(registry: R, events: Option<EventSender>, cancel: CancellationToken) -> Self {
        Self {
            registry,
            state: SessionState::Idle,
            events,
            cancel: Some(cancel),
            codec: None,
            settings: None,
            encoder: None,
            muxer: None,
            muxer_started: false,
            track_index: None,
            output_path: None,
            reporter: None,
            frame_index: 0,
            total_frames: 0,
            samples_written: 0,
            torn_down: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Layout frames are converted to, once configured
    pub fn layout(&self) -> Option<YuvLayout> {
        self.settings.as_ref().map(|s| s.layout)
    }

    pub fn codec(&self) -> Option<&CodecInfo> {
        self.codec.as_ref()
    }

    /// Frames the caller announced at start
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn frames_queued(&self) -> u64 {
        self.frame_index
    }

    pub fn samples_written(&self) -> usize {
        self.samples_written
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Pick a hardware encoder and input layout for `width x height` frames
    ///
    /// # Returns
    /// * `Err(TranscodeError::NoCodecFound)` - No hardware encoder produces the mime type
    /// * `Err(TranscodeError::Config)` - The configuration is invalid
    pub fn configure(
        &mut self,
        config: &MediaConfig,
        width: u32,
        height: u32,
    ) -> TranscodeResult<()> {
        self.require("configure", SessionState::Idle)?;

        let result = config.validate().and_then(|_| {
            let codec = self
                .registry
                .find_encoder(&config.mime_type)
                .ok_or_else(|| TranscodeError::NoCodecFound(config.mime_type.clone()))?;
            let settings = encoder_settings(config, &codec, width, height)?;
            Ok((codec, settings))
        });

        match result {
            Ok((codec, settings)) => {
                info!(
                    encoder = %codec.name,
                    layout = ?settings.layout,
                    width,
                    height,
                    bit_rate = settings.bit_rate,
                    frame_rate = settings.frame_rate,
                    "Encode session configured"
                );
                self.codec = Some(codec);
                self.settings = Some(settings);
                self.state = SessionState::Configured;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Create and start the encoder, then create the muxer for `output_path`
    ///
    /// `total_frames` is the number of frames that will be submitted; progress
    /// percentages are relative to it.
    pub fn start(&mut self, output_path: &Path, total_frames: usize) -> TranscodeResult<()> {
        self.require("start", SessionState::Configured)?;
        let (Some(codec), Some(settings)) = (self.codec.clone(), self.settings.clone()) else {
            return Err(self.fail(TranscodeError::InvalidState {
                operation: "start",
                state: "unconfigured",
            }));
        };
        self.output_path = Some(output_path.to_path_buf());
        self.total_frames = total_frames;

        let mut encoder = match self.registry.create_encoder(&codec, &settings) {
            Ok(encoder) => encoder,
            Err(e) => return Err(self.fail(e)),
        };
        let started = encoder.start();
        self.encoder = Some(encoder);
        if let Err(e) = started {
            return Err(self.fail(e));
        }

        match self.registry.create_muxer(output_path) {
            Ok(muxer) => self.muxer = Some(muxer),
            Err(e) => return Err(self.fail(e)),
        }

        self.reporter = Some(ProgressReporter::new(
            self.events.clone(),
            output_path.to_path_buf(),
            total_frames,
        ));
        self.state = SessionState::Running;
        info!(path = %output_path.display(), total_frames, "Encode session running");
        Ok(())
    }

    /// Offer one frame to the encoder and poll its output once
    ///
    /// Returns [`FrameSubmission::Retry`] when no input slot freed up within
    /// the slot timeout; the caller submits the same frame again. Progress is
    /// only reported for queued frames.
    pub fn submit_frame(&mut self, frame: &RgbaImage) -> TranscodeResult<FrameSubmission> {
        self.require("submit_frame", SessionState::Running)?;
        if self.is_cancel_requested() {
            self.cancel_now();
            return Ok(FrameSubmission::Cancelled);
        }

        match self.submit_inner(frame) {
            Ok(submission) => Ok(submission),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn submit_inner(&mut self, frame: &RgbaImage) -> TranscodeResult<FrameSubmission> {
        let settings = self.running_settings()?;
        if frame.width() != settings.width || frame.height() != settings.height {
            return Err(TranscodeError::InvalidFrame(format!(
                "Frame is {}x{}, session encodes {}x{}",
                frame.width(),
                frame.height(),
                settings.width,
                settings.height
            )));
        }
        let (width, height, layout, frame_rate) = (
            settings.width,
            settings.height,
            settings.layout,
            settings.frame_rate,
        );

        let yuv = convert_rgb_to_yuv(frame.as_raw(), 4, width, height, layout)?;
        let pts_us = presentation_time_us(self.frame_index, frame_rate);

        let encoder = self.encoder_mut()?;
        let queued = match encoder.dequeue_input_buffer(encode::INPUT_SLOT_TIMEOUT)? {
            Some(slot) => {
                encoder.queue_input_buffer(slot, &yuv, pts_us, false)?;
                true
            }
            None => {
                debug!(frame = self.frame_index, "No input slot free, frame will be retried");
                false
            }
        };

        if queued {
            self.frame_index += 1;
        }

        let status = self
            .encoder_mut()?
            .dequeue_output_buffer(encode::OUTPUT_POLL_TIMEOUT)?;
        self.handle_output(status)?;

        if !queued {
            return Ok(FrameSubmission::Retry);
        }

        let consumed = self.frame_index as usize;
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.frame_consumed(consumed, Some(format!("Encoded frame {}", consumed)));
        }
        Ok(FrameSubmission::Queued)
    }

    /// Act on one output poll result
    ///
    /// Returns `true` once the encoder reports end of stream.
    fn handle_output(&mut self, status: OutputStatus) -> TranscodeResult<bool> {
        match status {
            OutputStatus::TryAgainLater => Ok(false),

            OutputStatus::FormatChanged(mut format) => {
                if self.muxer_started {
                    warn!("Encoder changed its output format after the muxer started, ignoring");
                    return Ok(false);
                }
                format.max_input_size = encode::MAX_INPUT_SIZE;
                info!(
                    mime = %format.mime,
                    width = format.width,
                    height = format.height,
                    "Encoder output format changed"
                );

                let muxer = self
                    .muxer
                    .as_mut()
                    .ok_or(TranscodeError::UseAfterRelease("Muxer"))?;
                let track = muxer.add_track(&format)?;
                muxer.start()?;
                self.track_index = Some(track);
                self.muxer_started = true;
                Ok(false)
            }

            OutputStatus::Unexpected(code) => {
                warn!(code, "Unexpected status from encoder output");
                Ok(false)
            }

            OutputStatus::Buffer(buffer) => {
                if buffer.flags.codec_config {
                    debug!("Skipping codec config buffer");
                } else if !buffer.data.is_empty() {
                    let Some(track) = self.track_index.filter(|_| self.muxer_started) else {
                        self.encoder_mut()?.release_output_buffer(buffer.index)?;
                        return Err(TranscodeError::MuxerNotStarted);
                    };
                    let muxer = self
                        .muxer
                        .as_mut()
                        .ok_or(TranscodeError::UseAfterRelease("Muxer"))?;
                    muxer.write_sample(
                        track,
                        &buffer.data,
                        SampleInfo {
                            pts_us: buffer.pts_us,
                            dts_us: buffer.dts_us,
                            key_frame: buffer.flags.key_frame,
                        },
                    )?;
                    self.samples_written += 1;
                }
                self.encoder_mut()?.release_output_buffer(buffer.index)?;
                Ok(buffer.flags.end_of_stream)
            }
        }
    }

    /// Drain the encoder and finalize the container
    ///
    /// Call after the last frame was queued. Emits the terminal `Complete`
    /// event on success.
    pub fn finish(&mut self) -> TranscodeResult<SessionOutcome> {
        self.require("finish", SessionState::Running)?;
        if self.is_cancel_requested() {
            self.cancel_now();
            return Ok(SessionOutcome::Cancelled);
        }

        if let Err(e) = self.drain() {
            return Err(self.fail(e));
        }
        if !self.muxer_started {
            return Err(self.fail(TranscodeError::Encoder(
                "Encoder produced no output format".into(),
            )));
        }

        self.state = SessionState::Completed;
        if let Err(e) = self.teardown() {
            self.state = SessionState::Failed;
            self.discard_output();
            self.emit_error(&e);
            self.clear_references();
            return Err(e);
        }

        info!(
            frames = self.frame_index,
            samples = self.samples_written,
            "Encode session completed"
        );
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.complete();
        }
        self.clear_references();
        Ok(SessionOutcome::Completed)
    }

    /// Queue end of stream and pull output until the encoder confirms it
    fn drain(&mut self) -> TranscodeResult<()> {
        let deadline = Instant::now() + encode::DRAIN_TIMEOUT;
        let frame_rate = self.running_settings()?.frame_rate;
        let eos_pts = presentation_time_us(self.frame_index, frame_rate);

        let mut eos_queued = false;
        while Instant::now() < deadline {
            if !eos_queued {
                let encoder = self.encoder_mut()?;
                if let Some(slot) = encoder.dequeue_input_buffer(encode::INPUT_SLOT_TIMEOUT)? {
                    encoder.queue_input_buffer(slot, &[], eos_pts, true)?;
                    eos_queued = true;
                    debug!("End of stream queued, draining encoder");
                }
            }

            let status = self
                .encoder_mut()?
                .dequeue_output_buffer(encode::OUTPUT_POLL_TIMEOUT)?;
            if self.handle_output(status)? {
                debug!(samples = self.samples_written, "Encoder drained");
                return Ok(());
            }
        }

        warn!(
            timeout = ?encode::DRAIN_TIMEOUT,
            "Encoder did not confirm end of stream, finalizing anyway"
        );
        Ok(())
    }

    /// Stop on request: tear down and discard the partial output
    ///
    /// No further progress is emitted. A no-op once the session is terminal.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.cancel_now();
        }
    }

    fn cancel_now(&mut self) {
        info!(frames = self.frame_index, "Encode session cancelled");
        self.state = SessionState::Cancelled;
        if let Err(e) = self.teardown() {
            debug!(error = %e, "Teardown after cancellation reported an error");
        }
        self.clear_references();
    }

    /// Move to `Failed`, tear down and report `err` on the event channel
    ///
    /// Used by drivers for failures outside the session, such as a frame
    /// file that cannot be decoded. Returns `err` for propagation.
    pub fn fail(&mut self, err: TranscodeError) -> TranscodeError {
        if self.state.is_terminal() {
            return err;
        }
        error!(error = %err, state = self.state.name(), "Encode session failed");
        self.state = SessionState::Failed;
        if let Err(e) = self.teardown() {
            debug!(error = %e, "Teardown after failure reported an error");
        }
        self.emit_error(&err);
        self.clear_references();
        err
    }

    /// Release encoder and muxer, in that order; runs at most once
    ///
    /// Returns the first stop error so completion can surface a container
    /// that failed to finalize. Every release step runs regardless.
    pub fn teardown(&mut self) -> TranscodeResult<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        let mut first_error = None;

        if let Some(mut encoder) = self.encoder.take() {
            if let Err(e) = encoder.stop() {
                warn!(error = %e, "Failed to stop encoder");
                first_error.get_or_insert(e);
            }
            encoder.release();
            debug!("Encoder released");
        }

        if let Some(mut muxer) = self.muxer.take() {
            if self.muxer_started
                && let Err(e) = muxer.stop()
            {
                warn!(error = %e, "Failed to stop muxer");
                first_error.get_or_insert(e);
            }
            muxer.release();
            debug!("Muxer released");
        }

        if matches!(self.state, SessionState::Cancelled | SessionState::Failed) || !self.muxer_started
        {
            self.discard_output();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn discard_output(&self) {
        let Some(path) = self.output_path.as_deref() else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "Discarded partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
        }
    }

    fn emit_error(&mut self, err: &TranscodeError) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.error(err.clone());
        } else if let Some(events) = &self.events
            && events.send(TranscodeEvent::Error(err.clone())).is_err()
        {
            debug!("Progress receiver dropped, error discarded");
        }
    }

    fn clear_references(&mut self) {
        self.cancel = None;
        self.reporter = None;
        self.events = None;
    }

    fn is_cancel_requested(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    fn require(&self, operation: &'static str, expected: SessionState) -> TranscodeResult<()> {
        if self.state.is_terminal() {
            return Err(TranscodeError::UseAfterRelease("HardwareEncodeSession"));
        }
        if self.state != expected {
            return Err(TranscodeError::InvalidState {
                operation,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    fn running_settings(&self) -> TranscodeResult<&EncoderSettings> {
        self.settings
            .as_ref()
            .ok_or(TranscodeError::UseAfterRelease("EncoderSettings"))
    }

    fn encoder_mut(&mut self) -> TranscodeResult<&mut Box<dyn VideoEncoder>> {
        self.encoder
            .as_mut()
            .ok_or(TranscodeError::UseAfterRelease("VideoEncoder"))
    }
}

impl<R: CodecRegistry> Drop for HardwareEncodeSession<R> {
    fn drop(&mut self) {
        if !self.state.is_terminal() && self.state != SessionState::Idle {
            debug!(state = self.state.name(), "Encode session dropped while active");
            self.cancel_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_times() {
        let pts: Vec<u64> = (0..3).map(|i| presentation_time_us(i, 30)).collect();
        assert_eq!(pts, vec![132, 33465, 66798]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert_eq!(SessionState::Configured.name(), "configured");
    }
}
