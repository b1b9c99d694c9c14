// SPDX-License-Identifier: GPL-3.0-only

//! Hardware encode session scenarios against a scripted encoder and muxer

use frame_transcoder::config::MediaConfig;
use frame_transcoder::errors::{TranscodeError, TranscodeResult};
use frame_transcoder::events::{
    CancellationToken, EventReceiver, SessionOutcome, TranscodeEvent, event_channel,
};
use frame_transcoder::media::codec::{
    BufferFlags, CodecInfo, CodecRegistry, EncodedBuffer, EncoderSettings, Muxer, OutputFormat,
    OutputStatus, SampleInfo, VideoEncoder,
};
use frame_transcoder::media::formats::{YuvLayout, yuv420_frame_size};
use frame_transcoder::pipelines::video::{
    FrameSubmission, HardwareEncodeSession, SessionState, encode_frames,
};
use image::{Rgba, RgbaImage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything the fakes observed, shared with the test body
#[derive(Default)]
struct Record {
    settings: Option<EncoderSettings>,
    queued_pts: Vec<u64>,
    input_sizes: Vec<usize>,
    eos_queued: bool,
    tracks: Vec<OutputFormat>,
    samples: Vec<SampleInfo>,
    /// Teardown calls in the order they happened
    calls: Vec<&'static str>,
    muxer_created: bool,
}

type Shared = Arc<Mutex<Record>>;

fn count(record: &Shared, call: &str) -> usize {
    record.lock().unwrap().calls.iter().filter(|c| **c == call).count()
}

#[derive(Clone)]
struct FakeRegistry {
    record: Shared,
    codec: Option<CodecInfo>,
    fail_encoder_start: bool,
    fail_muxer_stop: bool,
    /// Input slot requests answered with "no slot" before slots free up
    input_timeouts: usize,
}

impl FakeRegistry {
    fn new() -> Self {
        Self {
            record: Shared::default(),
            codec: Some(CodecInfo {
                name: "fakeh264enc".into(),
                mime: "video/avc".into(),
                color_formats: vec![YuvLayout::Planar, YuvLayout::SemiPlanar],
                is_hardware: true,
            }),
            fail_encoder_start: false,
            fail_muxer_stop: false,
            input_timeouts: 0,
        }
    }
}

impl CodecRegistry for FakeRegistry {
    fn find_encoder(&self, mime: &str) -> Option<CodecInfo> {
        self.codec.clone().filter(|c| c.mime == mime)
    }

    fn create_encoder(
        &self,
        _codec: &CodecInfo,
        settings: &EncoderSettings,
    ) -> TranscodeResult<Box<dyn VideoEncoder>> {
        self.record.lock().unwrap().settings = Some(settings.clone());
        Ok(Box::new(FakeEncoder {
            record: Arc::clone(&self.record),
            settings: settings.clone(),
            fail_start: self.fail_encoder_start,
            input_timeouts: self.input_timeouts,
            format_sent: false,
            output: VecDeque::new(),
            next_slot: 0,
        }))
    }

    fn create_muxer(&self, output_path: &Path) -> TranscodeResult<Box<dyn Muxer>> {
        self.record.lock().unwrap().muxer_created = true;
        Ok(Box::new(FakeMuxer {
            record: Arc::clone(&self.record),
            path: output_path.to_path_buf(),
            fail_stop: self.fail_muxer_stop,
        }))
    }
}

/// Encodes each queued frame into one output buffer, announcing the format first
struct FakeEncoder {
    record: Shared,
    settings: EncoderSettings,
    fail_start: bool,
    input_timeouts: usize,
    format_sent: bool,
    output: VecDeque<OutputStatus>,
    next_slot: usize,
}

impl VideoEncoder for FakeEncoder {
    fn start(&mut self) -> TranscodeResult<()> {
        if self.fail_start {
            return Err(TranscodeError::EncoderInit("device busy".into()));
        }
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> TranscodeResult<Option<usize>> {
        if self.input_timeouts > 0 {
            self.input_timeouts -= 1;
            return Ok(None);
        }
        self.next_slot += 1;
        Ok(Some(self.next_slot % 4))
    }

    fn queue_input_buffer(
        &mut self,
        _index: usize,
        data: &[u8],
        pts_us: u64,
        end_of_stream: bool,
    ) -> TranscodeResult<()> {
        let mut record = self.record.lock().unwrap();
        if end_of_stream {
            record.eos_queued = true;
            self.output.push_back(OutputStatus::Buffer(EncodedBuffer {
                index: 0,
                data: Vec::new(),
                pts_us,
                dts_us: None,
                flags: BufferFlags {
                    end_of_stream: true,
                    ..BufferFlags::default()
                },
            }));
            return Ok(());
        }

        record.queued_pts.push(pts_us);
        record.input_sizes.push(data.len());
        if !self.format_sent {
            self.format_sent = true;
            self.output.push_back(OutputStatus::FormatChanged(OutputFormat {
                mime: self.settings.mime.clone(),
                width: self.settings.width,
                height: self.settings.height,
                frame_rate: self.settings.frame_rate,
                max_input_size: 0,
                caps: None,
            }));
        }
        self.output.push_back(OutputStatus::Buffer(EncodedBuffer {
            index: record.queued_pts.len(),
            data: vec![0xAB; 16],
            pts_us,
            // Decode order runs one frame ahead, as with B-frames
            dts_us: Some(pts_us.saturating_sub(33_333)),
            flags: BufferFlags {
                key_frame: record.queued_pts.len() == 1,
                ..BufferFlags::default()
            },
        }));
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> TranscodeResult<OutputStatus> {
        Ok(self.output.pop_front().unwrap_or(OutputStatus::TryAgainLater))
    }

    fn release_output_buffer(&mut self, _index: usize) -> TranscodeResult<()> {
        Ok(())
    }

    fn stop(&mut self) -> TranscodeResult<()> {
        self.record.lock().unwrap().calls.push("encoder.stop");
        Ok(())
    }

    fn release(&mut self) {
        self.record.lock().unwrap().calls.push("encoder.release");
    }
}

/// Writes an empty file on start, like a container that has opened its output
struct FakeMuxer {
    record: Shared,
    path: PathBuf,
    fail_stop: bool,
}

impl Muxer for FakeMuxer {
    fn add_track(&mut self, format: &OutputFormat) -> TranscodeResult<usize> {
        self.record.lock().unwrap().tracks.push(format.clone());
        Ok(0)
    }

    fn start(&mut self) -> TranscodeResult<()> {
        std::fs::write(&self.path, b"")?;
        self.record.lock().unwrap().calls.push("muxer.start");
        Ok(())
    }

    fn write_sample(&mut self, track: usize, data: &[u8], info: SampleInfo) -> TranscodeResult<()> {
        assert_eq!(track, 0);
        assert!(!data.is_empty());
        self.record.lock().unwrap().samples.push(info);
        Ok(())
    }

    fn stop(&mut self) -> TranscodeResult<()> {
        self.record.lock().unwrap().calls.push("muxer.stop");
        if self.fail_stop {
            return Err(TranscodeError::Muxer("finalize failed".into()));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.record.lock().unwrap().calls.push("muxer.release");
    }
}

fn config() -> MediaConfig {
    MediaConfig {
        mime_type: "video/avc".into(),
        bit_rate: 1_000_000,
        frame_rate: 30,
        i_frame_interval: 1,
    }
}

fn frame(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([200, 40, 90, 255]))
}

fn drain_events(receiver: &mut EventReceiver) -> Vec<TranscodeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_three_frames_end_to_end() {
    let registry = FakeRegistry::new();
    let record = Arc::clone(&registry.record);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let (events, mut receiver) = event_channel();

    let mut session = HardwareEncodeSession::new(registry, Some(events), CancellationToken::new());
    session.configure(&config(), 64, 64).unwrap();
    assert_eq!(session.layout(), Some(YuvLayout::SemiPlanar));
    session.start(&output, 3).unwrap();

    for _ in 0..3 {
        assert_eq!(
            session.submit_frame(&frame(64, 64)).unwrap(),
            FrameSubmission::Queued
        );
    }
    assert_eq!(session.finish().unwrap(), SessionOutcome::Completed);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.samples_written(), 3);

    let record = record.lock().unwrap();
    assert_eq!(record.queued_pts, vec![132, 33465, 66798]);
    assert!(record.input_sizes.iter().all(|&n| n == yuv420_frame_size(64, 64)));
    assert!(record.eos_queued);
    assert_eq!(record.tracks.len(), 1);
    assert_eq!(record.tracks[0].mime, "video/avc");
    assert!(record.tracks[0].max_input_size > 0);
    let sample_pts: Vec<u64> = record.samples.iter().map(|s| s.pts_us).collect();
    assert_eq!(sample_pts, vec![132, 33465, 66798]);
    let sample_dts: Vec<Option<u64>> = record.samples.iter().map(|s| s.dts_us).collect();
    assert_eq!(sample_dts, vec![Some(0), Some(132), Some(33465)]);
    assert!(record.samples[0].key_frame);
    assert_eq!(
        record.calls,
        vec![
            "muxer.start",
            "encoder.stop",
            "encoder.release",
            "muxer.stop",
            "muxer.release"
        ]
    );
    let settings = record.settings.as_ref().unwrap();
    assert_eq!(settings.bit_rate, 1_000_000);
    assert_eq!(settings.i_frame_interval, 1);
    drop(record);

    assert!(output.exists());
    let events = drain_events(&mut receiver);
    assert!(matches!(events.last(), Some(TranscodeEvent::Complete(p)) if p.percent == 100));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[test]
fn test_progress_is_monotonic() {
    let registry = FakeRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let (events, mut receiver) = event_channel();

    let mut session = HardwareEncodeSession::new(registry, Some(events), CancellationToken::new());
    session.configure(&config(), 16, 16).unwrap();
    session.start(&dir.path().join("out.mp4"), 7).unwrap();
    for _ in 0..7 {
        session.submit_frame(&frame(16, 16)).unwrap();
    }
    session.finish().unwrap();

    let percents: Vec<u8> = drain_events(&mut receiver)
        .into_iter()
        .filter_map(|e| match e {
            TranscodeEvent::Progress(p) => Some(p.percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.len(), 7);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
}

#[test]
fn test_cancel_after_two_frames_discards_output() {
    let registry = FakeRegistry::new();
    let record = Arc::clone(&registry.record);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let cancel = CancellationToken::new();
    let (events, mut receiver) = event_channel();

    let mut session = HardwareEncodeSession::new(registry, Some(events), cancel.clone());
    session.configure(&config(), 32, 32).unwrap();
    session.start(&output, 10).unwrap();
    for _ in 0..2 {
        session.submit_frame(&frame(32, 32)).unwrap();
    }
    assert!(output.exists());

    cancel.cancel();
    assert_eq!(
        session.submit_frame(&frame(32, 32)).unwrap(),
        FrameSubmission::Cancelled
    );
    assert_eq!(session.state(), SessionState::Cancelled);

    // Teardown is idempotent
    session.cancel();
    session.teardown().unwrap();
    assert!(matches!(
        session.submit_frame(&frame(32, 32)),
        Err(TranscodeError::UseAfterRelease(_))
    ));
    drop(session);

    assert_eq!(count(&record, "encoder.release"), 1);
    assert_eq!(count(&record, "muxer.release"), 1);
    assert!(!output.exists());

    let events = drain_events(&mut receiver);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| !e.is_terminal()));
}

#[test]
fn test_missing_encoder_fails_configure() {
    let mut registry = FakeRegistry::new();
    registry.codec = None;
    let record = Arc::clone(&registry.record);
    let (events, mut receiver) = event_channel();

    let mut session = HardwareEncodeSession::new(registry, Some(events), CancellationToken::new());
    let result = session.configure(&config(), 64, 64);

    assert!(matches!(result, Err(TranscodeError::NoCodecFound(ref m)) if m == "video/avc"));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(record.lock().unwrap().settings.is_none());
    assert!(matches!(
        receiver.try_recv(),
        Ok(TranscodeEvent::Error(TranscodeError::NoCodecFound(_)))
    ));
}

#[test]
fn test_encoder_start_failure_leaves_no_file() {
    let mut registry = FakeRegistry::new();
    registry.fail_encoder_start = true;
    let record = Arc::clone(&registry.record);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");

    let mut session = HardwareEncodeSession::new(registry, None, CancellationToken::new());
    session.configure(&config(), 64, 64).unwrap();
    let result = session.start(&output, 3);

    assert!(matches!(result, Err(TranscodeError::EncoderInit(_))));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!output.exists());
    let record = record.lock().unwrap();
    assert!(!record.muxer_created);
    assert_eq!(record.calls, vec!["encoder.stop", "encoder.release"]);
}

#[test]
fn test_input_timeouts_retry_without_progress() {
    let mut registry = FakeRegistry::new();
    registry.input_timeouts = 2;
    let record = Arc::clone(&registry.record);
    let dir = tempfile::tempdir().unwrap();
    let (events, mut receiver) = event_channel();

    let mut session = HardwareEncodeSession::new(registry, Some(events), CancellationToken::new());
    session.configure(&config(), 16, 16).unwrap();
    session.start(&dir.path().join("out.mp4"), 1).unwrap();

    let image = frame(16, 16);
    assert_eq!(session.submit_frame(&image).unwrap(), FrameSubmission::Retry);
    assert_eq!(session.submit_frame(&image).unwrap(), FrameSubmission::Retry);
    assert!(drain_events(&mut receiver).is_empty());

    assert_eq!(session.submit_frame(&image).unwrap(), FrameSubmission::Queued);
    assert_eq!(session.frames_queued(), 1);
    assert_eq!(record.lock().unwrap().queued_pts, vec![132]);
    assert_eq!(drain_events(&mut receiver).len(), 1);
}

#[test]
fn test_wrong_frame_size_fails_session() {
    let registry = FakeRegistry::new();
    let record = Arc::clone(&registry.record);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");

    let mut session = HardwareEncodeSession::new(registry, None, CancellationToken::new());
    session.configure(&config(), 32, 32).unwrap();
    session.start(&output, 2).unwrap();
    session.submit_frame(&frame(32, 32)).unwrap();

    let result = session.submit_frame(&frame(64, 32));
    assert!(matches!(result, Err(TranscodeError::InvalidFrame(_))));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!output.exists());
    assert_eq!(count(&record, "muxer.release"), 1);
}

#[test]
fn test_muxer_finalize_failure_is_reported() {
    let mut registry = FakeRegistry::new();
    registry.fail_muxer_stop = true;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let (events, mut receiver) = event_channel();

    let mut session = HardwareEncodeSession::new(registry, Some(events), CancellationToken::new());
    session.configure(&config(), 16, 16).unwrap();
    session.start(&output, 1).unwrap();
    session.submit_frame(&frame(16, 16)).unwrap();

    assert!(matches!(session.finish(), Err(TranscodeError::Muxer(_))));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!output.exists());
    assert!(matches!(
        drain_events(&mut receiver).last(),
        Some(TranscodeEvent::Error(TranscodeError::Muxer(_)))
    ));
}

#[test]
fn test_operations_out_of_order_are_rejected() {
    let mut session = HardwareEncodeSession::new(FakeRegistry::new(), None, CancellationToken::new());
    assert!(matches!(
        session.submit_frame(&frame(16, 16)),
        Err(TranscodeError::InvalidState { operation: "submit_frame", .. })
    ));
    assert!(matches!(
        session.start(Path::new("unused.mp4"), 1),
        Err(TranscodeError::InvalidState { operation: "start", .. })
    ));
    assert_eq!(session.state(), SessionState::Idle);
}

fn write_frames(dir: &Path, count: usize, size: u32) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("frame_{:05}.png", i));
            frame(size, size).save(&path).unwrap();
            path
        })
        .collect()
}

#[tokio::test]
async fn test_encode_frames_from_png_files() {
    let registry = FakeRegistry::new();
    let record = Arc::clone(&registry.record);
    let dir = tempfile::tempdir().unwrap();
    let frames = write_frames(dir.path(), 4, 32);
    let output = dir.path().join("video.mp4");
    let (events, mut receiver) = event_channel();

    let outcome = encode_frames(
        registry,
        frames,
        output.clone(),
        config(),
        CancellationToken::new(),
        Some(events),
    )
    .await
    .unwrap();

    assert_eq!(outcome, SessionOutcome::Completed);
    assert!(output.exists());
    assert_eq!(record.lock().unwrap().samples.len(), 4);

    let mut completed = false;
    while let Some(event) = receiver.recv().await {
        if let TranscodeEvent::Complete(progress) = event {
            assert_eq!(progress.destination, output);
            completed = true;
        }
    }
    assert!(completed);
}

#[tokio::test]
async fn test_encode_frames_without_frames_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = encode_frames(
        FakeRegistry::new(),
        Vec::new(),
        dir.path().join("video.mp4"),
        config(),
        CancellationToken::new(),
        None,
    )
    .await;
    assert!(matches!(result, Err(TranscodeError::InvalidFrame(_))));
}

#[tokio::test]
async fn test_encode_frames_unreadable_frame_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut frames = write_frames(dir.path(), 2, 16);
    let broken = dir.path().join("frame_00002.png");
    std::fs::write(&broken, b"not a png").unwrap();
    frames.push(broken);
    let output = dir.path().join("video.mp4");

    let result = encode_frames(
        FakeRegistry::new(),
        frames,
        output.clone(),
        config(),
        CancellationToken::new(),
        None,
    )
    .await;
    assert!(matches!(result, Err(TranscodeError::ImageDecode { .. })));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_encode_frames_cancelled_up_front() {
    let registry = FakeRegistry::new();
    let record = Arc::clone(&registry.record);
    let dir = tempfile::tempdir().unwrap();
    let frames = write_frames(dir.path(), 3, 16);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = encode_frames(
        registry,
        frames,
        dir.path().join("video.mp4"),
        config(),
        cancel,
        None,
    )
    .await
    .unwrap();

    assert_eq!(outcome, SessionOutcome::Cancelled);
    assert!(record.lock().unwrap().samples.is_empty());
}
