// SPDX-License-Identifier: GPL-3.0-only

//! Encode driver: still images in, one video file out
//!
//! Two blocking stages connected by a bounded channel:
//!
//! ```text
//! decode stage (image files -> RGBA)  --mpsc(2)-->  submit stage (session)
//! ```
//!
//! Frames carry their index and the submit stage rejects anything out of
//! order. Dropping either end stops the other: the decoder stops when the
//! session is gone, the session finishes when the decoder runs out.

use super::session::{FrameSubmission, HardwareEncodeSession, SessionState};
use crate::config::MediaConfig;
use crate::constants::{encode, file_formats};
use crate::errors::{TranscodeError, TranscodeResult};
use crate::events::{CancellationToken, EventSender, SessionOutcome};
use crate::media::codec::CodecRegistry;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type DecodedFrame = (usize, TranscodeResult<RgbaImage>);

/// Decode a still image into RGBA8
pub fn load_rgba(path: &Path) -> TranscodeResult<RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| TranscodeError::image_decode(path, e))
}

/// Image files in `dir`, sorted by file name
///
/// Extraction names frames `frame_00000.jpg`, `frame_00001.jpg`, ... so this
/// order is presentation order.
pub fn collect_frame_files(dir: &Path) -> TranscodeResult<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(file_formats::is_image_extension)
        })
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Encode `frames` in order into `output`
///
/// The first frame fixes the video dimensions. Progress, `Complete` and
/// `Error` events go to `events`; cancellation discards the output and
/// returns [`SessionOutcome::Cancelled`] without a terminal event.
pub async fn encode_frames<R>(
    registry: R,
    frames: Vec<PathBuf>,
    output: PathBuf,
    config: MediaConfig,
    cancel: CancellationToken,
    events: Option<EventSender>,
) -> TranscodeResult<SessionOutcome>
where
    R: CodecRegistry + 'static,
{
    let total = frames.len();
    info!(frames = total, output = %output.display(), "Starting encode");

    let (tx, rx) = mpsc::channel::<DecodedFrame>(encode::PIPELINE_CHANNEL_CAPACITY);

    let decode_cancel = cancel.clone();
    let decoder = tokio::task::spawn_blocking(move || decode_stage(frames, tx, decode_cancel));
    let submitter = tokio::task::spawn_blocking(move || {
        submit_stage(registry, rx, &output, &config, total, cancel, events)
    });

    let outcome = submitter
        .await
        .map_err(|e| TranscodeError::Io(format!("Encode task error: {}", e)))?;
    if let Err(e) = decoder.await {
        warn!(error = %e, "Decode task ended abnormally");
    }
    outcome
}

fn decode_stage(frames: Vec<PathBuf>, tx: mpsc::Sender<DecodedFrame>, cancel: CancellationToken) {
    for (index, path) in frames.into_iter().enumerate() {
        if cancel.is_cancelled() {
            debug!(index, "Decode stage cancelled");
            break;
        }
        let decoded = load_rgba(&path);
        let failed = decoded.is_err();
        if tx.blocking_send((index, decoded)).is_err() {
            debug!("Submit stage gone, stopping decode");
            break;
        }
        if failed {
            break;
        }
    }
}

fn submit_stage<R: CodecRegistry>(
    registry: R,
    mut rx: mpsc::Receiver<DecodedFrame>,
    output: &Path,
    config: &MediaConfig,
    total: usize,
    cancel: CancellationToken,
    events: Option<EventSender>,
) -> TranscodeResult<SessionOutcome> {
    let mut session = HardwareEncodeSession::new(registry, events, cancel.clone());
    let mut expected = 0usize;

    while let Some((index, decoded)) = rx.blocking_recv() {
        if index != expected {
            return Err(session.fail(TranscodeError::InvalidFrame(format!(
                "Frame {} arrived out of order, expected {}",
                index, expected
            ))));
        }
        expected += 1;

        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => return Err(session.fail(e)),
        };

        if session.state() == SessionState::Idle {
            session.configure(config, frame.width(), frame.height())?;
            session.start(output, total)?;
        }

        if submit_with_retry(&mut session, &frame)? == FrameSubmission::Cancelled {
            return Ok(SessionOutcome::Cancelled);
        }
    }

    if session.state() == SessionState::Idle {
        if cancel.is_cancelled() {
            session.cancel();
            return Ok(SessionOutcome::Cancelled);
        }
        return Err(session.fail(TranscodeError::InvalidFrame("No frames to encode".into())));
    }

    session.finish()
}

/// Submit one frame until it is queued or the session is cancelled
fn submit_with_retry<R: CodecRegistry>(
    session: &mut HardwareEncodeSession<R>,
    frame: &RgbaImage,
) -> TranscodeResult<FrameSubmission> {
    for _ in 0..=encode::MAX_INPUT_RETRIES {
        match session.submit_frame(frame)? {
            FrameSubmission::Retry => continue,
            done => return Ok(done),
        }
    }
    Err(session.fail(TranscodeError::Encoder(format!(
        "No input slot freed up after {} attempts",
        encode::MAX_INPUT_RETRIES + 1
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_frame_files_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_00002.jpg", "frame_00000.jpg", "notes.txt", "frame_00001.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let names: Vec<String> = collect_frame_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["frame_00000.jpg", "frame_00001.png", "frame_00002.jpg"]);
    }

    #[test]
    fn test_load_rgba_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        match load_rgba(&path) {
            Err(TranscodeError::ImageDecode { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {:?}", other.map(|i| i.dimensions())),
        }
    }
}
