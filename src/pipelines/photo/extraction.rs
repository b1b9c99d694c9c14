// SPDX-License-Identifier: GPL-3.0-only

//! Frame extraction driver
//!
//! For every requested timestamp:
//!
//! ```text
//! request_frame(ts) -> latch (fatal timeout) -> draw(invert_y) -> read_pixels -> JPEG
//! ```
//!
//! The render surface is created on the calling thread and never leaves it.
//! It is released on every exit path, including errors and cancellation.

use super::encoding::StillImageWriter;
use crate::config::ExtractConfig;
use crate::constants::extraction;
use crate::errors::{TranscodeError, TranscodeResult};
use crate::events::{CancellationToken, EventSender, ProgressReporter, SessionOutcome};
use crate::gpu::{GpuRenderSurface, RenderPlatform, SeekableFrameSource};
use crate::media::decoders::GstFrameSource;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What an extraction run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    pub outcome: SessionOutcome,
    /// Written frame files, in request order
    pub frames: Vec<PathBuf>,
}

/// `count` timestamps starting at zero, `interval` apart
///
/// Stops early at the first timestamp a `Duration` cannot hold.
pub fn evenly_spaced_timestamps(interval: Duration, count: usize) -> Vec<Duration> {
    (0..count)
        .map_while(|i| u32::try_from(i).ok().and_then(|i| interval.checked_mul(i)))
        .collect()
}

/// Pulls frames at given timestamps out of a video and saves them as JPEG
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    config: ExtractConfig,
    writer: StillImageWriter,
}

impl FrameExtractor {
    pub fn new(config: ExtractConfig) -> Self {
        let writer = StillImageWriter::new(config.photo_quality);
        Self { config, writer }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Decode `input` and save one frame per timestamp into `out_dir`
    ///
    /// Blocks the calling thread, which owns the GPU context for the whole
    /// run. `out_dir` must exist. Emits progress per saved frame and a final
    /// `Complete` or `Error` event; a cancelled run emits neither.
    pub fn run(
        &self,
        input: &Path,
        timestamps: &[Duration],
        out_dir: &Path,
        cancel: &CancellationToken,
        events: Option<EventSender>,
    ) -> TranscodeResult<ExtractionReport> {
        let mut reporter = ProgressReporter::new(events, out_dir.to_path_buf(), timestamps.len());
        info!(
            input = %input.display(),
            frames = timestamps.len(),
            width = self.config.width,
            height = self.config.height,
            "Starting frame extraction"
        );

        let (width, height) = (self.config.width, self.config.height);
        let result = GstFrameSource::open(input, width, height)
            .inspect(|source| {
                if let Some(duration) = source.duration()
                    && let Some(last) = timestamps.iter().max().filter(|t| **t > duration)
                {
                    warn!(?duration, ?last, "Requested timestamps past the end of the stream");
                }
            })
            .and_then(|source| GpuRenderSurface::create(width, height, source))
            .and_then(|mut surface| {
                let extracted =
                    self.extract_all(&mut surface, timestamps, out_dir, cancel, &mut reporter);
                surface.release();
                extracted
            });

        Self::conclude(result, &mut reporter)
    }

    /// Extract using an already created surface
    ///
    /// The surface is released before returning, whatever the outcome.
    pub fn run_on_surface<P, S>(
        &self,
        surface: &mut GpuRenderSurface<P, S>,
        timestamps: &[Duration],
        out_dir: &Path,
        cancel: &CancellationToken,
        events: Option<EventSender>,
    ) -> TranscodeResult<ExtractionReport>
    where
        P: RenderPlatform,
        S: SeekableFrameSource,
    {
        let mut reporter = ProgressReporter::new(events, out_dir.to_path_buf(), timestamps.len());
        let result = self.extract_all(surface, timestamps, out_dir, cancel, &mut reporter);
        surface.release();
        Self::conclude(result, &mut reporter)
    }

    fn conclude(
        result: TranscodeResult<ExtractionReport>,
        reporter: &mut ProgressReporter,
    ) -> TranscodeResult<ExtractionReport> {
        match result {
            Ok(report) => {
                if report.outcome == SessionOutcome::Completed {
                    info!(frames = report.frames.len(), "Frame extraction completed");
                    reporter.complete();
                }
                Ok(report)
            }
            Err(e) => {
                reporter.error(e.clone());
                Err(e)
            }
        }
    }

    fn extract_all<P, S>(
        &self,
        surface: &mut GpuRenderSurface<P, S>,
        timestamps: &[Duration],
        out_dir: &Path,
        cancel: &CancellationToken,
        reporter: &mut ProgressReporter,
    ) -> TranscodeResult<ExtractionReport>
    where
        P: RenderPlatform,
        S: SeekableFrameSource,
    {
        if !out_dir.is_dir() {
            return Err(TranscodeError::image_write(
                out_dir,
                "output directory does not exist",
            ));
        }

        let mut frames = Vec::with_capacity(timestamps.len());
        for (index, &timestamp) in timestamps.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(saved = frames.len(), "Frame extraction cancelled");
                return Ok(ExtractionReport {
                    outcome: SessionOutcome::Cancelled,
                    frames,
                });
            }

            surface.source_mut().request_frame(timestamp)?;
            surface.latch_next_frame(self.config.frame_timeout)?;
            surface.draw_frame(true)?;

            let (width, height) = (surface.width(), surface.height());
            let pixels = surface.read_pixels()?;
            let path = out_dir.join(extraction::frame_file_name(index));
            self.writer.save(pixels.as_bytes(), width, height, &path)?;
            debug!(index, ?timestamp, path = %path.display(), "Frame extracted");

            frames.push(path);
            reporter.frame_consumed(
                index + 1,
                Some(format!("Extracted frame at {:.3}s", timestamp.as_secs_f64())),
            );
        }

        Ok(ExtractionReport {
            outcome: SessionOutcome::Completed,
            frames,
        })
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(ExtractConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evenly_spaced_timestamps() {
        let ts = evenly_spaced_timestamps(Duration::from_millis(500), 3);
        assert_eq!(
            ts,
            vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(1000)
            ]
        );
        assert!(evenly_spaced_timestamps(Duration::from_secs(1), 0).is_empty());
    }

    #[test]
    fn test_evenly_spaced_timestamps_stop_before_overflow() {
        let huge = Duration::from_secs(u64::MAX / 2 + 1);
        let ts = evenly_spaced_timestamps(huge, 5);
        assert_eq!(ts, vec![Duration::ZERO, huge]);
    }

    #[test]
    fn test_writer_uses_configured_quality() {
        let extractor = FrameExtractor::new(ExtractConfig {
            photo_quality: 75,
            ..ExtractConfig::default()
        });
        assert_eq!(extractor.writer.quality(), 75);
    }
}
