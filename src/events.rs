// SPDX-License-Identifier: GPL-3.0-only

//! Progress events and cooperative cancellation
//!
//! Both transcode directions report through the same [`TranscodeEvent`]
//! stream and observe the same [`CancellationToken`]. Events go over an
//! unbounded tokio channel so blocking workers can emit without awaiting.

use crate::errors::TranscodeError;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Progress snapshot for one consumed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Percent complete, 0-100
    pub percent: u8,
    pub message: Option<String>,
    /// Output file or directory the session writes to
    pub destination: PathBuf,
    pub elapsed: Duration,
}

/// Event emitted by an extraction or encode session
#[derive(Debug, Clone)]
pub enum TranscodeEvent {
    Progress(Progress),
    /// Terminal success; carries the final (100%) progress
    Complete(Progress),
    /// Terminal failure, emitted after teardown
    Error(TranscodeError),
}

impl TranscodeEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TranscodeEvent::Progress(_))
    }
}

/// How a session that did not fail came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every input was processed and the output finalized
    Completed,
    /// The cancellation token was observed; partial output was discarded
    Cancelled,
}

/// Sending half of the event stream
pub type EventSender = mpsc::UnboundedSender<TranscodeEvent>;

/// Receiving half of the event stream
pub type EventReceiver = mpsc::UnboundedReceiver<TranscodeEvent>;

/// Create a connected event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Shared cancellation flag, polled at frame boundaries
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; sessions notice at their next checkpoint
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Turns consumed-frame counts into monotonically non-decreasing progress events
#[derive(Debug)]
pub struct ProgressReporter {
    events: Option<EventSender>,
    destination: PathBuf,
    total: usize,
    last_percent: u8,
    started_at: Instant,
}

impl ProgressReporter {
    /// Reporter for `total` frames written to `destination`
    ///
    /// With `events` set to `None` nothing is sent, which keeps sessions usable
    /// without a listener.
    pub fn new(events: Option<EventSender>, destination: PathBuf, total: usize) -> Self {
        Self {
            events,
            destination,
            total,
            last_percent: 0,
            started_at: Instant::now(),
        }
    }

    /// Percent for `consumed` frames, clamped to 100 and never below the last value
    pub fn percent_for(&self, consumed: usize) -> u8 {
        let percent = if self.total == 0 {
            100
        } else {
            (consumed.saturating_mul(100) / self.total).min(100) as u8
        };
        percent.max(self.last_percent)
    }

    /// Emit progress after `consumed` frames
    pub fn frame_consumed(&mut self, consumed: usize, message: Option<String>) -> Progress {
        let progress = self.snapshot(self.percent_for(consumed), message);
        self.send(TranscodeEvent::Progress(progress.clone()));
        progress
    }

    /// Emit the terminal success event
    pub fn complete(&mut self) {
        let progress = self.snapshot(100, None);
        self.send(TranscodeEvent::Complete(progress));
    }

    /// Emit the terminal error event
    pub fn error(&mut self, err: TranscodeError) {
        self.send(TranscodeEvent::Error(err));
    }

    pub fn destination(&self) -> &PathBuf {
        &self.destination
    }

    fn snapshot(&mut self, percent: u8, message: Option<String>) -> Progress {
        self.last_percent = percent;
        Progress {
            percent,
            message,
            destination: self.destination.clone(),
            elapsed: self.started_at.elapsed(),
        }
    }

    fn send(&self, event: TranscodeEvent) {
        if let Some(events) = &self.events
            && events.send(event).is_err()
        {
            debug!("Progress receiver dropped, event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_clamped_and_monotonic() {
        let mut reporter = ProgressReporter::new(None, PathBuf::from("out.mp4"), 3);
        assert_eq!(reporter.frame_consumed(1, None).percent, 33);
        assert_eq!(reporter.frame_consumed(2, None).percent, 66);
        // A stale count never moves progress backwards
        assert_eq!(reporter.frame_consumed(1, None).percent, 66);
        assert_eq!(reporter.frame_consumed(3, None).percent, 100);
        assert_eq!(reporter.percent_for(7), 100);
    }

    #[tokio::test]
    async fn test_events_reach_receiver() {
        let (tx, mut rx) = event_channel();
        let mut reporter = ProgressReporter::new(Some(tx), PathBuf::from("frames"), 2);
        reporter.frame_consumed(1, Some("frame 1".into()));
        reporter.complete();
        drop(reporter);

        match rx.recv().await {
            Some(TranscodeEvent::Progress(p)) => {
                assert_eq!(p.percent, 50);
                assert_eq!(p.message.as_deref(), Some("frame 1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        let last = rx.recv().await.unwrap();
        assert!(last.is_terminal());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
