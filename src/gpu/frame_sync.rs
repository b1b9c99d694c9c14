// SPDX-License-Identifier: GPL-3.0-only

//! Frame-available handoff between a decoder callback and the render thread
//!
//! The decoder delivers "new frame" notifications on its own thread. The
//! render thread blocks in [`FrameSync::await_and_consume`] until one arrives.
//! At most one notification may be pending: a second signal before the first
//! is consumed means frames were dropped, so it is rejected and also latched
//! so the waiting side fails instead of rendering the wrong frame.

use crate::errors::{TranscodeError, TranscodeResult};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct SyncState {
    available: bool,
    violated: bool,
}

/// Mutex and condition guarded frame-available flag
#[derive(Debug, Default)]
pub struct FrameSync {
    state: Mutex<SyncState>,
    cond: Condvar,
}

impl FrameSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a frame available and wake the render thread
    ///
    /// Called from the decoder's callback thread.
    ///
    /// # Returns
    /// * `Ok(())` - The flag was clear and is now set
    /// * `Err(TranscodeError::ProtocolViolation)` - A previous frame was still pending
    pub fn signal(&self) -> TranscodeResult<()> {
        let mut state = self.lock();
        if state.available {
            warn!("Frame signalled while the previous one is unconsumed");
            state.violated = true;
            self.cond.notify_all();
            return Err(TranscodeError::ProtocolViolation);
        }
        state.available = true;
        self.cond.notify_all();
        Ok(())
    }

    /// Block until a frame is available, then consume it
    ///
    /// Spurious wakeups are absorbed by re-checking the flag against the
    /// original deadline.
    ///
    /// # Returns
    /// * `Ok(())` - A frame was consumed
    /// * `Err(TranscodeError::FrameTimeout)` - Nothing arrived within `timeout`
    /// * `Err(TranscodeError::ProtocolViolation)` - A double signal was recorded
    pub fn await_and_consume(&self, timeout: Duration) -> TranscodeResult<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        loop {
            if state.violated {
                state.violated = false;
                state.available = false;
                return Err(TranscodeError::ProtocolViolation);
            }
            if state.available {
                state.available = false;
                debug!("Frame consumed");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TranscodeError::FrameTimeout(timeout));
            }

            state = match self.cond.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Whether a signalled frame is waiting to be consumed
    pub fn is_pending(&self) -> bool {
        self.lock().available
    }

    /// Drop any pending or violated state before a new decode request
    pub fn reset(&self) {
        let mut state = self.lock();
        state.available = false;
        state.violated = false;
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        // The state is two booleans; a panicked holder cannot leave it torn
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_signal_then_consume() {
        let sync = FrameSync::new();
        sync.signal().unwrap();
        assert!(sync.is_pending());
        sync.await_and_consume(Duration::from_millis(10)).unwrap();
        assert!(!sync.is_pending());
    }

    #[test]
    fn test_timeout_without_signal() {
        let sync = FrameSync::new();
        let start = Instant::now();
        let err = sync
            .await_and_consume(Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, TranscodeError::FrameTimeout(_)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_signal_from_other_thread_wakes_waiter() {
        let sync = Arc::new(FrameSync::new());
        let signaller = Arc::clone(&sync);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            signaller.signal()
        });
        sync.await_and_consume(Duration::from_secs(3)).unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_double_signal_is_latched() {
        let sync = FrameSync::new();
        sync.signal().unwrap();
        assert!(matches!(
            sync.signal(),
            Err(TranscodeError::ProtocolViolation)
        ));
        assert!(matches!(
            sync.await_and_consume(Duration::from_millis(10)),
            Err(TranscodeError::ProtocolViolation)
        ));
        // The violation is reported once; the protocol can then resume
        sync.signal().unwrap();
        sync.await_and_consume(Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn test_reset_clears_pending_frame() {
        let sync = FrameSync::new();
        sync.signal().unwrap();
        sync.reset();
        assert!(!sync.is_pending());
        sync.signal().unwrap();
    }
}
