//! Suspend/resume gate between shell and kernel
//!
//! Lets a non-real-time caller freeze the dispatch loop at a block boundary
//! to observe a self-consistent engine snapshot (project save/load). The
//! kernel only ever acknowledges at the top of a block; the shell polls,
//! and gives up after a bounded wait if the audio callback is not running.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

const RUNNING: u8 = 0;
const REQUESTED: u8 = 1;
const SUSPENDED: u8 = 2;

/// How often the shell re-checks while waiting for suspension
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Shared suspend state, one per engine instance
#[derive(Debug, Default)]
pub struct SuspendGate {
    state: AtomicU8,
}

impl SuspendGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shell side: ask the kernel to stop processing at its next block
    pub fn request_suspend(&self) {
        let _ = self.state.compare_exchange(
            RUNNING,
            REQUESTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Shell side: let the kernel run again
    pub fn request_resume(&self) {
        self.state.store(RUNNING, Ordering::Release);
    }

    /// True once the kernel has acknowledged the request
    pub fn is_suspended(&self) -> bool {
        self.state.load(Ordering::Acquire) == SUSPENDED
    }

    /// Kernel side, top of every block: acknowledge a pending request and
    /// report whether this block should be skipped entirely
    pub(crate) fn observe_block(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            REQUESTED => {
                self.state.store(SUSPENDED, Ordering::Release);
                true
            }
            SUSPENDED => true,
            _ => false,
        }
    }

    /// Shell side: bounded sleep-and-poll for the acknowledgment
    ///
    /// Returns false on timeout; the caller must treat that as a hard
    /// failure of whatever needed the frozen state, not proceed unsafely.
    pub fn wait_suspended(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_suspended() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
