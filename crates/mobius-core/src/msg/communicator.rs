//! The duplex message queue pair between shell and kernel
//!
//! One mutex guards the free pool and both direction queues; every operation
//! under it is O(1) pointer work, so the audio thread never waits more than a
//! few instructions. Pool growth happens only on the shell side
//! ([`Communicator::check_capacity`]), keeping the kernel allocation-free in
//! steady state. The one sanctioned exception: a kernel-side alloc on an
//! exhausted pool allocates anyway with a loud trace, because dropping some
//! message kinds (event completions a script is waiting on) causes worse
//! symptoms than a rare allocation.
//!
//! Sends push newest-first, so a drain yields reverse temporal order. The
//! dispatcher re-reverses order-sensitive kinds; consumers that need FIFO
//! directly (maintenance drain, log replay) pass `ordered = true`.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::message::KernelMessage;

/// Messages created on the first capacity check
pub const INITIAL_POOL_MESSAGES: usize = 64;

/// Free-pool size below which the shell tops up
pub const POOL_LOW_WATER: usize = 16;

/// Messages added per extension
pub const POOL_EXTENSION: usize = 32;

/// Counter snapshot for diagnostics and leak detection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages ever created, including emergency kernel allocations
    pub total_created: usize,
    /// Messages currently in the free pool
    pub pool_free: usize,
    /// Messages queued toward the shell
    pub shell_queued: usize,
    /// Messages queued toward the kernel
    pub kernel_queued: usize,
    /// Messages held by the shell (allocated or received, not yet returned)
    pub shell_in_flight: usize,
    /// Messages held by the kernel
    pub kernel_in_flight: usize,
    /// Deepest the shell-bound queue has ever been
    pub shell_highwater: usize,
    /// Deepest the kernel-bound queue has ever been
    pub kernel_highwater: usize,
    /// Pool extensions performed by capacity checks
    pub extensions: usize,
    /// Kernel-side allocations taken on pool exhaustion
    pub emergency_allocs: usize,
    /// Total messages the shell has sent
    pub shell_sent: usize,
    /// Total messages the kernel has sent
    pub kernel_sent: usize,
}

impl QueueStats {
    /// Conservation check: every message is in the pool, one queue, or one
    /// side's hands. A mismatch means a message leaked or a counter drifted.
    pub fn balanced(&self) -> bool {
        self.pool_free
            + self.shell_queued
            + self.kernel_queued
            + self.shell_in_flight
            + self.kernel_in_flight
            == self.total_created
    }
}

#[derive(Default)]
struct Queues {
    pool: Vec<Box<KernelMessage>>,
    /// Messages destined for the kernel; front is newest
    to_kernel: VecDeque<Box<KernelMessage>>,
    /// Messages destined for the shell; front is newest
    to_shell: VecDeque<Box<KernelMessage>>,
    stats: QueueStats,
}

impl Queues {
    fn top_up(&mut self) {
        let batch = if self.stats.total_created == 0 {
            INITIAL_POOL_MESSAGES
        } else if self.pool.len() < POOL_LOW_WATER {
            POOL_EXTENSION
        } else {
            return;
        };

        self.pool.reserve(batch);
        for _ in 0..batch {
            self.pool.push(Box::default());
        }
        self.stats.total_created += batch;
        if self.stats.total_created > INITIAL_POOL_MESSAGES {
            self.stats.extensions += 1;
            log::info!(
                "message pool extended by {} (total {}, free {})",
                batch,
                self.stats.total_created,
                self.pool.len()
            );
        }
    }
}

/// The shell/kernel duplex queue pair plus the shared message pool
///
/// Explicitly constructed and shared by reference with both sides; there is
/// no process-wide instance, so independent engine instances coexist (one
/// per test, or several in one host).
#[derive(Default)]
pub struct Communicator {
    queues: Mutex<Queues>,
}

impl Communicator {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────
    // Shell side
    // ─────────────────────────────────────────────────────────────

    /// Take a free message for the shell to fill
    ///
    /// Returns None only if the pool is empty after a just-in-time top-up,
    /// which a prior `check_capacity` makes essentially unreachable.
    pub fn shell_alloc(&self) -> Option<Box<KernelMessage>> {
        let mut q = self.queues.lock().unwrap();
        if q.pool.is_empty() {
            q.top_up();
        }
        match q.pool.pop() {
            Some(msg) => {
                q.stats.shell_in_flight += 1;
                Some(msg)
            }
            None => {
                log::warn!("shell message allocation failed: pool exhausted");
                None
            }
        }
    }

    /// Queue a message toward the kernel
    pub fn shell_send(&self, msg: Box<KernelMessage>) {
        let mut q = self.queues.lock().unwrap();
        // The shell thread may allocate, so top up opportunistically here
        // rather than making the kernel pay for growth.
        if q.pool.len() < POOL_LOW_WATER {
            q.top_up();
        }
        q.to_kernel.push_front(msg);
        q.stats.shell_in_flight = q.stats.shell_in_flight.saturating_sub(1);
        q.stats.shell_sent += 1;
        q.stats.kernel_highwater = q.stats.kernel_highwater.max(q.to_kernel.len());
    }

    /// Take the next shell-bound message
    ///
    /// `ordered = false` pops newest-first (the queue's native order);
    /// `ordered = true` pops oldest-first for consumers that need delivery in
    /// submission order.
    pub fn shell_receive(&self, ordered: bool) -> Option<Box<KernelMessage>> {
        let mut q = self.queues.lock().unwrap();
        let msg = if ordered { q.to_shell.pop_back() } else { q.to_shell.pop_front() };
        if msg.is_some() {
            q.stats.shell_in_flight += 1;
        }
        msg
    }

    /// Return a message the shell decided not to use
    pub fn shell_abandon(&self, msg: Box<KernelMessage>) {
        let mut q = self.queues.lock().unwrap();
        q.stats.shell_in_flight = q.stats.shell_in_flight.saturating_sub(1);
        Self::release(&mut q, msg);
    }

    /// Grow the pool from the non-real-time side
    ///
    /// First call builds the initial pool; later calls extend it whenever the
    /// free count has dropped below the low-water mark. Never call this from
    /// the audio thread.
    pub fn check_capacity(&self) {
        let mut q = self.queues.lock().unwrap();
        q.top_up();
    }

    // ─────────────────────────────────────────────────────────────
    // Kernel side
    // ─────────────────────────────────────────────────────────────

    /// Take a free message for the kernel to fill
    ///
    /// On pool exhaustion this allocates rather than dropping the message:
    /// the shell's capacity checks make exhaustion rare, and a silently
    /// dropped event reply leaves a script waiting forever.
    pub fn kernel_alloc(&self) -> Box<KernelMessage> {
        let mut q = self.queues.lock().unwrap();
        match q.pool.pop() {
            Some(msg) => {
                q.stats.kernel_in_flight += 1;
                msg
            }
            None => {
                log::warn!("kernel message pool exhausted, allocating on the audio thread");
                q.stats.total_created += 1;
                q.stats.emergency_allocs += 1;
                q.stats.kernel_in_flight += 1;
                Box::default()
            }
        }
    }

    /// Queue a message toward the shell
    pub fn kernel_send(&self, msg: Box<KernelMessage>) {
        let mut q = self.queues.lock().unwrap();
        q.to_shell.push_front(msg);
        q.stats.kernel_in_flight = q.stats.kernel_in_flight.saturating_sub(1);
        q.stats.kernel_sent += 1;
        q.stats.shell_highwater = q.stats.shell_highwater.max(q.to_shell.len());
    }

    /// Take the next kernel-bound message, newest-first
    ///
    /// The kernel never needs FIFO here; the dispatcher restores submission
    /// order itself for the kinds where order matters.
    pub fn kernel_receive(&self) -> Option<Box<KernelMessage>> {
        let mut q = self.queues.lock().unwrap();
        let msg = q.to_kernel.pop_front();
        if msg.is_some() {
            q.stats.kernel_in_flight += 1;
        }
        msg
    }

    /// Return a consumed message to the pool
    pub fn kernel_abandon(&self, msg: Box<KernelMessage>) {
        let mut q = self.queues.lock().unwrap();
        q.stats.kernel_in_flight = q.stats.kernel_in_flight.saturating_sub(1);
        Self::release(&mut q, msg);
    }

    // ─────────────────────────────────────────────────────────────
    // Diagnostics
    // ─────────────────────────────────────────────────────────────

    /// Counter snapshot
    pub fn stats(&self) -> QueueStats {
        let q = self.queues.lock().unwrap();
        let mut stats = q.stats;
        stats.pool_free = q.pool.len();
        stats.shell_queued = q.to_shell.len();
        stats.kernel_queued = q.to_kernel.len();
        stats
    }

    /// Opportunistic leak check; logs and returns false on imbalance
    ///
    /// Advisory only. An imbalance is traced, never fatal: a drifted
    /// diagnostic counter costs far less than stopping the engine.
    pub fn check_balance(&self) -> bool {
        let stats = self.stats();
        if !stats.balanced() {
            log::error!(
                "message accounting imbalance: pool {} + queued {}/{} + in flight {}/{} != created {}",
                stats.pool_free,
                stats.shell_queued,
                stats.kernel_queued,
                stats.shell_in_flight,
                stats.kernel_in_flight,
                stats.total_created
            );
            return false;
        }
        true
    }

    fn release(q: &mut Queues, mut msg: Box<KernelMessage>) {
        if !msg.is_empty() {
            // The payload should have been taken or forwarded before the
            // envelope comes back; dropping it here still works but may free
            // memory on the wrong thread.
            log::warn!("message abandoned with live {:?} payload", msg.kind());
            msg.take_payload();
        }
        q.pool.push(msg);
    }
}
