//! Per-sample trigger state and cursor management

use std::sync::Arc;

use super::cursor::SampleCursor;
use super::SampleData;
use crate::stream::PortBuffers;

/// Pending trigger edges a player can hold between blocks
pub const TRIGGER_QUEUE: usize = 8;

/// Cursors warmed per player; also the layering limit in concurrent mode
pub const MAX_CURSORS: usize = 8;

/// Playback behavior flags, fixed when the library is compiled
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleProperties {
    /// Playback continues only while the trigger is held; release stops it
    pub sustain: bool,
    /// Wrap to the start at the natural end while sustained
    pub loops: bool,
    /// Each down layers a new voice instead of restarting
    pub concurrent: bool,
    /// Triggered from a momentary UI button (auto-repeat on held down)
    pub button: bool,
}

/// One pending trigger edge
#[derive(Debug, Clone, Copy, Default)]
struct TriggerEdge {
    down: bool,
}

/// Runtime playback state for one triggerable sample
///
/// The trigger queue is a small ring; overflow only happens at trigger rates
/// beyond one edge per block per slot, which no human-paced source reaches,
/// so an overflowing edge is traced and dropped.
#[derive(Debug)]
pub struct SamplePlayer {
    data: Arc<SampleData>,
    props: SampleProperties,
    triggers: [TriggerEdge; TRIGGER_QUEUE],
    head: usize,
    queued: usize,
    down: bool,
    active: Vec<SampleCursor>,
    free: Vec<SampleCursor>,
    input_latency: usize,
    fade_frames: usize,
}

impl SamplePlayer {
    /// Build a player with a warmed cursor pool (shell side)
    pub fn new(
        data: Arc<SampleData>,
        props: SampleProperties,
        input_latency: usize,
        fade_frames: usize,
    ) -> Self {
        let mut free = Vec::with_capacity(MAX_CURSORS);
        free.resize_with(MAX_CURSORS, SampleCursor::default);
        Self {
            data,
            props,
            triggers: [TriggerEdge::default(); TRIGGER_QUEUE],
            head: 0,
            queued: 0,
            down: false,
            active: Vec::with_capacity(MAX_CURSORS),
            free,
            input_latency,
            fade_frames,
        }
    }

    pub fn properties(&self) -> SampleProperties {
        self.props
    }

    pub fn filename(&self) -> &str {
        self.data.filename()
    }

    /// Number of cursors currently playing or fading
    pub fn active_cursors(&self) -> usize {
        self.active.len()
    }

    /// Cursors active and not yet asked to stop
    pub fn sounding_cursors(&self) -> usize {
        self.active.iter().filter(|c| !c.is_stopping()).count()
    }

    /// Record a trigger edge
    ///
    /// Downs enqueue unless the sample is a sustain type that is already
    /// held (one-shots re-trigger on auto-repeat). Ups enqueue only for
    /// sustain samples; for everything else release is meaningless.
    pub fn queue_trigger(&mut self, down: bool) {
        if down {
            if !self.down || !self.props.sustain {
                self.push_edge(true);
            }
            self.down = true;
        } else {
            if self.props.sustain {
                self.push_edge(false);
            }
            self.down = false;
        }
    }

    fn push_edge(&mut self, down: bool) {
        if self.queued == TRIGGER_QUEUE {
            log::warn!("sample trigger queue full for {}, dropping edge", self.filename());
            return;
        }
        let slot = (self.head + self.queued) % TRIGGER_QUEUE;
        self.triggers[slot] = TriggerEdge { down };
        self.queued += 1;
    }

    fn pop_edge(&mut self) -> Option<TriggerEdge> {
        if self.queued == 0 {
            return None;
        }
        let edge = self.triggers[self.head];
        self.head = (self.head + 1) % TRIGGER_QUEUE;
        self.queued -= 1;
        Some(edge)
    }

    /// Consume queued edges, starting and releasing cursors
    pub(super) fn consume_triggers(&mut self) {
        while let Some(edge) = self.pop_edge() {
            if edge.down {
                if !self.props.concurrent {
                    // Exclusive mode: a new down replaces every live voice
                    for cursor in &mut self.active {
                        cursor.begin_stop();
                    }
                }
                self.start_cursor();
            } else {
                // Release goes to the oldest voice not already stopping
                if let Some(cursor) = self.active.iter_mut().find(|c| !c.is_stopping()) {
                    cursor.begin_stop();
                }
            }
        }
    }

    fn start_cursor(&mut self) {
        let Some(mut cursor) = self.free.pop() else {
            log::warn!("cursor pool exhausted for {}, trigger dropped", self.filename());
            return;
        };
        cursor.start(Arc::clone(&self.data), self.input_latency, self.fade_frames);
        self.active.push(cursor);
    }

    /// Advance cursors a trigger just started, within the triggering block
    ///
    /// Returns true if any record half wrote into the input buffer.
    pub(super) fn catch_up(&mut self, io: &mut PortBuffers<'_>, frames: usize) -> bool {
        self.consume_triggers();
        let wrap = self.down && self.props.sustain && self.props.loops;
        let mut wrote_input = false;
        for cursor in &mut self.active {
            if cursor.take_advanced() {
                // Already advanced this block; restore the mark
                cursor.mark_advanced();
                continue;
            }
            wrote_input |= cursor.advance(io, frames, wrap);
            cursor.mark_advanced();
        }
        self.retire_finished();
        wrote_input
    }

    /// The once-per-block advance for this player
    pub(super) fn advance_block(&mut self, io: &mut PortBuffers<'_>, frames: usize) {
        self.consume_triggers();
        let wrap = self.down && self.props.sustain && self.props.loops;
        for cursor in &mut self.active {
            if cursor.take_advanced() {
                continue;
            }
            cursor.advance(io, frames, wrap);
        }
        self.retire_finished();
    }

    fn retire_finished(&mut self) {
        let mut i = 0;
        while i < self.active.len() {
            if self.active[i].is_stopped() {
                let mut cursor = self.active.remove(i);
                cursor.retire();
                if self.free.len() < MAX_CURSORS {
                    self.free.push(cursor);
                }
            } else {
                i += 1;
            }
        }
    }
}
