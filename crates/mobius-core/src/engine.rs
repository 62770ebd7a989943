//! Engine core contract
//!
//! The loop/track/layer audio machinery is a black box behind [`EngineCore`].
//! The kernel dispatcher drives it synchronously to completion inside every
//! audio block; an implementation must never spawn threads, block, or
//! allocate on these calls.
//!
//! Block preparation is two-phase: [`EngineCore::begin_block`] runs before
//! the control plane is drained, and [`EngineCore::advance_block`] runs after
//! sample injection, so script side effects always observe a fully prepared
//! block including any injected audio.

use crate::action::{ActionRecord, ParamId};
use crate::config::{ConfigSnapshot, ScriptLibrary, SessionSnapshot};
use crate::midi::{MidiMessage, MidiSequence};
use crate::stream::BlockBuffers;
use crate::types::AudioClip;

/// Kinds of event the core raises toward the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    /// A loop finished recording and should be persisted
    SaveLoop,
    /// A script ran to completion
    ScriptFinished,
    /// The play position crossed a loop boundary
    LoopBoundary,
    /// A track switched loops
    LoopSwitch,
    /// Reply carrying the completion of an earlier event
    Completed,
}

/// One engine-event record
///
/// Travels kernel-to-shell inside an Event message; the shell performs the
/// non-real-time work and may send the record back as a completion reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineEvent {
    pub kind: EngineEventKind,
    pub track: usize,
    /// Event-specific argument (loop number, script id, ...)
    pub argument: u64,
}

/// One host parameter update, in either direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamChange {
    pub param: ParamId,
    pub value: f32,
}

/// The black-box loop engine the kernel drives
///
/// All methods are called on the audio thread, except none: the shell never
/// touches the core after startup.
pub trait EngineCore: Send {
    /// Phase-one block preparation, before control-plane consumption
    fn begin_block(&mut self, frames: usize);

    /// Phase-two block preparation: script advancement and other logic that
    /// must observe sample-injection side effects
    fn advance_block(&mut self);

    /// Per-track audio processing over the (possibly sliced) block
    fn process_audio(&mut self, stream: &mut dyn BlockBuffers);

    /// The host block size changed; re-derive latency compensation
    fn block_size_changed(&mut self, frames: usize);

    /// Apply one action; may complete immediately with an event for the shell
    fn apply_action(&mut self, action: &ActionRecord) -> Option<EngineEvent>;

    /// The shell finished the non-real-time half of an event
    fn complete_event(&mut self, event: &EngineEvent);

    /// Raw MIDI input for MIDI tracks, independent of binding resolution
    fn receive_midi(&mut self, msg: &MidiMessage);

    /// Install a new configuration snapshot (kernel retains ownership)
    fn configure(&mut self, config: &ConfigSnapshot);

    /// Install a new session snapshot
    fn load_session(&mut self, session: &SessionSnapshot);

    /// Install a new compiled script library
    fn install_scripts(&mut self, scripts: &ScriptLibrary);

    /// Replace a loop's audio content
    fn load_loop(&mut self, track: usize, loop_index: usize, clip: &AudioClip);

    /// Replace a loop's MIDI content
    fn load_midi(&mut self, track: usize, loop_index: usize, sequence: &MidiSequence);

    /// Emit parameter values that changed during this block
    fn publish_params(&mut self, sink: &mut dyn FnMut(ParamChange));

    /// Flush queued track notifications accumulated during this block
    fn drain_notifications(&mut self, sink: &mut dyn FnMut(EngineEvent));
}
