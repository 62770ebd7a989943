//! Pooled message envelope and payload sum type
//!
//! A message owns exactly one payload; the discriminant drives the
//! dispatcher's two-phase classification. Large payloads are boxed so the
//! envelope stays small and a send moves one pointer-sized value.

use crate::action::ActionRecord;
use crate::config::{ConfigSnapshot, ScriptLibrary, SessionSnapshot};
use crate::engine::EngineEvent;
use crate::midi::{BindingTable, MidiMessage, MidiSequence};
use crate::sample::SampleManager;
use crate::types::AudioClip;

/// Message discriminant, used to classify without touching the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Reserved no-op; a freshly pooled or consumed message
    None,
    /// Configuration snapshot replacement
    Configure,
    /// Session snapshot replacement
    Session,
    /// One control action
    Action,
    /// Sample manager replacement
    Samples,
    /// Compiled script library replacement
    Scripts,
    /// MIDI binding table replacement
    Bindings,
    /// Engine event, or its completion reply
    Event,
    /// Loop audio content replacement
    LoadLoop,
    /// One queued raw MIDI message
    Midi,
    /// Loop MIDI content replacement
    MidiLoad,
}

impl MessageKind {
    /// Ordered kinds must be applied in original submission order; the
    /// dispatcher re-reverses them after the LIFO drain. Immediate kinds are
    /// idempotent replacements and apply in whatever order they pop.
    pub fn is_ordered(&self) -> bool {
        matches!(self, MessageKind::Action | MessageKind::Event | MessageKind::Midi)
    }
}

/// The payload a message carries; exactly one variant per kind
#[derive(Debug, Default)]
pub enum MessagePayload {
    #[default]
    None,
    Configure(Box<ConfigSnapshot>),
    Session(Box<SessionSnapshot>),
    Action(ActionRecord),
    Samples(Box<SampleManager>),
    Scripts(Box<ScriptLibrary>),
    Bindings(Box<BindingTable>),
    Event(EngineEvent),
    LoadLoop {
        track: usize,
        loop_index: usize,
        clip: AudioClip,
    },
    Midi(MidiMessage),
    MidiLoad {
        track: usize,
        loop_index: usize,
        sequence: MidiSequence,
    },
}

impl MessagePayload {
    /// The discriminant matching this payload
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::None => MessageKind::None,
            MessagePayload::Configure(_) => MessageKind::Configure,
            MessagePayload::Session(_) => MessageKind::Session,
            MessagePayload::Action(_) => MessageKind::Action,
            MessagePayload::Samples(_) => MessageKind::Samples,
            MessagePayload::Scripts(_) => MessageKind::Scripts,
            MessagePayload::Bindings(_) => MessageKind::Bindings,
            MessagePayload::Event(_) => MessageKind::Event,
            MessagePayload::LoadLoop { .. } => MessageKind::LoadLoop,
            MessagePayload::Midi(_) => MessageKind::Midi,
            MessagePayload::MidiLoad { .. } => MessageKind::MidiLoad,
        }
    }
}

/// One pooled cross-thread message
///
/// Ownership moves with the envelope: the pool, one queue, or one side's
/// in-flight set holds it at any time, never more than one. Payload and
/// discriminant cannot disagree since the kind is derived from the payload.
#[derive(Debug, Default)]
pub struct KernelMessage {
    payload: MessagePayload,
}

impl KernelMessage {
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &MessagePayload {
        &self.payload
    }

    /// Fill the envelope for sending
    pub fn set_payload(&mut self, payload: MessagePayload) {
        self.payload = payload;
    }

    /// Take the payload out, leaving the envelope empty for reuse or return
    pub fn take_payload(&mut self) -> MessagePayload {
        std::mem::take(&mut self.payload)
    }

    /// True if the envelope carries nothing
    pub fn is_empty(&self) -> bool {
        matches!(self.payload, MessagePayload::None)
    }
}
