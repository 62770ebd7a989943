//! MIDI message handling and binding resolution
//!
//! The kernel consumes the host's per-block MIDI buffer and resolves each
//! message against the installed binding table. A resolved binding becomes an
//! [`ActionRecord`] and is applied immediately; bound or not, the raw message
//! is always forwarded to the engine core's MIDI track input.

use crate::action::{ActionRecord, ActionSource, ActionTarget};

/// Identifies which MIDI device a message arrived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MidiDeviceId(pub u8);

/// Parsed classification of a MIDI status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiKind {
    NoteOn,
    NoteOff,
    Control,
    Program,
    Other,
}

/// One raw MIDI message plus its source device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    pub device: MidiDeviceId,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiMessage {
    pub fn new(device: MidiDeviceId, status: u8, data1: u8, data2: u8) -> Self {
        Self { device, status, data1, data2 }
    }

    /// Channel number (0-15) from the status byte
    #[inline]
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    /// Message classification. Note-on with velocity 0 is a note-off.
    pub fn kind(&self) -> MidiKind {
        match self.status & 0xF0 {
            0x90 if self.data2 > 0 => MidiKind::NoteOn,
            0x90 | 0x80 => MidiKind::NoteOff,
            0xB0 => MidiKind::Control,
            0xC0 => MidiKind::Program,
            _ => MidiKind::Other,
        }
    }
}

/// A timed MIDI sequence loaded into a track's MIDI loop
///
/// Events are (frame offset, message) pairs relative to the loop start.
/// Built on the shell, moved across in a MidiLoad message.
#[derive(Debug, Clone, Default)]
pub struct MidiSequence {
    pub events: Vec<(u64, MidiMessage)>,
}

/// What a binding matches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingTrigger {
    /// Note number; resolves on both on (down) and off (up) edges
    Note(u8),
    /// Controller number; value is the scaled CC value
    Control(u8),
    /// Program number
    Program(u8),
}

/// One MIDI-to-action binding
#[derive(Debug, Clone)]
pub struct MidiBinding {
    pub trigger: BindingTrigger,
    /// Restrict to one channel, or None for omni
    pub channel: Option<u8>,
    /// Restrict to one device, or None for any
    pub device: Option<MidiDeviceId>,
    pub target: ActionTarget,
    pub track: Option<usize>,
}

/// Immutable MIDI-to-action binding table
///
/// Compiled on the shell from the active binding configuration and installed
/// into the kernel by pointer swap. Resolution is a linear scan; tables are
/// small (tens of bindings).
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: Vec<MidiBinding>,
}

impl BindingTable {
    pub fn new(bindings: Vec<MidiBinding>) -> Self {
        Self { bindings }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Resolve a message to an action, if any binding matches
    pub fn resolve(&self, msg: &MidiMessage) -> Option<ActionRecord> {
        let kind = msg.kind();
        for binding in &self.bindings {
            if let Some(ch) = binding.channel {
                if ch != msg.channel() {
                    continue;
                }
            }
            if let Some(dev) = binding.device {
                if dev != msg.device {
                    continue;
                }
            }
            let hit = match (binding.trigger, kind) {
                (BindingTrigger::Note(n), MidiKind::NoteOn) => n == msg.data1,
                (BindingTrigger::Note(n), MidiKind::NoteOff) => n == msg.data1,
                (BindingTrigger::Control(n), MidiKind::Control) => n == msg.data1,
                (BindingTrigger::Program(n), MidiKind::Program) => n == msg.data1,
                _ => false,
            };
            if !hit {
                continue;
            }

            let down = !matches!(kind, MidiKind::NoteOff);
            let target = match binding.target {
                // CC bindings carry the scaled controller value
                ActionTarget::Parameter(id, _) => {
                    ActionTarget::Parameter(id, msg.data2 as f32 / 127.0)
                }
                other => other,
            };
            return Some(ActionRecord {
                target,
                down,
                track: binding.track,
                source: ActionSource::Midi,
            });
        }
        None
    }
}

/// External observer with veto power over MIDI consumption
///
/// Installed by the shell for capture flows (binding learn, MIDI monitor
/// panels). Returning true claims the message: no binding fires, but the raw
/// message still reaches the engine core.
pub trait MidiMonitor: Send {
    fn intercept(&mut self, msg: &MidiMessage) -> bool;
}
