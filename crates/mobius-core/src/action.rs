//! Action representation for engine control
//!
//! Every control source funnels into the same `ActionRecord` shape: UI
//! button presses, resolved MIDI bindings, host parameter changes and script
//! statements all arrive at the kernel as the one action vocabulary, so there
//! is exactly one application code path inside the dispatcher.

/// Engine functions that can be triggered by an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionId {
    Record,
    Overdub,
    Multiply,
    Insert,
    Mute,
    Undo,
    Redo,
    Reset,
    GlobalReset,
    SpeedToggle,
}

/// Identifier for a continuously-valued engine parameter
///
/// The index space is shared with the plugin host's parameter layer, so a
/// host automation write and a UI knob land on the same parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// What an action operates on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionTarget {
    /// A discrete engine function (record, mute, ...)
    Function(FunctionId),
    /// A continuous parameter, with the new value
    Parameter(ParamId, f32),
    /// A triggerable sample, by library index
    Sample(usize),
}

/// Where an action originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSource {
    Ui,
    Midi,
    Host,
    Script,
}

/// One control operation, as applied by the kernel
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub target: ActionTarget,
    /// Trigger edge: true on press/engage, false on release
    pub down: bool,
    /// Target track, or None for the focused/global scope
    pub track: Option<usize>,
    pub source: ActionSource,
}

impl ActionRecord {
    /// A function press from the UI, global scope
    pub fn function(id: FunctionId) -> Self {
        Self {
            target: ActionTarget::Function(id),
            down: true,
            track: None,
            source: ActionSource::Ui,
        }
    }

    /// A parameter set from the given source
    pub fn parameter(id: ParamId, value: f32, source: ActionSource) -> Self {
        Self {
            target: ActionTarget::Parameter(id, value),
            down: true,
            track: None,
            source,
        }
    }

    /// A sample trigger edge
    pub fn sample(index: usize, down: bool, source: ActionSource) -> Self {
        Self {
            target: ActionTarget::Sample(index),
            down,
            track: None,
            source,
        }
    }

    /// Scope the action to a specific track
    pub fn on_track(mut self, track: usize) -> Self {
        self.track = Some(track);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_builders() {
        let a = ActionRecord::function(FunctionId::Record).on_track(2);
        assert_eq!(a.track, Some(2));
        assert!(a.down);
        assert_eq!(a.source, ActionSource::Ui);

        let p = ActionRecord::parameter(ParamId(3), 0.25, ActionSource::Host);
        match p.target {
            ActionTarget::Parameter(id, v) => {
                assert_eq!(id, ParamId(3));
                assert_eq!(v, 0.25);
            }
            _ => panic!("wrong target"),
        }
    }
}
