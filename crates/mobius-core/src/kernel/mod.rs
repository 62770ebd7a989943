//! The real-time kernel side of the engine
//!
//! One dispatcher instance lives on the audio thread and runs the per-block
//! control loop: drain control-plane messages, consume MIDI, inject samples,
//! drive the engine core, exchange host parameters, publish notifications.
//! Nothing in this module blocks, allocates (outside the communicator's
//! documented escape hatch), or lets a failure interrupt block processing.

mod dispatcher;
mod params;
mod suspend;

pub use dispatcher::{KernelDispatcher, MIDI_SCRATCH, ORDERED_SCRATCH};
pub use params::{param_bridge, HostParamPort, ParamBridge, PARAM_QUEUE_CAPACITY};
pub use suspend::SuspendGate;
