//! Cross-thread messaging between shell and kernel
//!
//! Once audio is running, the pooled message system in this module is the
//! only legal channel between the non-real-time shell and the real-time
//! kernel. Messages are reusable envelopes drawn from a shared free pool;
//! steady-state operation performs no allocation on either side.

mod communicator;
mod message;

pub use communicator::{Communicator, QueueStats, INITIAL_POOL_MESSAGES, POOL_EXTENSION, POOL_LOW_WATER};
pub use message::{KernelMessage, MessageKind, MessagePayload};
