//! Mobius Core - shell/kernel architecture for a real-time looping engine
//!
//! A non-real-time control plane (the shell) drives a real-time audio plane
//! (the kernel) without locks, allocation, or synchronous calls on the audio
//! thread. The two sides share a pooled duplex message queue, a pair of
//! wait-free parameter rings, and one suspend gate; everything else is
//! exclusively owned by one side.

pub mod action;
pub mod config;
pub mod engine;
pub mod kernel;
pub mod midi;
pub mod msg;
pub mod runtime;
pub mod sample;
pub mod shell;
pub mod stream;
pub mod types;

pub use runtime::{EngineBuilder, MobiusEngine};
pub use types::*;
