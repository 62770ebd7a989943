//! The non-real-time shell side of the engine
//!
//! The shell owns everything that may block or allocate: snapshot
//! compilation, file-backed loads, the periodic maintenance tick that keeps
//! the message pool topped up and drains kernel notifications, and the
//! suspend handshake used by project save/load.

mod controller;

pub use controller::{MaintenanceHandle, ShellController, ShellError, ShellEvent, ShellResult};
