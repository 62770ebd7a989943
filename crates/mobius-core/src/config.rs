//! Configuration and session snapshots
//!
//! Snapshots are built on the shell, serialized there when projects are
//! saved, and handed to the kernel as owned values inside messages. Once a
//! snapshot has been sent its sender never touches it again; the kernel
//! returns the previously installed snapshot in the same message envelope so
//! large structures are never dropped on the audio thread.

use serde::{Deserialize, Serialize};

/// Global engine configuration snapshot
///
/// Replaces the previously installed configuration wholesale; application
/// order relative to other snapshot kinds carries no meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Reported input latency of the audio device, in frames
    pub input_latency: usize,
    /// Reported output latency of the audio device, in frames
    pub output_latency: usize,
    /// Number of loop tracks the core maintains
    pub track_count: usize,
    /// Length of the fade applied when playback stops early, in frames
    pub fade_frames: usize,
    /// Compensate sample-injection record cursors for input latency
    pub sample_latency_compensation: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            input_latency: 0,
            output_latency: 0,
            track_count: 8,
            fade_frames: 128,
            sample_latency_compensation: true,
        }
    }
}

/// Per-track setup within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSetup {
    pub name: String,
    pub input_port: usize,
    pub output_port: usize,
    /// Initial output level, 0.0 - 1.0
    pub level: f32,
    pub muted: bool,
}

impl Default for TrackSetup {
    fn default() -> Self {
        Self {
            name: String::new(),
            input_port: 0,
            output_port: 0,
            level: 1.0,
            muted: false,
        }
    }
}

/// Session snapshot: everything the core needs to reconstruct track state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub tracks: Vec<TrackSetup>,
}

/// Handle to one compiled script
///
/// Compilation happens on the shell (the script language lives outside this
/// crate); the kernel only ever routes by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRef {
    pub id: usize,
    pub name: String,
}

/// The set of compiled scripts currently installed
#[derive(Debug, Clone, Default)]
pub struct ScriptLibrary {
    pub scripts: Vec<ScriptRef>,
}

impl ScriptLibrary {
    pub fn find(&self, name: &str) -> Option<&ScriptRef> {
        self.scripts.iter().find(|s| s.name == name)
    }
}
