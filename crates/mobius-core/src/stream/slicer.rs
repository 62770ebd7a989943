//! Sub-block view over a full audio block
//!
//! Scheduled events land between block boundaries; the slicer lets that work
//! run against a restricted frame range as if it were the whole block. It
//! runs inside event processing on the audio thread, so every bounds
//! violation degrades to an empty window with a trace instead of panicking.

use super::block::{BlockBuffers, PortBuffers};
use crate::types::CHANNELS_PER_FRAME;

/// A logical sub-range of a containing block
///
/// Implements only the block-data capability; there is deliberately no way
/// to ask a slice for stream time or MIDI.
pub struct BlockSlicer<'a> {
    stream: &'a mut dyn BlockBuffers,
    offset: usize,
    length: usize,
}

impl<'a> BlockSlicer<'a> {
    /// Wrap a containing block; the window starts empty
    pub fn new(stream: &'a mut dyn BlockBuffers) -> Self {
        Self { stream, offset: 0, length: 0 }
    }

    /// Configure the visible window
    ///
    /// A window extending past the container clamps to empty rather than
    /// ever exposing out-of-range frames.
    pub fn set_slice(&mut self, offset: usize, length: usize) {
        let full = self.stream.frame_count();
        if offset.checked_add(length).is_none_or(|end| end > full) {
            log::warn!(
                "block slice {}+{} exceeds container of {} frames, clamping to empty",
                offset,
                length,
                full
            );
            self.offset = 0;
            self.length = 0;
        } else {
            self.offset = offset;
            self.length = length;
        }
    }

    /// Window start within the container
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl BlockBuffers for BlockSlicer<'_> {
    /// The configured window length, stored rather than derived from the
    /// container's frame count
    fn frame_count(&self) -> usize {
        self.length
    }

    fn port_buffers(&mut self, input_port: usize, output_port: usize) -> Option<PortBuffers<'_>> {
        if self.length == 0 {
            return None;
        }
        let full = self.stream.port_buffers(input_port, output_port)?;
        // Revalidate against the buffers actually handed back; the container
        // may have been resized since set_slice.
        let start = self.offset * CHANNELS_PER_FRAME;
        let end = start + self.length * CHANNELS_PER_FRAME;
        if end > full.input.len() || end > full.output.len() {
            log::warn!(
                "block slice {}+{} no longer fits container buffers, dropping",
                self.offset,
                self.length
            );
            return None;
        }
        Some(PortBuffers {
            input: &mut full.input[start..end],
            output: &mut full.output[start..end],
        })
    }
}
