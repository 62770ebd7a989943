//! Block-data and stream-metadata capabilities, plus the concrete host stream

use crate::midi::MidiMessage;
use crate::types::{Sample, CHANNELS_PER_FRAME};

/// Interleaved input and output buffers for one port pair
///
/// Both slices cover the same frame range and are valid for the duration of
/// the current block call; they may be read and written in place.
pub struct PortBuffers<'a> {
    pub input: &'a mut [Sample],
    pub output: &'a mut [Sample],
}

/// The block-data capability: a fixed-size logical audio block
///
/// Implemented by the top-level stream and by [`super::BlockSlicer`]. Code
/// that only processes audio takes this, not [`AudioStream`], so it cannot
/// reach for metadata that a sub-block view has no business answering.
pub trait BlockBuffers {
    /// Frames in this logical block
    fn frame_count(&self) -> usize;

    /// Interleaved buffers for one input/output port pair
    ///
    /// Returns None for an unknown port or an empty/invalid window; callers
    /// treat that as "nothing to process" and move on.
    fn port_buffers(&mut self, input_port: usize, output_port: usize) -> Option<PortBuffers<'_>>;
}

/// The stream-metadata capability, only ever present on the real stream
pub trait AudioStream: BlockBuffers {
    /// Sample rate of the underlying device
    fn sample_rate(&self) -> u32;

    /// Frames elapsed since the stream started
    fn stream_time(&self) -> u64;

    /// MIDI received during this block, in arrival order
    fn block_midi(&self) -> &[MidiMessage];
}

/// The concrete top-level stream owned by the embedding host
///
/// Port buffers are allocated once at the maximum block size; per block the
/// host copies device input in, calls the dispatcher, and copies output back
/// out. All pointers stay valid and writable for the whole dispatcher call.
#[derive(Debug)]
pub struct HostBlockStream {
    frames: usize,
    max_frames: usize,
    sample_rate: u32,
    stream_time: u64,
    inputs: Vec<Vec<Sample>>,
    outputs: Vec<Vec<Sample>>,
    midi: Vec<MidiMessage>,
}

impl HostBlockStream {
    /// Pre-allocate a stream with the given port count and maximum block size
    pub fn new(ports: usize, max_frames: usize, sample_rate: u32) -> Self {
        let buf = || vec![0.0; max_frames * CHANNELS_PER_FRAME];
        Self {
            frames: 0,
            max_frames,
            sample_rate,
            stream_time: 0,
            inputs: (0..ports).map(|_| buf()).collect(),
            outputs: (0..ports).map(|_| buf()).collect(),
            midi: Vec::with_capacity(256),
        }
    }

    /// Set the frame count for the next block; clamped to the allocation
    pub fn begin_block(&mut self, frames: usize) {
        if frames > self.max_frames {
            log::warn!(
                "host block of {} frames exceeds allocation of {}, clamping",
                frames,
                self.max_frames
            );
        }
        self.frames = frames.min(self.max_frames);
    }

    /// Advance stream time and clear per-block state after dispatch
    pub fn end_block(&mut self) {
        self.stream_time += self.frames as u64;
        self.midi.clear();
    }

    /// Queue a MIDI message for consumption during the next dispatch
    pub fn push_midi(&mut self, msg: MidiMessage) {
        self.midi.push(msg);
    }

    /// Direct access to a port's input buffer (host fills this)
    pub fn input_mut(&mut self, port: usize) -> Option<&mut [Sample]> {
        let frames = self.frames;
        self.inputs
            .get_mut(port)
            .map(|b| &mut b[..frames * CHANNELS_PER_FRAME])
    }

    /// Direct access to a port's output buffer (host drains this)
    pub fn output_mut(&mut self, port: usize) -> Option<&mut [Sample]> {
        let frames = self.frames;
        self.outputs
            .get_mut(port)
            .map(|b| &mut b[..frames * CHANNELS_PER_FRAME])
    }

    /// Zero all output buffers; hosts call this at the top of each block
    pub fn clear_outputs(&mut self) {
        for buf in &mut self.outputs {
            buf.fill(0.0);
        }
    }
}

impl BlockBuffers for HostBlockStream {
    fn frame_count(&self) -> usize {
        self.frames
    }

    fn port_buffers(&mut self, input_port: usize, output_port: usize) -> Option<PortBuffers<'_>> {
        let samples = self.frames * CHANNELS_PER_FRAME;
        let input = self.inputs.get_mut(input_port)?;
        let output = self.outputs.get_mut(output_port)?;
        Some(PortBuffers {
            input: &mut input[..samples],
            output: &mut output[..samples],
        })
    }
}

impl AudioStream for HostBlockStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stream_time(&self) -> u64 {
        self.stream_time
    }

    fn block_midi(&self) -> &[MidiMessage] {
        &self.midi
    }
}
