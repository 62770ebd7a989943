//! The installed set of sample players

use super::player::SamplePlayer;
use crate::stream::BlockBuffers;

/// Owns every resident sample player
///
/// Assembled on the shell from loaded audio, then moved to the kernel inside
/// a Samples message; the kernel swaps it in and sends the previous manager
/// back for disposal. Triggers resolve by library index.
#[derive(Debug, Default)]
pub struct SampleManager {
    players: Vec<SamplePlayer>,
}

impl SampleManager {
    pub fn new(players: Vec<SamplePlayer>) -> Self {
        Self { players }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, index: usize) -> Option<&SamplePlayer> {
        self.players.get(index)
    }

    /// Fire a trigger edge at a sample
    ///
    /// A down edge starts playback immediately: the new cursor is advanced
    /// by the whole current block from its frame 0, because triggers are
    /// only ever scheduled at block boundaries. Returns true if the input
    /// buffer was modified, so the caller can tell consumers holding a copy
    /// of the input that it went stale.
    pub fn trigger(&mut self, stream: &mut dyn BlockBuffers, index: usize, down: bool) -> bool {
        let frames = stream.frame_count();
        let Some(player) = self.players.get_mut(index) else {
            log::warn!("sample trigger index {} out of range ({} loaded)", index, self.players.len());
            return false;
        };
        player.queue_trigger(down);
        if !down {
            // Releases take effect in the per-block pass
            return false;
        }
        let Some(mut io) = stream.port_buffers(0, 0) else {
            return false;
        };
        player.catch_up(&mut io, frames)
    }

    /// Advance every player's active cursors over this block
    pub fn process_block(&mut self, stream: &mut dyn BlockBuffers) {
        let frames = stream.frame_count();
        if frames == 0 || self.players.is_empty() {
            return;
        }
        let Some(mut io) = stream.port_buffers(0, 0) else {
            return;
        };
        for player in &mut self.players {
            player.advance_block(&mut io, frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SampleData, SampleProperties};
    use crate::stream::HostBlockStream;
    use crate::types::StereoFrame;

    fn manager_with(len: usize, props: SampleProperties) -> SampleManager {
        let data = SampleData::new("clap.wav", (0..len).map(|i| StereoFrame::mono(i as f32 + 1.0)).collect());
        SampleManager::new(vec![SamplePlayer::new(data, props, 0, 16)])
    }

    #[test]
    fn test_trigger_injects_whole_block_into_both_buffers() {
        let mut stream = HostBlockStream::new(1, 64, 48_000);
        stream.begin_block(8);
        let mut manager = manager_with(4, SampleProperties::default());

        let dirty = manager.trigger(&mut stream, 0, true);
        assert!(dirty);

        let out: Vec<f32> = stream.output_mut(0).unwrap().to_vec();
        let inp: Vec<f32> = stream.input_mut(0).unwrap().to_vec();
        // Sample shorter than the block: the rest stays silent
        assert_eq!(&out[..8], &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);
        assert!(out[8..].iter().all(|s| *s == 0.0));
        assert_eq!(inp, out);
    }

    #[test]
    fn test_process_block_does_not_double_advance_triggered_cursor() {
        let mut stream = HostBlockStream::new(1, 64, 48_000);
        stream.begin_block(4);
        let mut manager = manager_with(64, SampleProperties::default());

        manager.trigger(&mut stream, 0, true);
        manager.process_block(&mut stream);

        // Only the first four frames of the sample sounded this block
        let out: Vec<f32> = stream.output_mut(0).unwrap().to_vec();
        assert_eq!(&out[..8], &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);

        // The next block continues where the trigger block left off
        stream.clear_outputs();
        stream.begin_block(4);
        manager.process_block(&mut stream);
        let out: Vec<f32> = stream.output_mut(0).unwrap().to_vec();
        assert_eq!(&out[..2], &[5.0, 5.0]);
    }

    #[test]
    fn test_out_of_range_index_is_a_traced_no_op() {
        let mut stream = HostBlockStream::new(1, 64, 48_000);
        stream.begin_block(8);
        let mut manager = manager_with(4, SampleProperties::default());

        assert!(!manager.trigger(&mut stream, 5, true));
        let out: Vec<f32> = stream.output_mut(0).unwrap().to_vec();
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
