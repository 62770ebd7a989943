//! Engine instance composition
//!
//! One builder wires a shell controller, a kernel dispatcher, the host
//! parameter port and the UI event channel around a shared communicator and
//! suspend gate. Nothing is process-global: tests and multi-instance hosts
//! build as many engines as they need.
//!
//! Construction is the only moment the two sides share anything beyond the
//! communicator: the message pool is warmed here, before the kernel half
//! moves to the audio thread, and from then on every interaction flows
//! through messages, the parameter rings, or the suspend gate.

use std::sync::Arc;

use crate::engine::EngineCore;
use crate::kernel::{param_bridge, HostParamPort, KernelDispatcher, SuspendGate};
use crate::msg::Communicator;
use crate::shell::{ShellController, ShellEvent};

/// Default capacity of the UI-bound event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// One fully wired engine instance
pub struct MobiusEngine<E: EngineCore> {
    /// Non-real-time control surface; stays with the UI
    pub shell: ShellController,
    /// Real-time half; moves to the audio thread
    pub kernel: KernelDispatcher<E>,
    /// Parameter endpoints for the plugin wrapper
    pub host_params: HostParamPort,
    /// UI-bound notifications drained by the frontend
    pub events: crossbeam::channel::Receiver<ShellEvent>,
}

/// Builder for one engine instance
pub struct EngineBuilder {
    event_capacity: usize,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { event_capacity: DEFAULT_EVENT_CAPACITY }
    }

    /// Capacity of the UI event channel
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Wire everything around the given engine core
    pub fn build<E: EngineCore>(self, core: E) -> MobiusEngine<E> {
        let comm = Arc::new(Communicator::new());
        // Warm the pool now; the kernel must never pay for initial growth
        comm.check_capacity();

        let gate = Arc::new(SuspendGate::new());
        let (host_params, bridge) = param_bridge();
        let (event_tx, events) = crossbeam::channel::bounded(self.event_capacity);

        let shell = ShellController::new(Arc::clone(&comm), Arc::clone(&gate), event_tx);
        let kernel = KernelDispatcher::new(core, comm, gate, bridge);

        MobiusEngine { shell, kernel, host_params, events }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionRecord, ActionSource, ParamId};
    use crate::engine::testing::RecordingCore;
    use crate::engine::EngineEventKind;
    use crate::sample::{SampleData, SampleManager, SamplePlayer, SampleProperties};
    use crate::shell::ShellError;
    use crate::stream::HostBlockStream;
    use crate::types::StereoFrame;
    use std::time::Duration;

    fn ramp_manager(len: usize) -> SampleManager {
        let data = SampleData::new(
            "ramp.wav",
            (0..len).map(|i| StereoFrame::mono(i as f32 + 1.0)).collect(),
        );
        SampleManager::new(vec![SamplePlayer::new(data, SampleProperties::default(), 0, 16)])
    }

    #[test]
    fn test_instances_are_independent() {
        let a = EngineBuilder::new().build(RecordingCore::default());
        let b = EngineBuilder::new().build(RecordingCore::default());

        a.shell.send_action(ActionRecord::parameter(ParamId(1), 0.5, ActionSource::Ui)).unwrap();
        assert_eq!(a.shell.stats().kernel_queued, 1);
        assert_eq!(b.shell.stats().kernel_queued, 0);
    }

    #[test]
    fn test_action_sweep_applies_in_submission_order() {
        let mut engine = EngineBuilder::new().build(RecordingCore::default());
        let mut stream = HostBlockStream::new(1, 128, 48_000);

        for i in 1..=3 {
            engine
                .shell
                .send_action(ActionRecord::parameter(ParamId(i), i as f32 * 0.1, ActionSource::Ui))
                .unwrap();
        }
        stream.begin_block(64);
        engine.kernel.process_block(&mut stream);

        let applied = engine.kernel.core().actions();
        let ids: Vec<usize> = applied
            .iter()
            .map(|a| match a.target {
                crate::action::ActionTarget::Parameter(ParamId(i), _) => i,
                _ => panic!("wrong target"),
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_sample_trigger_fills_output_and_input_alike() {
        let mut engine = EngineBuilder::new().build(RecordingCore::default());
        let mut stream = HostBlockStream::new(1, 128, 48_000);

        engine.shell.install_samples(ramp_manager(4)).unwrap();
        engine.shell.send_action(ActionRecord::sample(0, true, ActionSource::Ui)).unwrap();

        // Triggers land on block boundaries: the whole block plays at once
        stream.begin_block(8);
        engine.kernel.process_block(&mut stream);

        let out: Vec<f32> = stream.output_mut(0).unwrap().to_vec();
        let inp: Vec<f32> = stream.input_mut(0).unwrap().to_vec();
        // Sample shorter than the block: zero-padded after its 4 frames
        assert_eq!(&out[..8], &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);
        assert!(out[8..].iter().all(|s| *s == 0.0));
        assert_eq!(inp, out);
    }

    #[test]
    fn test_suspend_blocks_dispatch_and_resume_recovers() {
        let MobiusEngine { shell, mut kernel, .. } =
            EngineBuilder::new().build(RecordingCore::default());
        let mut stream = HostBlockStream::new(1, 128, 48_000);

        // With no audio callback running the request times out, rolls back,
        // and the caller aborts its file operation
        let err = shell.suspend(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, ShellError::SuspendTimeout { .. }));

        // With a callback servicing blocks, the handshake completes
        let suspender = std::thread::spawn(move || {
            shell.suspend(Duration::from_millis(500)).expect("suspend");
            shell
        });
        while !suspender.is_finished() {
            stream.begin_block(32);
            kernel.process_block(&mut stream);
            std::thread::sleep(Duration::from_millis(1));
        }
        let shell = suspender.join().unwrap();
        assert!(shell.is_suspended());

        // Every block while suspended is a no-op: no drain, no core calls
        shell.send_action(ActionRecord::parameter(ParamId(1), 0.1, ActionSource::Ui)).unwrap();
        let frozen = kernel.core().calls.len();
        for _ in 0..3 {
            stream.begin_block(32);
            kernel.process_block(&mut stream);
        }
        assert_eq!(kernel.core().calls.len(), frozen);
        assert_eq!(shell.stats().kernel_queued, 1);

        shell.resume();
        stream.begin_block(32);
        kernel.process_block(&mut stream);
        assert_eq!(kernel.core().actions().len(), 1);
    }

    #[test]
    fn test_engine_event_reaches_ui_channel() {
        let mut engine = EngineBuilder::new().build(RecordingCore::default());
        let mut stream = HostBlockStream::new(1, 128, 48_000);

        engine.kernel.core_mut().pending_notifications = vec![crate::engine::EngineEvent {
            kind: EngineEventKind::SaveLoop,
            track: 2,
            argument: 1,
        }];
        stream.begin_block(32);
        engine.kernel.process_block(&mut stream);

        engine.shell.perform_maintenance();
        match engine.events.try_recv().unwrap() {
            ShellEvent::Engine(event) => {
                assert_eq!(event.kind, EngineEventKind::SaveLoop);
                assert_eq!(event.track, 2);
            }
        }
        assert!(engine.shell.stats().balanced());
    }
}
