//! Per-block control loop
//!
//! ```text
//! ┌──────────────────┐                      ┌──────────────────────┐
//! │   Shell threads  │──shell_send()───────►│   Communicator       │
//! │  (UI, timer)     │                      │ (pooled, one mutex)  │
//! └──────────────────┘                      └──────────┬───────────┘
//!          ▲                                           │ kernel_receive()
//!          │ kernel_send() replies                     ▼
//! ┌──────────────────┐                      ┌──────────────────────┐
//! │  HostParamPort   │◄──rtrb rings────────►│  KernelDispatcher    │
//! │  (plugin layer)  │                      │ (owns the EngineCore)│
//! └──────────────────┘                      └──────────────────────┘
//! ```
//!
//! Block order: suspend check, block-size re-sync, message drain, MIDI,
//! sample injection, phase-two core prep, track processing, parameter
//! exchange, notification flush. A missing resource degrades one feature
//! for one block; nothing ever stops the loop.

use std::sync::Arc;

use crate::action::{ActionRecord, ActionSource, ActionTarget};
use crate::config::{ConfigSnapshot, ScriptLibrary, SessionSnapshot};
use crate::engine::{EngineCore, EngineEvent, ParamChange};
use crate::midi::{BindingTable, MidiMessage, MidiMonitor};
use crate::msg::{Communicator, KernelMessage, MessagePayload};
use crate::sample::SampleManager;
use crate::stream::AudioStream;

use super::params::{ParamBridge, PARAM_QUEUE_CAPACITY};
use super::suspend::SuspendGate;

/// Order-sensitive messages held back for replay within one drain.
/// Past this the drain degrades to dequeue order with a trace.
pub const ORDERED_SCRATCH: usize = 256;

/// MIDI messages consumed per block; hosts deliver far fewer
pub const MIDI_SCRATCH: usize = 256;

/// The real-time dispatcher; owns the engine core and every kernel-side
/// resource for one engine instance
pub struct KernelDispatcher<E: EngineCore> {
    core: E,
    comm: Arc<Communicator>,
    gate: Arc<SuspendGate>,
    params: ParamBridge,
    samples: Option<Box<SampleManager>>,
    bindings: Option<Box<BindingTable>>,
    config: Option<Box<ConfigSnapshot>>,
    session: Option<Box<SessionSnapshot>>,
    scripts: Option<Box<ScriptLibrary>>,
    monitor: Option<Box<dyn MidiMonitor>>,
    ordered_scratch: Vec<Box<KernelMessage>>,
    midi_scratch: Vec<MidiMessage>,
    param_scratch: Vec<ParamChange>,
    last_block_frames: usize,
}

impl<E: EngineCore> KernelDispatcher<E> {
    /// Assemble a dispatcher; all scratch space is reserved here, before the
    /// instance moves to the audio thread
    pub fn new(
        core: E,
        comm: Arc<Communicator>,
        gate: Arc<SuspendGate>,
        params: ParamBridge,
    ) -> Self {
        Self {
            core,
            comm,
            gate,
            params,
            samples: None,
            bindings: None,
            config: None,
            session: None,
            scripts: None,
            monitor: None,
            ordered_scratch: Vec::with_capacity(ORDERED_SCRATCH),
            midi_scratch: Vec::with_capacity(MIDI_SCRATCH),
            param_scratch: Vec::with_capacity(PARAM_QUEUE_CAPACITY),
            last_block_frames: 0,
        }
    }

    /// Install a MIDI monitor before processing starts
    pub fn install_monitor(&mut self, monitor: Box<dyn MidiMonitor>) {
        self.monitor = Some(monitor);
    }

    pub fn core(&self) -> &E {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut E {
        &mut self.core
    }

    /// The currently installed sample manager, if any
    pub fn samples(&self) -> Option<&SampleManager> {
        self.samples.as_deref()
    }

    /// Process one audio block; the host calls this once per real-time cycle
    pub fn process_block(&mut self, stream: &mut dyn AudioStream) {
        if self.gate.observe_block() {
            return;
        }

        // Some hosts change the block size mid-stream; latency compensation
        // must be re-derived before anything else touches this block.
        let frames = stream.frame_count();
        if frames != self.last_block_frames {
            self.core.block_size_changed(frames);
            self.last_block_frames = frames;
        }

        self.core.begin_block(frames);
        self.consume_messages(stream);
        self.consume_midi(stream);
        if let Some(samples) = self.samples.as_mut() {
            samples.process_block(stream);
        }
        // Scripts advance only after injected audio is in place, so their
        // side effects observe the fully prepared block.
        self.core.advance_block();
        self.core.process_audio(stream);
        self.exchange_params();
        self.flush_notifications();
    }

    /// Drain every queued shell message in one pass
    ///
    /// Immediate kinds are idempotent replacements and apply as they pop.
    /// Ordered kinds pop newest-first (the queue is a stack), so they are
    /// collected and replayed oldest-first to restore submission order.
    fn consume_messages(&mut self, stream: &mut dyn AudioStream) {
        while let Some(msg) = self.comm.kernel_receive() {
            if msg.kind().is_ordered() {
                if self.ordered_scratch.len() < ORDERED_SCRATCH {
                    self.ordered_scratch.push(msg);
                } else {
                    log::warn!("ordered message scratch full, applying out of order");
                    self.apply_message(stream, msg);
                }
            } else {
                self.apply_message(stream, msg);
            }
        }
        while let Some(msg) = self.ordered_scratch.pop() {
            self.apply_message(stream, msg);
        }
    }

    fn apply_message(&mut self, stream: &mut dyn AudioStream, mut msg: Box<KernelMessage>) {
        match msg.take_payload() {
            MessagePayload::None => self.comm.kernel_abandon(msg),

            // Snapshot swaps: install the new value, hand the old one back
            // in the same envelope so it is freed off the audio thread.
            MessagePayload::Configure(config) => {
                self.core.configure(&config);
                let old = self.config.replace(config);
                self.reply_or_abandon(msg, old.map(MessagePayload::Configure));
            }
            MessagePayload::Session(session) => {
                self.core.load_session(&session);
                let old = self.session.replace(session);
                self.reply_or_abandon(msg, old.map(MessagePayload::Session));
            }
            MessagePayload::Samples(samples) => {
                let old = self.samples.replace(samples);
                self.reply_or_abandon(msg, old.map(MessagePayload::Samples));
            }
            MessagePayload::Scripts(scripts) => {
                self.core.install_scripts(&scripts);
                let old = self.scripts.replace(scripts);
                self.reply_or_abandon(msg, old.map(MessagePayload::Scripts));
            }
            MessagePayload::Bindings(bindings) => {
                let old = self.bindings.replace(bindings);
                self.reply_or_abandon(msg, old.map(MessagePayload::Bindings));
            }

            // Content loads: the core copies what it needs, the payload goes
            // back to the shell for disposal.
            MessagePayload::LoadLoop { track, loop_index, clip } => {
                self.core.load_loop(track, loop_index, &clip);
                msg.set_payload(MessagePayload::LoadLoop { track, loop_index, clip });
                self.comm.kernel_send(msg);
            }
            MessagePayload::MidiLoad { track, loop_index, sequence } => {
                self.core.load_midi(track, loop_index, &sequence);
                msg.set_payload(MessagePayload::MidiLoad { track, loop_index, sequence });
                self.comm.kernel_send(msg);
            }

            // Ordered kinds
            MessagePayload::Action(action) => match self.perform_action(stream, &action) {
                Some(event) => {
                    msg.set_payload(MessagePayload::Event(event));
                    self.comm.kernel_send(msg);
                }
                None => self.comm.kernel_abandon(msg),
            },
            MessagePayload::Event(event) => {
                self.core.complete_event(&event);
                self.comm.kernel_abandon(msg);
            }
            MessagePayload::Midi(midi) => {
                self.handle_midi(stream, &midi);
                self.comm.kernel_abandon(msg);
            }
        }
    }

    /// The single action-application path for every control source
    fn perform_action(
        &mut self,
        stream: &mut dyn AudioStream,
        action: &ActionRecord,
    ) -> Option<EngineEvent> {
        if let ActionTarget::Sample(index) = action.target {
            match self.samples.as_mut() {
                Some(samples) => {
                    if samples.trigger(stream, index, action.down) {
                        log::trace!("sample trigger rewrote the live input buffer");
                    }
                }
                None => log::warn!("sample trigger with no sample library installed"),
            }
            return None;
        }
        self.core.apply_action(action)
    }

    /// Consume this block's MIDI from the stream
    fn consume_midi(&mut self, stream: &mut dyn AudioStream) {
        let mut scratch = std::mem::take(&mut self.midi_scratch);
        scratch.clear();
        let block = stream.block_midi();
        if block.len() > MIDI_SCRATCH {
            log::warn!("{} MIDI messages in one block, consuming first {}", block.len(), MIDI_SCRATCH);
        }
        scratch.extend(block.iter().take(MIDI_SCRATCH).copied());

        for midi in &scratch {
            self.handle_midi(stream, midi);
        }
        self.midi_scratch = scratch;
    }

    fn handle_midi(&mut self, stream: &mut dyn AudioStream, midi: &MidiMessage) {
        let vetoed = self
            .monitor
            .as_mut()
            .map(|m| m.intercept(midi))
            .unwrap_or(false);

        if !vetoed {
            let action = self.bindings.as_deref().and_then(|b| b.resolve(midi));
            if let Some(action) = action {
                if let Some(event) = self.perform_action(stream, &action) {
                    self.send_event(event);
                }
            }
        }

        // The core's MIDI tracks hear everything, bound or not
        self.core.receive_midi(midi);
    }

    /// Publish block-produced parameter values, then apply inbound host
    /// automation through the normal action path; for each parameter only
    /// the last write in the batch is applied
    fn exchange_params(&mut self) {
        let core = &mut self.core;
        let outbound = &mut self.params.outbound;
        core.publish_params(&mut |change| {
            if outbound.push(change).is_err() {
                log::warn!("host parameter update ring full, dropping update");
            }
        });

        let mut scratch = std::mem::take(&mut self.param_scratch);
        scratch.clear();
        while let Ok(change) = self.params.inbound.pop() {
            scratch.push(change);
        }
        for i in 0..scratch.len() {
            let change = scratch[i];
            if scratch[i + 1..].iter().any(|later| later.param == change.param) {
                continue;
            }
            let action = ActionRecord::parameter(change.param, change.value, ActionSource::Host);
            if let Some(event) = self.core.apply_action(&action) {
                self.send_event(event);
            }
        }
        self.param_scratch = scratch;
    }

    /// Forward queued track notifications to the shell
    fn flush_notifications(&mut self) {
        let comm = Arc::clone(&self.comm);
        self.core.drain_notifications(&mut |event| {
            let mut msg = comm.kernel_alloc();
            msg.set_payload(MessagePayload::Event(event));
            comm.kernel_send(msg);
        });
    }

    fn send_event(&mut self, event: EngineEvent) {
        let mut msg = self.comm.kernel_alloc();
        msg.set_payload(MessagePayload::Event(event));
        self.comm.kernel_send(msg);
    }

    fn reply_or_abandon(&mut self, mut msg: Box<KernelMessage>, reply: Option<MessagePayload>) {
        match reply {
            Some(payload) => {
                msg.set_payload(payload);
                self.comm.kernel_send(msg);
            }
            None => self.comm.kernel_abandon(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionRecord, FunctionId, ParamId};
    use crate::engine::testing::{CoreCall, RecordingCore};
    use crate::engine::{EngineEventKind, ParamChange};
    use crate::kernel::params::param_bridge;
    use crate::kernel::HostParamPort;
    use crate::midi::{BindingTrigger, MidiBinding, MidiDeviceId};
    use crate::msg::MessageKind;
    use crate::sample::{SampleData, SamplePlayer, SampleProperties};
    use crate::stream::HostBlockStream;
    use crate::types::StereoFrame;

    struct Rig {
        comm: Arc<Communicator>,
        gate: Arc<SuspendGate>,
        host: HostParamPort,
        dispatcher: KernelDispatcher<RecordingCore>,
        stream: HostBlockStream,
    }

    fn rig() -> Rig {
        let comm = Arc::new(Communicator::new());
        comm.check_capacity();
        let gate = Arc::new(SuspendGate::new());
        let (host, bridge) = param_bridge();
        let dispatcher = KernelDispatcher::new(
            RecordingCore::default(),
            Arc::clone(&comm),
            Arc::clone(&gate),
            bridge,
        );
        Rig {
            comm,
            gate,
            host,
            dispatcher,
            stream: HostBlockStream::new(1, 256, 48_000),
        }
    }

    fn send(comm: &Communicator, payload: MessagePayload) {
        let mut msg = comm.shell_alloc().unwrap();
        msg.set_payload(payload);
        comm.shell_send(msg);
    }

    fn run_block(rig: &mut Rig, frames: usize) {
        rig.stream.begin_block(frames);
        rig.dispatcher.process_block(&mut rig.stream);
        rig.stream.end_block();
    }

    fn param_action(i: usize) -> ActionRecord {
        ActionRecord::parameter(ParamId(i), i as f32, crate::action::ActionSource::Ui)
    }

    #[test]
    fn test_actions_replay_in_submission_order() {
        let mut rig = rig();
        for i in [1, 2, 3] {
            send(&rig.comm, MessagePayload::Action(param_action(i)));
        }
        run_block(&mut rig, 64);

        let applied = rig.dispatcher.core().actions();
        assert_eq!(applied, vec![param_action(1), param_action(2), param_action(3)]);
    }

    #[test]
    fn test_suspend_freezes_dispatch_until_resume() {
        let mut rig = rig();
        send(&rig.comm, MessagePayload::Action(param_action(1)));

        rig.gate.request_suspend();
        run_block(&mut rig, 64);
        assert!(rig.gate.is_suspended());
        assert!(rig.dispatcher.core().calls.is_empty());
        assert_eq!(rig.comm.stats().kernel_queued, 1);

        run_block(&mut rig, 64);
        assert!(rig.dispatcher.core().calls.is_empty());

        rig.gate.request_resume();
        run_block(&mut rig, 64);
        assert_eq!(rig.dispatcher.core().actions(), vec![param_action(1)]);
    }

    #[test]
    fn test_snapshot_swap_returns_old_to_shell() {
        let mut rig = rig();
        let first = ConfigSnapshot { track_count: 4, ..Default::default() };
        let second = ConfigSnapshot { track_count: 6, ..Default::default() };

        send(&rig.comm, MessagePayload::Configure(Box::new(first.clone())));
        run_block(&mut rig, 64);
        // First install has nothing to return
        assert!(rig.comm.shell_receive(false).is_none());

        send(&rig.comm, MessagePayload::Configure(Box::new(second.clone())));
        run_block(&mut rig, 64);
        let mut returned = rig.comm.shell_receive(false).unwrap();
        match returned.take_payload() {
            MessagePayload::Configure(old) => assert_eq!(*old, first),
            other => panic!("unexpected payload {:?}", other),
        }
        rig.comm.shell_abandon(returned);

        let configures: Vec<_> = rig
            .dispatcher
            .core()
            .calls
            .iter()
            .filter(|c| matches!(c, CoreCall::Configure(_)))
            .collect();
        assert_eq!(configures.len(), 2);
        assert!(rig.comm.check_balance());
    }

    #[test]
    fn test_load_loop_applies_then_returns_clip() {
        let mut rig = rig();
        let clip = crate::types::AudioClip::new(vec![StereoFrame::mono(0.1); 32], 48_000);
        send(&rig.comm, MessagePayload::LoadLoop { track: 2, loop_index: 1, clip });
        run_block(&mut rig, 64);

        assert!(rig
            .dispatcher
            .core()
            .calls
            .contains(&CoreCall::LoadLoop { track: 2, loop_index: 1, frames: 32 }));

        let mut returned = rig.comm.shell_receive(false).unwrap();
        assert_eq!(returned.kind(), MessageKind::LoadLoop);
        returned.take_payload();
        rig.comm.shell_abandon(returned);
    }

    #[test]
    fn test_midi_binding_fires_action_and_always_forwards() {
        let mut rig = rig();
        let table = BindingTable::new(vec![MidiBinding {
            trigger: BindingTrigger::Note(60),
            channel: None,
            device: None,
            target: ActionTarget::Function(FunctionId::Record),
            track: Some(0),
        }]);
        send(&rig.comm, MessagePayload::Bindings(Box::new(table)));
        run_block(&mut rig, 64);

        let bound = MidiMessage::new(MidiDeviceId(0), 0x90, 60, 100);
        let unbound = MidiMessage::new(MidiDeviceId(0), 0x90, 61, 100);
        rig.stream.push_midi(bound);
        rig.stream.push_midi(unbound);
        run_block(&mut rig, 64);

        let calls = &rig.dispatcher.core().calls;
        // The bound note produced an action; both notes reached the core
        assert_eq!(rig.dispatcher.core().actions().len(), 1);
        assert!(calls.contains(&CoreCall::Midi(bound)));
        assert!(calls.contains(&CoreCall::Midi(unbound)));
    }

    struct VetoAll;
    impl MidiMonitor for VetoAll {
        fn intercept(&mut self, _msg: &MidiMessage) -> bool {
            true
        }
    }

    #[test]
    fn test_monitor_veto_blocks_binding_but_not_core() {
        let mut rig = rig();
        let table = BindingTable::new(vec![MidiBinding {
            trigger: BindingTrigger::Note(60),
            channel: None,
            device: None,
            target: ActionTarget::Function(FunctionId::Record),
            track: None,
        }]);
        send(&rig.comm, MessagePayload::Bindings(Box::new(table)));
        rig.dispatcher.install_monitor(Box::new(VetoAll));

        let msg = MidiMessage::new(MidiDeviceId(0), 0x90, 60, 100);
        rig.stream.push_midi(msg);
        run_block(&mut rig, 64);

        assert!(rig.dispatcher.core().actions().is_empty());
        assert!(rig.dispatcher.core().calls.contains(&CoreCall::Midi(msg)));
    }

    #[test]
    fn test_action_completion_replies_to_shell() {
        let mut rig = rig();
        rig.dispatcher.core_mut().reply_to_actions = true;

        send(&rig.comm, MessagePayload::Action(ActionRecord::function(FunctionId::Record).on_track(5)));
        run_block(&mut rig, 64);

        let mut reply = rig.comm.shell_receive(false).unwrap();
        match reply.take_payload() {
            MessagePayload::Event(e) => {
                assert_eq!(e.kind, EngineEventKind::Completed);
                assert_eq!(e.track, 5);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        rig.comm.shell_abandon(reply);
        assert!(rig.comm.check_balance());
    }

    #[test]
    fn test_event_reply_completes_in_core() {
        let mut rig = rig();
        let event = EngineEvent { kind: EngineEventKind::SaveLoop, track: 1, argument: 9 };
        send(&rig.comm, MessagePayload::Event(event));
        run_block(&mut rig, 64);
        assert!(rig.dispatcher.core().calls.contains(&CoreCall::CompleteEvent(event)));
    }

    #[test]
    fn test_host_params_last_write_wins_and_publishes() {
        let mut rig = rig();
        rig.host.set_parameter(ParamChange { param: ParamId(4), value: 0.2 });
        rig.host.set_parameter(ParamChange { param: ParamId(4), value: 0.9 });
        rig.host.set_parameter(ParamChange { param: ParamId(5), value: 0.5 });
        rig.dispatcher.core_mut().pending_params =
            vec![ParamChange { param: ParamId(7), value: 0.3 }];

        run_block(&mut rig, 64);

        let actions = rig.dispatcher.core().actions();
        assert_eq!(actions.len(), 2);
        match actions[0].target {
            ActionTarget::Parameter(id, v) => {
                assert_eq!(id, ParamId(4));
                assert!((v - 0.9).abs() < 1e-6);
            }
            _ => panic!("wrong target"),
        }
        assert_eq!(actions[0].source, crate::action::ActionSource::Host);

        let update = rig.host.poll_update().unwrap();
        assert_eq!(update.param, ParamId(7));
    }

    #[test]
    fn test_notifications_flush_to_shell() {
        let mut rig = rig();
        let event = EngineEvent { kind: EngineEventKind::LoopBoundary, track: 3, argument: 0 };
        rig.dispatcher.core_mut().pending_notifications = vec![event];
        run_block(&mut rig, 64);

        let mut msg = rig.comm.shell_receive(false).unwrap();
        match msg.take_payload() {
            MessagePayload::Event(e) => assert_eq!(e, event),
            other => panic!("unexpected payload {:?}", other),
        }
        rig.comm.shell_abandon(msg);
    }

    #[test]
    fn test_block_size_change_resyncs_latency_once() {
        let mut rig = rig();
        run_block(&mut rig, 64);
        run_block(&mut rig, 64);
        run_block(&mut rig, 128);

        let resyncs: Vec<_> = rig
            .dispatcher
            .core()
            .calls
            .iter()
            .filter_map(|c| match c {
                CoreCall::BlockSizeChanged(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(resyncs, vec![64, 128]);
    }

    #[test]
    fn test_sample_trigger_action_injects_audio() {
        let mut rig = rig();
        let data = SampleData::new(
            "kick.wav",
            (0..16).map(|i| StereoFrame::mono(i as f32 + 1.0)).collect(),
        );
        let manager = SampleManager::new(vec![SamplePlayer::new(
            data,
            SampleProperties::default(),
            0,
            4,
        )]);
        send(&rig.comm, MessagePayload::Samples(Box::new(manager)));
        send(&rig.comm, MessagePayload::Action(ActionRecord::sample(0, true, crate::action::ActionSource::Ui)));
        run_block(&mut rig, 8);

        let out: Vec<f32> = rig.stream.output_mut(0).unwrap().to_vec();
        let inp: Vec<f32> = rig.stream.input_mut(0).unwrap().to_vec();
        assert_eq!(&out[..4], &[1.0, 1.0, 2.0, 2.0]);
        assert_eq!(inp, out);

        // Out-of-range trigger is a traced no-op
        send(&rig.comm, MessagePayload::Action(ActionRecord::sample(9, true, crate::action::ActionSource::Ui)));
        run_block(&mut rig, 8);
        assert!(rig.comm.check_balance());
    }
}
