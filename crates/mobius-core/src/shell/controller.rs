//! Shell-side controller and maintenance thread

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::action::ActionRecord;
use crate::config::{ConfigSnapshot, ScriptLibrary, SessionSnapshot};
use crate::engine::EngineEvent;
use crate::kernel::SuspendGate;
use crate::midi::{BindingTable, MidiMessage, MidiSequence};
use crate::msg::{Communicator, MessagePayload, QueueStats};
use crate::sample::SampleManager;
use crate::types::AudioClip;

/// Errors surfaced to shell-side callers
#[derive(Error, Debug)]
pub enum ShellError {
    /// The message pool had nothing free; the control request was dropped
    #[error("message pool exhausted, control message dropped")]
    PoolExhausted,

    /// The kernel never acknowledged a suspend request
    ///
    /// The operation that needed the frozen state must abort; proceeding
    /// would race the audio thread.
    #[error("kernel did not reach suspended state within {waited:?}")]
    SuspendTimeout { waited: Duration },
}

/// Result type for shell operations
pub type ShellResult<T> = Result<T, ShellError>;

/// Notifications fanned out to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellEvent {
    /// The engine raised an event (loop boundary, save request, ...)
    Engine(EngineEvent),
}

/// The non-real-time counterpart of the kernel dispatcher
///
/// Every method is callable from any shell thread; the UI event thread and
/// the maintenance timer serialize on the communicator's mutex, which is the
/// only state they share.
pub struct ShellController {
    comm: Arc<Communicator>,
    gate: Arc<SuspendGate>,
    events: crossbeam::channel::Sender<ShellEvent>,
}

impl ShellController {
    pub fn new(
        comm: Arc<Communicator>,
        gate: Arc<SuspendGate>,
        events: crossbeam::channel::Sender<ShellEvent>,
    ) -> Self {
        Self { comm, gate, events }
    }

    // ─────────────────────────────────────────────────────────────
    // Sending toward the kernel
    // ─────────────────────────────────────────────────────────────

    fn send(&self, payload: MessagePayload) -> ShellResult<()> {
        let Some(mut msg) = self.comm.shell_alloc() else {
            return Err(ShellError::PoolExhausted);
        };
        msg.set_payload(payload);
        self.comm.shell_send(msg);
        Ok(())
    }

    /// Queue one action for the kernel's next block
    pub fn send_action(&self, action: ActionRecord) -> ShellResult<()> {
        self.send(MessagePayload::Action(action))
    }

    /// Install a new configuration snapshot
    pub fn install_config(&self, config: ConfigSnapshot) -> ShellResult<()> {
        self.send(MessagePayload::Configure(Box::new(config)))
    }

    /// Install a new session snapshot
    pub fn install_session(&self, session: SessionSnapshot) -> ShellResult<()> {
        self.send(MessagePayload::Session(Box::new(session)))
    }

    /// Install a freshly compiled sample manager
    pub fn install_samples(&self, samples: SampleManager) -> ShellResult<()> {
        self.send(MessagePayload::Samples(Box::new(samples)))
    }

    /// Install a freshly compiled script library
    pub fn install_scripts(&self, scripts: ScriptLibrary) -> ShellResult<()> {
        self.send(MessagePayload::Scripts(Box::new(scripts)))
    }

    /// Install a freshly compiled MIDI binding table
    pub fn install_bindings(&self, bindings: BindingTable) -> ShellResult<()> {
        self.send(MessagePayload::Bindings(Box::new(bindings)))
    }

    /// Replace a loop's audio content
    pub fn load_loop(&self, track: usize, loop_index: usize, clip: AudioClip) -> ShellResult<()> {
        self.send(MessagePayload::LoadLoop { track, loop_index, clip })
    }

    /// Replace a loop's MIDI content
    pub fn load_midi(
        &self,
        track: usize,
        loop_index: usize,
        sequence: MidiSequence,
    ) -> ShellResult<()> {
        self.send(MessagePayload::MidiLoad { track, loop_index, sequence })
    }

    /// Forward a shell-received MIDI message into the kernel's MIDI path
    pub fn send_midi(&self, midi: MidiMessage) -> ShellResult<()> {
        self.send(MessagePayload::Midi(midi))
    }

    /// Return a completed engine event to the kernel
    pub fn complete_event(&self, event: EngineEvent) -> ShellResult<()> {
        self.send(MessagePayload::Event(event))
    }

    // ─────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────

    /// One maintenance pass: top up the pool, verify accounting, drain
    /// kernel messages in submission order
    ///
    /// Returned snapshots from swaps die here, on a thread where freeing
    /// them is harmless. Engine events fan out to the UI channel; a full
    /// channel drops the event with a trace rather than blocking.
    pub fn perform_maintenance(&self) {
        maintenance_pass(&self.comm, &self.events);
    }

    /// Spawn the periodic maintenance thread
    pub fn start_maintenance(&self, interval: Duration) -> MaintenanceHandle {
        let comm = Arc::clone(&self.comm);
        let events = self.events.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let thread = std::thread::Builder::new()
            .name("mobius-maintenance".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    maintenance_pass(&comm, &events);
                    std::thread::sleep(interval);
                }
            })
            .expect("failed to spawn maintenance thread");

        MaintenanceHandle { shutdown, thread: Some(thread) }
    }

    // ─────────────────────────────────────────────────────────────
    // Suspend control surface
    // ─────────────────────────────────────────────────────────────

    /// Freeze the kernel at its next block boundary
    ///
    /// Blocks the calling shell thread until the kernel acknowledges or the
    /// timeout passes. On timeout the request is rolled back and the caller
    /// must abort whatever needed the frozen state.
    pub fn suspend(&self, timeout: Duration) -> ShellResult<()> {
        self.gate.request_suspend();
        if self.gate.wait_suspended(timeout) {
            Ok(())
        } else {
            self.gate.request_resume();
            Err(ShellError::SuspendTimeout { waited: timeout })
        }
    }

    /// Let the kernel run again after a successful suspend
    pub fn resume(&self) {
        self.gate.request_resume();
    }

    pub fn is_suspended(&self) -> bool {
        self.gate.is_suspended()
    }

    /// Message accounting snapshot for diagnostics panels
    pub fn stats(&self) -> QueueStats {
        self.comm.stats()
    }
}

/// One maintenance pass over the communicator
fn maintenance_pass(comm: &Communicator, events: &crossbeam::channel::Sender<ShellEvent>) {
    comm.check_capacity();
    comm.check_balance();

    while let Some(mut msg) = comm.shell_receive(true) {
        match msg.take_payload() {
            MessagePayload::Event(event) => {
                if events.try_send(ShellEvent::Engine(event)).is_err() {
                    log::warn!("shell event channel full, dropping {:?}", event.kind);
                }
            }
            MessagePayload::None => {}
            // Everything else is a returned payload coming back for
            // disposal after the kernel swapped in its replacement.
            returned => {
                log::debug!("disposing returned {:?} payload", returned.kind());
                drop(returned);
            }
        }
        comm.shell_abandon(msg);
    }
}

/// Handle to the running maintenance thread
///
/// Dropping the handle stops the thread.
pub struct MaintenanceHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Stop the maintenance loop and wait for it to finish
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionRecord, FunctionId};
    use crate::engine::EngineEventKind;
    use crate::msg::MessageKind;

    fn shell() -> (ShellController, crossbeam::channel::Receiver<ShellEvent>, Arc<Communicator>, Arc<SuspendGate>) {
        let comm = Arc::new(Communicator::new());
        let gate = Arc::new(SuspendGate::new());
        let (tx, rx) = crossbeam::channel::bounded(64);
        let controller = ShellController::new(Arc::clone(&comm), Arc::clone(&gate), tx);
        (controller, rx, comm, gate)
    }

    #[test]
    fn test_send_action_reaches_kernel_queue() {
        let (controller, _rx, comm, _gate) = shell();
        comm.check_capacity();

        controller.send_action(ActionRecord::function(FunctionId::Record)).unwrap();
        let msg = comm.kernel_receive().unwrap();
        assert_eq!(msg.kind(), MessageKind::Action);
        comm.kernel_abandon(msg);
        assert!(comm.check_balance());
    }

    #[test]
    fn test_maintenance_builds_pool_and_fans_out_events() {
        let (controller, rx, comm, _gate) = shell();

        // First tick builds the pool
        controller.perform_maintenance();
        assert!(controller.stats().total_created > 0);

        // Kernel posts two events; the ordered drain preserves their order
        for track in [1, 2] {
            let mut msg = comm.kernel_alloc();
            msg.set_payload(MessagePayload::Event(EngineEvent {
                kind: EngineEventKind::LoopBoundary,
                track,
                argument: 0,
            }));
            comm.kernel_send(msg);
        }
        controller.perform_maintenance();

        let tracks: Vec<usize> = rx
            .try_iter()
            .map(|e| match e {
                ShellEvent::Engine(ev) => ev.track,
            })
            .collect();
        assert_eq!(tracks, vec![1, 2]);
        assert!(comm.check_balance());
    }

    #[test]
    fn test_maintenance_disposes_returned_snapshots() {
        let (controller, rx, comm, _gate) = shell();
        controller.perform_maintenance();

        let mut msg = comm.kernel_alloc();
        msg.set_payload(MessagePayload::Configure(Box::new(ConfigSnapshot::default())));
        comm.kernel_send(msg);
        controller.perform_maintenance();

        assert!(rx.try_recv().is_err());
        let stats = controller.stats();
        assert_eq!(stats.shell_queued, 0);
        assert!(stats.balanced());
    }

    #[test]
    fn test_suspend_without_kernel_times_out_and_rolls_back() {
        let (controller, _rx, _comm, gate) = shell();
        let err = controller.suspend(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, ShellError::SuspendTimeout { .. }));
        // The rolled-back request must not suspend a later block
        assert!(!gate.observe_block());
    }

    #[test]
    fn test_suspend_succeeds_once_kernel_acknowledges() {
        let (controller, _rx, _comm, gate) = shell();

        let waiter = {
            let gate = Arc::clone(&gate);
            // Stand-in for the audio callback hitting block boundaries
            std::thread::spawn(move || {
                for _ in 0..500 {
                    if gate.observe_block() {
                        return true;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                false
            })
        };

        controller.suspend(Duration::from_millis(500)).unwrap();
        assert!(waiter.join().unwrap());
        assert!(controller.is_suspended());
        controller.resume();
        assert!(!controller.is_suspended());
    }

    #[test]
    fn test_maintenance_thread_runs_and_shuts_down() {
        let (controller, _rx, comm, _gate) = shell();
        let handle = controller.start_maintenance(Duration::from_millis(1));
        // Give the thread a couple of ticks to build the pool
        std::thread::sleep(Duration::from_millis(20));
        assert!(comm.stats().total_created > 0);
        handle.shutdown();
    }
}
