//! Host parameter bridge
//!
//! Plugin-host automation is just another action source. Inbound changes
//! cross into the kernel over a wait-free SPSC ring and are translated into
//! the same action representation UI and MIDI use; outbound values the block
//! produced travel back over a second ring for the host to publish.

use crate::engine::ParamChange;

/// Slots per direction; automation bursts stay well under this per block
pub const PARAM_QUEUE_CAPACITY: usize = 256;

/// Kernel-side ends of the bridge
pub struct ParamBridge {
    pub(crate) inbound: rtrb::Consumer<ParamChange>,
    pub(crate) outbound: rtrb::Producer<ParamChange>,
}

/// Host-side ends of the bridge
///
/// Owned by the plugin wrapper (or a test); both calls are wait-free.
pub struct HostParamPort {
    to_kernel: rtrb::Producer<ParamChange>,
    from_kernel: rtrb::Consumer<ParamChange>,
}

impl HostParamPort {
    /// Queue an automation write toward the kernel
    ///
    /// Returns false if the ring is full; the change is dropped and the
    /// host's next write supersedes it anyway.
    pub fn set_parameter(&mut self, change: ParamChange) -> bool {
        self.to_kernel.push(change).is_ok()
    }

    /// Next engine-produced parameter update, if any
    pub fn poll_update(&mut self) -> Option<ParamChange> {
        self.from_kernel.pop().ok()
    }
}

/// Create a connected host/kernel bridge pair
pub fn param_bridge() -> (HostParamPort, ParamBridge) {
    let (to_kernel, inbound) = rtrb::RingBuffer::new(PARAM_QUEUE_CAPACITY);
    let (outbound, from_kernel) = rtrb::RingBuffer::new(PARAM_QUEUE_CAPACITY);
    (
        HostParamPort { to_kernel, from_kernel },
        ParamBridge { inbound, outbound },
    )
}
