//! Queue identity and per-operation parameter types shared by
//! [`crate::mbuf_exchange`], the scheduler builders, and the executors.

use gehete_drv_core::DeviceType;

/// Sentinel `queue_id` meaning "no queue" — an output slot that should be
/// dropped rather than delivered anywhere.
pub const NO_QUEUE: u32 = u32::MAX;

/// Identity of a queue endpoint. Immutable once a queue is bound to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAttrs {
    pub queue_id: u32,
    pub device_id: i32,
    pub device_type: DeviceType,
    pub global_logic_id: u32,
}

impl QueueAttrs {
    pub fn is_none(&self) -> bool {
        self.queue_id == NO_QUEUE
    }
}

/// Parameters used to create a queue.
#[derive(Debug, Clone, Copy)]
pub struct MemQueueAttr {
    pub depth: u32,
    pub overwrite: bool,
    pub is_client: bool,
}

impl Default for MemQueueAttr {
    fn default() -> MemQueueAttr {
        MemQueueAttr { depth: 2, overwrite: false, is_client: false }
    }
}

/// Per-buffer entry for the scatter-gather enqueue overload. An empty slice
/// (`len() == 0`) contributes no bytes but is still a valid list entry,
/// matching the source's tolerance for a trailing `{nullptr, 0}` slot.
pub struct BufInfo<'a> {
    pub bytes: &'a [u8],
}

/// Per-operation parameters threaded through enqueue/dequeue.
#[derive(Debug, Clone)]
pub struct ControlInfo {
    /// `-1` waits forever, `0` is non-blocking best-effort, otherwise a
    /// millisecond budget.
    pub timeout_ms: i32,
    pub is_shared_input: bool,
    pub skip_size: usize,
    /// Suppresses error-level logging when a negative return is expected
    /// (producer operating in speculative mode).
    pub print_error_flag: bool,
    pub user_data: [u8; 64],
    /// `0` requests an auto-assigned transaction id.
    pub user_trans_id: u64,
    /// Populated by `dequeue` on return.
    pub end_of_sequence_flag: bool,
}

impl Default for ControlInfo {
    fn default() -> ControlInfo {
        ControlInfo {
            timeout_ms: -1,
            is_shared_input: false,
            skip_size: 0,
            print_error_flag: true,
            user_data: [0u8; 64],
            user_trans_id: 0,
            end_of_sequence_flag: false,
        }
    }
}

/// How a dequeued message's payload was delivered to the caller.
pub enum DequeuedPayload {
    /// `n` bytes were copied into the caller-supplied buffer.
    Copied(usize),
    /// The Mbuf's backing pages were moved into a delete-guard instead of
    /// being copied; the payload is reachable via [`crate::mbuf_exchange::AlignedPtr`].
    ZeroCopy(crate::mbuf_exchange::AlignedPtr),
    /// No payload (EOS or null-data).
    None,
}

/// Everything a caller needs after a successful dequeue: the header fields
/// plus however the payload was delivered.
pub struct DequeueResult {
    pub trans_id: u64,
    pub eos: bool,
    pub null_data: bool,
    pub ret_code: i32,
    pub payload: DequeuedPayload,
}

impl DequeueResult {
    /// `true` if the executor should skip model execution for this message
    /// (EOS, null-data, or a producer-supplied non-zero ret_code).
    pub fn is_no_execute(&self) -> bool {
        self.eos || self.null_data || self.ret_code != 0
    }
}
