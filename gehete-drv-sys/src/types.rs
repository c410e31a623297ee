//! Opaque handle and scalar type aliases for the accelerator runtime driver.
//!
//! Mirrors the driver's own C headers: every handle is an opaque pointer,
//! every status is a plain `i32`. None of these types are ever dereferenced
//! on the Rust side; they are passed back to the driver verbatim.

use libc::{c_char, c_void};

pub type rtError_t = i32;
pub type rtStream_t = *mut c_void;
pub type rtContext_t = *mut c_void;
pub type rtEvent_t = *mut c_void;
pub type rtMbuf_t = *mut c_void;

pub type DeviceId = i32;
pub type QueueId = u32;
pub type ModelId = u32;
pub type NotifyId = u32;

/// `RT_ERROR_NONE`.
pub const RT_ERROR_NONE: rtError_t = 0;
/// `ACL_ERROR_RT_QUEUE_FULL` — returned by a non-blocking enqueue attempt on a full queue.
pub const ACL_ERROR_RT_QUEUE_FULL: rtError_t = 107_020;
/// `ACL_ERROR_RT_QUEUE_EMPTY` — returned by a non-blocking dequeue attempt on an empty queue.
pub const ACL_ERROR_RT_QUEUE_EMPTY: rtError_t = 107_021;
/// `ACL_ERROR_RT_REPORT_TIMEOUT` — benign timeout on `rtEschedWaitEvent`.
pub const ACL_ERROR_RT_REPORT_TIMEOUT: rtError_t = 107_022;
/// `ACL_ERROR_RT_FEATURE_NOT_SUPPORT` — tolerated by `rtMemQueueInit` on devices
/// without the local-queue feature.
pub const ACL_ERROR_RT_FEATURE_NOT_SUPPORT: rtError_t = 107_023;
/// Generic internal failure with no more specific code.
pub const RT_FAILED: rtError_t = 1;

pub const RT_MQ_DEPLOY_MODE_LOCAL: u32 = 0;
pub const RT_MQ_DEPLOY_MODE_CLIENT: u32 = 1;
pub const RT_MQ_MODE_PULL: u32 = 0;

pub const RT_MEMORY_HBM: u32 = 2;

pub const RT_GRP_TYPE_BIND_CP_CPU: u32 = 1;
pub const RT_EVENT_QUEUE_EMPTY_TO_NOT_EMPTY: u32 = 1;
pub const RT_EVENT_QUEUE_FULL_TO_NOT_FULL: u32 = 2;
pub const RT_EVENT_AICPU_MSG: u32 = 3;

pub const RT_MQ_MAX_NAME_LEN: usize = 128;

pub type char_t = c_char;
