//! Raw bindings to the vendor accelerator runtime driver.
//!
//! Every function here is `unsafe extern "C"` and opaque to this crate: the
//! driver owns the handles it returns, and callers in `gehete-drv-core` are
//! responsible for obeying each call's ownership contract.
//!
//! Compiled only when the `driver-sim` feature is disabled. Linking requires
//! the vendor runtime shared library to be on the link path.

#![allow(non_snake_case)]

use libc::{c_char, c_void, size_t};

use crate::types::*;

extern "C" {
    // -- Queue lifecycle -----------------------------------------------
    pub fn rtMemQueueInit(device_id: DeviceId) -> rtError_t;
    pub fn rtMemQueueCreate(device_id: DeviceId, name: *const c_char, depth: u32, work_mode: u32,
        is_client: u32, queue_id: *mut QueueId) -> rtError_t;
    pub fn rtMemQueueDestroy(device_id: DeviceId, queue_id: QueueId) -> rtError_t;
    pub fn rtMemQueueAttach(device_id: DeviceId, queue_id: QueueId, timeout_ms: i32) -> rtError_t;
    pub fn rtMemQueueSubscribe(device_id: DeviceId, queue_id: QueueId, group_id: u32) -> rtError_t;
    pub fn rtMemQueueSubF2NFEvent(device_id: DeviceId, queue_id: QueueId) -> rtError_t;

    // -- Whole-Mbuf enqueue/dequeue --------------------------------------
    pub fn rtMemQueueEnQueue(device_id: DeviceId, queue_id: QueueId, mbuf: rtMbuf_t) -> rtError_t;
    pub fn rtMemQueueDeQueue(device_id: DeviceId, queue_id: QueueId, mbuf: *mut rtMbuf_t) -> rtError_t;
    pub fn rtMemQueuePeek(device_id: DeviceId, queue_id: QueueId, timeout_ms: i32) -> rtError_t;

    // -- Buff-mode (client queue) enqueue/dequeue ------------------------
    pub fn rtMemQueueEnQueueBuff(device_id: DeviceId, queue_id: QueueId, header: *const c_void,
        header_len: size_t, payload: *const c_void, payload_len: size_t) -> rtError_t;
    pub fn rtMemQueueDeQueueBuff(device_id: DeviceId, queue_id: QueueId, header: *mut c_void,
        header_len: size_t, payload: *mut *mut c_void, payload_len: *mut size_t) -> rtError_t;

    // -- Mbuf handle management -------------------------------------------
    pub fn rtMbufAlloc(mbuf: *mut rtMbuf_t, size: size_t) -> rtError_t;
    pub fn rtMbufFree(mbuf: rtMbuf_t) -> rtError_t;
    pub fn rtMbufBuild(buf: *mut c_void, size: size_t, mbuf: *mut rtMbuf_t) -> rtError_t;
    pub fn rtMbufUnBuild(mbuf: rtMbuf_t) -> rtError_t;
    pub fn rtMbufGetPrivInfo(mbuf: rtMbuf_t, priv_buf: *mut *mut c_void, priv_size: *mut size_t) -> rtError_t;
    pub fn rtMbufGetBuffAddr(mbuf: rtMbuf_t, data_addr: *mut *mut c_void) -> rtError_t;
    pub fn rtMbufGetBuffSize(mbuf: rtMbuf_t, size: *mut size_t) -> rtError_t;
    pub fn rtMbufSetDataLen(mbuf: rtMbuf_t, len: size_t) -> rtError_t;
    pub fn rtMbufGetDataLen(mbuf: rtMbuf_t, len: *mut size_t) -> rtError_t;
    pub fn rtMbufCopyBufRef(src: rtMbuf_t, dst: *mut rtMbuf_t) -> rtError_t;

    // -- Event scheduling --------------------------------------------------
    pub fn rtEschedCreateGroup(device_id: DeviceId, group_id: u32, grp_type: u32) -> rtError_t;
    pub fn rtEschedSubscribeEvent(device_id: DeviceId, group_id: u32, pid: i32, event_bitmap: u64) -> rtError_t;
    pub fn rtEschedWaitEvent(device_id: DeviceId, group_id: u32, pid: i32, timeout_ms: i32,
        event_id: *mut u32, subevent_id: *mut u32, msg: *mut c_char, msg_len: *mut u32) -> rtError_t;
    pub fn rtEschedSubmitEvent(device_id: DeviceId, event_id: u32, subevent_id: u32, dst_engine: u32,
        pid: i32, msg: *const c_char, msg_len: u32) -> rtError_t;
    pub fn rtEschedAttachDevice(device_id: DeviceId) -> rtError_t;

    // -- Memory ----------------------------------------------------------
    pub fn rtMalloc(dev_ptr: *mut *mut c_void, size: size_t, mem_type: u32) -> rtError_t;
    pub fn rtFree(dev_ptr: *mut c_void) -> rtError_t;
    pub fn rtMallocHost(host_ptr: *mut *mut c_void, size: size_t) -> rtError_t;
    pub fn rtFreeHost(host_ptr: *mut c_void) -> rtError_t;
    pub fn rtMemcpy(dst: *mut c_void, dst_size: size_t, src: *const c_void, src_size: size_t, kind: u32) -> rtError_t;
    pub fn rtMemset(dev_ptr: *mut c_void, dst_size: size_t, value: u32, count: size_t) -> rtError_t;

    // -- Streams & context -------------------------------------------------
    pub fn rtStreamCreate(stream: *mut rtStream_t, priority: i32) -> rtError_t;
    pub fn rtStreamDestroy(stream: rtStream_t) -> rtError_t;
    pub fn rtStreamSynchronize(stream: rtStream_t) -> rtError_t;
    pub fn rtStreamWaitEvent(stream: rtStream_t, event: rtEvent_t) -> rtError_t;
    pub fn rtCtxCreate(ctx: *mut rtContext_t, flags: u32, device_id: DeviceId) -> rtError_t;
    pub fn rtCtxDestroy(ctx: rtContext_t) -> rtError_t;
    pub fn rtCtxSetCurrent(ctx: rtContext_t) -> rtError_t;
    pub fn rtSetDevice(device_id: DeviceId) -> rtError_t;

    // -- CPU kernel launch ---------------------------------------------------
    pub fn rtCpuKernelLaunchWithFlag(kernel_name: *const c_char, block_dim: u32, args: *const c_void,
        args_size: u32, stream: rtStream_t, flags: u32) -> rtError_t;
}
