//! In-process simulated accelerator runtime driver.
//!
//! Implements the same entry points as [`crate::ffi`] against plain Rust
//! data structures instead of a linked vendor shared library, so the layers
//! above (`gehete-drv-core`, `gehete`) can be built and tested on any machine.
//! Compiled when the `driver-sim` feature is enabled (the default).
//!
//! The simulation is deliberately literal about the two properties the
//! upper layers depend on: a queue at capacity rejects non-blocking
//! enqueues, and an empty queue rejects non-blocking dequeues, with
//! empty-to-non-empty and full-to-not-full transitions raised as events on
//! the requesting device's event group so `rtEschedWaitEvent` callers see
//! the same wakeups a real back-pressure event would produce.

#![allow(non_snake_case)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::ptr;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use libc::{c_char, c_void, size_t};

use crate::types::*;

struct SimMbuf {
    /// `None` means the payload was built in place over caller memory
    /// (shared-input / zero-copy mode) and must not be freed here.
    owned_payload: Option<Vec<u8>>,
    borrowed_payload: *mut u8,
    payload_len: usize,
    data_len: usize,
    priv_info: Vec<u8>,
}

unsafe impl Send for SimMbuf {}

#[derive(Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Local,
    Client,
}

enum QueueItems {
    Whole(VecDeque<*mut SimMbuf>),
    Buff(VecDeque<(Vec<u8>, Vec<u8>)>),
}

struct SimQueue {
    depth: usize,
    kind: QueueKind,
    items: QueueItems,
}

impl SimQueue {
    fn len(&self) -> usize {
        match &self.items {
            QueueItems::Whole(q) => q.len(),
            QueueItems::Buff(q) => q.len(),
        }
    }
}

#[derive(Clone)]
struct PendingEvent {
    event_id: u32,
    subevent_id: u32,
    msg: Vec<u8>,
}

#[derive(Default)]
struct SimDriver {
    queues: HashMap<(DeviceId, QueueId), SimQueue>,
    next_queue_id: u32,
    groups: HashSet<(DeviceId, u32)>,
    events: HashMap<(DeviceId, u32), VecDeque<PendingEvent>>,
    allocs: HashMap<usize, Vec<u8>>,
}

struct SimState {
    driver: Mutex<SimDriver>,
    cv: Condvar,
}

static STATE: once_flag::Lazy<SimState> = once_flag::Lazy::new(|| SimState {
    driver: Mutex::new(SimDriver::default()),
    cv: Condvar::new(),
});

/// A minimal `lazy_static`-equivalent so this module has no external
/// dependency beyond `libc`; the real driver crate has none of this, this
/// backend exists purely to make the rest of the stack host-testable.
mod once_flag {
    use std::sync::Once;
    use std::cell::UnsafeCell;

    pub struct Lazy<T> {
        once: Once,
        value: UnsafeCell<Option<T>>,
        init: fn() -> T,
    }

    unsafe impl<T: Sync> Sync for Lazy<T> {}

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Lazy { once: Once::new(), value: UnsafeCell::new(None), init }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.once.call_once(|| unsafe {
                *self.value.get() = Some((self.init)());
            });
            unsafe { (*self.value.get()).as_ref().unwrap() }
        }
    }
}

fn push_event(drv: &mut SimDriver, device_id: DeviceId, event_id: u32, subevent_id: u32, msg: Vec<u8>) {
    for &(dev, grp) in drv.groups.iter() {
        if dev == device_id {
            drv.events.entry((dev, grp)).or_insert_with(VecDeque::new)
                .push_back(PendingEvent { event_id, subevent_id, msg: msg.clone() });
        }
    }
}

fn queue_id_msg(queue_id: QueueId) -> Vec<u8> {
    queue_id.to_le_bytes().to_vec()
}

pub unsafe fn rtMemQueueInit(_device_id: DeviceId) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtMemQueueCreate(device_id: DeviceId, name: *const c_char, depth: u32, _work_mode: u32,
        is_client: u32, queue_id: *mut QueueId) -> rtError_t {
    let _name = if name.is_null() { String::new() } else {
        std::ffi::CStr::from_ptr(name).to_string_lossy().into_owned()
    };
    let mut drv = STATE.driver.lock().unwrap();
    let id = drv.next_queue_id;
    drv.next_queue_id += 1;
    let kind = if is_client != 0 { QueueKind::Client } else { QueueKind::Local };
    let items = match kind {
        QueueKind::Local => QueueItems::Whole(VecDeque::new()),
        QueueKind::Client => QueueItems::Buff(VecDeque::new()),
    };
    drv.queues.insert((device_id, id), SimQueue { depth: depth as usize, kind, items });
    *queue_id = id;
    RT_ERROR_NONE
}

pub unsafe fn rtMemQueueDestroy(device_id: DeviceId, queue_id: QueueId) -> rtError_t {
    STATE.driver.lock().unwrap().queues.remove(&(device_id, queue_id));
    RT_ERROR_NONE
}

pub unsafe fn rtMemQueueAttach(_device_id: DeviceId, _queue_id: QueueId, _timeout_ms: i32) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtMemQueueSubscribe(_device_id: DeviceId, _queue_id: QueueId, _group_id: u32) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtMemQueueSubF2NFEvent(_device_id: DeviceId, _queue_id: QueueId) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtMemQueueEnQueue(device_id: DeviceId, queue_id: QueueId, mbuf: rtMbuf_t) -> rtError_t {
    let mut drv = STATE.driver.lock().unwrap();
    let was_empty = match drv.queues.get(&(device_id, queue_id)) {
        Some(q) => q.len() == 0,
        None => return RT_FAILED,
    };
    {
        let q = drv.queues.get_mut(&(device_id, queue_id)).unwrap();
        if q.kind != QueueKind::Local {
            return RT_FAILED;
        }
        if q.len() >= q.depth {
            return ACL_ERROR_RT_QUEUE_FULL;
        }
        if let QueueItems::Whole(ref mut dq) = q.items {
            dq.push_back(mbuf as *mut SimMbuf);
        }
    }
    if was_empty {
        push_event(&mut drv, device_id, RT_EVENT_QUEUE_EMPTY_TO_NOT_EMPTY, 0, queue_id_msg(queue_id));
        STATE.cv.notify_all();
    }
    RT_ERROR_NONE
}

pub unsafe fn rtMemQueueDeQueue(device_id: DeviceId, queue_id: QueueId, mbuf: *mut rtMbuf_t) -> rtError_t {
    let mut drv = STATE.driver.lock().unwrap();
    let was_full = match drv.queues.get(&(device_id, queue_id)) {
        Some(q) => q.len() >= q.depth,
        None => return RT_FAILED,
    };
    let popped = {
        let q = drv.queues.get_mut(&(device_id, queue_id)).unwrap();
        if q.kind != QueueKind::Local {
            return RT_FAILED;
        }
        match &mut q.items {
            QueueItems::Whole(dq) => dq.pop_front(),
            QueueItems::Buff(_) => return RT_FAILED,
        }
    };
    match popped {
        Some(ptr) => {
            *mbuf = ptr as rtMbuf_t;
            if was_full {
                push_event(&mut drv, device_id, RT_EVENT_QUEUE_FULL_TO_NOT_FULL, 0, queue_id_msg(queue_id));
                STATE.cv.notify_all();
            }
            RT_ERROR_NONE
        }
        None => ACL_ERROR_RT_QUEUE_EMPTY,
    }
}

pub unsafe fn rtMemQueuePeek(device_id: DeviceId, queue_id: QueueId, _timeout_ms: i32) -> rtError_t {
    let drv = STATE.driver.lock().unwrap();
    match drv.queues.get(&(device_id, queue_id)) {
        Some(q) if q.len() > 0 => RT_ERROR_NONE,
        Some(_) => ACL_ERROR_RT_QUEUE_EMPTY,
        None => RT_FAILED,
    }
}

pub unsafe fn rtMemQueueEnQueueBuff(device_id: DeviceId, queue_id: QueueId, header: *const c_void,
        header_len: size_t, payload: *const c_void, payload_len: size_t) -> rtError_t {
    let mut drv = STATE.driver.lock().unwrap();
    let was_empty = match drv.queues.get(&(device_id, queue_id)) {
        Some(q) => q.len() == 0,
        None => return RT_FAILED,
    };
    let header_bytes = std::slice::from_raw_parts(header as *const u8, header_len).to_vec();
    let payload_bytes = std::slice::from_raw_parts(payload as *const u8, payload_len).to_vec();
    {
        let q = drv.queues.get_mut(&(device_id, queue_id)).unwrap();
        if q.kind != QueueKind::Client {
            return RT_FAILED;
        }
        if q.len() >= q.depth {
            return ACL_ERROR_RT_QUEUE_FULL;
        }
        if let QueueItems::Buff(ref mut dq) = q.items {
            dq.push_back((header_bytes, payload_bytes));
        }
    }
    if was_empty {
        push_event(&mut drv, device_id, RT_EVENT_QUEUE_EMPTY_TO_NOT_EMPTY, 0, queue_id_msg(queue_id));
        STATE.cv.notify_all();
    }
    RT_ERROR_NONE
}

pub unsafe fn rtMemQueueDeQueueBuff(device_id: DeviceId, queue_id: QueueId, header: *mut c_void,
        header_len: size_t, payload: *mut *mut c_void, payload_len: *mut size_t) -> rtError_t {
    let mut drv = STATE.driver.lock().unwrap();
    let was_full = match drv.queues.get(&(device_id, queue_id)) {
        Some(q) => q.len() >= q.depth,
        None => return RT_FAILED,
    };
    let popped = {
        let q = drv.queues.get_mut(&(device_id, queue_id)).unwrap();
        if q.kind != QueueKind::Client {
            return RT_FAILED;
        }
        match &mut q.items {
            QueueItems::Buff(dq) => dq.pop_front(),
            QueueItems::Whole(_) => return RT_FAILED,
        }
    };
    match popped {
        Some((hdr, mut pld)) => {
            let copy_len = hdr.len().min(header_len);
            ptr::copy_nonoverlapping(hdr.as_ptr(), header as *mut u8, copy_len);
            *payload_len = pld.len();
            let leaked = pld.as_mut_ptr();
            std::mem::forget(pld);
            *payload = leaked as *mut c_void;
            if was_full {
                push_event(&mut drv, device_id, RT_EVENT_QUEUE_FULL_TO_NOT_FULL, 0, queue_id_msg(queue_id));
                STATE.cv.notify_all();
            }
            RT_ERROR_NONE
        }
        None => ACL_ERROR_RT_QUEUE_EMPTY,
    }
}

pub unsafe fn rtMbufAlloc(mbuf: *mut rtMbuf_t, size: size_t) -> rtError_t {
    let b = Box::new(SimMbuf {
        owned_payload: Some(vec![0u8; size]),
        borrowed_payload: ptr::null_mut(),
        payload_len: size,
        data_len: size,
        priv_info: vec![0u8; 256],
    });
    *mbuf = Box::into_raw(b) as rtMbuf_t;
    RT_ERROR_NONE
}

pub unsafe fn rtMbufFree(mbuf: rtMbuf_t) -> rtError_t {
    if !mbuf.is_null() {
        drop(Box::from_raw(mbuf as *mut SimMbuf));
    }
    RT_ERROR_NONE
}

pub unsafe fn rtMbufBuild(buf: *mut c_void, size: size_t, mbuf: *mut rtMbuf_t) -> rtError_t {
    let b = Box::new(SimMbuf {
        owned_payload: None,
        borrowed_payload: buf as *mut u8,
        payload_len: size,
        data_len: size,
        priv_info: vec![0u8; 256],
    });
    *mbuf = Box::into_raw(b) as rtMbuf_t;
    RT_ERROR_NONE
}

pub unsafe fn rtMbufUnBuild(_mbuf: rtMbuf_t) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtMbufGetPrivInfo(mbuf: rtMbuf_t, priv_buf: *mut *mut c_void, priv_size: *mut size_t) -> rtError_t {
    let m = &mut *(mbuf as *mut SimMbuf);
    *priv_buf = m.priv_info.as_mut_ptr() as *mut c_void;
    *priv_size = m.priv_info.len();
    RT_ERROR_NONE
}

pub unsafe fn rtMbufGetBuffAddr(mbuf: rtMbuf_t, data_addr: *mut *mut c_void) -> rtError_t {
    let m = &mut *(mbuf as *mut SimMbuf);
    *data_addr = match &mut m.owned_payload {
        Some(v) => v.as_mut_ptr() as *mut c_void,
        None => m.borrowed_payload as *mut c_void,
    };
    RT_ERROR_NONE
}

pub unsafe fn rtMbufGetBuffSize(mbuf: rtMbuf_t, size: *mut size_t) -> rtError_t {
    let m = &*(mbuf as *mut SimMbuf);
    *size = m.payload_len;
    RT_ERROR_NONE
}

pub unsafe fn rtMbufSetDataLen(mbuf: rtMbuf_t, len: size_t) -> rtError_t {
    let m = &mut *(mbuf as *mut SimMbuf);
    m.data_len = len;
    RT_ERROR_NONE
}

pub unsafe fn rtMbufGetDataLen(mbuf: rtMbuf_t, len: *mut size_t) -> rtError_t {
    let m = &*(mbuf as *mut SimMbuf);
    *len = m.data_len;
    RT_ERROR_NONE
}

pub unsafe fn rtMbufCopyBufRef(src: rtMbuf_t, dst: *mut rtMbuf_t) -> rtError_t {
    let s = &*(src as *mut SimMbuf);
    let payload = match &s.owned_payload {
        Some(v) => v.clone(),
        None => std::slice::from_raw_parts(s.borrowed_payload, s.payload_len).to_vec(),
    };
    let b = Box::new(SimMbuf {
        owned_payload: Some(payload),
        borrowed_payload: ptr::null_mut(),
        payload_len: s.payload_len,
        data_len: s.data_len,
        priv_info: s.priv_info.clone(),
    });
    *dst = Box::into_raw(b) as rtMbuf_t;
    RT_ERROR_NONE
}

pub unsafe fn rtEschedCreateGroup(device_id: DeviceId, group_id: u32, _grp_type: u32) -> rtError_t {
    STATE.driver.lock().unwrap().groups.insert((device_id, group_id));
    RT_ERROR_NONE
}

pub unsafe fn rtEschedSubscribeEvent(_device_id: DeviceId, _group_id: u32, _pid: i32, _event_bitmap: u64) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtEschedWaitEvent(device_id: DeviceId, group_id: u32, _pid: i32, timeout_ms: i32,
        event_id: *mut u32, subevent_id: *mut u32, msg: *mut c_char, msg_len: *mut u32) -> rtError_t {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms.max(0) as u64);
    let mut drv = STATE.driver.lock().unwrap();
    loop {
        if let Some(q) = drv.events.get_mut(&(device_id, group_id)) {
            if let Some(ev) = q.pop_front() {
                *event_id = ev.event_id;
                *subevent_id = ev.subevent_id;
                let n = ev.msg.len().min(*msg_len as usize);
                ptr::copy_nonoverlapping(ev.msg.as_ptr(), msg as *mut u8, n);
                *msg_len = n as u32;
                return RT_ERROR_NONE;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return ACL_ERROR_RT_REPORT_TIMEOUT;
        }
        let (guard, timeout_result) = STATE.cv.wait_timeout(drv, deadline - now).unwrap();
        drv = guard;
        if timeout_result.timed_out() {
            return ACL_ERROR_RT_REPORT_TIMEOUT;
        }
    }
}

pub unsafe fn rtEschedSubmitEvent(device_id: DeviceId, event_id: u32, subevent_id: u32, _dst_engine: u32,
        _pid: i32, msg: *const c_char, msg_len: u32) -> rtError_t {
    let bytes = std::slice::from_raw_parts(msg as *const u8, msg_len as usize).to_vec();
    let mut drv = STATE.driver.lock().unwrap();
    push_event(&mut drv, device_id, event_id, subevent_id, bytes);
    STATE.cv.notify_all();
    RT_ERROR_NONE
}

pub unsafe fn rtEschedAttachDevice(_device_id: DeviceId) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtMalloc(dev_ptr: *mut *mut c_void, size: size_t, _mem_type: u32) -> rtError_t {
    let mut v = vec![0u8; size];
    let p = v.as_mut_ptr();
    STATE.driver.lock().unwrap().allocs.insert(p as usize, v);
    *dev_ptr = p as *mut c_void;
    RT_ERROR_NONE
}

pub unsafe fn rtFree(dev_ptr: *mut c_void) -> rtError_t {
    STATE.driver.lock().unwrap().allocs.remove(&(dev_ptr as usize));
    RT_ERROR_NONE
}

pub unsafe fn rtMallocHost(host_ptr: *mut *mut c_void, size: size_t) -> rtError_t {
    rtMalloc(host_ptr, size, 0)
}

pub unsafe fn rtFreeHost(host_ptr: *mut c_void) -> rtError_t {
    rtFree(host_ptr)
}

pub unsafe fn rtMemcpy(dst: *mut c_void, dst_size: size_t, src: *const c_void, src_size: size_t, _kind: u32) -> rtError_t {
    if src_size > dst_size {
        return RT_FAILED;
    }
    ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, src_size);
    RT_ERROR_NONE
}

pub unsafe fn rtMemset(dev_ptr: *mut c_void, dst_size: size_t, value: u32, count: size_t) -> rtError_t {
    if count > dst_size {
        return RT_FAILED;
    }
    ptr::write_bytes(dev_ptr as *mut u8, value as u8, count);
    RT_ERROR_NONE
}

pub unsafe fn rtStreamCreate(stream: *mut rtStream_t, _priority: i32) -> rtError_t {
    let b: Box<u8> = Box::new(0);
    *stream = Box::into_raw(b) as rtStream_t;
    RT_ERROR_NONE
}

pub unsafe fn rtStreamDestroy(stream: rtStream_t) -> rtError_t {
    if !stream.is_null() {
        drop(Box::from_raw(stream as *mut u8));
    }
    RT_ERROR_NONE
}

pub unsafe fn rtStreamSynchronize(_stream: rtStream_t) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtStreamWaitEvent(_stream: rtStream_t, _event: rtEvent_t) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtCtxCreate(ctx: *mut rtContext_t, _flags: u32, _device_id: DeviceId) -> rtError_t {
    let b: Box<u8> = Box::new(0);
    *ctx = Box::into_raw(b) as rtContext_t;
    RT_ERROR_NONE
}

pub unsafe fn rtCtxDestroy(ctx: rtContext_t) -> rtError_t {
    if !ctx.is_null() {
        drop(Box::from_raw(ctx as *mut u8));
    }
    RT_ERROR_NONE
}

pub unsafe fn rtCtxSetCurrent(_ctx: rtContext_t) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtSetDevice(_device_id: DeviceId) -> rtError_t {
    RT_ERROR_NONE
}

pub unsafe fn rtCpuKernelLaunchWithFlag(_kernel_name: *const c_char, _block_dim: u32, _args: *const c_void,
        _args_size: u32, _stream: rtStream_t, _flags: u32) -> rtError_t {
    RT_ERROR_NONE
}

/// Test-only escape hatch used by `gehete-drv-core`'s own unit tests to
/// reset global sim state between cases (queue ids, pending events).
#[doc(hidden)]
pub fn __reset_for_tests() {
    let mut drv = STATE.driver.lock().unwrap();
    *drv = SimDriver::default();
}
