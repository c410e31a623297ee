//! `MbufExchangeService` — a mutex/condvar-guarded façade over driver
//! message queues.
//!
//! One instance lives for the whole process (see [`instance`]); `standard`
//! callers reach it through [`MbufExchangeService::instance`] the same way
//! the source system reaches its singleton through
//! `MbufExchangeService::GetInstance()`. Tests that want isolation from
//! other tests construct their own `MbufExchangeService::new()` instead —
//! the simulated driver backend keys all state by `(device_id, queue_id)`
//! so two instances never collide as long as they use disjoint device ids.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use gehete_drv_core::types::{
    ENQUEUE_WAIT_SLICE_MS, DEQUEUE_WAIT_SLICE_MS,
    EVENT_GROUP_ID_MBUF, MBUF_HEAD_MAX_SIZE, QUEUE_OP_TIMEOUT_MS,
};
use gehete_drv_core::{self as core, Mbuf, Status};

use crate::error::{Error, Result};
use crate::flow_msg::{self, MsgInfo};
use crate::queue_attrs::{BufInfo, ControlInfo, DequeueResult, DequeuedPayload, MemQueueAttr};
use crate::trans_id::TransIdRegistry;

/// A free-on-drop delete-guard over an Mbuf's backing pages, handed back by
/// the zero-copy dequeue path instead of a fresh allocation. Frees the Mbuf
/// on drop, matching the driver's "consumer frees" ownership rule.
pub struct AlignedPtr {
    mbuf: Mbuf,
    len: usize,
}

unsafe impl Send for AlignedPtr {}

impl AlignedPtr {
    pub fn as_slice(&self) -> &[u8] {
        let addr = core::mbuf_buff_addr(self.mbuf).expect("mbuf outlives its AlignedPtr guard");
        unsafe { std::slice::from_raw_parts(addr, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for AlignedPtr {
    fn drop(&mut self) {
        let _ = core::mbuf_free(self.mbuf);
    }
}

struct ReadyFlags(Mutex<HashMap<(i32, u32), bool>>);

impl ReadyFlags {
    fn new() -> ReadyFlags {
        ReadyFlags(Mutex::new(HashMap::new()))
    }

    fn reset(&self, key: (i32, u32)) -> Result<()> {
        self.0.lock()?.insert(key, false);
        Ok(())
    }

    fn mark_ready(&self, key: (i32, u32)) -> Result<()> {
        self.0.lock()?.insert(key, true);
        Ok(())
    }

    fn is_ready(&self, key: (i32, u32)) -> Result<bool> {
        Ok(self.0.lock()?.get(&key).copied().unwrap_or(false))
    }
}

struct EventThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Event-driven façade over the driver's message-queue API.
pub struct MbufExchangeService {
    trans_ids: TransIdRegistry,
    devices: Mutex<HashMap<i32, EventThread>>,
    client_queue_ids: Mutex<HashSet<(i32, u32)>>,
    enqueue_ready: ReadyFlags,
    dequeue_ready: ReadyFlags,
    enqueue_cv: Condvar,
    dequeue_cv: Condvar,
    /// Dummy mutex paired with the condvars above purely so `wait_timeout`
    /// has something to park on; the actual state lives in `ReadyFlags`.
    park: Mutex<()>,
}

static INSTANCE: OnceLock<MbufExchangeService> = OnceLock::new();

impl MbufExchangeService {
    /// Private: the event thread spawned by [`initialize`](Self::initialize)
    /// always reaches back through [`instance`](Self::instance), so only the
    /// single process-wide instance behaves correctly. Tests share that
    /// instance too, distinguishing themselves by `device_id`.
    fn new() -> MbufExchangeService {
        MbufExchangeService {
            trans_ids: TransIdRegistry::new(),
            devices: Mutex::new(HashMap::new()),
            client_queue_ids: Mutex::new(HashSet::new()),
            enqueue_ready: ReadyFlags::new(),
            dequeue_ready: ReadyFlags::new(),
            enqueue_cv: Condvar::new(),
            dequeue_cv: Condvar::new(),
            park: Mutex::new(()),
        }
    }

    /// The process-wide instance, analogous to `MbufExchangeService::GetInstance()`.
    pub fn instance() -> &'static MbufExchangeService {
        INSTANCE.get_or_init(MbufExchangeService::new)
    }

    /// Idempotent per `device_id`: the first call starts the device's event
    /// thread and initializes the driver's local-queue subsystem; later
    /// calls are a no-op success.
    pub fn initialize(&self, device_id: i32) -> Result<()> {
        if self.devices.lock()?.contains_key(&device_id) {
            return Ok(());
        }

        core::init_queue_subsystem(device_id)?;
        core::esched_create_group(device_id, EVENT_GROUP_ID_MBUF, gehete_drv_core::ffi::RT_GRP_TYPE_BIND_CP_CPU)?;
        core::esched_subscribe_event(device_id, EVENT_GROUP_ID_MBUF, std::process::id() as i32, u64::MAX)?;

        let stop = Arc::new(AtomicBool::new(false));
        let ready = Arc::new((Mutex::new(false), Condvar::new()));

        let handle = {
            let stop = Arc::clone(&stop);
            let ready = Arc::clone(&ready);
            thread::Builder::new()
                .name(format!("ge_hete_mq_ev_{}", device_id))
                .spawn(move || Self::event_loop(device_id, stop, ready))?
        };

        // Handshake: don't return from `initialize` until the thread has
        // subscribed and entered its wait loop.
        let (lock, cv) = &*ready;
        let mut started = lock.lock()?;
        while !*started {
            started = cv.wait(started)?;
        }

        self.devices.lock()?.insert(device_id, EventThread { stop, handle: Some(handle) });
        log::info!(target: "gehete::mbuf_exchange", "device {} event thread subscribed", device_id);
        Ok(())
    }

    fn event_loop(device_id: i32, stop: Arc<AtomicBool>, ready: Arc<(Mutex<bool>, Condvar)>) {
        pin_current_thread_to_cpu(device_id as usize * 8);

        {
            let (lock, cv) = &*ready;
            if let Ok(mut started) = lock.lock() {
                *started = true;
                cv.notify_all();
            }
        }

        let service = MbufExchangeService::instance();
        while !stop.load(Ordering::SeqCst) {
            match core::esched_wait_event(device_id, EVENT_GROUP_ID_MBUF, std::process::id() as i32, 1_000) {
                Ok(Some((event_id, _sub, msg))) => {
                    if msg.len() < 4 {
                        continue;
                    }
                    let queue_id = u32::from_le_bytes([msg[0], msg[1], msg[2], msg[3]]);
                    let key = (device_id, queue_id);
                    match event_id {
                        gehete_drv_core::ffi::RT_EVENT_QUEUE_EMPTY_TO_NOT_EMPTY => {
                            let _ = service.dequeue_ready.mark_ready(key);
                            service.dequeue_cv.notify_all();
                        }
                        gehete_drv_core::ffi::RT_EVENT_QUEUE_FULL_TO_NOT_FULL => {
                            let _ = service.enqueue_ready.mark_ready(key);
                            service.enqueue_cv.notify_all();
                        }
                        _ => {}
                    }
                }
                Ok(None) => {} // benign 1s wait timeout
                Err(err) => {
                    log::warn!(target: "gehete::mbuf_exchange", "device {} event wait failed: {}", device_id, err);
                }
            }
        }
    }

    /// Stops every device's event thread (joined), drops subscriptions, and
    /// forgets all trans-id state. Intended for process shutdown; tests that
    /// only own one device should call [`shutdown_device`](Self::shutdown_device)
    /// instead so they don't tear down threads other tests still need.
    pub fn finalize(&self) -> Result<()> {
        let mut devices = self.devices.lock()?;
        for (device_id, mut ev) in devices.drain() {
            ev.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = ev.handle.take() {
                let _ = handle.join();
            }
            log::info!(target: "gehete::mbuf_exchange", "device {} event thread joined", device_id);
        }
        Ok(())
    }

    /// Stops and joins a single device's event thread, leaving other
    /// devices' threads running.
    pub fn shutdown_device(&self, device_id: i32) -> Result<()> {
        let mut ev = match self.devices.lock()?.remove(&device_id) {
            Some(ev) => ev,
            None => return Ok(()),
        };
        ev.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = ev.handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Creates a queue bounded to the driver's 127-character name limit
    /// (enforced by `gehete_drv_core::create_queue` itself).
    pub fn create_queue(&self, device_id: i32, name: &str, attr: MemQueueAttr) -> Result<u32> {
        let queue_id = core::create_queue(device_id, name, attr.depth, attr.is_client)?;
        core::subscribe_queue(device_id, queue_id, EVENT_GROUP_ID_MBUF)?;
        core::subscribe_f2nf(device_id, queue_id)?;
        if attr.is_client {
            self.client_queue_ids.lock()?.insert((device_id, queue_id));
        }
        Ok(queue_id)
    }

    /// Destroys a queue and frees its trans-id entry.
    pub fn destroy_queue(&self, device_id: i32, queue_id: u32) -> Result<()> {
        core::destroy_queue(device_id, queue_id)?;
        self.trans_ids.evict(device_id, queue_id);
        self.client_queue_ids.lock()?.remove(&(device_id, queue_id));
        Ok(())
    }

    fn is_client_queue(&self, device_id: i32, queue_id: u32) -> Result<bool> {
        Ok(self.client_queue_ids.lock()?.contains(&(device_id, queue_id)))
    }

    fn init_header(&self, priv_buf: &mut [u8], control: &ControlInfo, device_id: i32, queue_id: u32) -> Result<u64> {
        let trans_id = self.trans_ids.gen(device_id, queue_id, control.user_trans_id)?;
        flow_msg::set_eos(priv_buf, false)?;
        flow_msg::write_user_data(priv_buf, 0, &control.user_data)?;
        flow_msg::write_msg_info(priv_buf, &MsgInfo { trans_id, ..Default::default() })?;
        Ok(trans_id)
    }

    /// Shared-input enqueue: wraps `buf` as an Mbuf via `rtMbufBuild` with no
    /// copy; on success ownership of `buf`'s backing memory transfers to the
    /// consumer.
    pub fn enqueue_shared_input(&self, device_id: i32, queue_id: u32, buf: &mut [u8], control: &ControlInfo) -> Result<u64> {
        let mbuf = core::mbuf_build(buf.as_mut_ptr(), buf.len())?;
        let priv_buf = core::mbuf_priv_info(mbuf)?;
        let trans_id = self.init_header(priv_buf, control, device_id, queue_id)?;
        self.enqueue_mbuf(device_id, queue_id, mbuf, control.timeout_ms)?;
        Ok(trans_id)
    }

    /// Enqueues a zero-length end-of-sequence control pulse, the terminator
    /// a producer sends once its stream is drained.
    pub fn enqueue_eos(&self, device_id: i32, queue_id: u32, timeout_ms: i32) -> Result<u64> {
        let mbuf = core::mbuf_alloc(0)?;
        let priv_buf = core::mbuf_priv_info(mbuf)?;
        let control = ControlInfo { timeout_ms, ..Default::default() };
        let trans_id = self.init_header(priv_buf, &control, device_id, queue_id)?;
        flow_msg::set_eos(priv_buf, true)?;
        self.enqueue_mbuf(device_id, queue_id, mbuf, timeout_ms)?;
        Ok(trans_id)
    }

    /// Allocates a fresh Mbuf, fills it via `fill`, then enqueues it.
    pub fn enqueue_copy(&self, device_id: i32, queue_id: u32, size: usize,
            fill: impl FnOnce(&mut [u8]), control: &ControlInfo) -> Result<u64> {
        let mbuf = core::mbuf_alloc(size)?;
        let addr = core::mbuf_buff_addr(mbuf)?;
        let payload = unsafe { std::slice::from_raw_parts_mut(addr, size) };
        fill(payload);
        let priv_buf = core::mbuf_priv_info(mbuf)?;
        let trans_id = self.init_header(priv_buf, control, device_id, queue_id)?;
        self.enqueue_mbuf(device_id, queue_id, mbuf, control.timeout_ms)?;
        Ok(trans_id)
    }

    /// Scatter-gather enqueue: on a client queue, uses the buff API with a
    /// 256-byte stack header; otherwise concatenates the non-empty buffers
    /// into one contiguous Mbuf via [`gehete_extras::multi_thread_copy`].
    pub fn enqueue_scatter_gather(&self, device_id: i32, queue_id: u32, bufs: &[BufInfo], control: &ControlInfo) -> Result<u64> {
        let total: usize = bufs.iter().map(|b| b.bytes.len()).sum();

        if self.is_client_queue(device_id, queue_id)? {
            let mut header = [0u8; MBUF_HEAD_MAX_SIZE];
            let trans_id = self.trans_ids.gen(device_id, queue_id, control.user_trans_id)?;
            flow_msg::set_eos(&mut header, false)?;
            flow_msg::write_user_data(&mut header, 0, &control.user_data)?;
            flow_msg::write_msg_info(&mut header, &MsgInfo { trans_id, ..Default::default() })?;

            let mut payload = vec![0u8; total];
            let mut off = 0;
            for b in bufs {
                if !b.bytes.is_empty() {
                    payload[off..off + b.bytes.len()].copy_from_slice(b.bytes);
                    off += b.bytes.len();
                }
            }
            self.enqueue_buff(device_id, queue_id, &header, &payload, control.timeout_ms)?;
            return Ok(trans_id);
        }

        let mbuf = core::mbuf_alloc(total)?;
        let addr = core::mbuf_buff_addr(mbuf)?;
        let dst = unsafe { std::slice::from_raw_parts_mut(addr, total) };
        let mut off = 0;
        for b in bufs {
            if b.bytes.is_empty() {
                continue;
            }
            let chunk = &mut dst[off..off + b.bytes.len()];
            gehete_extras::multi_thread_copy(chunk, b.bytes)
                .map_err(|msg| Error::String(format!("scatter-gather copy failed: {}", msg)))?;
            off += b.bytes.len();
        }
        let priv_buf = core::mbuf_priv_info(mbuf)?;
        let trans_id = self.init_header(priv_buf, control, device_id, queue_id)?;
        self.enqueue_mbuf(device_id, queue_id, mbuf, control.timeout_ms)?;
        Ok(trans_id)
    }

    /// Dequeues a single message, reporting EOS/null-data/ret-code via the
    /// returned [`DequeueResult`] and delivering the payload either by copy
    /// into `out_buf` or, with `zero_copy`, as an [`AlignedPtr`] guard.
    pub fn dequeue(&self, device_id: i32, queue_id: u32, out_buf: &mut [u8],
            control: &mut ControlInfo, zero_copy: bool) -> Result<DequeueResult> {
        if self.is_client_queue(device_id, queue_id)? {
            return self.dequeue_buff(device_id, queue_id, out_buf, control);
        }

        let mbuf = self.dequeue_mbuf(device_id, queue_id, control.timeout_ms)?;
        let priv_buf = core::mbuf_priv_info(mbuf)?;
        let eos = flow_msg::is_eos(priv_buf)?;
        control.end_of_sequence_flag = eos;

        if eos {
            let info = flow_msg::read_msg_info(priv_buf).unwrap_or_default();
            core::mbuf_free(mbuf)?;
            return Ok(DequeueResult { trans_id: info.trans_id, eos: true, null_data: false, ret_code: 0, payload: DequeuedPayload::None });
        }

        let info = flow_msg::read_msg_info(priv_buf)?;
        if info.has_null_data() {
            core::mbuf_free(mbuf)?;
            return Ok(DequeueResult { trans_id: info.trans_id, eos: false, null_data: true, ret_code: info.ret_code, payload: DequeuedPayload::None });
        }
        if info.ret_code != 0 {
            if !control.print_error_flag {
                log::debug!(target: "gehete::mbuf_exchange", "queue[{}] device[{}]: ret_code={}", queue_id, device_id, info.ret_code);
            } else {
                log::warn!(target: "gehete::mbuf_exchange", "queue[{}] device[{}]: ret_code={}", queue_id, device_id, info.ret_code);
            }
        }

        let len = core::mbuf_data_len(mbuf)?.saturating_sub(control.skip_size);
        if zero_copy {
            return Ok(DequeueResult {
                trans_id: info.trans_id, eos: false, null_data: false, ret_code: info.ret_code,
                payload: DequeuedPayload::ZeroCopy(AlignedPtr { mbuf, len }),
            });
        }

        let addr = core::mbuf_buff_addr(mbuf)?;
        let src = unsafe { std::slice::from_raw_parts(addr.add(control.skip_size), len) };
        let n = len.min(out_buf.len());
        out_buf[..n].copy_from_slice(&src[..n]);
        core::mbuf_free(mbuf)?;
        Ok(DequeueResult { trans_id: info.trans_id, eos: false, null_data: false, ret_code: info.ret_code, payload: DequeuedPayload::Copied(n) })
    }

    fn dequeue_buff(&self, device_id: i32, queue_id: u32, out_buf: &mut [u8], control: &mut ControlInfo) -> Result<DequeueResult> {
        let mut header = [0u8; MBUF_HEAD_MAX_SIZE];
        let (_payload_ptr, payload_len) = self.dequeue_buff_raw(device_id, queue_id, &mut header, control.timeout_ms)?;

        let eos = flow_msg::is_eos(&header)?;
        control.end_of_sequence_flag = eos;
        let info = flow_msg::read_msg_info(&header)?;

        if eos {
            return Ok(DequeueResult { trans_id: info.trans_id, eos: true, null_data: false, ret_code: 0, payload: DequeuedPayload::None });
        }
        if info.has_null_data() {
            return Ok(DequeueResult { trans_id: info.trans_id, eos: false, null_data: true, ret_code: info.ret_code, payload: DequeuedPayload::None });
        }

        let n = payload_len.saturating_sub(control.skip_size).min(out_buf.len());
        if n > 0 {
            let src = unsafe { std::slice::from_raw_parts(_payload_ptr.add(control.skip_size), n) };
            out_buf[..n].copy_from_slice(src);
        }
        core::free_device(_payload_ptr)?;
        Ok(DequeueResult { trans_id: info.trans_id, eos: false, null_data: false, ret_code: info.ret_code, payload: DequeuedPayload::Copied(n) })
    }

    // -- enqueue/dequeue state machines (§4.B.2) -----------------------------

    fn enqueue_mbuf(&self, device_id: i32, queue_id: u32, mbuf: Mbuf, timeout_ms: i32) -> Result<()> {
        let key = (device_id, queue_id);
        let effective_ms = if timeout_ms < 0 { QUEUE_OP_TIMEOUT_MS as u64 } else { timeout_ms as u64 };
        let deadline = Instant::now() + Duration::from_millis(effective_ms);

        loop {
            self.enqueue_ready.reset(key)?;
            let status = core::try_enqueue_mbuf(device_id, queue_id, mbuf)?;
            if status == Status::Success {
                return Ok(());
            }
            debug_assert_eq!(status, Status::QueueFull);

            let can_wait = Instant::now() < deadline;
            if !can_wait {
                let _ = core::mbuf_free(mbuf);
                return Err(Error::Timeout { queue_id, waited_ms: timeout_ms.max(0) as u32 });
            }

            let slice = slice_duration(ENQUEUE_WAIT_SLICE_MS, deadline);
            self.wait_on(&self.enqueue_cv, &self.enqueue_ready, key, slice)?;
        }
    }

    fn enqueue_buff(&self, device_id: i32, queue_id: u32, header: &[u8], payload: &[u8], timeout_ms: i32) -> Result<()> {
        let key = (device_id, queue_id);
        let effective_ms = if timeout_ms < 0 { QUEUE_OP_TIMEOUT_MS as u64 } else { timeout_ms as u64 };
        let deadline = Instant::now() + Duration::from_millis(effective_ms);

        loop {
            self.enqueue_ready.reset(key)?;
            let status = core::try_enqueue_buff(device_id, queue_id, header, payload)?;
            if status == Status::Success {
                return Ok(());
            }
            let can_wait = Instant::now() < deadline;
            if !can_wait {
                return Err(Error::Timeout { queue_id, waited_ms: timeout_ms.max(0) as u32 });
            }
            let slice = slice_duration(ENQUEUE_WAIT_SLICE_MS, deadline);
            self.wait_on(&self.enqueue_cv, &self.enqueue_ready, key, slice)?;
        }
    }

    fn dequeue_mbuf(&self, device_id: i32, queue_id: u32, timeout_ms: i32) -> Result<Mbuf> {
        let key = (device_id, queue_id);
        let effective_ms = if timeout_ms < 0 { QUEUE_OP_TIMEOUT_MS as u64 } else { timeout_ms as u64 };
        let deadline = Instant::now() + Duration::from_millis(effective_ms);

        loop {
            self.dequeue_ready.reset(key)?;
            let (status, mbuf) = core::try_dequeue_mbuf(device_id, queue_id)?;
            if status == Status::Success {
                return Ok(mbuf.expect("Success dequeue must yield an mbuf"));
            }
            debug_assert_eq!(status, Status::QueueEmpty);

            let can_wait = Instant::now() < deadline;
            if !can_wait {
                return Err(Error::Timeout { queue_id, waited_ms: timeout_ms.max(0) as u32 });
            }
            let slice = slice_duration(DEQUEUE_WAIT_SLICE_MS, deadline);
            self.wait_on(&self.dequeue_cv, &self.dequeue_ready, key, slice)?;
        }
    }

    fn dequeue_buff_raw(&self, device_id: i32, queue_id: u32, header_out: &mut [u8], timeout_ms: i32) -> Result<(*mut u8, usize)> {
        let key = (device_id, queue_id);
        let effective_ms = if timeout_ms < 0 { QUEUE_OP_TIMEOUT_MS as u64 } else { timeout_ms as u64 };
        let deadline = Instant::now() + Duration::from_millis(effective_ms);

        loop {
            self.dequeue_ready.reset(key)?;
            let (status, payload) = core::try_dequeue_buff(device_id, queue_id, header_out)?;
            if status == Status::Success {
                return Ok(payload.expect("Success dequeue must yield a payload"));
            }
            let can_wait = Instant::now() < deadline;
            if !can_wait {
                return Err(Error::Timeout { queue_id, waited_ms: timeout_ms.max(0) as u32 });
            }
            let slice = slice_duration(DEQUEUE_WAIT_SLICE_MS, deadline);
            self.wait_on(&self.dequeue_cv, &self.dequeue_ready, key, slice)?;
        }
    }

    fn wait_on(&self, cv: &Condvar, ready: &ReadyFlags, key: (i32, u32), slice: Duration) -> Result<()> {
        if cfg!(feature = "event_debug_print") {
            println!("-> Waiting on device[{}] queue[{}] for up to {:?}.", key.0, key.1, slice);
        }
        let guard = self.park.lock()?;
        let (_guard, timeout) = cv.wait_timeout_while(guard, slice, |_| {
            !ready.is_ready(key).unwrap_or(true)
        })?;
        if cfg!(feature = "event_debug_print") {
            println!("-> Woke on device[{}] queue[{}], timed_out: {}.", key.0, key.1, timeout.timed_out());
        }
        Ok(())
    }

    pub fn current_trans_id(&self, device_id: i32, queue_id: u32) -> u64 {
        self.trans_ids.current(device_id, queue_id)
    }
}

impl Default for MbufExchangeService {
    fn default() -> MbufExchangeService {
        MbufExchangeService::new()
    }
}

fn slice_duration(slice_ms: u32, deadline: Instant) -> Duration {
    let slice = Duration::from_millis(slice_ms as u64);
    deadline.saturating_duration_since(Instant::now()).min(slice)
}

#[cfg(target_os = "linux")]
fn pin_current_thread_to_cpu(cpu: usize) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_current_thread_to_cpu(_cpu: usize) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_attrs::MemQueueAttr;

    // Tests share the process-wide singleton (the event thread it spawns
    // always reaches back through `instance()`), but distinguish themselves
    // by `device_id` so they don't observe each other's queues. Each test
    // tears down only its own device with `shutdown_device`.
    fn fresh_service(device_id: i32) -> &'static MbufExchangeService {
        let svc = MbufExchangeService::instance();
        svc.initialize(device_id).unwrap();
        svc
    }

    #[test]
    fn enqueue_dequeue_preserves_trans_id_order() {
        let svc = fresh_service(101);
        let queue_id = svc.create_queue(101, "q1", MemQueueAttr { depth: 4, ..Default::default() }).unwrap();

        for i in 0..3u8 {
            let payload = vec![i; 100];
            svc.enqueue_copy(101, queue_id, 100, |b| b.copy_from_slice(&payload), &ControlInfo::default()).unwrap();
        }

        let mut buf = [0u8; 100];
        for expected in [1u64, 2, 3] {
            let mut ctl = ControlInfo::default();
            let res = svc.dequeue(101, queue_id, &mut buf, &mut ctl, false).unwrap();
            assert_eq!(res.trans_id, expected);
        }
        svc.shutdown_device(101).unwrap();
    }

    #[test]
    fn zero_timeout_enqueue_fails_fast_on_full_queue() {
        let svc = fresh_service(102);
        let queue_id = svc.create_queue(102, "q2", MemQueueAttr { depth: 1, ..Default::default() }).unwrap();
        let mut ctl = ControlInfo { timeout_ms: 0, ..Default::default() };
        svc.enqueue_copy(102, queue_id, 8, |_| {}, &ctl).unwrap();
        ctl.timeout_ms = 0;
        let err = svc.enqueue_copy(102, queue_id, 8, |_| {}, &ctl).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        svc.shutdown_device(102).unwrap();
    }

    #[test]
    fn eos_dequeue_reports_flag_with_empty_payload() {
        let svc = fresh_service(103);
        let queue_id = svc.create_queue(103, "q3", MemQueueAttr::default()).unwrap();
        svc.enqueue_copy(103, queue_id, 16, |b| b.fill(9), &ControlInfo::default()).unwrap();
        svc.enqueue_eos(103, queue_id, -1).unwrap();

        let mut buf = [0u8; 16];
        let mut ctl = ControlInfo::default();
        let data_msg = svc.dequeue(103, queue_id, &mut buf, &mut ctl, false).unwrap();
        assert!(!data_msg.eos);
        assert!(!ctl.end_of_sequence_flag);

        let mut ctl2 = ControlInfo::default();
        let eos_msg = svc.dequeue(103, queue_id, &mut buf, &mut ctl2, false).unwrap();
        assert!(eos_msg.eos);
        assert!(ctl2.end_of_sequence_flag);
        assert!(matches!(eos_msg.payload, DequeuedPayload::None));

        svc.shutdown_device(103).unwrap();
    }
}
