//! Safe, one-function-per-driver-call wrappers around `gehete-drv-sys`.
//!
//! Every function here returns `error::Result<T>`; a non-success `rtError_t`
//! is translated into `ErrorKind::DriverStatus` unless the call site
//! documents a more specific meaning (e.g. `QueueFull`/`QueueEmpty` are
//! returned as `Ok(Status::QueueFull)` rather than an `Err`, since callers
//! need to branch on them as part of normal back-pressure control flow, not
//! treat them as failures).

use std::ffi::CString;

use gehete_drv_sys as ffi;

use gehete_drv_sys::{DeviceId, QueueId};

use crate::error::{Error, Result};
use crate::types::Status;

pub type Mbuf = ffi::rtMbuf_t;
pub type Stream = ffi::rtStream_t;
pub type Context = ffi::rtContext_t;

fn check(code: i32) -> Result<()> {
    if code == ffi::types::RT_ERROR_NONE {
        Ok(())
    } else {
        Err(Error::driver_status(Status::from_rt_error(code)))
    }
}

pub fn init_queue_subsystem(device_id: DeviceId) -> Result<()> {
    let code = unsafe { ffi::rtMemQueueInit(device_id) };
    if code == ffi::types::RT_ERROR_NONE || code == ffi::types::ACL_ERROR_RT_FEATURE_NOT_SUPPORT {
        return Ok(());
    }
    Err(Error::driver_status(Status::from_rt_error(code)))
}

pub fn create_queue(device_id: DeviceId, name: &str, depth: u32, is_client: bool) -> Result<QueueId> {
    if name.len() > crate::types::MAX_QUEUE_NAME_LEN {
        return Err(Error::param_invalid(format!(
            "queue name {:?} exceeds {} characters", name, crate::types::MAX_QUEUE_NAME_LEN)));
    }
    let cname = CString::new(name)?;
    let mut queue_id: QueueId = 0;
    let code = unsafe {
        ffi::rtMemQueueCreate(device_id, cname.as_ptr(), depth, ffi::types::RT_MQ_MODE_PULL,
            is_client as u32, &mut queue_id)
    };
    check(code)?;
    Ok(queue_id)
}

pub fn destroy_queue(device_id: DeviceId, queue_id: QueueId) -> Result<()> {
    check(unsafe { ffi::rtMemQueueDestroy(device_id, queue_id) })
}

pub fn subscribe_queue(device_id: DeviceId, queue_id: QueueId, group_id: u32) -> Result<()> {
    check(unsafe { ffi::rtMemQueueSubscribe(device_id, queue_id, group_id) })
}

pub fn subscribe_f2nf(device_id: DeviceId, queue_id: QueueId) -> Result<()> {
    check(unsafe { ffi::rtMemQueueSubF2NFEvent(device_id, queue_id) })
}

/// Attempts a non-blocking whole-Mbuf enqueue. Returns the resulting status
/// rather than an `Err` for `QueueFull`, since callers drive the back-off
/// loop themselves.
pub fn try_enqueue_mbuf(device_id: DeviceId, queue_id: QueueId, mbuf: Mbuf) -> Result<Status> {
    let code = unsafe { ffi::rtMemQueueEnQueue(device_id, queue_id, mbuf) };
    let status = Status::from_rt_error(code);
    match status {
        Status::Success | Status::QueueFull => Ok(status),
        _ => Err(Error::driver_status(status)),
    }
}

/// Attempts a non-blocking whole-Mbuf dequeue. Returns `Ok(Status::QueueEmpty, None)`
/// shaped as `Ok((Status::QueueEmpty, None))` rather than erroring for the same
/// reason as [`try_enqueue_mbuf`].
pub fn try_dequeue_mbuf(device_id: DeviceId, queue_id: QueueId) -> Result<(Status, Option<Mbuf>)> {
    let mut mbuf: Mbuf = std::ptr::null_mut();
    let code = unsafe { ffi::rtMemQueueDeQueue(device_id, queue_id, &mut mbuf) };
    let status = Status::from_rt_error(code);
    match status {
        Status::Success => Ok((status, Some(mbuf))),
        Status::QueueEmpty => Ok((status, None)),
        _ => Err(Error::driver_status(status)),
    }
}

pub fn try_enqueue_buff(device_id: DeviceId, queue_id: QueueId, header: &[u8], payload: &[u8]) -> Result<Status> {
    let code = unsafe {
        ffi::rtMemQueueEnQueueBuff(device_id, queue_id,
            header.as_ptr() as *const _, header.len(),
            payload.as_ptr() as *const _, payload.len())
    };
    let status = Status::from_rt_error(code);
    match status {
        Status::Success | Status::QueueFull => Ok(status),
        _ => Err(Error::driver_status(status)),
    }
}

/// Dequeues in buff mode into a caller-owned header slice, returning the
/// driver-owned payload pointer and length on success (caller must free it
/// with `rtFree`/`free_host` per the driver's buff-mode ownership contract).
pub fn try_dequeue_buff(device_id: DeviceId, queue_id: QueueId, header_out: &mut [u8])
        -> Result<(Status, Option<(*mut u8, usize)>)> {
    let mut payload: *mut libc::c_void = std::ptr::null_mut();
    let mut payload_len: usize = 0;
    let code = unsafe {
        ffi::rtMemQueueDeQueueBuff(device_id, queue_id,
            header_out.as_mut_ptr() as *mut _, header_out.len(),
            &mut payload, &mut payload_len)
    };
    let status = Status::from_rt_error(code);
    match status {
        Status::Success => Ok((status, Some((payload as *mut u8, payload_len)))),
        Status::QueueEmpty => Ok((status, None)),
        _ => Err(Error::driver_status(status)),
    }
}

pub fn mbuf_alloc(size: usize) -> Result<Mbuf> {
    let mut mbuf: Mbuf = std::ptr::null_mut();
    check(unsafe { ffi::rtMbufAlloc(&mut mbuf, size) })?;
    Ok(mbuf)
}

pub fn mbuf_free(mbuf: Mbuf) -> Result<()> {
    check(unsafe { ffi::rtMbufFree(mbuf) })
}

/// Wraps caller memory as an Mbuf without copying (shared-input mode).
pub fn mbuf_build(buf: *mut u8, size: usize) -> Result<Mbuf> {
    let mut mbuf: Mbuf = std::ptr::null_mut();
    check(unsafe { ffi::rtMbufBuild(buf as *mut _, size, &mut mbuf) })?;
    Ok(mbuf)
}

pub fn mbuf_priv_info(mbuf: Mbuf) -> Result<&'static mut [u8]> {
    let mut ptr: *mut libc::c_void = std::ptr::null_mut();
    let mut size: usize = 0;
    check(unsafe { ffi::rtMbufGetPrivInfo(mbuf, &mut ptr, &mut size) })?;
    Ok(unsafe { std::slice::from_raw_parts_mut(ptr as *mut u8, size) })
}

pub fn mbuf_buff_addr(mbuf: Mbuf) -> Result<*mut u8> {
    let mut ptr: *mut libc::c_void = std::ptr::null_mut();
    check(unsafe { ffi::rtMbufGetBuffAddr(mbuf, &mut ptr) })?;
    Ok(ptr as *mut u8)
}

pub fn mbuf_buff_size(mbuf: Mbuf) -> Result<usize> {
    let mut size: usize = 0;
    check(unsafe { ffi::rtMbufGetBuffSize(mbuf, &mut size) })?;
    Ok(size)
}

pub fn mbuf_set_data_len(mbuf: Mbuf, len: usize) -> Result<()> {
    check(unsafe { ffi::rtMbufSetDataLen(mbuf, len) })
}

pub fn mbuf_data_len(mbuf: Mbuf) -> Result<usize> {
    let mut len: usize = 0;
    check(unsafe { ffi::rtMbufGetDataLen(mbuf, &mut len) })?;
    Ok(len)
}

pub fn esched_create_group(device_id: DeviceId, group_id: u32, grp_type: u32) -> Result<()> {
    check(unsafe { ffi::rtEschedCreateGroup(device_id, group_id, grp_type) })
}

pub fn esched_subscribe_event(device_id: DeviceId, group_id: u32, pid: i32, event_bitmap: u64) -> Result<()> {
    check(unsafe { ffi::rtEschedSubscribeEvent(device_id, group_id, pid, event_bitmap) })
}

/// Blocks up to `timeout_ms` waiting for an event on `group_id`. Timeouts
/// are reported as `Ok(None)`, matching `ACL_ERROR_RT_REPORT_TIMEOUT` being
/// benign at every call site in the spec.
pub fn esched_wait_event(device_id: DeviceId, group_id: u32, pid: i32, timeout_ms: i32)
        -> Result<Option<(u32, u32, Vec<u8>)>> {
    let mut event_id: u32 = 0;
    let mut subevent_id: u32 = 0;
    let mut msg = vec![0u8; 256];
    let mut msg_len: u32 = msg.len() as u32;
    let code = unsafe {
        ffi::rtEschedWaitEvent(device_id, group_id, pid, timeout_ms,
            &mut event_id, &mut subevent_id, msg.as_mut_ptr() as *mut _, &mut msg_len)
    };
    if code == ffi::types::ACL_ERROR_RT_REPORT_TIMEOUT {
        return Ok(None);
    }
    check(code)?;
    msg.truncate(msg_len as usize);
    Ok(Some((event_id, subevent_id, msg)))
}

pub fn esched_submit_event(device_id: DeviceId, event_id: u32, subevent_id: u32, dst_engine: u32,
        pid: i32, msg: &[u8]) -> Result<()> {
    check(unsafe {
        ffi::rtEschedSubmitEvent(device_id, event_id, subevent_id, dst_engine, pid,
            msg.as_ptr() as *const _, msg.len() as u32)
    })
}

pub fn malloc_device(size: usize) -> Result<*mut u8> {
    let mut ptr: *mut libc::c_void = std::ptr::null_mut();
    check(unsafe { ffi::rtMalloc(&mut ptr, size, ffi::types::RT_MEMORY_HBM) })?;
    Ok(ptr as *mut u8)
}

pub fn free_device(ptr: *mut u8) -> Result<()> {
    check(unsafe { ffi::rtFree(ptr as *mut _) })
}

pub fn memcpy_h2d(dst: *mut u8, dst_size: usize, src: &[u8]) -> Result<()> {
    check(unsafe { ffi::rtMemcpy(dst as *mut _, dst_size, src.as_ptr() as *const _, src.len(), 0) })
}

pub fn stream_create() -> Result<Stream> {
    let mut stream: Stream = std::ptr::null_mut();
    check(unsafe { ffi::rtStreamCreate(&mut stream, 0) })?;
    Ok(stream)
}

pub fn stream_destroy(stream: Stream) -> Result<()> {
    check(unsafe { ffi::rtStreamDestroy(stream) })
}

pub fn cpu_kernel_launch(kernel_name: &str, args: &[u8], stream: Stream) -> Result<()> {
    let cname = CString::new(kernel_name)?;
    check(unsafe {
        ffi::rtCpuKernelLaunchWithFlag(cname.as_ptr(), 1, args.as_ptr() as *const _,
            args.len() as u32, stream, 0)
    })
}

pub fn set_device(device_id: DeviceId) -> Result<()> {
    check(unsafe { ffi::rtSetDevice(device_id) })
}

pub fn ctx_create(device_id: DeviceId) -> Result<Context> {
    let mut ctx: Context = std::ptr::null_mut();
    check(unsafe { ffi::rtCtxCreate(&mut ctx, 0, device_id) })?;
    Ok(ctx)
}

pub fn ctx_destroy(ctx: Context) -> Result<()> {
    check(unsafe { ffi::rtCtxDestroy(ctx) })
}
