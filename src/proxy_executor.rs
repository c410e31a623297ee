//! `ProxyDynamicModelExecutor` — a host-side stand-in for
//! [`crate::executor::DynamicModelExecutor`] used when a model actually runs
//! on a remote host process rather than this device's AICPU. Dequeues
//! requests off the device's request queue, forwards them through a
//! [`DynamicModelExecutor`], and enqueues the response back to the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gehete_drv_core::Mbuf;
use log::{debug, error, warn};

use crate::error::Result;
use crate::executor::DynamicModelExecutor;
use crate::flow_msg::FlowMsg;
use crate::mbuf_exchange::MbufExchangeService;

/// Retry slice used while cooperatively polling the request queue so the
/// dispatcher thread notices `running` going false promptly.
const RETRY_INTERVAL_MS: u32 = 200;
/// Response delivery gets a generous timeout since a slow consumer
/// shouldn't silently drop a completed result.
const RESPONSE_TIMEOUT_MS: i32 = 10 * 60 * 1000;

/// Dispatches requests arriving on a device queue pair to a host-resident
/// [`DynamicModelExecutor`] and relays results back to the device.
pub struct ProxyDynamicModelExecutor {
    device_id: i32,
    req_queue_id: u32,
    resp_queue_id: u32,
    executor: Arc<DynamicModelExecutor>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ProxyDynamicModelExecutor {
    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    pub fn queues(&self) -> (u32, u32) {
        (self.req_queue_id, self.resp_queue_id)
    }

    pub fn executor(&self) -> &Arc<DynamicModelExecutor> {
        &self.executor
    }

    pub fn start(
        device_id: i32,
        req_queue_id: u32,
        resp_queue_id: u32,
        executor: Arc<DynamicModelExecutor>,
    ) -> Result<ProxyDynamicModelExecutor> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let thread_executor = executor.clone();

        let handle = thread::Builder::new()
            .name(format!("ge-hete-proxy-{}", device_id))
            .spawn(move || {
                Self::dispatch_loop(device_id, req_queue_id, resp_queue_id, thread_executor, thread_running);
            })?;

        Ok(ProxyDynamicModelExecutor {
            device_id,
            req_queue_id,
            resp_queue_id,
            executor,
            running,
            thread: Some(handle),
        })
    }

    fn dispatch_loop(
        device_id: i32,
        req_queue_id: u32,
        resp_queue_id: u32,
        executor: Arc<DynamicModelExecutor>,
        running: Arc<AtomicBool>,
    ) {
        let svc = MbufExchangeService::instance();
        while running.load(Ordering::Acquire) {
            let req_mbuf = match Self::dequeue_request(svc, device_id, req_queue_id, &running) {
                Some(mbuf) => mbuf,
                None => continue,
            };

            let resp_mbuf = match Self::build_response_mbuf(req_mbuf) {
                Ok(mbuf) => mbuf,
                Err(err) => {
                    error!("device {}: failed to build response mbuf: {}", device_id, err);
                    let _ = gehete_drv_core::mbuf_free(req_mbuf);
                    continue;
                }
            };

            let device_id_for_cb = device_id;
            let callback: crate::executor::ExecuteCallback = Box::new(move |result| {
                match result {
                    Ok(Some(resp)) => {
                        if let Err(err) = Self::publish_response(device_id_for_cb, resp_queue_id, resp) {
                            error!("device {}: failed to publish response: {}", device_id_for_cb, err);
                        }
                    }
                    Ok(None) => warn!("device {}: proxy execution produced no response mbuf", device_id_for_cb),
                    Err(err) => error!("device {}: model execution failed: {}", device_id_for_cb, err),
                }
            });

            if let Err(err) = executor.execute_async(req_mbuf, resp_mbuf, callback) {
                error!("device {}: execute_async rejected request: {}", device_id, err);
                let _ = gehete_drv_core::mbuf_free(req_mbuf);
                let _ = gehete_drv_core::mbuf_free(resp_mbuf);
            }
        }
    }

    fn dequeue_request(svc: &MbufExchangeService, device_id: i32, queue_id: u32, running: &AtomicBool) -> Option<Mbuf> {
        loop {
            if !running.load(Ordering::Acquire) {
                return None;
            }
            let mut control = crate::queue_attrs::ControlInfo { timeout_ms: RETRY_INTERVAL_MS as i32, ..Default::default() };
            let mut buf = [0u8; 0];
            match svc.dequeue(device_id, queue_id, &mut buf, &mut control, true) {
                Ok(result) => match result.payload {
                    crate::queue_attrs::DequeuedPayload::ZeroCopy(ptr) => {
                        let mbuf = match gehete_drv_core::mbuf_build(ptr.as_slice().as_ptr() as *mut u8, ptr.len()) {
                            Ok(mbuf) => mbuf,
                            Err(_) => continue,
                        };
                        std::mem::forget(ptr);
                        return Some(mbuf);
                    }
                    _ => continue,
                },
                Err(_) => {
                    thread::sleep(Duration::from_millis(RETRY_INTERVAL_MS as u64));
                    continue;
                }
            }
        }
    }

    /// Allocates the response mbuf and copies the request's trans-id/flags
    /// header forward so the reply carries the same correlation identity.
    fn build_response_mbuf(req_mbuf: Mbuf) -> Result<Mbuf> {
        let req_priv = gehete_drv_core::mbuf_priv_info(req_mbuf)?;
        let info = crate::flow_msg::read_msg_info(req_priv)?;
        let resp = FlowMsg::alloc_tensor(0, 0)?;
        let resp_priv = gehete_drv_core::mbuf_priv_info(resp.mbuf())?;
        crate::flow_msg::write_msg_info(resp_priv, &info)?;
        Ok(resp.mbuf())
    }

    fn publish_response(device_id: i32, resp_queue_id: u32, resp_mbuf: Mbuf) -> Result<()> {
        debug!("device {}: publishing response on queue {}", device_id, resp_queue_id);
        let svc = MbufExchangeService::instance();
        let size = gehete_drv_core::mbuf_buff_size(resp_mbuf).unwrap_or(0);
        let mut scratch = vec![0u8; size];
        if size > 0 {
            if let Ok(addr) = gehete_drv_core::mbuf_buff_addr(resp_mbuf) {
                let src = unsafe { std::slice::from_raw_parts(addr, size) };
                scratch.copy_from_slice(src);
            }
        }
        let control = crate::queue_attrs::ControlInfo { timeout_ms: RESPONSE_TIMEOUT_MS, ..Default::default() };
        svc.enqueue_copy(device_id, resp_queue_id, size, |dst| dst.copy_from_slice(&scratch), &control)?;
        gehete_drv_core::mbuf_free(resp_mbuf)
    }
}

impl Drop for ProxyDynamicModelExecutor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_spawns_a_named_dispatch_thread() {
        let executor = DynamicModelExecutor::initialize(210, false).unwrap();
        let svc = MbufExchangeService::instance();
        svc.initialize(210).unwrap();
        let req_q = svc.create_queue(210, "proxy_req", crate::queue_attrs::MemQueueAttr::default()).unwrap();
        let resp_q = svc.create_queue(210, "proxy_resp", crate::queue_attrs::MemQueueAttr::default()).unwrap();
        let proxy = ProxyDynamicModelExecutor::start(210, req_q, resp_q, executor).unwrap();
        drop(proxy);
        svc.shutdown_device(210).unwrap();
    }
}
