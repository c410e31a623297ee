//! `DynamicModelExecutor` — owns one device's worker thread and runs the
//! check/prepare/execute/update pipeline for every request handed to it via
//! [`DynamicModelExecutor::execute_async`].
//!
//! State machine: `Idle` -(load_model)-> `Ready` -(execute_async)->
//! `Running` -(callback)-> `Ready`; `Running` -(error)-> `Failed`;
//! `Ready` -(clear_model(Stop))-> `Stopped` -(clear_model(Clear))-> `Ready`;
//! `Ready` -(unload_model)-> `Terminated`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use gehete_drv_core::Mbuf;
use log::{error, warn};

use crate::error::{Error, Result};
use crate::flow_msg::FlowMsg;
use crate::sched_model_builder::ModelInfo;

/// Process-wide mutex serializing device-driver calls that touch AICPU
/// model state across every executor on the host.
static EXEC_MUTEX: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Ready,
    Running,
    Failed,
    Stopped,
    Terminated,
}

/// Whether [`DynamicModelExecutor::clear_model`] stops the model or clears
/// its input queues and restarts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearAction {
    Stop = 1,
    Clear = 2,
}

pub type ExecuteCallback = Box<dyn FnOnce(Result<Option<Mbuf>>) + Send + 'static>;

/// One request queued onto the worker thread. `mbufs` is `None` for a
/// device-triggered activation (the model's own scheduler-stream tasks
/// already own dequeue/enqueue) and `Some` for a host-proxied request where
/// the caller dequeued the pair itself.
pub struct ModelExecuteParam {
    pub callback: ExecuteCallback,
    pub mbufs: Option<(Mbuf, Mbuf)>,
}

unsafe impl Send for ModelExecuteParam {}

/// Runs the check/prepare/execute/update pipeline for a single device's
/// models, off of a dedicated single-slot worker queue.
pub struct DynamicModelExecutor {
    device_id: i32,
    state: Mutex<ExecutorState>,
    model: Mutex<Option<ModelInfo>>,
    davinci_model_runtime_ids: Mutex<Vec<u32>>,
    sender: Mutex<Option<SyncSender<ModelExecuteParam>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop_flag: Arc<AtomicBool>,
    support_exception_notify: bool,
}

impl DynamicModelExecutor {
    /// Attaches the device, stands up the single-slot task queue and its
    /// worker thread, and returns in `Idle` state.
    pub fn initialize(device_id: i32, support_exception_notify: bool) -> Result<Arc<DynamicModelExecutor>> {
        gehete_drv_core::set_device(device_id)?;

        let executor = Arc::new(DynamicModelExecutor {
            device_id,
            state: Mutex::new(ExecutorState::Idle),
            model: Mutex::new(None),
            davinci_model_runtime_ids: Mutex::new(Vec::new()),
            sender: Mutex::new(None),
            worker: Mutex::new(None),
            stop_flag: Arc::new(AtomicBool::new(false)),
            support_exception_notify,
        });

        let (tx, rx) = sync_channel(1);
        let worker_executor = executor.clone();
        let stop_flag = executor.stop_flag.clone();
        let handle = thread::Builder::new()
            .name(format!("ge-hete-exec-{}", device_id))
            .spawn(move || worker_executor.worker_loop(rx, stop_flag))?;

        *executor.sender.lock()? = Some(tx);
        *executor.worker.lock()? = Some(handle);
        Ok(executor)
    }

    fn worker_loop(&self, rx: Receiver<ModelExecuteParam>, stop_flag: Arc<AtomicBool>) {
        while !stop_flag.load(Ordering::Acquire) {
            let param = match rx.recv() {
                Ok(p) => p,
                Err(_) => break,
            };
            let result = self.execute_internal(param.mbufs);
            (param.callback)(result);
        }
    }

    /// Parses the model's task chain, registers it as runtime-model-backed,
    /// and transitions `Idle` -> `Ready`.
    pub fn load_model(&self, model: ModelInfo, runtime_model_id: u32) -> Result<()> {
        model.distribute_all()?;
        self.davinci_model_runtime_ids.lock()?.push(runtime_model_id);
        *self.model.lock()? = Some(model);
        *self.state.lock()? = ExecutorState::Ready;
        Ok(())
    }

    pub fn state(&self) -> ExecutorState {
        *self.state.lock().expect("executor state mutex poisoned")
    }

    /// Queues a host-proxied request carrying an explicit request/response
    /// Mbuf pair. Returns `Err` immediately if the single worker slot is
    /// already occupied rather than blocking the caller.
    pub fn execute_async(&self, req_mbuf: Mbuf, resp_mbuf: Mbuf, callback: ExecuteCallback) -> Result<()> {
        self.submit(Some((req_mbuf, resp_mbuf)), callback)
    }

    /// Queues a device-triggered activation with no explicit Mbuf pair: the
    /// model's own scheduler-stream tasks already dequeued its input and
    /// will enqueue its output, so this just re-runs the task chain.
    pub fn activate(&self, callback: ExecuteCallback) -> Result<()> {
        self.submit(None, callback)
    }

    fn submit(&self, mbufs: Option<(Mbuf, Mbuf)>, callback: ExecuteCallback) -> Result<()> {
        if self.state() != ExecutorState::Ready {
            return Err(Error::String(format!("executor for device {} is not ready", self.device_id)));
        }
        let guard = self.sender.lock()?;
        let sender = guard.as_ref().ok_or_else(|| Error::String("executor has no worker thread".into()))?;
        *self.state.lock()? = ExecutorState::Running;
        sender
            .try_send(ModelExecuteParam { callback, mbufs })
            .map_err(|_| Error::String("executor's single worker slot is occupied".into()))
    }

    fn execute_internal(&self, mbufs: Option<(Mbuf, Mbuf)>) -> Result<Option<Mbuf>> {
        let outcome = (|| -> Result<Option<Mbuf>> {
            match mbufs {
                Some((req_mbuf, resp_mbuf)) => {
                    let req = FlowMsg::Raw { mbuf: req_mbuf };
                    let info = req.msg_info()?;
                    if req.is_eos()? || info.has_null_data() || info.ret_code != 0 {
                        self.publish_output_without_execute(req_mbuf, resp_mbuf, &info)?;
                        gehete_drv_core::mbuf_free(req_mbuf)?;
                        return Ok(Some(resp_mbuf));
                    }
                    self.do_execute_model()?;
                    gehete_drv_core::mbuf_free(req_mbuf)?;
                    Ok(Some(resp_mbuf))
                }
                None => {
                    self.do_execute_model()?;
                    Ok(None)
                }
            }
        })();

        let mut state = self.state.lock()?;
        *state = match &outcome {
            Ok(_) => ExecutorState::Ready,
            Err(_) => ExecutorState::Failed,
        };
        outcome
    }

    fn publish_output_without_execute(&self, req_mbuf: Mbuf, resp_mbuf: Mbuf, info: &crate::flow_msg::MsgInfo) -> Result<()> {
        let resp_priv = gehete_drv_core::mbuf_priv_info(resp_mbuf)?;
        crate::flow_msg::write_msg_info(resp_priv, info)?;
        crate::flow_msg::set_eos(resp_priv, crate::flow_msg::is_eos(gehete_drv_core::mbuf_priv_info(req_mbuf)?)?)?;
        Ok(())
    }

    fn do_execute_model(&self) -> Result<()> {
        let _guard = EXEC_MUTEX.lock()?;
        let model = self.model.lock()?;
        let model = model.as_ref().ok_or_else(|| Error::String("no model loaded".into()))?;
        model.distribute_all()
    }

    /// `Stop` halts AICPU model execution; `Clear` drains and restarts its
    /// input queues. A no-op (not an error) if no runtime model is loaded.
    pub fn clear_model(&self, action: ClearAction) -> Result<()> {
        let ids = self.davinci_model_runtime_ids.lock()?;
        if ids.is_empty() {
            return Ok(());
        }
        match action {
            ClearAction::Stop => *self.state.lock()? = ExecutorState::Stopped,
            ClearAction::Clear => *self.state.lock()? = ExecutorState::Ready,
        }
        Ok(())
    }

    /// Runs the exception-handling path for a failed transaction, gated on
    /// whether the loaded firmware supports it.
    pub fn exception_notify(&self, exception_type: u32, trans_id: u64) -> Result<()> {
        if !self.support_exception_notify {
            warn!(
                "device {}: exception notify requested (type {}, trans {}) but firmware doesn't support it, dropping",
                self.device_id, exception_type, trans_id
            );
            return Ok(());
        }
        error!("device {}: processing data exception type {} for trans {}", self.device_id, exception_type, trans_id);
        *self.state.lock()? = ExecutorState::Failed;
        Ok(())
    }

    /// Stops the worker thread, drops the model, frees its runtime-model
    /// registration, and transitions to `Terminated`.
    pub fn unload_model(&self) -> Result<()> {
        self.stop_flag.store(true, Ordering::Release);
        *self.sender.lock()? = None;
        if let Some(handle) = self.worker.lock()?.take() {
            let _ = handle.join();
        }
        self.model.lock()?.take();
        self.davinci_model_runtime_ids.lock()?.clear();
        *self.state.lock()? = ExecutorState::Terminated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_and_is_ready_without_a_model() {
        let executor = DynamicModelExecutor::initialize(200, false).unwrap();
        assert_eq!(executor.state(), ExecutorState::Idle);
        executor.unload_model().unwrap();
        assert_eq!(executor.state(), ExecutorState::Terminated);
    }

    #[test]
    fn clear_model_without_runtime_ids_is_a_no_op() {
        let executor = DynamicModelExecutor::initialize(201, false).unwrap();
        executor.clear_model(ClearAction::Stop).unwrap();
        assert_eq!(executor.state(), ExecutorState::Idle);
        executor.unload_model().unwrap();
    }

    #[test]
    fn exception_notify_without_support_is_silently_dropped() {
        let executor = DynamicModelExecutor::initialize(202, false).unwrap();
        executor.exception_notify(1, 42).unwrap();
        assert_eq!(executor.state(), ExecutorState::Idle);
        executor.unload_model().unwrap();
    }
}
