//! `gehete` — host-side dataflow execution runtime for heterogeneous
//! accelerator models.
//!
//! This crate sits between a graph-execution engine and an accelerator's
//! driver, moving tensors in and out of device-resident models through
//! shared memory queues ("Mbufs") and standing up the on-device scheduler
//! task chains ("SchedTaskInfo") that drive a model's inference loop
//! without round-tripping through the host for every step.
//!
//! ## Layout
//!
//! - [`mbuf_exchange`] — the mutex/condvar-guarded façade over driver
//!   message queues every other module builds on.
//! - [`flow_msg`] and [`queue_attrs`] — the typed views and per-operation
//!   parameters threaded through enqueue/dequeue.
//! - [`trans_id`] — per-(device, queue) transaction id allocation.
//! - [`sched_task`] — device-resident CPU-kernel task arg blocks.
//! - [`sched_model_builder`] and [`npu_sched_loader`] — assemble a model's
//!   fixed scheduler-stream task chain and stand it up on the device.
//! - [`executor`] and [`proxy_executor`] — run that chain per request, on
//!   or off the device's own AICPU.
//! - [`dispatcher`] — routes device-raised `ActivateModel` events to the
//!   registered executor.
//! - [`hcom`] — cluster topology descriptor registry for collective models.
//! - [`membaton`] — cross-stream memory handoff primitives.
//! - [`config`] — process-wide runtime configuration.
//!
//! For lower level interfaces — the raw driver call wrappers and the
//! simulated/FFI backend they dispatch to — see the [`gehete-drv-core`] and
//! [`gehete-drv-sys`] crates this one is built on.

#![doc(html_root_url = "https://docs.rs/gehete/0.1.0")]

pub extern crate gehete_drv_core as drv_core;

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod flow_msg;
pub mod hcom;
pub mod mbuf_exchange;
pub mod membaton;
pub mod npu_sched_loader;
pub mod proxy_executor;
pub mod queue_attrs;
pub mod sched_model_builder;
pub mod sched_task;
pub mod trans_id;

pub use crate::config::RuntimeConfig;
pub use crate::dispatcher::CpuSchedEventDispatcher;
pub use crate::error::{Error, Result};
pub use crate::executor::{ClearAction, DynamicModelExecutor, ExecutorState};
pub use crate::flow_msg::FlowMsg;
pub use crate::hcom::HcomClusterDesc;
pub use crate::mbuf_exchange::{AlignedPtr, MbufExchangeService};
pub use crate::membaton::{GertEvent, MultiStreamMemBlock};
pub use crate::npu_sched_loader::{LoadModelSpec, LoadedModel, NpuSchedModelLoader};
pub use crate::proxy_executor::ProxyDynamicModelExecutor;
pub use crate::queue_attrs::{ControlInfo, MemQueueAttr, QueueAttrs};
pub use crate::sched_model_builder::{CpuSchedModelBuilder, ModelBuildSpec, ModelInfo};
pub use crate::trans_id::TransIdRegistry;

#[doc(no_inline)]
pub use crate::drv_core::{DeviceType, Mbuf, Status};
