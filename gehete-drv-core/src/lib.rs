//! Thin, safe wrappers for the accelerator runtime driver.
//!
//! Gives callers access to driver functionality with a minimal layer of
//! zero-cost abstraction: each function in [`functions`] maps onto a single
//! driver call, translating its `rtError_t` into [`error::Error`] and
//! upgrading raw pointers into typed handles where it's cheap to do so. The
//! `gehete` crate builds the higher-level queue/model/scheduling semantics
//! on top of this layer.
//!
//! ## Even lower level: [`gehete-drv-sys`]
//!
//! If something is missing, or you need to call the driver directly, use
//! `gehete_drv_sys` (re-exported here as `ffi`). Its handles (`rtMbuf_t`,
//! `rtStream_t`, ...) are the same ones passed to and returned by the
//! functions in this crate.
//!
//! ## Driver simulation
//!
//! With the `driver-sim` feature (on by default), every call in this crate
//! is backed by `gehete-drv-sys`'s in-process simulation rather than the
//! vendor shared library. Disable the default features to link the real
//! FFI surface on a host with the accelerator driver installed.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate enum_primitive;

pub extern crate gehete_drv_sys as ffi;

pub mod error;
pub mod types;
mod functions;

pub use crate::error::{Error, Result};
pub use crate::types::{DataFlag, DeviceType, QueueDeployMode, QueueWorkMode, Status};

pub use crate::functions::{
    init_queue_subsystem, create_queue, destroy_queue, subscribe_queue, subscribe_f2nf,
    try_enqueue_mbuf, try_dequeue_mbuf, try_enqueue_buff, try_dequeue_buff,
    mbuf_alloc, mbuf_free, mbuf_build, mbuf_priv_info, mbuf_buff_addr, mbuf_buff_size,
    mbuf_set_data_len, mbuf_data_len,
    esched_create_group, esched_subscribe_event, esched_wait_event, esched_submit_event,
    malloc_device, free_device, memcpy_h2d,
    stream_create, stream_destroy, cpu_kernel_launch, set_device, ctx_create, ctx_destroy,
    Mbuf, Stream, Context,
};
