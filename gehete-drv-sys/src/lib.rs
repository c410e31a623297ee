//! Raw FFI bindings to the accelerator runtime driver.
//!
//! This crate is the `-sys` tier of the workspace: it declares the driver's
//! opaque handle types and entry points and does nothing else. Consumers
//! that need safe wrappers, error types, or higher-level helpers should
//! depend on `gehete-drv-core` instead.
//!
//! With the `driver-sim` feature (the default), the functions re-exported
//! here are backed by an in-process simulation rather than the vendor
//! shared library, so the crate builds and its callers are testable without
//! physical accelerator hardware.

pub mod types;

#[cfg(feature = "driver-sim")]
mod sim;

#[cfg(not(feature = "driver-sim"))]
mod ffi;

pub use types::*;

#[cfg(feature = "driver-sim")]
pub use sim::*;

#[cfg(not(feature = "driver-sim"))]
pub use ffi::*;

/// Resets all simulated driver state (queues, pending events, allocations).
/// Intended for use between test cases in crates further up the stack.
#[cfg(feature = "driver-sim")]
pub fn reset_sim_for_tests() {
    sim::__reset_for_tests();
}
