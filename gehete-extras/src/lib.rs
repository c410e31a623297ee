//! Support utilities shared by `gehete`'s higher-level services: the
//! multi-threaded bulk copy used by the Mbuf exchange path and the task
//! ordering chain used by the scheduler builders.

pub mod copy_pool;
pub mod task_chain;

pub use self::copy_pool::multi_thread_copy;
pub use self::task_chain::TaskChain;
