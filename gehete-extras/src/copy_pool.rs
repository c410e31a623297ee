//! Multi-threaded bulk memory copy.
//!
//! Mirrors the driver's own copy-splitting heuristic: below
//! [`MULTI_THREAD_COPY_UNIT`] bytes a single `memcpy` is cheaper than the
//! thread-spawn overhead. Above it, the block count is chosen in two
//! passes: an initial `block_num = min(ceil(total/20MiB), 9)`, a batch size
//! rounded up to a 2MiB boundary from that, and then `block_num` is
//! recomputed from the rounded batch size so the last block never needs to
//! carry more than one alignment unit of slack. Every block but the last is
//! dispatched to a process-wide pool of [`COPY_THREAD_POOL_SIZE`] workers
//! (named `ge_hete_cpy`, standing up lazily on first use and living for the
//! rest of the process); the calling thread always takes the (possibly
//! short) tail block itself rather than waiting on one more worker for it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

pub const MULTI_THREAD_COPY_UNIT: usize = 20 * 1024 * 1024;
pub const MULTI_THREAD_COPY_ALIGN: usize = 2 * 1024 * 1024;
pub const COPY_THREAD_POOL_SIZE: usize = 8;
const COPY_THREAD_NAME: &str = "ge_hete_cpy";

struct CopyJob(Box<dyn FnOnce() + Send>);

/// Process-wide pool of [`COPY_THREAD_POOL_SIZE`] `ge_hete_cpy` workers
/// sharing one job queue, standing in for the driver's own oversize-memcpy
/// worker pool.
struct CopyPool {
    jobs: Sender<CopyJob>,
}

impl CopyPool {
    fn new(size: usize) -> CopyPool {
        let (tx, rx) = mpsc::channel::<CopyJob>();
        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..size {
            let rx = Arc::clone(&rx);
            thread::Builder::new()
                .name(COPY_THREAD_NAME.to_string())
                .spawn(move || loop {
                    let job = {
                        let rx = rx.lock().expect("ge_hete_cpy job queue poisoned");
                        rx.recv()
                    };
                    match job {
                        Ok(CopyJob(run)) => run(),
                        Err(_) => break, // sender dropped: process shutting down
                    }
                })
                .expect("failed to spawn ge_hete_cpy worker");
        }
        CopyPool { jobs: tx }
    }

    /// Runs `run` on a pool worker and returns a receiver that yields once
    /// it completes (`Err` if the worker panicked).
    fn dispatch(&self, run: impl FnOnce() + Send + 'static) -> Receiver<Result<(), String>> {
        let (done_tx, done_rx) = mpsc::channel();
        let job = CopyJob(Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(run))
                .map_err(|_| "ge_hete_cpy worker panicked".to_string());
            let _ = done_tx.send(result);
        }));
        self.jobs.send(job).expect("ge_hete_cpy pool workers have shut down");
        done_rx
    }
}

static COPY_POOL: OnceLock<CopyPool> = OnceLock::new();

fn copy_pool() -> &'static CopyPool {
    COPY_POOL.get_or_init(|| CopyPool::new(COPY_THREAD_POOL_SIZE))
}

/// Dispatches a single block's copy onto the pool. `dst_chunk`/`src_chunk`
/// only need to stay valid until the caller receives the completion signal,
/// which `multi_thread_copy` waits for before `dst`/`src` go out of scope —
/// so the blocks' addresses, not the borrows themselves, cross into the
/// 'static job closure.
fn dispatch_block(dst_chunk: &mut [u8], src_chunk: &[u8]) -> Receiver<Result<(), String>> {
    let dst_addr = dst_chunk.as_mut_ptr() as usize;
    let src_addr = src_chunk.as_ptr() as usize;
    let len = dst_chunk.len();
    copy_pool().dispatch(move || {
        // SAFETY: `multi_thread_copy` blocks on every dispatched block's
        // receiver before `dst`/`src` are dropped, so these addresses stay
        // valid for the lifetime of this closure.
        let dst = unsafe { std::slice::from_raw_parts_mut(dst_addr as *mut u8, len) };
        let src = unsafe { std::slice::from_raw_parts(src_addr as *const u8, len) };
        dst.copy_from_slice(src);
    })
}

/// Copies `src` into `dst`, splitting the work across the `ge_hete_cpy`
/// worker pool once the transfer is large enough to amortize dispatch cost.
///
/// `dst` and `src` must be the same length. Returns the first panic message
/// encountered by any worker, if any; a clean copy always leaves
/// `dst == src`.
pub fn multi_thread_copy(dst: &mut [u8], src: &[u8]) -> Result<(), String> {
    assert_eq!(dst.len(), src.len(), "multi_thread_copy: length mismatch");

    if dst.len() <= MULTI_THREAD_COPY_UNIT {
        dst.copy_from_slice(src);
        return Ok(());
    }

    let total = dst.len();
    let block_size = batch_size(total);
    let block_num = div_ceil(total, block_size);

    let spawned = block_num - 1;
    let (head, tail) = dst.split_at_mut(spawned * block_size);
    let (src_head, src_tail) = src.split_at(spawned * block_size);

    let receivers: Vec<_> = head.chunks_mut(block_size)
        .zip(src_head.chunks(block_size))
        .map(|(dst_chunk, src_chunk)| dispatch_block(dst_chunk, src_chunk))
        .collect();

    tail.copy_from_slice(src_tail);

    for (i, rx) in receivers.into_iter().enumerate() {
        rx.recv()
            .map_err(|_| format!("copy worker for block {} disconnected", i))?
            .map_err(|err| format!("copy worker {} failed: {}", i, err))?;
    }
    Ok(())
}

fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// First-pass block count: `min(ceil(total/20MiB), 9)`, capped at
/// [`COPY_THREAD_POOL_SIZE`] `+ 1` workers (the pool plus the caller).
fn block_count(total: usize) -> usize {
    div_ceil(total, MULTI_THREAD_COPY_UNIT).min(COPY_THREAD_POOL_SIZE + 1).max(1)
}

/// Batch size rounded up to a [`MULTI_THREAD_COPY_ALIGN`] boundary from the
/// first-pass block count; the final block count is then `ceil(total/batch)`.
fn batch_size(total: usize) -> usize {
    let block_num = block_count(total);
    if block_num <= 1 {
        return total;
    }
    let raw = div_ceil(total, block_num);
    div_ceil(raw, MULTI_THREAD_COPY_ALIGN) * MULTI_THREAD_COPY_ALIGN
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn small_copy_is_direct() {
        let src = vec![7u8; 1024];
        let mut dst = vec![0u8; 1024];
        multi_thread_copy(&mut dst, &src).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn large_copy_splits_across_threads() {
        let mut rng = rand::thread_rng();
        let len = MULTI_THREAD_COPY_UNIT + 5 * MULTI_THREAD_COPY_ALIGN + 17;
        let src: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let mut dst = vec![0u8; len];
        multi_thread_copy(&mut dst, &src).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn block_count_caps_at_pool_size_plus_one() {
        let huge = MULTI_THREAD_COPY_ALIGN * 100;
        assert_eq!(block_count(huge), COPY_THREAD_POOL_SIZE + 1);
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn mismatched_lengths_panic() {
        let mut dst = vec![0u8; 4];
        let src = vec![0u8; 8];
        multi_thread_copy(&mut dst, &src).unwrap();
    }
}
