//! `GertEvent` / `MultiStreamMemBlock` — a minimal baton for handing one
//! device buffer between streams that don't otherwise share an execution
//! order. This is a deliberately partial implementation: it only covers the
//! single-producer/multi-consumer handoff the scheduler builders need
//! (mark a block ready, let every consumer stream wait on it once); it does
//! not model the full multi-writer reference-counted buffer pool the
//! original subsystem provides.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::Result;

/// A one-shot cross-stream signal: a producer calls [`GertEvent::record`]
/// once; any number of consumers can [`GertEvent::wait`] and will all
/// unblock once it fires.
#[derive(Clone)]
pub struct GertEvent {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl GertEvent {
    pub fn new() -> GertEvent {
        GertEvent { inner: Arc::new((Mutex::new(false), Condvar::new())) }
    }

    pub fn record(&self) -> Result<()> {
        let (lock, cvar) = &*self.inner;
        let mut fired = lock.lock()?;
        *fired = true;
        cvar.notify_all();
        Ok(())
    }

    pub fn wait(&self) -> Result<()> {
        let (lock, cvar) = &*self.inner;
        let mut fired = lock.lock()?;
        while !*fired {
            fired = cvar.wait(fired)?;
        }
        Ok(())
    }

    pub fn is_recorded(&self) -> Result<bool> {
        Ok(*self.inner.0.lock()?)
    }
}

impl Default for GertEvent {
    fn default() -> GertEvent {
        GertEvent::new()
    }
}

/// A device memory block shared by multiple streams, freed once every
/// holder has dropped its handle. Pairs the block's address with a
/// [`GertEvent`] so consumers can wait for the producing stream to finish
/// writing before reading it.
pub struct MultiStreamMemBlock {
    addr: *mut u8,
    size: usize,
    refcount: Arc<AtomicUsize>,
    ready: GertEvent,
}

unsafe impl Send for MultiStreamMemBlock {}

impl MultiStreamMemBlock {
    pub fn alloc(size: usize) -> Result<MultiStreamMemBlock> {
        let addr = gehete_drv_core::malloc_device(size.max(1))?;
        Ok(MultiStreamMemBlock { addr, size, refcount: Arc::new(AtomicUsize::new(1)), ready: GertEvent::new() })
    }

    pub fn addr(&self) -> u64 {
        self.addr as u64
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn ready_event(&self) -> GertEvent {
        self.ready.clone()
    }

    /// Hands out another reference to the same block, bumping the shared
    /// refcount; the backing allocation is freed only once every clone has
    /// been dropped.
    pub fn share(&self) -> MultiStreamMemBlock {
        self.refcount.fetch_add(1, Ordering::AcqRel);
        MultiStreamMemBlock { addr: self.addr, size: self.size, refcount: self.refcount.clone(), ready: self.ready.clone() }
    }

    pub fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }
}

impl Drop for MultiStreamMemBlock {
    fn drop(&mut self) {
        if self.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _ = gehete_drv_core::free_device(self.addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn gert_event_wakes_all_waiters() {
        let event = GertEvent::new();
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let e = event.clone();
                thread::spawn(move || e.wait().unwrap())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        event.record().unwrap();
        for c in consumers {
            c.join().unwrap();
        }
    }

    #[test]
    fn mem_block_frees_only_after_last_share_drops() {
        let block = MultiStreamMemBlock::alloc(64).unwrap();
        let shared = block.share();
        assert_eq!(block.ref_count(), 2);
        drop(shared);
        assert_eq!(block.ref_count(), 1);
    }
}
