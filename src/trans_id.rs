//! Per-(device, queue) monotonic transaction id generation.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};

const SENTINEL: u64 = u64::MAX;

/// A registry of `last_trans_id` values keyed by `(device_id, queue_id)`.
///
/// `MbufExchangeService` owns one instance per process; tests may create
/// their own to exercise the generator in isolation.
pub struct TransIdRegistry {
    table: Mutex<HashMap<(i32, u32), u64>>,
}

impl TransIdRegistry {
    pub fn new() -> TransIdRegistry {
        TransIdRegistry { table: Mutex::new(HashMap::new()) }
    }

    /// Generates the next transaction id for `(device_id, queue_id)`.
    ///
    /// `user_assigned == 0` requests auto-increment; any other value asks
    /// the registry to adopt that id as `last`, failing if it would move
    /// the sequence backwards. `user_assigned == u64::MAX` is a reserved
    /// sentinel and always rejected.
    pub fn gen(&self, device_id: i32, queue_id: u32, user_assigned: u64) -> Result<u64> {
        if user_assigned == SENTINEL {
            return Err(Error::String(format!(
                "user_assigned trans id {} is the reserved sentinel", SENTINEL)));
        }

        let mut table = self.table.lock().unwrap();
        let last = *table.get(&(device_id, queue_id)).unwrap_or(&0);

        if user_assigned > 0 {
            if user_assigned < last {
                return Err(Error::String(format!(
                    "user_assigned trans id {} is behind last observed id {} for device {} queue {}",
                    user_assigned, last, device_id, queue_id)));
            }
            table.insert((device_id, queue_id), user_assigned);
            return Ok(user_assigned);
        }

        if last == SENTINEL - 1 {
            return Err(Error::TransIdExhausted { device_id, queue_id });
        }
        let next = last + 1;
        table.insert((device_id, queue_id), next);
        Ok(next)
    }

    /// Returns the last generated id for `(device_id, queue_id)`, or
    /// `u64::MAX` if no entry exists yet.
    pub fn current(&self, device_id: i32, queue_id: u32) -> u64 {
        self.table.lock().unwrap().get(&(device_id, queue_id)).copied().unwrap_or(SENTINEL)
    }

    /// Evicts the entry for a destroyed queue.
    pub fn evict(&self, device_id: i32, queue_id: u32) {
        self.table.lock().unwrap().remove(&(device_id, queue_id));
    }
}

impl Default for TransIdRegistry {
    fn default() -> TransIdRegistry {
        TransIdRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_increments_from_one() {
        let reg = TransIdRegistry::new();
        assert_eq!(reg.gen(0, 1, 0).unwrap(), 1);
        assert_eq!(reg.gen(0, 1, 0).unwrap(), 2);
        assert_eq!(reg.gen(0, 1, 0).unwrap(), 3);
    }

    #[test]
    fn user_assigned_must_not_regress() {
        let reg = TransIdRegistry::new();
        assert_eq!(reg.gen(0, 1, 5).unwrap(), 5);
        assert_eq!(reg.current(0, 1), 5);
        assert!(reg.gen(0, 1, 3).is_err());
        assert_eq!(reg.gen(0, 1, 5).unwrap(), 5);
    }

    #[test]
    fn sentinel_user_assigned_rejected() {
        let reg = TransIdRegistry::new();
        assert!(reg.gen(0, 1, u64::MAX).is_err());
    }

    #[test]
    fn current_is_sentinel_before_first_gen() {
        let reg = TransIdRegistry::new();
        assert_eq!(reg.current(0, 1), u64::MAX);
    }

    #[test]
    fn evict_clears_entry() {
        let reg = TransIdRegistry::new();
        reg.gen(0, 1, 0).unwrap();
        reg.evict(0, 1);
        assert_eq!(reg.current(0, 1), u64::MAX);
    }

    #[test]
    fn distinct_queues_are_independent() {
        let reg = TransIdRegistry::new();
        reg.gen(0, 1, 0).unwrap();
        reg.gen(0, 1, 0).unwrap();
        assert_eq!(reg.gen(0, 2, 0).unwrap(), 1);
    }
}
