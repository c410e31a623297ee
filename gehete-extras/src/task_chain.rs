//! A task requisite-dependency chain.
//!
//! Device-side scheduler tasks (dequeue, dynamic-input preparation, the
//! kernel body, output postprocessing, enqueue, ...) must run on a stream
//! in a fixed relative order even though each is built independently by
//! [`crate::copy_pool`]'s caller. `TaskChain` records that order as a
//! simple append-only sequence plus an index lookup, so builders can assert
//! "task A must precede task B" without hard-coding positions.

use std::collections::HashMap;

/// One entry in the chain: an opaque label and the step index it was
/// registered at.
pub struct TaskChain {
    order: Vec<String>,
    positions: HashMap<String, usize>,
}

impl TaskChain {
    pub fn new() -> TaskChain {
        TaskChain { order: Vec::new(), positions: HashMap::new() }
    }

    /// Appends `label` to the end of the chain. Panics if `label` was
    /// already registered; task names are meant to be unique per chain.
    pub fn push(&mut self, label: impl Into<String>) -> usize {
        let label = label.into();
        assert!(!self.positions.contains_key(&label), "duplicate task label {:?}", label);
        let idx = self.order.len();
        self.positions.insert(label.clone(), idx);
        self.order.push(label);
        idx
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.positions.get(label).copied()
    }

    /// True if `before` was registered strictly earlier than `after`. Both
    /// labels must be present in the chain.
    pub fn precedes(&self, before: &str, after: &str) -> bool {
        match (self.position(before), self.position(after)) {
            (Some(b), Some(a)) => b < a,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.order
    }
}

impl Default for TaskChain {
    fn default() -> TaskChain {
        TaskChain::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_order_and_precedence() {
        let mut chain = TaskChain::new();
        chain.push("dequeue");
        chain.push("prepare_dynamic_input_output");
        chain.push("kernel");
        chain.push("postprocess_dynamic_output");
        chain.push("enqueue");

        assert!(chain.precedes("dequeue", "kernel"));
        assert!(chain.precedes("kernel", "enqueue"));
        assert!(!chain.precedes("enqueue", "dequeue"));
        assert_eq!(chain.len(), 5);
    }

    #[test]
    #[should_panic(expected = "duplicate task label")]
    fn duplicate_labels_panic() {
        let mut chain = TaskChain::new();
        chain.push("dequeue");
        chain.push("dequeue");
    }

    #[test]
    fn unknown_labels_do_not_precede() {
        let mut chain = TaskChain::new();
        chain.push("dequeue");
        assert!(!chain.precedes("dequeue", "missing"));
    }
}
