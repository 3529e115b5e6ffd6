use std::collections::{HashSet, VecDeque};

/// Default number of message ids remembered.
pub const DEDUP_CAPACITY: usize = 1000;

/// Insertion-ordered set of recently seen message ids.
///
/// Bounded at `capacity`: once full, each new id evicts the oldest one.
/// Owned by a single task, so it carries no locking.
#[derive(Debug)]
pub struct DedupCache {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity + 1),
            seen: HashSet::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Returns true the first time `message_id` is seen, false for repeats.
    pub fn check_and_insert(&mut self, message_id: &str) -> bool {
        if self.seen.contains(message_id) {
            return false;
        }
        self.seen.insert(message_id.to_string());
        self.order.push_back(message_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEDUP_CAPACITY)
    }
}
