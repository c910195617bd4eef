//! Bounded ledger of recently processed Slack event ids.
//!
//! Slack delivers events at-least-once and retries on slow
//! acknowledgements, so the same `event_id` can arrive more than once.
//! The ledger remembers the most recent ids and lets the ingress drop a
//! redelivery instead of answering the user twice. In-memory only: a
//! restart forgets the window.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

pub const DEFAULT_CAPACITY: usize = 200;

/// Fixed-capacity FIFO set of event ids; the oldest id is evicted first.
pub struct EventLedger {
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl EventLedger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                order: VecDeque::with_capacity(capacity),
                seen: HashSet::with_capacity(capacity),
            }),
        }
    }

    /// Membership check only; never mutates the ledger.
    pub fn seen(&self, event_id: &str) -> bool {
        self.inner.lock().seen.contains(event_id)
    }

    /// Idempotent insert. Re-recording a known id does not refresh its
    /// position in the eviction order.
    pub fn record(&self, event_id: &str) {
        let mut inner = self.inner.lock();
        Self::insert(&mut inner, self.capacity, event_id);
    }

    /// Check-then-record under a single lock. Returns true when the id is
    /// new and the event should be processed.
    pub fn record_if_new(&self, event_id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.seen.contains(event_id) {
            return false;
        }
        Self::insert(&mut inner, self.capacity, event_id);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(inner: &mut Inner, capacity: usize, event_id: &str) {
        if inner.seen.contains(event_id) {
            return;
        }
        if inner.order.len() >= capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        inner.order.push_back(event_id.to_string());
        inner.seen.insert(event_id.to_string());
    }
}

impl Default for EventLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_until_recorded() {
        let ledger = EventLedger::new();
        assert!(!ledger.seen("Ev001"));
        ledger.record("Ev001");
        assert!(ledger.seen("Ev001"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn record_if_new_gates_duplicates() {
        let ledger = EventLedger::new();
        assert!(ledger.record_if_new("Ev001"));
        assert!(!ledger.record_if_new("Ev001"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn record_is_idempotent() {
        let ledger = EventLedger::with_capacity(3);
        ledger.record("Ev001");
        ledger.record("Ev001");
        ledger.record("Ev001");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn oldest_evicted_at_capacity() {
        let ledger = EventLedger::with_capacity(3);
        ledger.record("Ev001");
        ledger.record("Ev002");
        ledger.record("Ev003");
        ledger.record("Ev004");
        assert!(!ledger.seen("Ev001"));
        assert!(ledger.seen("Ev002"));
        assert!(ledger.seen("Ev003"));
        assert!(ledger.seen("Ev004"));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn default_capacity_holds_exactly_200() {
        let ledger = EventLedger::new();
        for i in 0..=DEFAULT_CAPACITY {
            ledger.record(&format!("Ev{i:04}"));
        }
        assert_eq!(ledger.len(), DEFAULT_CAPACITY);
        assert!(!ledger.seen("Ev0000"));
        assert!(ledger.seen("Ev0001"));
        assert!(ledger.seen(&format!("Ev{DEFAULT_CAPACITY:04}")));
    }
}
