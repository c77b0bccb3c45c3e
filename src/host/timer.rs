//! Timer heap for host timers.
//!
//! A min-heap ordered by deadline, then by insertion sequence, so timers
//! sharing a deadline fire in the order they were set. Cancellation is lazy:
//! a cleared timer stays in the heap and is skipped when popped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

/// Identifier of a pending host timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the raw sequence number.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct TimerEntry {
    deadline: Duration,
    id: TimerId,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of timers ordered by deadline.
#[derive(Debug, Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    cancelled: HashSet<TimerId>,
    next_id: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of live (not cancelled) timers.
    pub(crate) fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a timer with the given deadline and returns its id.
    pub(crate) fn insert(&mut self, deadline: Duration) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(TimerEntry { deadline, id });
        id
    }

    /// Marks a timer as cancelled. Returns false if it was unknown or already cancelled.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        if self.heap.iter().any(|e| e.id == id) {
            self.cancelled.insert(id)
        } else {
            false
        }
    }

    /// Returns the earliest live deadline, if any.
    pub(crate) fn peek_deadline(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pops the earliest timer if its deadline has passed.
    pub(crate) fn pop_expired(&mut self, now: Duration) -> Option<TimerId> {
        self.discard_cancelled();
        if self.heap.peek()?.deadline <= now {
            self.heap.pop().map(|e| e.id)
        } else {
            None
        }
    }

    fn discard_cancelled(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.cancelled.remove(&entry.id) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }
}
