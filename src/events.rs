//! Event scheduling: the pending-entry heap behind the environment.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::event::Event;
use crate::time::SimTime;

/// What happens when a scheduled entry is popped.
pub(crate) enum Action {
    /// Poll the process, provided its wait epoch still matches.
    Resume {
        /// Target process id.
        process: u64,
        /// Wait epoch the resume was issued for; a mismatch means the wait
        /// was cancelled and the entry is stale.
        epoch: u64,
    },
    /// Fire the event: latch it done and drain its callbacks.
    Fire {
        /// The event to fire.
        event: Event,
    },
}

/// An entry scheduled for execution at a specific virtual time.
///
/// Entries at the same time pop in insertion order via the sequence number,
/// which keeps runs reproducible.
pub(crate) struct ScheduledEvent {
    pub(crate) at: SimTime,
    pub(crate) seq: u64,
    pub(crate) action: Action,
    /// Human label, used for tracing only.
    pub(crate) label: String,
}

impl ScheduledEvent {
    pub(crate) fn new(at: SimTime, seq: u64, action: Action, label: String) -> Self {
        Self {
            at,
            seq,
            action,
            label,
        }
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse both comparisons so the earliest
        // time wins, with the lower sequence number breaking ties.
        match other.at.cmp(&self.at) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Priority queue of pending entries in `(fire_time, sequence)` order.
#[derive(Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub(crate) fn schedule(&mut self, entry: ScheduledEvent) {
        self.heap.push(entry);
    }

    pub(crate) fn pop_earliest(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    /// Fire time of the earliest pending entry.
    pub(crate) fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|entry| entry.at)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}
