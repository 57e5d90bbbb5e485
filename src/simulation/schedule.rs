//! Deferred completions (chat end, object-use end)
//!
//! Entries are ordered by `(due, sequence)` so completions that fall due in
//! the same frame resolve in scheduling order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::types::{AgentId, Millis, ObjectId};

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledKind {
    /// Release both participants of a conversation and clear their tasks
    EndChat { initiator: AgentId, partner: AgentId },
    /// Release an agent from an object and run the activity's completion effect
    FinishObjectUse {
        agent: AgentId,
        object: ObjectId,
        activity: String,
    },
}

#[derive(Debug, Clone)]
pub struct ScheduledAction {
    pub due: Millis,
    pub sequence: u64,
    pub kind: ScheduledKind,
}

// Min-heap on (due, sequence); BinaryHeap is a max-heap so the ordering is reversed.
impl PartialEq for ScheduledAction {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for ScheduledAction {}

impl PartialOrd for ScheduledAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledAction {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionSchedule {
    heap: BinaryHeap<ScheduledAction>,
    next_sequence: u64,
}

impl ActionSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Millis, kind: ScheduledKind) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledAction { due, sequence, kind });
    }

    /// Pop the next action if it is due at or before `now`
    pub fn pop_due(&mut self, now: Millis) -> Option<ScheduledAction> {
        if self.heap.peek().is_some_and(|a| a.due <= now) {
            self.heap.pop()
        } else {
            None
        }
    }

    pub fn peek_due(&self) -> Option<Millis> {
        self.heap.peek().map(|a| a.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
