//! In-order release of out-of-order completions.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::error::{Error, Result};

/// One completed response waiting for its turn on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSlot<T> {
    /// Read-order sequence id assigned when the request came off the wire.
    pub sequence: u64,
    pub payload: T,
}

/// Min-heap adapter: the slot with the smallest sequence id surfaces first.
struct HeapSlot<T>(PipelineSlot<T>);

impl<T> PartialEq for HeapSlot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.sequence == other.0.sequence
    }
}

impl<T> Eq for HeapSlot<T> {}

impl<T> PartialOrd for HeapSlot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapSlot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap's max-heap pops the smallest sequence.
        other.0.sequence.cmp(&self.0.sequence)
    }
}

impl<T> std::fmt::Debug for HeapSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HeapSlot({})", self.0.sequence)
    }
}

/// Guarantees pipelined responses are written in the order their requests
/// were read, no matter what order handlers complete in.
///
/// Sequence `n + 1` is never released before sequence `n` has been released.
#[derive(Debug)]
pub struct ResponseSequencer<T> {
    next_read: u64,
    next_write: u64,
    queued: BinaryHeap<HeapSlot<T>>,
    /// Sequence ids currently held in `queued`, to reject duplicate
    /// completions of a still-blocked sequence.
    queued_ids: HashSet<u64>,
    capacity: usize,
}

impl<T> ResponseSequencer<T> {
    /// A sequencer holding at most `capacity` completed-but-unwritten slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            next_read: 0,
            next_write: 0,
            queued: BinaryHeap::new(),
            queued_ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Assign the sequence id for a request just read off the wire.
    pub fn assign_sequence(&mut self) -> u64 {
        let sequence = self.next_read;
        self.next_read += 1;
        sequence
    }

    /// Record the completion of `sequence` and return the run of slots now
    /// writable, in order. Empty when `sequence` is still blocked behind an
    /// incomplete predecessor.
    ///
    /// Overflow of the bounded queue is connection-fatal by policy.
    pub fn complete(&mut self, sequence: u64, payload: T) -> Result<Vec<PipelineSlot<T>>> {
        if sequence < self.next_write
            || sequence >= self.next_read
            || self.queued_ids.contains(&sequence)
        {
            // Duplicate or never-assigned id; drop rather than corrupt order.
            tracing::warn!(sequence, "Ignoring completion with invalid sequence");
            return Ok(Vec::new());
        }

        if sequence != self.next_write && self.queued.len() >= self.capacity {
            return Err(Error::PipelineOverflow {
                capacity: self.capacity,
            });
        }
        self.queued.push(HeapSlot(PipelineSlot { sequence, payload }));
        self.queued_ids.insert(sequence);

        let mut writable = Vec::new();
        while let Some(min) = self.queued.peek() {
            if min.0.sequence != self.next_write {
                break;
            }
            let slot = self.queued.pop().expect("peeked slot present").0;
            self.queued_ids.remove(&slot.sequence);
            self.next_write += 1;
            writable.push(slot);
        }
        Ok(writable)
    }

    /// Completed responses still waiting for a predecessor.
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Requests read but not yet written.
    pub fn outstanding(&self) -> u64 {
        self.next_read - self.next_write
    }
}
