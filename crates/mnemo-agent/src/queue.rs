//! Bounded priority queue of pending reflection requests
//!
//! Lower priority value is served first; equal priorities are FIFO. A full
//! queue drops the new request and says so.

use crate::collaborators::CycleOptions;
use mnemo_core::ReflectionMode;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::{debug, warn};

pub const MAX_QUEUE_CAPACITY: usize = 3;

/// Priority given to quick and migration requests.
pub const URGENT: u8 = 1;
/// Priority given to deep requests.
pub const ROUTINE: u8 = 2;

pub fn default_priority(mode: ReflectionMode) -> u8 {
    match mode {
        ReflectionMode::Quick | ReflectionMode::Migration => URGENT,
        ReflectionMode::Deep => ROUTINE,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReflectionRequest {
    pub mode: ReflectionMode,
    pub options: CycleOptions,
    pub priority: u8,
}

impl ReflectionRequest {
    pub fn new(mode: ReflectionMode, options: CycleOptions) -> Self {
        Self {
            mode,
            options,
            priority: default_priority(mode),
        }
    }

    pub fn quick() -> Self {
        Self::new(ReflectionMode::Quick, CycleOptions::default())
    }

    pub fn deep() -> Self {
        Self::new(ReflectionMode::Deep, CycleOptions::default())
    }

    pub fn migration() -> Self {
        Self::new(ReflectionMode::Migration, CycleOptions::default())
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

struct Entry {
    priority: u8,
    seq: u64,
    request: ReflectionRequest,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

pub struct ReflectionQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    capacity: usize,
    seq: u64,
}

impl Default for ReflectionQueue {
    fn default() -> Self {
        Self::new(MAX_QUEUE_CAPACITY)
    }
}

impl ReflectionQueue {
    /// Capacity is clamped to `1..=MAX_QUEUE_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
            seq: 0,
        }
    }

    /// Never blocks. Returns `false` and drops the request when full.
    pub fn enqueue(&mut self, request: ReflectionRequest) -> bool {
        if self.heap.len() >= self.capacity {
            warn!(
                "Reflection queue full ({}); dropping {} request",
                self.capacity, request.mode
            );
            return false;
        }
        self.seq += 1;
        debug!(
            "Queued {} reflection (priority {}, seq {})",
            request.mode, request.priority, self.seq
        );
        self.heap.push(Reverse(Entry {
            priority: request.priority,
            seq: self.seq,
            request,
        }));
        true
    }

    pub fn pop(&mut self) -> Option<ReflectionRequest> {
        self.heap.pop().map(|Reverse(e)| e.request)
    }

    pub fn peek(&self) -> Option<&ReflectionRequest> {
        self.heap.peek().map(|Reverse(e)| &e.request)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
