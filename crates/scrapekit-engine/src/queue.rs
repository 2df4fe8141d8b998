//! The two queues behind the dispatch loop.

use scrapekit_core::{DelayedEnvelope, Envelope};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::Notify;

/// Priority queue of ready requests. Lowest priority value pops first;
/// ties pop in submission order.
///
/// Bounded when `capacity > 0`: producers wait in `push` until a slot
/// frees up. The shutdown sentinel bypasses the bound so close can never
/// deadlock on a full queue.
pub(crate) struct ReadyQueue {
    heap: Mutex<BinaryHeap<Reverse<Envelope>>>,
    /// Wakes the consumer when an envelope arrives.
    ready: Notify,
    /// Wakes one producer when a slot frees up.
    space: Notify,
    capacity: usize,
}

impl ReadyQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            ready: Notify::new(),
            space: Notify::new(),
            capacity,
        }
    }

    pub(crate) async fn push(&self, envelope: Envelope) {
        let mut envelope = envelope;
        loop {
            match self.try_push(envelope) {
                Ok(()) => return,
                Err(rejected) => {
                    envelope = rejected;
                    self.space.notified().await;
                }
            }
        }
    }

    pub(crate) fn try_push(&self, envelope: Envelope) -> Result<(), Envelope> {
        let mut heap = self.heap.lock().unwrap();
        if self.capacity == 0 || heap.len() < self.capacity {
            heap.push(Reverse(envelope));
            drop(heap);
            self.ready.notify_one();
            Ok(())
        } else {
            Err(envelope)
        }
    }

    /// Pushes ignoring the capacity bound. Used for the shutdown sentinel.
    pub(crate) fn push_unbounded(&self, envelope: Envelope) {
        self.heap.lock().unwrap().push(Reverse(envelope));
        self.ready.notify_one();
    }

    /// Waits for the next envelope. Single consumer: the dispatch loop.
    pub(crate) async fn pop(&self) -> Envelope {
        loop {
            if let Some(Reverse(envelope)) = self.heap.lock().unwrap().pop() {
                self.space.notify_one();
                return envelope;
            }
            self.ready.notified().await;
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.lock().unwrap().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }
}

/// Min-heap of delayed requests ordered by due time.
pub(crate) struct DelayHeap {
    heap: Mutex<BinaryHeap<Reverse<DelayedEnvelope>>>,
}

impl DelayHeap {
    pub(crate) fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    pub(crate) fn push(&self, envelope: DelayedEnvelope) {
        self.heap.lock().unwrap().push(Reverse(envelope));
    }

    /// Pops the top entry when it is due at `now`.
    pub(crate) fn pop_due(&self, now: Instant) -> Option<DelayedEnvelope> {
        let mut heap = self.heap.lock().unwrap();
        if heap.peek().is_some_and(|Reverse(top)| top.due <= now) {
            heap.pop().map(|Reverse(envelope)| envelope)
        } else {
            None
        }
    }

    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.heap.lock().unwrap().peek().map(|Reverse(top)| top.due)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.lock().unwrap().is_empty()
    }
}
