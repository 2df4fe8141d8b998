//! Queue envelopes ordering requests for dispatch.

use crate::Request;
use std::cmp::Ordering;
use std::time::Instant;

/// A request paired with its dispatch priority.
///
/// Ordered ascending by priority; ties fall back to the submission
/// sequence number, so equal priorities dispatch FIFO.
#[derive(Debug)]
pub struct Envelope {
    pub priority: i32,
    /// Monotonic submission sequence, assigned by the sender.
    pub seq: u64,
    pub request: Request,
}

impl Envelope {
    pub fn new(priority: i32, seq: u64, request: Request) -> Self {
        Self {
            priority,
            seq,
            request,
        }
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Envelope {}

impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Envelope {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

/// A request parked until its due time.
///
/// Ordered ascending by due instant, ties by submission sequence.
#[derive(Debug)]
pub struct DelayedEnvelope {
    pub due: Instant,
    pub seq: u64,
    pub request: Request,
}

impl DelayedEnvelope {
    pub fn new(due: Instant, seq: u64, request: Request) -> Self {
        Self { due, seq, request }
    }
}

impl PartialEq for DelayedEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for DelayedEnvelope {}

impl PartialOrd for DelayedEnvelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEnvelope {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request() -> Request {
        Request::get("https://example.com").build().unwrap()
    }

    #[test]
    fn lower_priority_sorts_first() {
        let a = Envelope::new(1, 10, request());
        let b = Envelope::new(3, 1, request());
        assert!(a < b);
    }

    #[test]
    fn equal_priority_is_fifo_by_seq() {
        let a = Envelope::new(2, 1, request());
        let b = Envelope::new(2, 2, request());
        assert!(a < b);
    }

    #[test]
    fn delayed_orders_by_due_time() {
        let now = Instant::now();
        let sooner = DelayedEnvelope::new(now + Duration::from_millis(10), 5, request());
        let later = DelayedEnvelope::new(now + Duration::from_millis(20), 1, request());
        assert!(sooner < later);
    }
}
