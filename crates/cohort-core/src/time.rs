//! Simulation time and the scheduling collaborator contract.
//!
//! The core never reads an ambient clock: every mutating operation receives
//! the current [`Time`] explicitly. [`PlanQueue`] is the reference scheduler
//! collaborator used by tests and wiring code. It orders plans by time with a
//! stable FIFO tie-break among plans scheduled for the same instant, which is
//! the ordering contract deferred person removal relies on: a purge scheduled
//! "at now" runs after every plan already queued for now.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A point in simulation time. Finite by construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Time(f64);

impl Time {
    /// The conventional simulation start.
    pub const START: Time = Time(0.0);

    /// Create a time value. Returns `None` for non-finite input.
    pub fn new(value: f64) -> Option<Self> {
        value.is_finite().then_some(Time(value))
    }

    /// The underlying floating-point value.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PlanQueue
// ---------------------------------------------------------------------------

/// Errors from plan scheduling.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan time {requested} is before the current time {now}")]
    TimeInPast { requested: Time, now: Time },
}

/// A plan waiting in the queue. Ordered by `(time, seq)` so that plans for
/// the same instant run in submission order.
#[derive(Debug)]
struct Plan<T> {
    time: Time,
    seq: u64,
    payload: T,
}

impl<T> PartialEq for Plan<T> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl<T> Eq for Plan<T> {}

impl<T> PartialOrd for Plan<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Plan<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest plan first.
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

/// A time-ordered plan queue with a stable FIFO tie-break.
///
/// `pop` advances the queue's notion of "now" to the popped plan's time.
#[derive(Debug)]
pub struct PlanQueue<T> {
    heap: BinaryHeap<Plan<T>>,
    next_seq: u64,
    now: Time,
}

impl<T> PlanQueue<T> {
    /// Create an empty queue starting at the given time.
    pub fn new(start: Time) -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            now: start,
        }
    }

    /// The current simulation time: the time of the last popped plan, or the
    /// start time if nothing has run yet.
    pub fn now(&self) -> Time {
        self.now
    }

    /// Schedule a plan to run at the given time. Fails if the time is in
    /// the past.
    pub fn run_at(&mut self, time: Time, payload: T) -> Result<(), PlanError> {
        if time < self.now {
            return Err(PlanError::TimeInPast {
                requested: time,
                now: self.now,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Plan { time, seq, payload });
        Ok(())
    }

    /// Schedule a plan to run at the current time, after every plan already
    /// queued for the current time.
    pub fn run_now(&mut self, payload: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Plan {
            time: self.now,
            seq,
            payload,
        });
    }

    /// Pop the next plan and advance the current time to its scheduled time.
    pub fn pop(&mut self) -> Option<(Time, T)> {
        let plan = self.heap.pop()?;
        self.now = plan.time;
        Some((plan.time, plan.payload))
    }

    /// The scheduled time of the next plan, if any.
    pub fn peek_time(&self) -> Option<Time> {
        self.heap.peek().map(|p| p.time)
    }

    /// Number of plans waiting.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue has no pending plans.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(v: f64) -> Time {
        Time::new(v).unwrap()
    }

    #[test]
    fn time_rejects_non_finite() {
        assert!(Time::new(f64::NAN).is_none());
        assert!(Time::new(f64::INFINITY).is_none());
        assert!(Time::new(3.5).is_some());
    }

    #[test]
    fn time_orders_totally() {
        assert!(t(1.0) < t(2.0));
        assert_eq!(t(1.0), t(1.0));
    }

    #[test]
    fn plans_pop_in_time_order() {
        let mut q = PlanQueue::new(Time::START);
        q.run_at(t(3.0), "c").unwrap();
        q.run_at(t(1.0), "a").unwrap();
        q.run_at(t(2.0), "b").unwrap();

        assert_eq!(q.pop(), Some((t(1.0), "a")));
        assert_eq!(q.pop(), Some((t(2.0), "b")));
        assert_eq!(q.pop(), Some((t(3.0), "c")));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn same_time_plans_run_fifo() {
        let mut q = PlanQueue::new(Time::START);
        q.run_at(t(5.0), 1).unwrap();
        q.run_at(t(5.0), 2).unwrap();
        q.run_at(t(5.0), 3).unwrap();

        assert_eq!(q.pop().unwrap().1, 1);
        assert_eq!(q.pop().unwrap().1, 2);
        assert_eq!(q.pop().unwrap().1, 3);
    }

    #[test]
    fn run_now_queues_behind_existing_same_time_plans() {
        let mut q = PlanQueue::new(Time::START);
        q.run_at(Time::START, "first").unwrap();
        q.run_now("second");

        assert_eq!(q.pop().unwrap().1, "first");
        assert_eq!(q.pop().unwrap().1, "second");
    }

    #[test]
    fn pop_advances_now() {
        let mut q = PlanQueue::new(Time::START);
        q.run_at(t(4.0), ()).unwrap();
        assert_eq!(q.now(), Time::START);
        q.pop();
        assert_eq!(q.now(), t(4.0));
    }

    #[test]
    fn scheduling_in_the_past_fails() {
        let mut q = PlanQueue::new(Time::START);
        q.run_at(t(4.0), ()).unwrap();
        q.pop();
        let result = q.run_at(t(2.0), ());
        assert!(matches!(result, Err(PlanError::TimeInPast { .. })));
    }
}
