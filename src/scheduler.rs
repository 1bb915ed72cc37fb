//! Single-threaded deferred task queue.
//!
//! Tasks are one-shot and cannot be cancelled. Whoever handles a task must
//! re-check current state, so a task that has become irrelevant runs as a
//! no-op. Tasks due at the same instant run in the order they were scheduled.

use crate::core::SessionTicket;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Work the agent loop runs later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Task {
    /// Close a correlation session
    CloseSession(SessionTicket),
    /// Send buffered metric points
    FlushMetrics,
    /// Once-a-minute rollup check
    MinuteTick,
}

/// Fractional epoch seconds to whole milliseconds.
pub fn to_millis(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

/// Epoch seconds of the next whole wall-clock minute after `now`.
pub fn next_minute(now: f64) -> f64 {
    ((now / 60.0).floor() + 1.0) * 60.0
}

/// Deferred tasks ordered by due time.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<(i64, u64, Task)>>,
    seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` at epoch seconds `due`.
    pub fn schedule_at(&mut self, due: f64, task: Task) {
        self.seq += 1;
        self.queue.push(Reverse((to_millis(due), self.seq, task)));
    }

    /// Schedule `task` `delay_secs` after `now`.
    pub fn schedule_after(&mut self, now: f64, delay_secs: f64, task: Task) {
        self.schedule_at(now + delay_secs.max(0.0), task);
    }

    /// Remove and return the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<Task> {
        let now_ms = to_millis(now);
        match self.queue.peek() {
            Some(Reverse((due, _, _))) if *due <= now_ms => {
                self.queue.pop().map(|Reverse((_, _, task))| task)
            }
            _ => None,
        }
    }

    /// Epoch seconds of the earliest pending task.
    pub fn next_due(&self) -> Option<f64> {
        self.queue
            .peek()
            .map(|Reverse((due, _, _))| *due as f64 / 1000.0)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_in_due_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(30.0, Task::MinuteTick);
        scheduler.schedule_after(0.0, 10.0, Task::FlushMetrics);

        assert_eq!(scheduler.next_due(), Some(10.0));
        assert_eq!(scheduler.pop_due(5.0), None);
        assert_eq!(scheduler.pop_due(10.0), Some(Task::FlushMetrics));
        assert_eq!(scheduler.pop_due(10.0), None);
        assert_eq!(scheduler.pop_due(60.0), Some(Task::MinuteTick));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_same_instant_is_fifo() {
        let mut scheduler = Scheduler::new();
        let ticket = SessionTicket {
            epoch: 0,
            generation: 1,
        };
        scheduler.schedule_at(5.0, Task::MinuteTick);
        scheduler.schedule_at(5.0, Task::CloseSession(ticket));
        scheduler.schedule_at(5.0, Task::FlushMetrics);

        assert_eq!(scheduler.pop_due(5.0), Some(Task::MinuteTick));
        assert_eq!(scheduler.pop_due(5.0), Some(Task::CloseSession(ticket)));
        assert_eq!(scheduler.pop_due(5.0), Some(Task::FlushMetrics));
    }

    #[test]
    fn test_next_minute() {
        assert_eq!(next_minute(0.0), 60.0);
        assert_eq!(next_minute(59.9), 60.0);
        assert_eq!(next_minute(60.0), 120.0);
        assert_eq!(next_minute(1_700_000_030.0), 1_700_000_040.0);
    }
}
