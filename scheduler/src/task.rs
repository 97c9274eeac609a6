// Task model for the two-tier scheduler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Maximum accepted task label length, in bytes.
pub const MAX_LABEL_LEN: usize = 256;

/// Maximum accepted delay in milliseconds (the classic 32-bit timer clamp).
pub const MAX_DELAY_MS: u64 = 2_147_483_647;

/// A scheduled unit of work. The callback either succeeds, returns an error,
/// or panics; all three outcomes are recorded by the engine.
pub type TaskCallback = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Queue tier a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Drained completely before any timed-tier task runs in a cycle.
    Immediate,
    /// Ordered by (delay, arrival); one dispatch per cycle, between
    /// immediate-tier drains.
    Timed,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Immediate => "immediate",
            Tier::Timed => "timed",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task queued inside the engine.
///
/// `sequence` is assigned under the engine lock at enqueue time: globally
/// unique and strictly increasing across both tiers. It is the sole ordering
/// key in the immediate FIFO and the tie-break for equal delays in the timed
/// queue.
pub(crate) struct Task {
    pub callback: TaskCallback,
    pub label: String,
    pub tier: Tier,
    pub sequence: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("tier", &self.tier)
            .field("sequence", &self.sequence)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Caller-facing receipt for a scheduled task.
///
/// Carries identity only; there is no cancellation capability to expose.
#[derive(Debug, Clone, Serialize)]
pub struct TaskHandle {
    pub id: Uuid,
    pub sequence: u64,
    pub label: String,
    pub tier: Tier,
}

/// Timed-queue entry ordered by (delay, sequence) ascending.
#[derive(Debug)]
pub(crate) struct TimedEntry {
    pub delay: Duration,
    pub task: Task,
}

impl PartialEq for TimedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.delay == other.delay && self.task.sequence == other.task.sequence
    }
}

impl Eq for TimedEntry {}

impl PartialOrd for TimedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.delay, self.task.sequence).cmp(&(other.delay, other.task.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed_entry(delay_ms: u64, sequence: u64) -> TimedEntry {
        TimedEntry {
            delay: Duration::from_millis(delay_ms),
            task: Task {
                callback: Box::new(|| Ok(())),
                label: format!("task-{}", sequence),
                tier: Tier::Timed,
                sequence,
                enqueued_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_timed_entries_order_by_delay_first() {
        let early = timed_entry(0, 5);
        let late = timed_entry(10, 1);
        assert!(early < late);
    }

    #[test]
    fn test_equal_delays_tie_break_by_sequence() {
        let first = timed_entry(5, 1);
        let second = timed_entry(5, 2);
        assert!(first < second);
    }

    #[test]
    fn test_min_heap_pops_earliest_entry() {
        use std::cmp::Reverse;
        use std::collections::BinaryHeap;

        let mut heap = BinaryHeap::new();
        heap.push(Reverse(timed_entry(10, 0)));
        heap.push(Reverse(timed_entry(0, 1)));
        heap.push(Reverse(timed_entry(0, 2)));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop())
            .map(|Reverse(entry)| entry.task.sequence)
            .collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(Tier::Immediate.to_string(), "immediate");
        assert_eq!(Tier::Timed.to_string(), "timed");
    }
}
