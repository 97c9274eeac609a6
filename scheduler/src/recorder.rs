// Execution recorder: append-only log of dispatch lifecycle events

use crate::task::Tier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Lifecycle phase of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Start,
    End,
    Error,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::End => "end",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed dispatch event, appended in true execution order (never in
/// scheduling order).
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionLogEntry {
    pub phase: Phase,
    pub tier: Tier,
    pub label: String,
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
}

impl fmt::Display for ExecutionLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.tier, self.phase, self.label)
    }
}

/// Unbounded append-only event log owned by the engine.
///
/// Single writer (the dispatch path), single reader (`drain`). The caller is
/// responsible for draining in long-running use; crossing `warn_threshold`
/// logs a warning but never drops an entry.
#[derive(Debug)]
pub(crate) struct ExecutionRecorder {
    entries: Vec<ExecutionLogEntry>,
    warn_threshold: usize,
    threshold_warned: bool,
}

impl ExecutionRecorder {
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            entries: Vec::new(),
            warn_threshold,
            threshold_warned: false,
        }
    }

    pub fn record(&mut self, phase: Phase, tier: Tier, label: &str, sequence: u64) {
        self.entries.push(ExecutionLogEntry {
            phase,
            tier,
            label: label.to_string(),
            sequence,
            recorded_at: Utc::now(),
        });

        if self.entries.len() > self.warn_threshold && !self.threshold_warned {
            self.threshold_warned = true;
            warn!(
                entries = self.entries.len(),
                threshold = self.warn_threshold,
                "Execution log exceeded its warn threshold; drain it to bound memory"
            );
        }
    }

    /// Snapshot and clear in one operation: no entry is read twice or lost.
    pub fn drain(&mut self) -> Vec<ExecutionLogEntry> {
        self.threshold_warned = false;
        std::mem::take(&mut self.entries)
    }
}
