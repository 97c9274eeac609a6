// Error handling framework

use thiserror::Error;

/// Scheduling errors raised synchronously at enqueue time.
///
/// These are caller-recoverable and never touch queue state: a rejected
/// schedule call leaves both tiers exactly as they were.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("scheduler engine is closed")]
    Closed,

    #[error("task label is {len} bytes, maximum is {max}")]
    LabelTooLong { len: usize, max: usize },

    #[error("delay of {delay_ms} ms exceeds the maximum of {max_ms} ms")]
    DelayTooLarge { delay_ms: u128, max_ms: u64 },
}

/// Failure of a task callback during dispatch.
///
/// Carried inside the dispatch report; the engine records an Error entry,
/// logs the failure, and keeps processing subsequent tasks in both tiers.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task callback returned an error: {0}")]
    Failed(#[source] anyhow::Error),

    #[error("task callback panicked: {0}")]
    Panicked(String),
}

/// Settlement errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettleError {
    #[error("scheduler engine closed before settlement")]
    EngineClosed,
}

/// State store errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("state patch must be a JSON object, got {found}")]
    InvalidPatch { found: &'static str },

    #[error("initial state must be a JSON object, got {found}")]
    InvalidInitialState { found: &'static str },
}

/// Human-readable JSON type name, used in store error payloads.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
