// Two-tier deferred-task scheduler: an immediate tier that fully drains
// before any timed-tier task runs, with instrumentation of the order tasks
// actually execute in.

pub mod engine;
pub mod recorder;
pub mod settle;
pub mod task;

pub use engine::{
    DispatchReport, EngineConfig, Scheduler, SchedulerEngine, SchedulerHandle, TaskFailure,
};
pub use recorder::{ExecutionLogEntry, Phase};
pub use settle::Settlement;
pub use task::{TaskHandle, Tier, MAX_DELAY_MS, MAX_LABEL_LEN};
