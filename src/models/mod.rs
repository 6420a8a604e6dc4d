// Domain models

mod report;
mod result;
mod snapshot;
mod task;
mod usage;

pub use report::{GroupSummary, Report};
pub use result::{BenchmarkRun, FailureKind, RunResult, new_run_id};
pub use snapshot::{GpuReading, HostReading, ResourceSnapshot};
pub use task::{BenchmarkTask, WorkloadSpec, enumerate_tasks};
pub use usage::{ContainerUsage, UsageSample};

/// Current wall-clock time as Unix nanoseconds (0 if out of range).
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
}
