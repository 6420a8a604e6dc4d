// Run Task: pre-sample, container run, post-sample, folded into exactly one RunResult.
// Nothing escapes `execute`: errors and panics become failed results.

use crate::collector::Collector;
use crate::models::{BenchmarkTask, FailureKind, ResourceSnapshot, RunResult};
use crate::runner::{ContainerRunner, RunnerError};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, instrument};

pub struct TaskExecutor {
    runner: Arc<ContainerRunner>,
    collector: Arc<dyn Collector>,
}

impl TaskExecutor {
    pub fn new(runner: Arc<ContainerRunner>, collector: Arc<dyn Collector>) -> Self {
        Self { runner, collector }
    }

    #[instrument(skip(self, task), fields(task = %task.label(), seq = task.seq))]
    pub async fn execute(&self, task: BenchmarkTask) -> RunResult {
        match AssertUnwindSafe(self.execute_inner(task.clone()))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let msg = panic_message(&panic);
                error!(error = %msg, "benchmark task panicked");
                RunResult::failed(
                    task,
                    FailureKind::Internal,
                    format!("task panicked: {}", msg),
                    ResourceSnapshot::empty(),
                    ResourceSnapshot::empty(),
                )
            }
        }
    }

    async fn execute_inner(&self, task: BenchmarkTask) -> RunResult {
        let mut pre = self.collector.sample().await;
        let outcome = self
            .runner
            .run(&task.image, &task.workload.command, task.workload.timeout)
            .await;
        let mut post = self.collector.sample().await;
        ResourceSnapshot::align(&mut pre, &mut post);

        match outcome {
            Ok(o) if o.success => RunResult::succeeded(task, o.duration_seconds, pre, post)
                .with_usage(o.usage)
                .with_output(o.stdout, o.stderr),
            Ok(o) => RunResult::failed(
                task,
                FailureKind::NonZeroExit,
                format!("exited with status {}", o.exit_status),
                pre,
                post,
            )
            .with_duration(o.duration_seconds)
            .with_exit_status(Some(o.exit_status))
            .with_usage(o.usage)
            .with_output(o.stdout, o.stderr),
            Err(e) => {
                let duration = match &e {
                    RunnerError::TimedOut {
                        duration_seconds, ..
                    } => *duration_seconds,
                    _ => 0.0,
                };
                RunResult::failed(task, e.failure_kind(), e.to_string(), pre, post)
                    .with_duration(duration)
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
