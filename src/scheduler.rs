// Scheduler: expands the task matrix and drains it through a fixed pool of workers.
// Workers pull from a shared queue and report over a channel; the collector loop here
// is the only place results are appended.

use crate::models::{
    BenchmarkRun, BenchmarkTask, FailureKind, ResourceSnapshot, RunResult, WorkloadSpec,
    enumerate_tasks,
};
use crate::run_task::TaskExecutor;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Upper bound on the default pool when no concurrency bound is configured.
const DEFAULT_POOL_CAP: usize = 32;

/// Pool size used when `max_concurrency <= 0`: available parallelism + 4, capped at 32.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_add(4)
        .min(DEFAULT_POOL_CAP)
}

/// Number of workers for `task_count` tasks under `max_concurrency`.
pub fn pool_size(max_concurrency: i64, task_count: usize) -> usize {
    let bound = if max_concurrency <= 0 {
        default_pool_size()
    } else {
        max_concurrency as usize
    };
    bound.min(task_count)
}

pub struct Scheduler {
    executor: Arc<TaskExecutor>,
    run_id: String,
    deadline: Option<Duration>,
    stop_rx: Option<watch::Receiver<bool>>,
    result_tx: Option<mpsc::Sender<RunResult>>,
}

impl Scheduler {
    pub fn new(executor: Arc<TaskExecutor>, run_id: impl Into<String>) -> Self {
        Self {
            executor,
            run_id: run_id.into(),
            deadline: None,
            stop_rx: None,
            result_tx: None,
        }
    }

    /// Stop dispatching new tasks once `deadline` has elapsed since `run_all` began.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Stop dispatching new tasks once the watched value becomes true.
    pub fn with_stop_signal(mut self, stop_rx: watch::Receiver<bool>) -> Self {
        self.stop_rx = Some(stop_rx);
        self
    }

    /// Every completed result is also sent to `tx`. A full channel is waited on; a closed
    /// one is logged and the run carries on.
    pub fn with_result_listener(mut self, tx: mpsc::Sender<RunResult>) -> Self {
        self.result_tx = Some(tx);
        self
    }

    pub async fn run_all(
        &self,
        images: &[String],
        workloads: &[WorkloadSpec],
        iterations: u32,
        max_concurrency: i64,
    ) -> BenchmarkRun {
        let tasks = enumerate_tasks(images, workloads, iterations);
        let total = tasks.len();
        let workers = pool_size(max_concurrency, total);
        let deadline_at = self.deadline.map(|d| Instant::now() + d);
        info!(
            run_id = %self.run_id,
            tasks = total,
            workers,
            "starting benchmark run"
        );

        let mut run = BenchmarkRun::new(self.run_id.clone());
        let queue = Arc::new(Mutex::new(VecDeque::from(tasks.clone())));
        let (tx, mut rx) = mpsc::unbounded_channel::<RunResult>();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let tx = tx.clone();
            let executor = self.executor.clone();
            let stop_rx = self.stop_rx.clone();
            handles.push(tokio::spawn(async move {
                while let Some(task) = next_task(&queue) {
                    let result = match stop_reason(deadline_at, stop_rx.as_ref()) {
                        Some(reason) => RunResult::not_started(task, reason),
                        None => executor.execute(task).await,
                    };
                    if tx.send(result).is_err() {
                        break;
                    }
                }
                tracing::debug!(worker_id, "worker drained queue");
            }));
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            self.log_completion(&result, run.len() + 1, total);
            if let Some(listener) = &self.result_tx
                && listener.send(result.clone()).await.is_err()
            {
                warn!(
                    task = %result.task.label(),
                    "result listener closed, result not forwarded"
                );
            }
            run.push(result);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "benchmark worker failed");
            }
        }

        fill_missing(&mut run, &tasks);
        run.finish();
        info!(
            run_id = %run.run_id,
            tasks = run.len(),
            succeeded = run.success_count(),
            "benchmark run complete"
        );
        run
    }

    fn log_completion(&self, result: &RunResult, done: usize, total: usize) {
        if result.success {
            info!(
                task = %result.task.label(),
                duration_s = result.duration_seconds,
                done,
                total,
                "✓ task succeeded"
            );
        } else {
            warn!(
                task = %result.task.label(),
                failure = %result.failure.map(|f| f.as_str()).unwrap_or("unknown"),
                error = result.error.as_deref().unwrap_or(""),
                done,
                total,
                "✗ task failed"
            );
        }
    }
}

fn next_task(queue: &Mutex<VecDeque<BenchmarkTask>>) -> Option<BenchmarkTask> {
    // A poisoned queue still holds valid tasks; keep draining it.
    let mut q = queue.lock().unwrap_or_else(|e| e.into_inner());
    q.pop_front()
}

fn stop_reason(
    deadline_at: Option<Instant>,
    stop_rx: Option<&watch::Receiver<bool>>,
) -> Option<&'static str> {
    if stop_rx.is_some_and(|rx| *rx.borrow()) {
        return Some("shutdown requested before task started");
    }
    if deadline_at.is_some_and(|d| Instant::now() >= d) {
        return Some("run deadline passed before task started");
    }
    None
}

/// Any task without a result (its worker died) gets an internal failure so the run
/// always holds exactly one result per task.
fn fill_missing(run: &mut BenchmarkRun, tasks: &[BenchmarkTask]) {
    let seen: HashSet<usize> = run.results.iter().map(|r| r.task.seq).collect();
    for task in tasks {
        if !seen.contains(&task.seq) {
            error!(task = %task.label(), "no result recorded for task");
            run.push(RunResult::failed(
                task.clone(),
                FailureKind::Internal,
                "worker exited without reporting a result",
                ResourceSnapshot::empty(),
                ResourceSnapshot::empty(),
            ));
        }
    }
}
