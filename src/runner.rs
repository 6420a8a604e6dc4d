// Container Runner: one workload command in one fresh container, bounded by a timeout,
// with the container removed on every exit path.

use crate::config::ContainerConfig;
use crate::models::{ContainerUsage, FailureKind, UsageSample};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, RuntimeError, VolumeMount};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

pub const RUN_LABEL: &str = "imagebench.run";

/// Runner settings derived from `[container]` plus the run id used for naming and labels.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub run_id: String,
    pub shell: String,
    pub mount: Option<VolumeMount>,
    pub working_dir: Option<String>,
    pub gpus: bool,
    pub always_pull: bool,
    pub pull_timeout: Duration,
    pub memory_limit_bytes: Option<i64>,
    pub nano_cpus: Option<i64>,
    pub read_only_rootfs: bool,
    pub log_limit_bytes: usize,
    pub collect_usage: bool,
}

impl RunnerConfig {
    pub fn from_container_config(c: &ContainerConfig, run_id: &str) -> anyhow::Result<Self> {
        let mount = match &c.workload_dir {
            Some(dir) => {
                let abs = std::fs::canonicalize(dir).map_err(|e| {
                    anyhow::anyhow!("container.workload_dir {}: {}", dir.display(), e)
                })?;
                Some(VolumeMount {
                    source: abs.to_string_lossy().into_owned(),
                    target: c.mount_target.clone(),
                    read_only: true,
                })
            }
            None => None,
        };
        Ok(Self {
            run_id: run_id.to_string(),
            shell: c.shell.clone(),
            working_dir: mount.as_ref().map(|m| m.target.clone()),
            mount,
            gpus: c.gpus,
            always_pull: c.always_pull,
            pull_timeout: c.pull_timeout(),
            memory_limit_bytes: c.memory_limit_bytes,
            nano_cpus: c.nano_cpus,
            read_only_rootfs: c.read_only_rootfs,
            log_limit_bytes: c.log_limit_bytes,
            collect_usage: c.collect_usage,
        })
    }
}

/// A container that ran to exit (zero or non-zero).
#[derive(Debug, Clone)]
pub struct ContainerOutcome {
    pub container_id: String,
    pub exit_status: i64,
    /// Start-to-exit window; excludes pull and teardown.
    pub duration_seconds: f64,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub usage: Option<ContainerUsage>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("image {image} unavailable: {reason}")]
    ImageUnavailable { image: String, reason: String },

    #[error("timed out after {}s (container {container_id} removed)", timeout.as_secs_f64())]
    TimedOut {
        timeout: Duration,
        container_id: String,
        duration_seconds: f64,
    },

    #[error("container runtime: {0}")]
    Runtime(#[from] RuntimeError),
}

impl RunnerError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            RunnerError::ImageUnavailable { .. } => FailureKind::ImageUnavailable,
            RunnerError::TimedOut { .. } => FailureKind::TimedOut,
            RunnerError::Runtime(_) => FailureKind::RuntimeError,
        }
    }
}

pub struct ContainerRunner {
    runtime: Arc<dyn ContainerRuntime>,
    config: RunnerConfig,
    next_container: AtomicU64,
}

impl ContainerRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: RunnerConfig) -> Self {
        Self {
            runtime,
            config,
            next_container: AtomicU64::new(1),
        }
    }

    /// Runs `command` in a fresh container of `image`. A non-zero exit is an Ok outcome
    /// with `success == false`; pull failures and timeouts are errors.
    #[instrument(skip(self, command, timeout), fields(operation = "run_container", image = %image))]
    pub async fn run(
        &self,
        image: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<ContainerOutcome, RunnerError> {
        self.ensure_image(image).await?;

        let spec = self.container_spec(image, command);
        let handle = self.runtime.create(&spec).await?;
        debug!(container = %handle.name, id = %handle.id, "container created");

        let result = AssertUnwindSafe(self.execute(&handle, timeout))
            .catch_unwind()
            .await;

        if let Err(e) = self.runtime.remove(&handle).await {
            warn!(
                container = %handle.name,
                error = %e,
                operation = "remove_container",
                "failed to remove container"
            );
        }
        match result {
            Ok(result) => result,
            // Container is gone; the caller turns the panic into a failed result.
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<(), RunnerError> {
        let unavailable = |reason: String| RunnerError::ImageUnavailable {
            image: image.to_string(),
            reason,
        };

        if !self.config.always_pull {
            match self.runtime.image_exists(image).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    warn!(image, error = %e, "image inspect failed, pulling");
                }
            }
        }

        info!(image, "pulling image");
        match tokio::time::timeout(self.config.pull_timeout, self.runtime.pull(image)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(unavailable(e.to_string())),
            Err(_) => Err(unavailable(format!(
                "pull timed out after {}s",
                self.config.pull_timeout.as_secs()
            ))),
        }
    }

    fn container_spec(&self, image: &str, command: &str) -> ContainerSpec {
        let n = self.next_container.fetch_add(1, Ordering::Relaxed);
        let mut labels = HashMap::new();
        labels.insert(RUN_LABEL.to_string(), self.config.run_id.clone());
        ContainerSpec {
            name: format!("imagebench-{}-{}", self.config.run_id, n),
            image: image.to_string(),
            cmd: vec![
                self.config.shell.clone(),
                "-c".to_string(),
                command.to_string(),
            ],
            working_dir: self.config.working_dir.clone(),
            mounts: self.config.mount.iter().cloned().collect(),
            gpus: self.config.gpus,
            memory_limit_bytes: self.config.memory_limit_bytes,
            nano_cpus: self.config.nano_cpus,
            read_only_rootfs: self.config.read_only_rootfs,
            labels,
        }
    }

    async fn execute(
        &self,
        handle: &ContainerHandle,
        timeout: Duration,
    ) -> Result<ContainerOutcome, RunnerError> {
        let (usage_tx, mut usage_rx) = mpsc::unbounded_channel::<UsageSample>();
        let stats_task = self.config.collect_usage.then(|| {
            let runtime = self.runtime.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                if let Err(e) = runtime.stats(&handle, usage_tx).await {
                    debug!(container = %handle.name, error = %e, "usage sampling stopped");
                }
            })
        });

        let started = Instant::now();
        let waited = async {
            self.runtime.start(handle).await?;
            Ok::<_, RuntimeError>(tokio::time::timeout(timeout, self.runtime.wait(handle)).await)
        }
        .await;
        let duration_seconds = started.elapsed().as_secs_f64();

        if let Some(task) = stats_task {
            task.abort();
        }
        let mut samples = Vec::new();
        while let Ok(s) = usage_rx.try_recv() {
            samples.push(s);
        }
        let usage = ContainerUsage::from_samples(&samples);

        let exit_status = match waited? {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    container = %handle.name,
                    timeout_s = timeout.as_secs_f64(),
                    "workload timed out, tearing down container"
                );
                return Err(RunnerError::TimedOut {
                    timeout,
                    container_id: handle.id.clone(),
                    duration_seconds,
                });
            }
        };

        let (stdout, stderr) = match self
            .runtime
            .logs(handle, self.config.log_limit_bytes)
            .await
        {
            Ok(out) => out,
            Err(e) => {
                warn!(container = %handle.name, error = %e, "log capture failed");
                (String::new(), String::new())
            }
        };

        Ok(ContainerOutcome {
            container_id: handle.id.clone(),
            exit_status,
            duration_seconds,
            success: exit_status == 0,
            stdout,
            stderr,
            usage,
        })
    }
}
