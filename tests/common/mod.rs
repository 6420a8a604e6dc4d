// Shared test helpers: in-memory container runtime and collector.
//
// FakeRuntime interprets the workload command:
//   "ok"        exit 0 immediately
//   "ok:<ms>"   sleep <ms>, exit 0
//   "fail:<n>"  exit n immediately
//   "hang"      never exits on its own
//   "panic"     wait panics

#![allow(dead_code)]

use async_trait::async_trait;
use imagebench::collector::Collector;
use imagebench::models::{HostReading, ResourceSnapshot, UsageSample};
use imagebench::runner::{ContainerRunner, RunnerConfig};
use imagebench::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, RuntimeError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct FakeRuntime {
    present: Mutex<HashSet<String>>,
    pull_failures: HashSet<String>,
    containers: Mutex<HashMap<String, String>>,
    running: Mutex<HashSet<String>>,
    pub created: Mutex<Vec<ContainerSpec>>,
    pub removed: Mutex<Vec<String>>,
    pub pulls: AtomicUsize,
    pub max_running: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images that are already local.
    pub fn with_images(self, images: &[&str]) -> Self {
        {
            let mut p = self.present.lock().unwrap();
            for i in images {
                p.insert(i.to_string());
            }
        }
        self
    }

    /// Images whose pull is rejected.
    pub fn with_pull_failures(mut self, images: &[&str]) -> Self {
        self.pull_failures = images.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.lock().unwrap().len()
    }

    pub fn live_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    fn command_of(&self, handle: &ContainerHandle) -> Result<String, RuntimeError> {
        self.containers
            .lock()
            .unwrap()
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| RuntimeError::Other(format!("no such container {}", handle.id)))
    }

    fn stop_running(&self, id: &str) {
        self.running.lock().unwrap().remove(id);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(self.present.lock().unwrap().contains(image))
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        if self.pull_failures.contains(image) {
            return Err(RuntimeError::Other(format!("pull access denied for {}", image)));
        }
        self.present.lock().unwrap().insert(image.to_string());
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("fake{:04}", n);
        let command = spec.cmd.last().cloned().unwrap_or_default();
        self.containers.lock().unwrap().insert(id.clone(), command);
        self.created.lock().unwrap().push(spec.clone());
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.command_of(handle)?;
        let mut running = self.running.lock().unwrap();
        running.insert(handle.id.clone());
        self.max_running.fetch_max(running.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RuntimeError> {
        let command = self.command_of(handle)?;
        if command == "panic" {
            panic!("wait exploded");
        }
        let status = if command == "hang" {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            0
        } else if let Some(ms) = command.strip_prefix("ok:") {
            let ms: u64 = ms.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            0
        } else if let Some(code) = command.strip_prefix("fail:") {
            code.parse().unwrap_or(1)
        } else {
            0
        };
        self.stop_running(&handle.id);
        Ok(status)
    }

    async fn stats(
        &self,
        _handle: &ContainerHandle,
        tx: mpsc::UnboundedSender<UsageSample>,
    ) -> Result<(), RuntimeError> {
        let _ = tx.send(UsageSample {
            cpu_percent: 50.0,
            mem_usage_bytes: 256,
            mem_limit_bytes: 1024,
        });
        Ok(())
    }

    async fn logs(
        &self,
        handle: &ContainerHandle,
        _limit_bytes: usize,
    ) -> Result<(String, String), RuntimeError> {
        let command = self.command_of(handle)?;
        Ok((format!("ran {}\n", command), String::new()))
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.stop_running(&handle.id);
        if self.containers.lock().unwrap().remove(&handle.id).is_some() {
            self.removed.lock().unwrap().push(handle.id.clone());
        }
        Ok(())
    }

    async fn exists(&self, handle: &ContainerHandle) -> Result<bool, RuntimeError> {
        Ok(self.containers.lock().unwrap().contains_key(&handle.id))
    }
}

/// Collector returning a fixed host reading and counting calls.
#[derive(Default)]
pub struct FakeCollector {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Collector for FakeCollector {
    async fn sample(&self) -> ResourceSnapshot {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ResourceSnapshot {
            gpus: None,
            host: Some(HostReading {
                cpu_percent: 12.5,
                mem_usage_bytes: 1 << 30,
                mem_percent: 25.0,
            }),
        }
    }
}

/// Collector whose sample panics.
pub struct PanickingCollector;

#[async_trait]
impl Collector for PanickingCollector {
    async fn sample(&self) -> ResourceSnapshot {
        panic!("probe exploded");
    }
}

pub fn runner_config() -> RunnerConfig {
    RunnerConfig {
        run_id: "run-test".into(),
        shell: "/bin/sh".into(),
        mount: None,
        working_dir: None,
        gpus: false,
        always_pull: false,
        pull_timeout: Duration::from_secs(5),
        memory_limit_bytes: None,
        nano_cpus: None,
        read_only_rootfs: false,
        log_limit_bytes: 4096,
        collect_usage: true,
    }
}

pub fn runner(runtime: Arc<FakeRuntime>) -> Arc<ContainerRunner> {
    Arc::new(ContainerRunner::new(runtime, runner_config()))
}
