// Container runtime boundary. DockerRepo implements it over bollard; tests use in-memory fakes.

use crate::models::UsageSample;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("image {0} not found")]
    ImageNotFound(String),

    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("{0}")]
    Other(String),
}

/// Bind mount from the host into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Everything needed to create one benchmark container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub working_dir: Option<String>,
    pub mounts: Vec<VolumeMount>,
    pub gpus: bool,
    pub memory_limit_bytes: Option<i64>,
    pub nano_cpus: Option<i64>,
    pub read_only_rootfs: bool,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn pull(&self, image: &str) -> Result<(), RuntimeError>;

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError>;

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Block until the container exits; returns its exit status.
    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RuntimeError>;

    /// Stream usage samples into `tx` until the container stops or the stream fails.
    async fn stats(
        &self,
        handle: &ContainerHandle,
        tx: mpsc::UnboundedSender<UsageSample>,
    ) -> Result<(), RuntimeError>;

    /// (stdout, stderr), each trimmed to its last `limit_bytes`.
    async fn logs(
        &self,
        handle: &ContainerHandle,
        limit_bytes: usize,
    ) -> Result<(String, String), RuntimeError>;

    /// Force-remove (kills if running). Removing an already-gone container is Ok.
    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    async fn exists(&self, handle: &ContainerHandle) -> Result<bool, RuntimeError>;
}

/// Keep the last `limit` bytes of `s`, cut on a char boundary.
pub fn keep_tail(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut start = s.len() - limit;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}
