// Docker container lifecycle via bollard

mod stats;

use crate::models::UsageSample;
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, RuntimeError, keep_tail};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerCreateBody, DeviceRequest, HostConfig, Mount, MountType};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StatsOptions, WaitContainerOptions,
};
use futures_util::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self { docker })
    }

    /// Daemon reachability check, used at startup before any task is scheduled.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    fn host_config(spec: &ContainerSpec) -> HostConfig {
        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.target.clone()),
                source: Some(m.source.clone()),
                typ: Some(MountType::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let device_requests = spec.gpus.then(|| {
            vec![DeviceRequest {
                count: Some(-1),
                capabilities: Some(vec![vec!["gpu".to_string()]]),
                ..Default::default()
            }]
        });

        let tmpfs = spec.read_only_rootfs.then(|| {
            let mut t = HashMap::new();
            t.insert("/tmp".to_string(), "rw,size=256m".to_string());
            t
        });

        HostConfig {
            mounts: if mounts.is_empty() { None } else { Some(mounts) },
            device_requests,
            memory: spec.memory_limit_bytes,
            nano_cpus: spec.nano_cpus,
            readonly_rootfs: Some(spec.read_only_rootfs),
            tmpfs,
            auto_remove: Some(false),
            ..Default::default()
        }
    }
}

/// Split an image reference into (repository, tag) for the pull API. An untagged
/// reference pulls `latest` (an empty tag would pull every tag). Digests pass through untagged.
pub(crate) fn pull_reference(image: &str) -> (String, Option<String>) {
    if image.contains('@') {
        return (image.to_string(), None);
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (image[..split].to_string(), Some(image[split + 1..].to_string()))
        }
        None => (image.to_string(), Some("latest".to_string())),
    }
}

fn is_not_found(e: &DockerError) -> bool {
    matches!(
        e,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRepo {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "pull"))]
    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        let (from_image, tag) = pull_reference(image);
        let options = CreateImageOptions {
            from_image: Some(from_image),
            tag,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image, status = %status, "pull progress");
                    }
                }
                Err(e) if is_not_found(&e) => {
                    return Err(RuntimeError::ImageNotFound(image.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    #[instrument(skip(self, spec), fields(repo = "docker", operation = "create", name = %spec.name))]
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            working_dir: spec.working_dir.clone(),
            labels: Some(spec.labels.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(Self::host_config(spec)),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        };
        let created = self.docker.create_container(Some(options), body).await?;
        for w in &created.warnings {
            warn!(container = %spec.name, warning = %w, "docker create warning");
        }
        Ok(ContainerHandle {
            id: created.id,
            name: spec.name.clone(),
        })
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RuntimeError> {
        let mut stream = self
            .docker
            .wait_container(&handle.id, None::<WaitContainerOptions>);
        match stream.next().await {
            Some(Ok(resp)) => Ok(resp.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(RuntimeError::Other(format!(
                "wait stream for {} ended without a status",
                handle.name
            ))),
        }
    }

    async fn stats(
        &self,
        handle: &ContainerHandle,
        tx: mpsc::UnboundedSender<UsageSample>,
    ) -> Result<(), RuntimeError> {
        let options = StatsOptions {
            stream: true,
            ..Default::default()
        };
        let mut stream = self.docker.stats(&handle.id, Some(options));
        while let Some(result) = stream.next().await {
            match result {
                Ok(s) => {
                    if let Some(sample) = stats::process_statistics(&s)
                        && tx.send(sample).is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    debug!(container = %handle.name, error = %e, "stats stream ended");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    async fn logs(
        &self,
        handle: &ContainerHandle,
        limit_bytes: usize,
    ) -> Result<(String, String), RuntimeError> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };
        let mut stream = self.docker.logs(&handle.id, Some(options));
        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdErr { message } => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok((keep_tail(&stdout, limit_bytes), keep_tail(&stderr, limit_bytes)))
    }

    #[instrument(skip(self, handle), fields(repo = "docker", operation = "remove", name = %handle.name))]
    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(&handle.id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, handle: &ContainerHandle) -> Result<bool, RuntimeError> {
        match self
            .docker
            .inspect_container(&handle.id, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
