// Metric Collector: one ResourceSnapshot from every enabled probe, each bounded by the probe timeout.

use crate::config::ProbeConfig;
use crate::gpu_repo::GpuProbe;
use crate::models::{HostReading, ResourceSnapshot};
use crate::sysinfo_repo::SysinfoRepo;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[async_trait]
pub trait Collector: Send + Sync {
    /// Never fails: an unavailable probe leaves its part of the snapshot `None`.
    async fn sample(&self) -> ResourceSnapshot;
}

pub struct ProbeCollector {
    gpu: Option<GpuProbe>,
    host: Option<Arc<SysinfoRepo>>,
    timeout: Duration,
}

impl ProbeCollector {
    pub fn new(gpu: Option<GpuProbe>, host: Option<Arc<SysinfoRepo>>, timeout: Duration) -> Self {
        Self { gpu, host, timeout }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        let gpu = config
            .gpu
            .then(|| GpuProbe::new(config.nvidia_smi.clone(), config.timeout()));
        let host = config.host.then(|| Arc::new(SysinfoRepo::new()));
        Self::new(gpu, host, config.timeout())
    }

    async fn host_reading(&self) -> Option<HostReading> {
        let repo = self.host.as_ref()?;
        match tokio::time::timeout(self.timeout, repo.host_reading()).await {
            Ok(Ok(reading)) => Some(reading),
            Ok(Err(e)) => {
                warn!(error = %e, operation = "host_reading", "host probe failed");
                None
            }
            Err(_) => {
                warn!(operation = "host_reading", "host probe timed out");
                None
            }
        }
    }

    async fn gpu_readings(&self) -> Option<Vec<crate::models::GpuReading>> {
        match &self.gpu {
            Some(probe) => probe.query().await,
            None => None,
        }
    }
}

#[async_trait]
impl Collector for ProbeCollector {
    async fn sample(&self) -> ResourceSnapshot {
        let (gpus, host) = tokio::join!(self.gpu_readings(), self.host_reading());
        ResourceSnapshot { gpus, host }
    }
}
