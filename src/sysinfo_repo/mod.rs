// Host CPU and memory via sysinfo.
// Each reading owns its System so concurrent tasks never wait on each other's probe.

use crate::models::HostReading;
use sysinfo::System;
use tracing::instrument;

#[derive(Debug, Default)]
pub struct SysinfoRepo;

impl SysinfoRepo {
    pub fn new() -> Self {
        Self
    }

    /// Host CPU% over one sysinfo update interval, plus current memory use.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "host_reading"))]
    pub async fn host_reading(&self) -> anyhow::Result<HostReading> {
        tokio::task::spawn_blocking(|| {
            let mut sys = System::new();
            sys.refresh_cpu_all();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            sys.refresh_cpu_all();
            sys.refresh_memory();
            host_reading_from(&sys)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))
    }
}

fn host_reading_from(sys: &System) -> HostReading {
    let cpu_percent = (sys.global_cpu_usage() as f64).clamp(0.0, 100.0);
    let total = sys.total_memory();
    let used = total.saturating_sub(sys.available_memory());
    let mem_percent = if total > 0 {
        (used as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    HostReading {
        cpu_percent,
        mem_usage_bytes: used,
        mem_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn host_reading_is_in_range() {
        let reading = SysinfoRepo::new().host_reading().await.unwrap();
        assert!((0.0..=100.0).contains(&reading.cpu_percent));
        assert!((0.0..=100.0).contains(&reading.mem_percent));
    }
}
