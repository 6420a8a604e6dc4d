// Benchmark container's own CPU/memory, as reported by the runtime's stats endpoint.

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

/// One processed stats sample for a running container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSample {
    pub cpu_percent: f64,
    pub mem_usage_bytes: u64,
    pub mem_limit_bytes: u64,
}

impl UsageSample {
    pub fn mem_percent(&self) -> f64 {
        if self.mem_limit_bytes > 0 {
            (self.mem_usage_bytes as f64 / self.mem_limit_bytes as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Peak usage over the lifetime of one benchmark container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct ContainerUsage {
    pub cpu_percent: f64,
    pub mem_usage_bytes: u64,
    pub mem_limit_bytes: u64,
    pub mem_percent: f64,
    pub samples: u32,
}

impl ContainerUsage {
    /// Fold samples into peak values. `None` when no sample arrived.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a UsageSample>) -> Option<Self> {
        let mut out: Option<ContainerUsage> = None;
        for s in samples {
            let u = out.get_or_insert(ContainerUsage {
                cpu_percent: 0.0,
                mem_usage_bytes: 0,
                mem_limit_bytes: 0,
                mem_percent: 0.0,
                samples: 0,
            });
            u.cpu_percent = u.cpu_percent.max(s.cpu_percent);
            u.mem_usage_bytes = u.mem_usage_bytes.max(s.mem_usage_bytes);
            u.mem_limit_bytes = u.mem_limit_bytes.max(s.mem_limit_bytes);
            u.mem_percent = u.mem_percent.max(s.mem_percent());
            u.samples += 1;
        }
        out
    }
}
