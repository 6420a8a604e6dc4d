// Point-in-time resource readings taken around each benchmark run.
// `None` means the probe was unavailable, never zero load.

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

/// One GPU row from the GPU probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct GpuReading {
    pub device_index: u32,
    pub name: String,
    pub utilization_pct: f64,
    pub memory_utilization_pct: f64,
    pub memory_used_mib: f64,
    pub memory_total_mib: f64,
    pub power_watts: f64,
    pub temperature_c: f64,
}

/// Host-wide CPU and memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct HostReading {
    pub cpu_percent: f64,
    pub mem_usage_bytes: u64,
    pub mem_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub gpus: Option<Vec<GpuReading>>,
    pub host: Option<HostReading>,
}

impl ResourceSnapshot {
    /// Snapshot with every probe marked unavailable.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.gpus.is_none() && self.host.is_none()
    }

    /// Make pre/post agree on probe availability: a probe missing on either side
    /// is dropped from both, so deltas are only ever computed over the same schema.
    pub fn align(pre: &mut Self, post: &mut Self) {
        if pre.gpus.is_none() || post.gpus.is_none() {
            pre.gpus = None;
            post.gpus = None;
        }
        if pre.host.is_none() || post.host.is_none() {
            pre.host = None;
            post.host = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(cpu: f64) -> HostReading {
        HostReading {
            cpu_percent: cpu,
            mem_usage_bytes: 1024,
            mem_percent: 10.0,
        }
    }

    #[test]
    fn align_drops_probe_missing_on_one_side() {
        let mut pre = ResourceSnapshot {
            gpus: Some(vec![]),
            host: Some(host(5.0)),
        };
        let mut post = ResourceSnapshot {
            gpus: None,
            host: Some(host(50.0)),
        };
        ResourceSnapshot::align(&mut pre, &mut post);
        assert!(pre.gpus.is_none());
        assert!(post.gpus.is_none());
        assert_eq!(pre.host, Some(host(5.0)));
        assert_eq!(post.host, Some(host(50.0)));
    }

    #[test]
    fn align_of_two_empty_snapshots_stays_identical() {
        let mut pre = ResourceSnapshot::empty();
        let mut post = ResourceSnapshot::empty();
        ResourceSnapshot::align(&mut pre, &mut post);
        assert_eq!(pre, post);
        assert!(pre.is_empty());
    }

    #[test]
    fn empty_snapshot_serializes_nulls_not_zeros() {
        let json = serde_json::to_string(&ResourceSnapshot::empty()).unwrap();
        assert_eq!(json, r#"{"gpus":null,"host":null}"#);
    }
}
