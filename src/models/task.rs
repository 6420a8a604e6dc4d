// Benchmark matrix models: one workload definition and one scheduled cell of the matrix.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Named command plus timeout describing what runs inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub name: String,
    pub command: String,
    #[serde(rename = "timeoutSecs", with = "secs_f64")]
    pub timeout: Duration,
}

impl WorkloadSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            timeout,
        }
    }
}

/// One (image, workload, iteration) unit of work. `seq` is the position in
/// enumeration order, so submission order can be rebuilt after out-of-order completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkTask {
    pub seq: usize,
    pub image: String,
    pub workload: WorkloadSpec,
    pub iteration: u32,
}

impl BenchmarkTask {
    /// Short human label for log lines, e.g. `python:3.10-slim [gpu_stress] iter 2`.
    pub fn label(&self) -> String {
        format!(
            "{} [{}] iter {}",
            self.image, self.workload.name, self.iteration
        )
    }
}

/// Expands images × workloads × iterations (1..=iterations) in nested order
/// image, then workload, then iteration.
pub fn enumerate_tasks(
    images: &[String],
    workloads: &[WorkloadSpec],
    iterations: u32,
) -> Vec<BenchmarkTask> {
    let mut tasks =
        Vec::with_capacity(images.len() * workloads.len() * iterations as usize);
    for image in images {
        for workload in workloads {
            for iteration in 1..=iterations {
                tasks.push(BenchmarkTask {
                    seq: tasks.len(),
                    image: image.clone(),
                    workload: workload.clone(),
                    iteration,
                });
            }
        }
    }
    tasks
}

mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
