// Aggregated per-(image, workload) report. Means are `None` when undefined.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub image: String,
    pub workload: String,
    pub runs: usize,
    pub successes: usize,
    pub failures: usize,
    pub timeouts: usize,
    pub avg_runtime_s: Option<f64>,
    pub min_runtime_s: Option<f64>,
    pub max_runtime_s: Option<f64>,
    pub avg_cpu_percent: Option<f64>,
    pub avg_mem_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub run_id: String,
    pub total_tasks: usize,
    pub total_successes: usize,
    /// Sorted by (image, workload).
    pub groups: Vec<GroupSummary>,
}
