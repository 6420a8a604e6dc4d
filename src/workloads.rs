// Workload discovery: every `<name>_test.py` in the workload directory becomes a
// workload `<name>` running `python <file>` from the mounted working directory.

use crate::config::{AppConfig, default_workload_timeout_secs};
use crate::models::WorkloadSpec;
use anyhow::Context;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

const SCRIPT_SUFFIX: &str = "_test.py";

/// Workload name for a script file, `None` if the file is not a workload script.
pub fn workload_name(file_name: &str) -> Option<&str> {
    let name = file_name.strip_suffix(SCRIPT_SUFFIX)?;
    (!name.is_empty()).then_some(name)
}

/// Discovered workloads sorted by name.
#[instrument(skip(default_timeout), fields(operation = "discover_workloads"))]
pub fn discover(dir: &Path, default_timeout: Duration) -> anyhow::Result<Vec<WorkloadSpec>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read workload directory {}", dir.display()))?;

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(name) = workload_name(file_name) else {
            continue;
        };
        debug!(workload = name, file = file_name, "discovered workload");
        out.push(WorkloadSpec::new(
            name,
            format!("python {}", file_name),
            default_timeout,
        ));
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

/// Declared workloads when any are configured, otherwise the ones discovered in
/// `container.workload_dir`.
pub fn resolve(config: &AppConfig) -> anyhow::Result<Vec<WorkloadSpec>> {
    let declared = config.workload_specs();
    if !declared.is_empty() {
        return Ok(declared);
    }
    let dir = config
        .container
        .workload_dir
        .as_deref()
        .context("no workloads declared and container.workload_dir not set")?;
    let found = discover(dir, Duration::from_secs(default_workload_timeout_secs()))?;
    anyhow::ensure!(
        !found.is_empty(),
        "no *{} scripts found in {}",
        SCRIPT_SUFFIX,
        dir.display()
    );
    Ok(found)
}
