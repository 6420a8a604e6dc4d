// Process raw Docker stats API response into a UsageSample.

use crate::models::UsageSample;
use bollard::models::ContainerStatsResponse;

/// Process a raw Docker stats response. `None` until the daemon has both the
/// current and previous CPU counters (the first frame of a stream has no precpu).
pub(crate) fn process_statistics(s: &ContainerStatsResponse) -> Option<UsageSample> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let precpu_stats = s.precpu_stats.as_ref()?;

    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;
    let precpu_usage = precpu_stats.cpu_usage.as_ref()?;

    let cpu_delta =
        cpu_usage.total_usage.unwrap_or(0) as i64 - precpu_usage.total_usage.unwrap_or(0) as i64;
    let system_delta = cpu_stats.system_cpu_usage.unwrap_or(0) as i64
        - precpu_stats.system_cpu_usage.unwrap_or(0) as i64;
    let online = cpu_stats.online_cpus.unwrap_or(1) as f64;
    let cpu_percent = if system_delta > 0 && online > 0.0 && cpu_delta > 0 {
        (cpu_delta as f64 / system_delta as f64) * online * 100.0
    } else {
        0.0
    };

    let mem_usage = s.memory_stats.as_ref().and_then(|m| m.usage).unwrap_or(0);
    let mem_limit = s.memory_stats.as_ref().and_then(|m| m.limit).unwrap_or(0);

    Some(UsageSample {
        cpu_percent,
        mem_usage_bytes: mem_usage,
        mem_limit_bytes: mem_limit,
    })
}
