// GPU readings via the nvidia-smi CSV query.
// Tool missing, non-zero exit, timeout or malformed output all yield None (no data).

use crate::models::GpuReading;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

const QUERY_ARG: &str = "--query-gpu=index,name,utilization.gpu,utilization.memory,memory.used,memory.total,power.draw,temperature.gpu";
const FORMAT_ARG: &str = "--format=csv,noheader,nounits";
const FIELD_COUNT: usize = 8;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProbeError {
    #[error("line {line}: expected 8 fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("line {line}: field {field} is not a number: {value:?}")]
    Number {
        line: usize,
        field: &'static str,
        value: String,
    },
}

pub struct GpuProbe {
    command: String,
    timeout: Duration,
}

impl GpuProbe {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    #[instrument(skip(self), fields(repo = "gpu", operation = "query"))]
    pub async fn query(&self) -> Option<Vec<GpuReading>> {
        let mut cmd = Command::new(&self.command);
        cmd.arg(QUERY_ARG)
            .arg(FORMAT_ARG)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                warn!(
                    command = %self.command,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "GPU probe timed out"
                );
                return None;
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(command = %self.command, "GPU probe not installed");
                return None;
            }
            Ok(Err(e)) => {
                warn!(command = %self.command, error = %e, "GPU probe failed to start");
                return None;
            }
            Ok(Ok(out)) => out,
        };

        if !output.status.success() {
            debug!(status = ?output.status.code(), "GPU probe exited non-zero");
            return None;
        }

        match parse_gpu_csv(&String::from_utf8_lossy(&output.stdout)) {
            Ok(readings) => Some(readings),
            Err(e) => {
                warn!(error = %e, "discarding malformed GPU probe output");
                None
            }
        }
    }
}

/// Parse `index, name, util.gpu, util.mem, mem.used, mem.total, power, temp` rows.
/// Any malformed row fails the whole parse.
pub fn parse_gpu_csv(output: &str) -> Result<Vec<GpuReading>, ProbeError> {
    let mut out = Vec::new();
    for (i, line) in output.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != FIELD_COUNT {
            return Err(ProbeError::FieldCount {
                line: line_no,
                found: fields.len(),
            });
        }
        let num = |idx: usize, field: &'static str| -> Result<f64, ProbeError> {
            fields[idx].parse::<f64>().map_err(|_| ProbeError::Number {
                line: line_no,
                field,
                value: fields[idx].to_string(),
            })
        };
        let device_index = fields[0].parse::<u32>().map_err(|_| ProbeError::Number {
            line: line_no,
            field: "index",
            value: fields[0].to_string(),
        })?;
        out.push(GpuReading {
            device_index,
            name: fields[1].to_string(),
            utilization_pct: num(2, "utilization.gpu")?,
            memory_utilization_pct: num(3, "utilization.memory")?,
            memory_used_mib: num(4, "memory.used")?,
            memory_total_mib: num(5, "memory.total")?,
            power_watts: num(6, "power.draw")?,
            temperature_c: num(7, "temperature.gpu")?,
        });
    }
    Ok(out)
}
