// Time-series sink: RunResults become line-protocol points written to InfluxDB v2.
// Forwarding is best effort; a failed point is logged and the next one is tried.

use crate::config::SinkConfig;
use crate::models::RunResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("sink returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Str(String),
}

/// One line-protocol point.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp_nanos: i64,
}

impl MetricPoint {
    /// Point for one result, tagged by image and workload. `outcome` and `runtime_s`
    /// are always present; container usage fields only when the runtime reported them.
    pub fn from_result(measurement: &str, result: &RunResult) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("image".to_string(), result.task.image.clone());
        tags.insert("workload".to_string(), result.task.workload.name.clone());
        let outcome = match result.failure {
            Some(kind) => kind.as_str(),
            None => "ok",
        };

        let mut fields = BTreeMap::new();
        fields.insert("outcome".to_string(), FieldValue::Str(outcome.to_string()));
        fields.insert(
            "runtime_s".to_string(),
            FieldValue::Float(result.duration_seconds),
        );
        if let Some(usage) = &result.usage {
            fields.insert(
                "cpu_percent".to_string(),
                FieldValue::Float(usage.cpu_percent),
            );
            fields.insert(
                "mem_percent".to_string(),
                FieldValue::Float(usage.mem_percent),
            );
            fields.insert(
                "mem_usage_bytes".to_string(),
                FieldValue::Int(i64::try_from(usage.mem_usage_bytes).unwrap_or(i64::MAX)),
            );
        }

        Self {
            measurement: measurement.to_string(),
            tags,
            fields,
            timestamp_nanos: result.timestamp_nanos,
        }
    }

    /// `measurement,tag=v field=1.5,count=3i,state="ok" 1700000000000000000`
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (k, v) in &self.tags {
            if v.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape(k, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(v, &[',', '=', ' ']));
        }
        let fields: Vec<String> = self
            .fields
            .iter()
            .filter_map(|(k, v)| {
                let value = match v {
                    FieldValue::Float(f) if f.is_finite() => format!("{}", f),
                    FieldValue::Float(_) => return None,
                    FieldValue::Int(i) => format!("{}i", i),
                    FieldValue::Str(text) => format!("\"{}\"", escape(text, &['"'])),
                };
                Some(format!("{}={}", escape(k, &[',', '=', ' ']), value))
            })
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&self.timestamp_nanos.to_string());
        line
    }
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn write(&self, bucket: &str, point: &MetricPoint) -> Result<(), SinkError>;
}

/// InfluxDB v2 HTTP write API.
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    org: String,
    token: String,
}

impl InfluxSink {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            org: config.org.clone(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl MetricSink for InfluxSink {
    async fn write(&self, bucket: &str, point: &MetricPoint) -> Result<(), SinkError> {
        let mut req = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", bucket),
                ("precision", "ns"),
            ])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(point.to_line_protocol());
        if !self.token.is_empty() {
            req = req.header("Authorization", format!("Token {}", self.token));
        }
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub sent: usize,
    pub failed: usize,
}

/// Spawn the task that writes every received result to `sink`. Ends when all
/// senders are dropped and returns how many points were written or lost.
pub fn spawn_forwarder(
    mut rx: mpsc::Receiver<RunResult>,
    sink: Arc<dyn MetricSink>,
    bucket: String,
    measurement: String,
) -> JoinHandle<ForwardStats> {
    tokio::spawn(async move {
        let mut stats = ForwardStats::default();
        while let Some(result) = rx.recv().await {
            let point = MetricPoint::from_result(&measurement, &result);
            match sink.write(&bucket, &point).await {
                Ok(()) => {
                    stats.sent += 1;
                    debug!(task = %result.task.label(), "point written to sink");
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        task = %result.task.label(),
                        error = %e,
                        operation = "sink_write",
                        "failed to forward result"
                    );
                }
            }
        }
        info!(
            sent = stats.sent,
            failed = stats.failed,
            "sink forwarder stopped"
        );
        stats
    })
}
