use crate::models::WorkloadSpec;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub workloads: Vec<WorkloadConfig>,
    pub sink: Option<SinkConfig>,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkConfig {
    pub images: Vec<String>,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Simultaneous container runs; <= 0 means the system default pool size.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: i64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Stop dispatching new tasks after this many seconds; in-flight tasks finish.
    pub deadline_secs: Option<u64>,
    /// Write one JSON file per (image, workload, iteration).
    #[serde(default = "default_true")]
    pub write_task_artifacts: bool,
}

fn default_iterations() -> u32 {
    3
}

fn default_max_concurrency() -> i64 {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    /// Host directory bind-mounted read-only into every container.
    pub workload_dir: Option<PathBuf>,
    #[serde(default = "default_mount_target")]
    pub mount_target: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Request all GPUs for every container. Explicit; never inferred from probe output.
    #[serde(default)]
    pub gpus: bool,
    #[serde(default)]
    pub always_pull: bool,
    #[serde(default = "default_pull_timeout_secs")]
    pub pull_timeout_secs: u64,
    pub memory_limit_bytes: Option<i64>,
    /// CPU quota in units of 1e-9 CPUs (Docker NanoCpus).
    pub nano_cpus: Option<i64>,
    /// Read-only root filesystem with a tmpfs /tmp. Containers are removed after
    /// every run either way; this also blocks writes during the run.
    #[serde(default)]
    pub read_only_rootfs: bool,
    /// stdout/stderr kept per run, each.
    #[serde(default = "default_log_limit_bytes")]
    pub log_limit_bytes: usize,
    /// Sample the container stats stream while it runs.
    #[serde(default = "default_true")]
    pub collect_usage: bool,
}

fn default_mount_target() -> String {
    "/app".into()
}

fn default_shell() -> String {
    "/bin/sh".into()
}

fn default_pull_timeout_secs() -> u64 {
    600
}

fn default_log_limit_bytes() -> usize {
    64 * 1024
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            workload_dir: None,
            mount_target: default_mount_target(),
            shell: default_shell(),
            gpus: false,
            always_pull: false,
            pull_timeout_secs: default_pull_timeout_secs(),
            memory_limit_bytes: None,
            nano_cpus: None,
            read_only_rootfs: false,
            log_limit_bytes: default_log_limit_bytes(),
            collect_usage: true,
        }
    }
}

impl ContainerConfig {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_nvidia_smi")]
    pub nvidia_smi: String,
    #[serde(default = "default_gpu_enabled")]
    pub gpu: bool,
    #[serde(default = "default_true")]
    pub host: bool,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_nvidia_smi() -> String {
    "nvidia-smi".into()
}

fn default_gpu_enabled() -> bool {
    true
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            nvidia_smi: default_nvidia_smi(),
            gpu: default_gpu_enabled(),
            host: true,
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadConfig {
    pub name: String,
    pub command: String,
    #[serde(default = "default_workload_timeout_secs")]
    pub timeout_secs: u64,
}

pub fn default_workload_timeout_secs() -> u64 {
    1800
}

impl WorkloadConfig {
    pub fn to_spec(&self) -> WorkloadSpec {
        WorkloadSpec::new(
            self.name.clone(),
            self.command.clone(),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// InfluxDB base URL, e.g. http://localhost:8086
    pub url: String,
    pub org: String,
    pub bucket: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
    /// Points buffered between the scheduler and the forwarder task.
    #[serde(default = "default_sink_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_sink_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_measurement() -> String {
    "benchmark".into()
}

fn default_sink_capacity() -> usize {
    256
}

fn default_sink_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "imagebench.toml".into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Declared workloads as specs. Empty when the config relies on directory discovery.
    pub fn workload_specs(&self) -> Vec<WorkloadSpec> {
        self.workloads.iter().map(WorkloadConfig::to_spec).collect()
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.benchmark.images.is_empty(),
            "benchmark.images must list at least one image"
        );
        anyhow::ensure!(
            self.benchmark.images.iter().all(|i| !i.trim().is_empty()),
            "benchmark.images must not contain empty names"
        );
        let mut images: Vec<&str> = self.benchmark.images.iter().map(String::as_str).collect();
        images.sort_unstable();
        images.dedup();
        anyhow::ensure!(
            images.len() == self.benchmark.images.len(),
            "benchmark.images must be unique"
        );
        anyhow::ensure!(
            self.benchmark.iterations > 0,
            "benchmark.iterations must be > 0, got {}",
            self.benchmark.iterations
        );
        anyhow::ensure!(
            !self.benchmark.output_dir.as_os_str().is_empty(),
            "benchmark.output_dir must be non-empty"
        );
        if let Some(d) = self.benchmark.deadline_secs {
            anyhow::ensure!(d > 0, "benchmark.deadline_secs must be > 0, got {}", d);
        }
        anyhow::ensure!(
            self.container.mount_target.starts_with('/'),
            "container.mount_target must be an absolute path, got {}",
            self.container.mount_target
        );
        anyhow::ensure!(
            !self.container.shell.is_empty(),
            "container.shell must be non-empty"
        );
        anyhow::ensure!(
            self.container.pull_timeout_secs > 0,
            "container.pull_timeout_secs must be > 0, got {}",
            self.container.pull_timeout_secs
        );
        anyhow::ensure!(
            self.probe.timeout_ms > 0,
            "probe.timeout_ms must be > 0, got {}",
            self.probe.timeout_ms
        );
        anyhow::ensure!(
            !self.workloads.is_empty() || self.container.workload_dir.is_some(),
            "workloads must be declared or container.workload_dir set for discovery"
        );
        for w in &self.workloads {
            anyhow::ensure!(!w.name.is_empty(), "workloads.name must be non-empty");
            anyhow::ensure!(
                !w.command.is_empty(),
                "workloads.command must be non-empty (workload {})",
                w.name
            );
            anyhow::ensure!(
                w.timeout_secs > 0,
                "workloads.timeout_secs must be > 0 (workload {})",
                w.name
            );
        }
        let mut names: Vec<&str> = self.workloads.iter().map(|w| w.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        anyhow::ensure!(
            names.len() == self.workloads.len(),
            "workloads.name must be unique"
        );
        if let Some(sink) = &self.sink {
            anyhow::ensure!(
                sink.url.starts_with("http://") || sink.url.starts_with("https://"),
                "sink.url must be an http(s) URL, got {}",
                sink.url
            );
            anyhow::ensure!(!sink.org.is_empty(), "sink.org must be non-empty");
            anyhow::ensure!(!sink.bucket.is_empty(), "sink.bucket must be non-empty");
            anyhow::ensure!(
                !sink.measurement.is_empty(),
                "sink.measurement must be non-empty"
            );
            anyhow::ensure!(
                sink.channel_capacity > 0,
                "sink.channel_capacity must be > 0, got {}",
                sink.channel_capacity
            );
        }
        if let Some(db) = &self.database {
            anyhow::ensure!(!db.path.is_empty(), "database.path must be non-empty");
        }
        Ok(())
    }
}
