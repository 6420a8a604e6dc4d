// SQLite results store. One benchmark_runs row per invocation, one run_results row per task.
// Snapshots and container usage are version-prefixed wincode BLOBs.

mod blob;

use crate::models::{
    BenchmarkRun, BenchmarkTask, ContainerUsage, FailureKind, ResourceSnapshot, RunResult,
    WorkloadSpec,
};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

/// Row of `benchmark_runs`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub run_id: String,
    pub started_at_nanos: i64,
    pub finished_at_nanos: i64,
    pub total_tasks: i64,
    pub successes: i64,
}

pub struct ResultsRepo {
    pool: SqlitePool,
}

impl ResultsRepo {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS benchmark_runs (
                run_id TEXT PRIMARY KEY,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                total_tasks INTEGER NOT NULL,
                successes INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS run_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL REFERENCES benchmark_runs(run_id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                image TEXT NOT NULL,
                workload TEXT NOT NULL,
                command TEXT NOT NULL,
                timeout_secs REAL NOT NULL,
                iteration INTEGER NOT NULL,
                success INTEGER NOT NULL,
                duration_seconds REAL NOT NULL,
                exit_status INTEGER,
                failure TEXT,
                error TEXT,
                stdout TEXT NOT NULL,
                stderr TEXT NOT NULL,
                pre_data BLOB NOT NULL,
                post_data BLOB NOT NULL,
                usage_data BLOB,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_results_run_seq ON run_results(run_id, seq)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert or replace a whole run in one transaction.
    #[instrument(skip(self, run), fields(repo = "results", operation = "save_run", run_id = %run.run_id, results_count = run.len()))]
    pub async fn save_run(&self, run: &BenchmarkRun) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM run_results WHERE run_id = $1")
            .bind(&run.run_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT OR REPLACE INTO benchmark_runs (run_id, started_at, finished_at, total_tasks, successes) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&run.run_id)
        .bind(run.started_at_nanos)
        .bind(run.finished_at_nanos)
        .bind(run.len() as i64)
        .bind(run.success_count() as i64)
        .execute(&mut *tx)
        .await?;

        for r in run.ordered_results() {
            let pre_data = snapshot_blob(&r.pre)?;
            let post_data = snapshot_blob(&r.post)?;
            let usage_data = r.usage.as_ref().map(usage_blob).transpose()?;
            sqlx::query(
                "INSERT INTO run_results (run_id, seq, image, workload, command, timeout_secs, iteration, success, duration_seconds, exit_status, failure, error, stdout, stderr, pre_data, post_data, usage_data, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
            )
            .bind(&run.run_id)
            .bind(r.task.seq as i64)
            .bind(&r.task.image)
            .bind(&r.task.workload.name)
            .bind(&r.task.workload.command)
            .bind(r.task.workload.timeout.as_secs_f64())
            .bind(r.task.iteration as i64)
            .bind(r.success)
            .bind(r.duration_seconds)
            .bind(r.exit_status)
            .bind(r.failure.map(|f| f.as_str()))
            .bind(r.error.as_deref())
            .bind(&r.stdout)
            .bind(&r.stderr)
            .bind(&pre_data)
            .bind(&post_data)
            .bind(usage_data.as_deref())
            .bind(r.timestamp_nanos)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn recent_runs(&self, limit: u32) -> anyhow::Result<Vec<StoredRun>> {
        let rows = sqlx::query(
            "SELECT run_id, started_at, finished_at, total_tasks, successes
             FROM benchmark_runs ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> anyhow::Result<StoredRun> {
                Ok(StoredRun {
                    run_id: row.try_get("run_id")?,
                    started_at_nanos: row.try_get("started_at")?,
                    finished_at_nanos: row.try_get("finished_at")?,
                    total_tasks: row.try_get("total_tasks")?,
                    successes: row.try_get("successes")?,
                })
            })
            .collect()
    }

    /// Full run with results in task order, or `None` for an unknown id.
    #[instrument(skip(self), fields(repo = "results", operation = "get_run"))]
    pub async fn get_run(&self, run_id: &str) -> anyhow::Result<Option<BenchmarkRun>> {
        let header = sqlx::query(
            "SELECT started_at, finished_at FROM benchmark_runs WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(header) = header else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT seq, image, workload, command, timeout_secs, iteration, success, duration_seconds, exit_status, failure, error, stdout, stderr, pre_data, post_data, usage_data, created_at
             FROM run_results WHERE run_id = $1 ORDER BY seq ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut run = BenchmarkRun::new(run_id);
        run.started_at_nanos = header.try_get("started_at")?;
        run.finished_at_nanos = header.try_get("finished_at")?;
        for row in &rows {
            run.push(Self::parse_result_row(row)?);
        }
        Ok(Some(run))
    }

    fn parse_result_row(row: &SqliteRow) -> anyhow::Result<RunResult> {
        let seq: i64 = row.try_get("seq")?;
        let iteration: i64 = row.try_get("iteration")?;
        let timeout_secs: f64 = row.try_get("timeout_secs")?;
        let task = BenchmarkTask {
            seq: usize::try_from(seq)?,
            image: row.try_get("image")?,
            workload: WorkloadSpec::new(
                row.try_get::<String, _>("workload")?,
                row.try_get::<String, _>("command")?,
                Duration::try_from_secs_f64(timeout_secs)?,
            ),
            iteration: u32::try_from(iteration)?,
        };

        let pre_data: Vec<u8> = row.try_get("pre_data")?;
        let post_data: Vec<u8> = row.try_get("post_data")?;
        let usage_data: Option<Vec<u8>> = row.try_get("usage_data")?;
        let failure: Option<String> = row.try_get("failure")?;

        Ok(RunResult {
            task,
            success: row.try_get("success")?,
            duration_seconds: row.try_get("duration_seconds")?,
            exit_status: row.try_get("exit_status")?,
            pre: deserialize_snapshot(&pre_data)?,
            post: deserialize_snapshot(&post_data)?,
            error: row.try_get("error")?,
            failure: failure.as_deref().map(FailureKind::from_tag),
            usage: usage_data
                .as_deref()
                .map(deserialize_usage)
                .transpose()?,
            stdout: row.try_get("stdout")?,
            stderr: row.try_get("stderr")?,
            timestamp_nanos: row.try_get("created_at")?,
        })
    }

    /// Delete a run and its results. Returns whether the run existed.
    pub async fn delete_run(&self, run_id: &str) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM run_results WHERE run_id = $1")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM benchmark_runs WHERE run_id = $1")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }
}

fn snapshot_blob(snapshot: &ResourceSnapshot) -> anyhow::Result<Vec<u8>> {
    let payload = wincode::serialize(snapshot).map_err(|e| anyhow::anyhow!("wincode: {}", e))?;
    Ok(blob::with_version_prefix(blob::BLOB_VERSION, payload))
}

fn usage_blob(usage: &ContainerUsage) -> anyhow::Result<Vec<u8>> {
    let payload = wincode::serialize(usage).map_err(|e| anyhow::anyhow!("wincode: {}", e))?;
    Ok(blob::with_version_prefix(blob::BLOB_VERSION, payload))
}

fn deserialize_snapshot(bytes: &[u8]) -> anyhow::Result<ResourceSnapshot> {
    wincode::deserialize(blob::blob_payload(bytes, blob::BLOB_VERSION)?)
        .map_err(|e| anyhow::anyhow!("wincode deserialize snapshot: {}", e))
}

fn deserialize_usage(bytes: &[u8]) -> anyhow::Result<ContainerUsage> {
    wincode::deserialize(blob::blob_payload(bytes, blob::BLOB_VERSION)?)
        .map_err(|e| anyhow::anyhow!("wincode deserialize usage: {}", e))
}
