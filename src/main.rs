use anyhow::Result;
use imagebench::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(
        package = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "starting benchmark orchestrator"
    );

    let workload_specs = workloads::resolve(&app_config)?;
    let docker_repo = Arc::new(docker_repo::DockerRepo::connect()?);
    docker_repo
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("container runtime unreachable: {}", e))?;

    let run_id = models::new_run_id();
    let runner = Arc::new(runner::ContainerRunner::new(
        docker_repo,
        runner::RunnerConfig::from_container_config(&app_config.container, &run_id)?,
    ));
    let collector = Arc::new(collector::ProbeCollector::from_config(&app_config.probe));
    let executor = Arc::new(run_task::TaskExecutor::new(runner, collector));

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        tracing::info!("Received shutdown signal, no new tasks will start");
        let _ = stop_tx.send(true);
    });

    let mut scheduler = scheduler::Scheduler::new(executor, run_id)
        .with_deadline(app_config.benchmark.deadline_secs.map(Duration::from_secs))
        .with_stop_signal(stop_rx);

    let forwarder = match &app_config.sink {
        Some(sink_config) => {
            let sink = Arc::new(sink::InfluxSink::new(sink_config)?);
            let (tx, rx) = mpsc::channel(sink_config.channel_capacity);
            scheduler = scheduler.with_result_listener(tx);
            Some(sink::spawn_forwarder(
                rx,
                sink,
                sink_config.bucket.clone(),
                sink_config.measurement.clone(),
            ))
        }
        None => None,
    };

    let run = scheduler
        .run_all(
            &app_config.benchmark.images,
            &workload_specs,
            app_config.benchmark.iterations,
            app_config.benchmark.max_concurrency,
        )
        .await;
    // Closes the sink channel so the forwarder can drain and stop.
    drop(scheduler);

    let report = aggregation::summarize(&run);
    artifacts::write_reports(
        &app_config.benchmark.output_dir,
        &run,
        &report,
        app_config.benchmark.write_task_artifacts,
    )?;
    println!("{}", aggregation::render_table(&report));

    if let Some(db) = &app_config.database {
        let results_repo = results_repo::ResultsRepo::connect(&db.path).await?;
        results_repo.init().await?;
        if let Err(e) = results_repo.save_run(&run).await {
            tracing::error!(error = %e, operation = "save_run", "failed to store run");
        }
    }

    if let Some(handle) = forwarder {
        match handle.await {
            Ok(stats) => tracing::info!(
                sent = stats.sent,
                failed = stats.failed,
                "sink forwarding finished"
            ),
            Err(e) => tracing::error!(error = %e, "sink forwarder failed"),
        }
    }

    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
