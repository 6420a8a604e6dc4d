// ContainerRunner and TaskExecutor against the in-memory runtime

mod common;

use common::{FakeCollector, FakeRuntime, PanickingCollector, runner, runner_config};
use imagebench::models::{BenchmarkTask, FailureKind, WorkloadSpec};
use imagebench::run_task::TaskExecutor;
use imagebench::runner::{ContainerRunner, RUN_LABEL, RunnerError};
use imagebench::runtime::{ContainerHandle, ContainerRuntime, VolumeMount};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn task(image: &str, command: &str, timeout: Duration) -> BenchmarkTask {
    BenchmarkTask {
        seq: 0,
        image: image.into(),
        workload: WorkloadSpec::new("wl", command, timeout),
        iteration: 1,
    }
}

#[tokio::test]
async fn runner_success_removes_container() {
    let rt = Arc::new(FakeRuntime::new().with_images(&["img"]));
    let r = runner(rt.clone());

    let out = r.run("img", "ok:30", Duration::from_secs(5)).await.unwrap();
    assert!(out.success);
    assert_eq!(out.exit_status, 0);
    assert!(out.duration_seconds >= 0.03);
    assert_eq!(out.stdout, "ran ok:30\n");
    assert_eq!(rt.created_count(), 1);
    assert_eq!(rt.removed_count(), 1);
    assert_eq!(rt.live_count(), 0);
    assert_eq!(rt.pulls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn runner_non_zero_exit_is_outcome_not_error() {
    let rt = Arc::new(FakeRuntime::new().with_images(&["img"]));
    let out = runner(rt.clone())
        .run("img", "fail:3", Duration::from_secs(5))
        .await
        .unwrap();
    assert!(!out.success);
    assert_eq!(out.exit_status, 3);
    assert_eq!(rt.live_count(), 0);
}

#[tokio::test]
async fn runner_timeout_tears_down_container() {
    let rt = Arc::new(FakeRuntime::new().with_images(&["img"]));
    let err = runner(rt.clone())
        .run("img", "hang", Duration::from_millis(100))
        .await
        .unwrap_err();

    let RunnerError::TimedOut {
        container_id,
        duration_seconds,
        ..
    } = &err
    else {
        panic!("expected timeout, got {err}");
    };
    assert!(*duration_seconds >= 0.1);
    assert_eq!(err.failure_kind(), FailureKind::TimedOut);
    let handle = ContainerHandle {
        id: container_id.clone(),
        name: String::new(),
    };
    assert!(!rt.exists(&handle).await.unwrap());
    assert_eq!(rt.removed_count(), 1);
}

#[tokio::test]
async fn runner_pulls_missing_image() {
    let rt = Arc::new(FakeRuntime::new());
    let out = runner(rt.clone())
        .run("fresh:1", "ok", Duration::from_secs(5))
        .await
        .unwrap();
    assert!(out.success);
    assert_eq!(rt.pulls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn runner_pull_failure_creates_nothing() {
    let rt = Arc::new(FakeRuntime::new().with_pull_failures(&["missing:latest"]));
    let err = runner(rt.clone())
        .run("missing:latest", "ok", Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::ImageUnavailable { .. }));
    assert_eq!(err.failure_kind(), FailureKind::ImageUnavailable);
    assert_eq!(rt.created_count(), 0);
}

#[tokio::test]
async fn runner_always_pull_pulls_present_image() {
    let rt = Arc::new(FakeRuntime::new().with_images(&["img"]));
    let mut cfg = runner_config();
    cfg.always_pull = true;
    let r = ContainerRunner::new(rt.clone(), cfg);
    r.run("img", "ok", Duration::from_secs(5)).await.unwrap();
    assert_eq!(rt.pulls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn runner_container_spec_carries_config() {
    let rt = Arc::new(FakeRuntime::new().with_images(&["img"]));
    let mut cfg = runner_config();
    cfg.gpus = true;
    cfg.mount = Some(VolumeMount {
        source: "/srv/workloads".into(),
        target: "/app".into(),
        read_only: true,
    });
    cfg.working_dir = Some("/app".into());
    let r = ContainerRunner::new(rt.clone(), cfg);
    r.run("img", "python gpu_stress_test.py", Duration::from_secs(5))
        .await
        .unwrap();
    r.run("img", "ok", Duration::from_secs(5)).await.unwrap();

    let created = rt.created.lock().unwrap();
    let spec = &created[0];
    assert_eq!(spec.image, "img");
    assert_eq!(spec.cmd, vec!["/bin/sh", "-c", "python gpu_stress_test.py"]);
    assert!(spec.gpus);
    assert_eq!(spec.working_dir.as_deref(), Some("/app"));
    assert_eq!(spec.mounts.len(), 1);
    assert_eq!(spec.labels.get(RUN_LABEL).map(String::as_str), Some("run-test"));
    assert_ne!(created[0].name, created[1].name);
}

#[tokio::test]
async fn executor_success_has_snapshots_and_usage() {
    let rt = Arc::new(FakeRuntime::new().with_images(&["img"]));
    let collector = Arc::new(FakeCollector::default());
    let exec = TaskExecutor::new(runner(rt), collector.clone());

    let result = exec
        .execute(task("img", "ok:50", Duration::from_secs(5)))
        .await;
    assert!(result.success);
    assert!(result.failure.is_none());
    assert_eq!(result.exit_status, Some(0));
    assert!(result.pre.host.is_some());
    assert!(result.post.host.is_some());
    assert!(result.pre.gpus.is_none());
    assert_eq!(collector.calls.load(Ordering::SeqCst), 2);
    let usage = result.usage.expect("usage sampled while running");
    assert_eq!(usage.cpu_percent, 50.0);
    assert_eq!(usage.mem_percent, 25.0);
}

#[tokio::test]
async fn executor_maps_failures() {
    let rt = Arc::new(
        FakeRuntime::new()
            .with_images(&["img"])
            .with_pull_failures(&["gone"]),
    );
    let exec = TaskExecutor::new(runner(rt), Arc::new(FakeCollector::default()));

    let r = exec.execute(task("img", "fail:2", Duration::from_secs(5))).await;
    assert!(!r.success);
    assert_eq!(r.failure, Some(FailureKind::NonZeroExit));
    assert_eq!(r.exit_status, Some(2));

    let r = exec.execute(task("gone", "ok", Duration::from_secs(5))).await;
    assert_eq!(r.failure, Some(FailureKind::ImageUnavailable));
    assert!(r.error.as_deref().unwrap_or("").contains("gone"));

    let r = exec
        .execute(task("img", "hang", Duration::from_millis(50)))
        .await;
    assert_eq!(r.failure, Some(FailureKind::TimedOut));
    assert!(r.timed_out());
    assert!(r.duration_seconds >= 0.05);
}

#[tokio::test]
async fn executor_panic_becomes_internal_failure() {
    let rt = Arc::new(FakeRuntime::new().with_images(&["img"]));
    let exec = TaskExecutor::new(runner(rt), Arc::new(PanickingCollector));
    let r = exec.execute(task("img", "ok", Duration::from_secs(5))).await;
    assert!(!r.success);
    assert_eq!(r.failure, Some(FailureKind::Internal));
    assert!(r.error.as_deref().unwrap_or("").contains("probe exploded"));
}

#[tokio::test]
async fn executor_panic_during_wait_still_removes_container() {
    let rt = Arc::new(FakeRuntime::new().with_images(&["img"]));
    let exec = TaskExecutor::new(runner(rt.clone()), Arc::new(FakeCollector::default()));
    let r = exec.execute(task("img", "panic", Duration::from_secs(5))).await;
    assert!(!r.success);
    assert_eq!(r.failure, Some(FailureKind::Internal));
    assert!(r.error.as_deref().unwrap_or("").contains("wait exploded"));
    assert_eq!(rt.created_count(), 1);
    assert_eq!(rt.removed_count(), 1);
    assert_eq!(rt.live_count(), 0);
}
