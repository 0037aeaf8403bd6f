// ABOUTME: End-to-end tests for the deploy orchestrator against a scripted runner and fake runtime.
// ABOUTME: Covers the happy path, fail-fast halting, idempotent re-runs, locking and cancellation.

mod support;

use deployctl::backup::BackupSnapshot;
use deployctl::deploy::{CancelFlag, DeployError, DeployErrorKind, DeployLock, Orchestrator};
use deployctl::error::Error;
use deployctl::exec::CommandOutput;
use deployctl::modules::{ModuleKind, ModuleOutcome};
use deployctl::state::{ModuleStatus, StateLog};
use deployctl::types::EnvironmentName;
use std::fs;
use support::{FakeRunner, FakeRuntime};
use tempfile::TempDir;

/// Test: A fresh project deploys every module in order and records each success.
#[tokio::test]
async fn fresh_project_runs_all_modules_in_order() {
    support::init_tracing();
    let dir = TempDir::new().unwrap();
    let ctx = support::context(dir.path(), "1.0.0");
    let runner = FakeRunner::new();
    let runtime = FakeRuntime::healthy("app");

    let report = Orchestrator::new(&ctx, &runner, &runtime)
        .deploy()
        .await
        .expect("deploy should succeed");

    let modules: Vec<_> = report.outcomes.iter().map(|(m, _)| *m).collect();
    assert_eq!(modules, ModuleKind::ALL.to_vec());
    assert!(
        report
            .outcomes
            .iter()
            .all(|(_, outcome)| *outcome == ModuleOutcome::Executed)
    );

    let log = StateLog::new(ctx.layout.state_log());
    let records = log
        .records_for_run(&report.run.deployment_id)
        .expect("state log should read");
    assert_eq!(records.len(), 7);
    for (record, module) in records.iter().zip(ModuleKind::ALL) {
        assert_eq!(record.module, module);
        assert_eq!(record.status, ModuleStatus::Success);
    }

    assert_eq!(report.validation.passed, 2);
    assert_eq!(report.validation.warned, 0);
    assert!(!ctx.layout.lock_file().exists(), "lock should be released");

    // Artifacts every later run relies on
    assert!(ctx.layout.compose_file().exists());
    assert!(ctx.layout.env_file().exists());
    assert!(ctx.layout.tls_dir().join("fullchain.pem").exists());
    assert!(dir.path().join("config/nginx/nginx.conf").exists());
    assert!(dir.path().join("config/prometheus/prometheus.yml").exists());
}

/// Test: The snapshot is taken before any module touches the project.
#[tokio::test]
async fn snapshot_precedes_modules() {
    let dir = TempDir::new().unwrap();
    let ctx = support::context(dir.path(), "1.0.0");
    let runner = FakeRunner::new();
    let runtime = FakeRuntime::healthy("app");

    let report = Orchestrator::new(&ctx, &runner, &runtime)
        .deploy()
        .await
        .expect("deploy should succeed");

    let snapshot = BackupSnapshot::load(&report.snapshot.dir).expect("metadata should load");
    assert_eq!(snapshot.metadata.deployment_id, report.run.deployment_id);
    // The compose file did not exist yet when the snapshot was taken.
    assert!(snapshot.metadata.files.is_empty());
    assert!(snapshot.database_dump_path().is_some());
}

/// Test: A failing module halts the run; later modules never start.
#[tokio::test]
async fn services_failure_halts_before_monitoring_and_gateway() {
    support::init_tracing();
    let dir = TempDir::new().unwrap();
    let ctx = support::context(dir.path(), "1.0.0");
    let runner = FakeRunner::new();
    runner.respond(
        "--remove-orphans api web",
        CommandOutput::failed(1, "pull access denied for registry.local/api"),
    );
    let runtime = FakeRuntime::healthy("app");

    let err = Orchestrator::new(&ctx, &runner, &runtime)
        .deploy()
        .await
        .expect_err("deploy should fail at services");

    assert_eq!(err.kind(), DeployErrorKind::ModuleFailed);
    assert_eq!(err.failed_module(), Some(ModuleKind::Services));
    let backup_dir = err.backup_dir().expect("backup dir").to_path_buf();
    assert!(backup_dir.join("metadata.json").exists());
    assert_eq!(
        err.rollback_command(),
        Some(format!(
            "deployctl --project-root {} --environment {} rollback {}",
            ctx.project_root().display(),
            ctx.environment,
            backup_dir.display()
        ))
    );
    assert_eq!(Error::from(err).exit_code(), 15);

    let log = StateLog::new(ctx.layout.state_log());
    let statuses: Vec<_> = log
        .records()
        .unwrap()
        .into_iter()
        .map(|r| (r.module, r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (ModuleKind::Init, ModuleStatus::Success),
            (ModuleKind::Secrets, ModuleStatus::Success),
            (ModuleKind::Database, ModuleStatus::Success),
            (ModuleKind::Cache, ModuleStatus::Success),
            (ModuleKind::Services, ModuleStatus::Failed),
        ]
    );
    assert_eq!(
        log.current_status(ModuleKind::Gateway).unwrap(),
        ModuleStatus::Pending
    );

    let lines = runner.call_lines();
    assert!(!lines.iter().any(|l| l.contains("prometheus grafana")));
    assert!(!lines.iter().any(|l| l.ends_with("--remove-orphans nginx")));
    assert!(!dir.path().join("config/nginx/nginx.conf").exists());
    assert!(!ctx.layout.lock_file().exists(), "lock released on failure");
}

/// Test: A second run at the same version skips every module and starts nothing.
#[tokio::test]
async fn second_run_at_same_version_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let runtime = FakeRuntime::healthy("app");

    let first = support::context(dir.path(), "1.0.0");
    Orchestrator::new(&first, &runner, &runtime)
        .deploy()
        .await
        .expect("first deploy");

    let compose = first.layout.compose_file();
    let env_file = first.layout.env_file();
    let compose_before = fs::metadata(&compose).unwrap().modified().unwrap();
    let env_before = fs::read(&env_file).unwrap();
    runner.clear_calls();

    let second = support::context(dir.path(), "1.0.0");
    let report = Orchestrator::new(&second, &runner, &runtime)
        .deploy()
        .await
        .expect("second deploy");

    assert!(
        report
            .outcomes
            .iter()
            .all(|(_, outcome)| *outcome == ModuleOutcome::Skipped)
    );
    assert!(
        !runner.call_lines().iter().any(|l| l.contains(" up -d")),
        "no service should be started again"
    );
    assert_eq!(fs::metadata(&compose).unwrap().modified().unwrap(), compose_before);
    assert_eq!(fs::read(&env_file).unwrap(), env_before);

    // Skipped modules still record success for the new run.
    let records = StateLog::new(second.layout.state_log())
        .records_for_run(&report.run.deployment_id)
        .unwrap();
    assert_eq!(records.len(), 7);
}

/// Test: A new version re-runs modules.
#[tokio::test]
async fn new_version_reruns_modules() {
    let dir = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let runtime = FakeRuntime::healthy("app");

    let first = support::context(dir.path(), "1.0.0");
    Orchestrator::new(&first, &runner, &runtime)
        .deploy()
        .await
        .expect("first deploy");

    let second = support::context(dir.path(), "1.1.0");
    let report = Orchestrator::new(&second, &runner, &runtime)
        .deploy()
        .await
        .expect("second deploy");

    assert!(
        report
            .outcomes
            .iter()
            .all(|(_, outcome)| *outcome == ModuleOutcome::Executed)
    );
    let compose = fs::read_to_string(second.layout.compose_file()).unwrap();
    assert!(compose.contains("registry.local/api:1.1.0"));
}

/// Test: An active lock refuses a second deploy; --force-lock breaks it.
#[tokio::test]
async fn held_lock_blocks_deploy_unless_forced() {
    let dir = TempDir::new().unwrap();
    let ctx = support::context(dir.path(), "1.0.0");
    let runner = FakeRunner::new();
    let runtime = FakeRuntime::healthy("app");

    let held = DeployLock::acquire(
        &ctx.layout.lock_file(),
        &EnvironmentName::production(),
        false,
    )
    .expect("first lock");

    let err = Orchestrator::new(&ctx, &runner, &runtime)
        .deploy()
        .await
        .expect_err("deploy should be refused");
    assert_eq!(err.kind(), DeployErrorKind::LockHeld);
    let holder = err.lock_holder_info().expect("holder info");
    assert_eq!(holder.pid, std::process::id());
    assert!(!ctx.layout.state_log().exists(), "nothing recorded");

    Orchestrator::new(&ctx, &runner, &runtime)
        .force_lock(true)
        .deploy()
        .await
        .expect("forced deploy should succeed");

    // The broken lock's guard finds its file gone.
    drop(held);
}

/// Test: Preflight reports every problem at once and touches nothing.
#[tokio::test]
async fn preflight_failures_are_aggregated() {
    let dir = TempDir::new().unwrap();
    let ctx = support::context(dir.path(), "1.0.0");
    let runner = FakeRunner::new();
    runner.respond("docker --version", CommandOutput::failed(127, "not found"));
    let runtime = FakeRuntime::unreachable();

    let err = Orchestrator::new(&ctx, &runner, &runtime)
        .deploy()
        .await
        .expect_err("preflight should fail");

    let DeployError::Preflight(preflight) = &err else {
        panic!("expected preflight error, got {err}");
    };
    assert_eq!(preflight.problems.len(), 2, "{err}");
    assert!(err.rollback_command().is_none());
    assert_eq!(Error::from(err).exit_code(), 3);

    assert!(!ctx.layout.state_log().exists());
    assert!(!ctx.layout.backups_dir().exists());
    assert!(!ctx.layout.lock_file().exists());
}

/// Test: Cancelling stops before the next module and keeps the backup path.
#[tokio::test]
async fn cancelled_run_stops_before_first_module() {
    let dir = TempDir::new().unwrap();
    let ctx = support::context(dir.path(), "1.0.0");
    let runner = FakeRunner::new();
    let runtime = FakeRuntime::healthy("app");
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = Orchestrator::new(&ctx, &runner, &runtime)
        .with_cancel(cancel)
        .deploy()
        .await
        .expect_err("deploy should be cancelled");

    assert!(matches!(
        err,
        DeployError::Cancelled {
            next: ModuleKind::Init,
            ..
        }
    ));
    assert!(err.rollback_command().is_some());
    assert!(!ctx.layout.compose_file().exists());
    assert_eq!(Error::from(err).exit_code(), 130);
}
