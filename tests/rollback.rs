// ABOUTME: Integration tests for snapshots and operator-invoked rollback.
// ABOUTME: Deploys twice against fakes, then restores the earlier compose and env files.

mod support;

use deployctl::backup::{BackupError, BackupSnapshot, RollbackError, rollback};
use deployctl::deploy::{DeployReport, Orchestrator};
use deployctl::exec::CommandOutput;
use deployctl::modules::{IdempotencyMarker, ModuleKind, ModuleOutcome};
use deployctl::types::DeploymentId;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use support::{FakeRunner, FakeRuntime};
use tempfile::TempDir;

async fn deploy(root: &Path, version: &str, runner: &FakeRunner, runtime: &FakeRuntime) -> DeployReport {
    let ctx = support::context(root, version);
    Orchestrator::new(&ctx, runner, runtime)
        .deploy()
        .await
        .expect("deploy should succeed")
}

/// Test: Rolling back the latest run restores the files it replaced.
#[tokio::test]
async fn rollback_restores_previous_compose_and_env() {
    support::init_tracing();
    let dir = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let runtime = FakeRuntime::healthy("app");

    deploy(dir.path(), "1.0.0", &runner, &runtime).await;
    let ctx = support::context(dir.path(), "1.0.0");
    let compose_v1 = fs::read_to_string(ctx.layout.compose_file()).unwrap();
    let env_v1 = fs::read(ctx.layout.env_file()).unwrap();

    let second = deploy(dir.path(), "2.0.0", &runner, &runtime).await;
    let compose_v2 = fs::read_to_string(ctx.layout.compose_file()).unwrap();
    assert_ne!(compose_v1, compose_v2);

    let snapshot = BackupSnapshot::load(&second.snapshot.dir).unwrap();
    assert_eq!(snapshot.metadata.files, vec!["docker-compose.yml", ".env"]);
    assert_eq!(snapshot.metadata.version, "2.0.0");
    runner.clear_calls();

    let outcome = rollback(&ctx, &runner, &second.snapshot.dir, false)
        .await
        .expect("rollback should succeed");

    assert_eq!(outcome.deployment_id, second.run.deployment_id);
    assert_eq!(outcome.restored.len(), 2);
    assert_eq!(fs::read_to_string(ctx.layout.compose_file()).unwrap(), compose_v1);
    assert_eq!(fs::read(ctx.layout.env_file()).unwrap(), env_v1);
    let mode = fs::metadata(ctx.layout.env_file()).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);

    let lines = runner.call_lines();
    assert!(lines.iter().any(|l| l.ends_with(" down")), "{lines:?}");
    assert!(!lines.iter().any(|l| l.contains("--volumes")));

    // The dump is surfaced, never applied.
    let dump = outcome.database_dump.expect("dump path");
    assert!(dump.exists());
    let command = outcome.restore_command.expect("restore command");
    assert!(command.starts_with("gunzip -c "));
    assert!(command.contains("psql -U app -d app"));
    assert!(!runner.call_lines().iter().any(|l| l.contains("psql")));

    let log = deployctl::state::StateLog::new(ctx.layout.state_log());
    let tail = log.tail(1).unwrap();
    assert!(tail[0].starts_with(&format!("# rollback {}", second.run.deployment_id)));
}

/// Test: Older snapshots are refused unless forced.
#[tokio::test]
async fn rollback_to_older_run_requires_force() {
    let dir = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let runtime = FakeRuntime::healthy("app");

    let first = deploy(dir.path(), "1.0.0", &runner, &runtime).await;
    let second = deploy(dir.path(), "2.0.0", &runner, &runtime).await;
    let ctx = support::context(dir.path(), "2.0.0");

    let err = rollback(&ctx, &runner, &first.snapshot.dir, false)
        .await
        .expect_err("older snapshot should be refused");
    match err {
        RollbackError::NotLatestRun {
            deployment_id,
            latest,
        } => {
            assert_eq!(deployment_id, first.run.deployment_id);
            assert_eq!(latest, second.run.deployment_id);
        }
        other => panic!("unexpected error: {other}"),
    }

    rollback(&ctx, &runner, &first.snapshot.dir, true)
        .await
        .expect("forced rollback should succeed");
}

/// Test: A snapshot whose run never appears in the state log is refused.
#[tokio::test]
async fn rollback_of_unknown_deployment_is_refused() {
    let dir = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let runtime = FakeRuntime::healthy("app");
    deploy(dir.path(), "1.0.0", &runner, &runtime).await;
    let ctx = support::context(dir.path(), "1.0.0");

    let foreign = dir.path().join("backups/foreign");
    fs::create_dir_all(&foreign).unwrap();
    fs::write(
        foreign.join("metadata.json"),
        r#"{"deployment_id":"20200101-000000-abcdef","version":"0.1.0","environment":"production","created_at":"2020-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    let err = rollback(&ctx, &runner, &foreign, false)
        .await
        .expect_err("unknown deployment should be refused");
    assert!(matches!(
        err,
        RollbackError::UnknownDeployment { ref deployment_id }
            if *deployment_id == DeploymentId::parse("20200101-000000-abcdef").unwrap()
    ));
}

/// Test: A directory without metadata is not a backup.
#[tokio::test]
async fn rollback_without_metadata_fails_before_stopping_anything() {
    let dir = TempDir::new().unwrap();
    let runner = FakeRunner::new();
    let ctx = support::context(dir.path(), "1.0.0");

    let err = rollback(&ctx, &runner, dir.path(), false)
        .await
        .expect_err("missing metadata");
    assert!(matches!(
        err,
        RollbackError::Backup(BackupError::MetadataMissing { .. })
    ));
    assert!(runner.calls().is_empty());
}

/// Test: After rolling back a failed run, redeploying that version rebuilds every artifact.
#[tokio::test]
async fn redeploy_after_rollback_renders_the_new_version() {
    support::init_tracing();
    let dir = TempDir::new().unwrap();
    let runtime = FakeRuntime::healthy("app");

    deploy(dir.path(), "1.0.0", &FakeRunner::new(), &runtime).await;

    let failing = FakeRunner::new();
    failing.respond(
        "--remove-orphans api web",
        CommandOutput::failed(1, "manifest unknown"),
    );
    let ctx = support::context(dir.path(), "2.0.0");
    let err = Orchestrator::new(&ctx, &failing, &runtime)
        .deploy()
        .await
        .expect_err("services should fail");
    let backup_dir = err.backup_dir().expect("backup dir").to_path_buf();

    let runner = FakeRunner::new();
    rollback(&ctx, &runner, &backup_dir, false)
        .await
        .expect("rollback should succeed");
    let compose = fs::read_to_string(ctx.layout.compose_file()).unwrap();
    assert!(compose.contains("registry.local/api:1.0.0"));
    for module in ModuleKind::ALL {
        let marker = IdempotencyMarker::new(&ctx.layout, module);
        assert_eq!(marker.read().unwrap(), None, "{module} marker should be cleared");
    }

    let report = deploy(dir.path(), "2.0.0", &runner, &runtime).await;

    assert!(
        report
            .outcomes
            .iter()
            .all(|(_, outcome)| *outcome == ModuleOutcome::Executed),
        "{:?}",
        report.outcomes
    );
    let compose = fs::read_to_string(ctx.layout.compose_file()).unwrap();
    assert!(compose.contains("registry.local/api:2.0.0"), "stale compose file");
    assert!(!compose.contains("registry.local/api:1.0.0"));
}
