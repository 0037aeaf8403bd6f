// ABOUTME: Integration tests for deploy lock functionality.
// ABOUTME: Tests lock acquisition, stale detection, and force breaking.

use chrono::Utc;
use deployctl::deploy::{DeployLock, LockError, LockInfo};
use deployctl::types::EnvironmentName;
use std::fs;
use tempfile::TempDir;

fn lock_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join(".deploy/deploy.lock")
}

/// Test: Lock acquired prevents second deployment.
#[test]
fn lock_acquired_prevents_second_deployment() {
    let dir = TempDir::new().unwrap();
    let path = lock_path(&dir);
    let env = EnvironmentName::production();

    let lock = DeployLock::acquire(&path, &env, false).expect("first lock should succeed");

    let err = DeployLock::acquire(&path, &env, false).expect_err("second lock should fail");
    let info = err.holder_info().expect("should have lock holder info");
    assert!(!info.holder.is_empty(), "holder should be set");
    assert!(info.pid > 0, "pid should be set");
    assert_eq!(info.environment, "production");

    lock.release().expect("release should succeed");
    assert!(!path.exists());

    let lock2 = DeployLock::acquire(&path, &env, false).expect("lock should succeed after release");
    lock2.release().expect("cleanup release");
}

/// Test: The lock file holds the holder as JSON.
#[test]
fn lock_file_contains_holder_json() {
    let dir = TempDir::new().unwrap();
    let path = lock_path(&dir);
    let staging = EnvironmentName::new("staging").unwrap();

    let _lock = DeployLock::acquire(&path, &staging, false).unwrap();

    let info: LockInfo = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(info.environment, "staging");
    assert_eq!(info.pid, std::process::id());
}

/// Test: Dropping the guard releases the lock.
#[test]
fn drop_releases_lock() {
    let dir = TempDir::new().unwrap();
    let path = lock_path(&dir);
    {
        let _lock = DeployLock::acquire(&path, &EnvironmentName::production(), false).unwrap();
        assert!(path.exists());
    }
    assert!(!path.exists(), "lock file should be removed on drop");
}

/// Test: Stale lock (>1 hour) is broken automatically.
#[test]
fn stale_lock_is_broken() {
    let dir = TempDir::new().unwrap();
    let path = lock_path(&dir);
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let mut stale = LockInfo::new(&EnvironmentName::production());
    stale.pid = 1;
    stale.started_at = Utc::now() - chrono::Duration::hours(2);
    fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

    let lock = DeployLock::acquire(&path, &EnvironmentName::production(), false)
        .expect("stale lock should be broken");
    let info: LockInfo = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(info.pid, std::process::id());
    lock.release().unwrap();
}

/// Test: Force flag breaks an active lock.
#[test]
fn force_breaks_active_lock() {
    let dir = TempDir::new().unwrap();
    let path = lock_path(&dir);
    let env = EnvironmentName::production();

    let _held = DeployLock::acquire(&path, &env, false).unwrap();
    assert!(matches!(
        DeployLock::acquire(&path, &env, false),
        Err(LockError::Held(_))
    ));

    let forced = DeployLock::acquire(&path, &env, true).expect("force should break the lock");
    forced.release().unwrap();
}

/// Test: A corrupt lock file does not wedge deploys forever.
#[test]
fn corrupt_lock_file_is_replaced() {
    let dir = TempDir::new().unwrap();
    let path = lock_path(&dir);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "not json").unwrap();

    let lock = DeployLock::acquire(&path, &EnvironmentName::production(), false)
        .expect("corrupt lock should be broken");
    lock.release().unwrap();
}
