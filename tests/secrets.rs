// ABOUTME: Integration tests for the file-backed secret store and local TLS issuance.
// ABOUTME: Checks that re-runs reuse material and that force regenerates it.

use deployctl::secrets::{SecretDecl, SecretError, SecretOrigin, SecretStore};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

fn store(dir: &TempDir) -> SecretStore {
    SecretStore::open(dir.path().join("secrets"), dir.path().join("tls"))
}

fn decls() -> Vec<SecretDecl> {
    SecretDecl::defaults().into_iter().collect()
}

mod symmetric {
    use super::*;

    /// Test: A second call loads the values written by the first.
    #[test]
    fn second_call_reuses_values() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store.generate_or_load(&decls(), false).unwrap();
        let second = store.generate_or_load(&decls(), false).unwrap();

        assert_eq!(first.len(), second.len());
        for (name, secret) in &second {
            assert_eq!(secret.origin, SecretOrigin::Loaded, "{name}");
            assert_eq!(secret.value, first[name].value, "{name}");
        }
    }

    /// Test: Force regenerates every value.
    #[test]
    fn force_regenerates_values() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store.generate_or_load(&decls(), false).unwrap();
        let forced = store.generate_or_load(&decls(), true).unwrap();

        for (name, secret) in &forced {
            assert_eq!(secret.origin, SecretOrigin::Generated);
            assert_ne!(secret.value, first[name].value, "{name} should change");
        }
    }

    /// Test: require fails listing every gap, then succeeds once generated.
    #[test]
    fn require_after_generation() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::create_dir_all(store.dir()).unwrap();

        let err = store
            .require(&["postgres_password", "jwt_secret"])
            .unwrap_err();
        let SecretError::Missing { gaps } = err else {
            panic!("expected missing secrets, got {err}");
        };
        assert_eq!(gaps.len(), 2);

        store
            .generate_or_load(
                &[
                    SecretDecl::inferred("postgres_password"),
                    SecretDecl::inferred("jwt_secret"),
                ],
                false,
            )
            .unwrap();
        let secrets = store.require(&["postgres_password", "jwt_secret"]).unwrap();
        assert_eq!(secrets.len(), 2);
    }

    /// Test: Values never reach Debug output.
    #[test]
    fn secrets_are_redacted_in_debug() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let secrets = store
            .generate_or_load(&[SecretDecl::inferred("api_key")], false)
            .unwrap();
        let secret = &secrets["api_key"];
        assert!(!format!("{secret:?}").contains(secret.value.expose()));
    }
}

mod tls {
    use super::*;

    fn sans() -> Vec<String> {
        vec!["app.test".to_string(), "localhost".to_string()]
    }

    /// Test: Issuing writes the CA, the leaf key and the full chain.
    #[test]
    fn issue_writes_material() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let ca = store.issue_ca("app local CA").unwrap();
        assert!(ca.created);
        let leaf = store.issue_leaf(&ca, "app.test", &sans(), false).unwrap();
        assert!(!leaf.reused);

        assert!(leaf.key_path.exists());
        assert!(leaf.cert_path.exists());
        let fullchain = fs::read_to_string(&leaf.fullchain_path).unwrap();
        assert_eq!(fullchain.matches("BEGIN CERTIFICATE").count(), 2);

        let key_mode = fs::metadata(&leaf.key_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(key_mode, 0o600);
        assert!(leaf.days_remaining() > 30);
    }

    /// Test: A second run reuses the CA and the still-valid leaf.
    #[test]
    fn second_run_reuses_material() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let ca = store.issue_ca("app local CA").unwrap();
        let leaf = store.issue_leaf(&ca, "app.test", &sans(), false).unwrap();
        let cert_before = fs::read(&leaf.cert_path).unwrap();

        let ca = store.issue_ca("app local CA").unwrap();
        assert!(!ca.created);
        let leaf = store.issue_leaf(&ca, "app.test", &sans(), false).unwrap();
        assert!(leaf.reused);
        assert_eq!(fs::read(&leaf.cert_path).unwrap(), cert_before);
    }

    /// Test: A new name the old certificate does not cover forces reissue.
    #[test]
    fn new_san_triggers_reissue() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let ca = store.issue_ca("app local CA").unwrap();
        store.issue_leaf(&ca, "app.test", &sans(), false).unwrap();

        let ca = store.issue_ca("app local CA").unwrap();
        let mut wider = sans();
        wider.push("api.app.test".to_string());
        let leaf = store.issue_leaf(&ca, "app.test", &wider, false).unwrap();
        assert!(!leaf.reused);
        assert!(leaf.sans.contains(&"api.app.test".to_string()));
    }

    /// Test: Recreating secrets reissues the leaf but keeps the CA.
    #[test]
    fn forced_leaf_keeps_the_ca() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let ca = store.issue_ca("app local CA").unwrap();
        let first = store.issue_leaf(&ca, "app.test", &sans(), false).unwrap();
        let key_before = fs::read(&first.key_path).unwrap();

        let ca_again = store.issue_ca("app local CA").unwrap();
        let forced = store.issue_leaf(&ca_again, "app.test", &sans(), true).unwrap();

        assert!(!forced.reused);
        assert_eq!(ca_again.cert_pem, ca.cert_pem);
        assert_ne!(fs::read(&forced.key_path).unwrap(), key_before);
    }
}
