// ABOUTME: Integration tests for validated identifiers.
// ABOUTME: Property tests for environment names, application versions and deployment ids.

use chrono::{TimeZone, Utc};
use deployctl::types::*;
use proptest::prelude::*;

mod environment_name_tests {
    use super::*;

    #[test]
    fn accepts_common_names() {
        for name in ["production", "staging", "qa-2", "eu1"] {
            assert_eq!(EnvironmentName::new(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn rejects_uppercase_and_edges() {
        assert_eq!(
            EnvironmentName::new("Prod"),
            Err(EnvironmentNameError::NotLowercase)
        );
        assert_eq!(
            EnvironmentName::new("-prod"),
            Err(EnvironmentNameError::StartsWithHyphen)
        );
        assert_eq!(
            EnvironmentName::new("prod-"),
            Err(EnvironmentNameError::EndsWithHyphen)
        );
        assert_eq!(EnvironmentName::new(""), Err(EnvironmentNameError::Empty));
    }

    proptest! {
        #[test]
        fn valid_names_round_trip(name in "[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?") {
            let env = EnvironmentName::new(&name).unwrap();
            prop_assert_eq!(env.as_str(), name.as_str());
            prop_assert_eq!(env.to_string().parse::<EnvironmentName>().unwrap(), env);
        }

        #[test]
        fn names_with_foreign_characters_are_rejected(
            prefix in "[a-z]{1,10}",
            bad in "[_./ A-Z]",
            suffix in "[a-z]{1,10}",
        ) {
            let name = format!("{prefix}{bad}{suffix}");
            prop_assert!(EnvironmentName::new(&name).is_err());
        }

        #[test]
        fn overlong_names_are_rejected(name in "[a-z]{64,100}") {
            prop_assert_eq!(EnvironmentName::new(&name), Err(EnvironmentNameError::TooLong));
        }
    }
}

mod app_version_tests {
    use super::*;

    #[test]
    fn accepts_tags() {
        for version in ["latest", "1.4.2", "v2.0.0-rc.1", "_build_77", "2026.03.01"] {
            assert_eq!(AppVersion::new(version).unwrap().as_str(), version);
        }
    }

    #[test]
    fn rejects_separators_and_edges() {
        assert_eq!(AppVersion::new(""), Err(AppVersionError::Empty));
        assert_eq!(AppVersion::new("-1.0"), Err(AppVersionError::InvalidStart('-')));
        assert_eq!(AppVersion::new(".1"), Err(AppVersionError::InvalidStart('.')));
        assert_eq!(AppVersion::new("1.0 x"), Err(AppVersionError::InvalidChar(' ')));
        assert_eq!(AppVersion::new("1.0\nx"), Err(AppVersionError::InvalidChar('\n')));
        assert_eq!(AppVersion::new("1.0/x"), Err(AppVersionError::InvalidChar('/')));
        assert_eq!(AppVersion::new("1.0:x"), Err(AppVersionError::InvalidChar(':')));
    }

    proptest! {
        #[test]
        fn tag_shaped_versions_are_accepted(version in "[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}") {
            let parsed = AppVersion::new(&version).unwrap();
            prop_assert_eq!(parsed.to_string(), version);
        }

        #[test]
        fn versions_with_whitespace_or_controls_are_rejected(
            prefix in "[a-z0-9]{1,10}",
            bad in "[ \t\r\n=#/:@]",
            suffix in "[a-z0-9]{0,10}",
        ) {
            let version = format!("{prefix}{bad}{suffix}");
            prop_assert!(AppVersion::new(&version).is_err());
        }

        #[test]
        fn overlong_versions_are_rejected(version in "[a-z0-9]{129,160}") {
            prop_assert_eq!(AppVersion::new(&version), Err(AppVersionError::TooLong));
        }
    }
}

mod deployment_id_tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_ids_parse_and_sort_by_time(a in 0i64..2_000_000_000, gap in 1i64..1_000_000) {
            let earlier = DeploymentId::generate(Utc.timestamp_opt(a, 0).unwrap());
            let later = DeploymentId::generate(Utc.timestamp_opt(a + gap, 0).unwrap());
            prop_assert_eq!(DeploymentId::parse(earlier.as_str()).unwrap(), earlier.clone());
            prop_assert!(earlier < later);
        }

        #[test]
        fn arbitrary_strings_rarely_parse(s in "\\PC{0,30}") {
            if let Ok(id) = DeploymentId::parse(&s) {
                prop_assert_eq!(id.as_str().len(), 22);
            }
        }
    }

    #[test]
    fn serde_uses_the_plain_string() {
        let id = DeploymentId::parse("20261019-083005-0a1b2c").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"20261019-083005-0a1b2c\"");
        let back: DeploymentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<DeploymentId>("\"yesterday\"").is_err());
    }
}
