use std::time::Duration;

use assert_matches::assert_matches;

use terra_ops::config::ConfigLoader;
use terra_ops::domain::TdrEnvironment;
use terra_ops::error::OpsError;

fn write_config(content: &str) -> (tempfile::TempDir, String) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("terra-ops.json");
    std::fs::write(&path, content).unwrap();
    let path = path.to_string_lossy().into_owned();
    (temp, path)
}

#[test]
fn explicit_config_file_overrides_defaults() {
    let (_temp, path) = write_config(
        r#"{
            "tdr": {"dev_url": "https://tdr.example.org/"},
            "poll_interval_secs": 2,
            "workers": 4,
            "billing_profile": "AB12AB12-0000-4000-8000-000000000001"
        }"#,
    );
    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(resolved.tdr_url(TdrEnvironment::Dev), "https://tdr.example.org");
    assert_eq!(resolved.tdr_url(TdrEnvironment::Prod), "https://data.terra.bio");
    assert_eq!(resolved.poll_interval, Duration::from_secs(2));
    assert_eq!(resolved.workers, 4);
    assert_eq!(
        resolved.billing_profile.map(|profile| profile.to_string()).as_deref(),
        Some("ab12ab12-0000-4000-8000-000000000001")
    );
}

#[test]
fn missing_explicit_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(Some(&path.to_string_lossy())).unwrap_err();
    assert_matches!(err, OpsError::ConfigRead(_));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let (_temp, path) = write_config("{ not json");
    let err = ConfigLoader::resolve(Some(&path)).unwrap_err();
    assert_matches!(err, OpsError::ConfigParse(_));
}

#[test]
fn bad_billing_profile_is_rejected() {
    let (_temp, path) = write_config(r#"{"billing_profile": "not-a-uuid"}"#);
    let err = ConfigLoader::resolve(Some(&path)).unwrap_err();
    assert_matches!(err, OpsError::InvalidUuid(_));
}
