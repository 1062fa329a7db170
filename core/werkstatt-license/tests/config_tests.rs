use std::path::PathBuf;
use std::time::Duration;

use werkstatt_license::{LicenseConfig, LicenseError, MacScan, ENV_DATA_DIR, ENV_SERVER_URL};

#[test]
fn defaults_match_shipped_policy() {
    let config = LicenseConfig::default();
    assert_eq!(config.request_timeout(), Duration::from_secs(15));
    assert_eq!(config.revalidation_interval_days, 7);
    assert_eq!(config.offline_grace_days, None);
    assert_eq!(config.offline_grace_millis(), None);
    assert_eq!(config.mac_scan, MacScan::FirstInterface);
    assert!(config.validate().is_ok());
}

#[test]
fn empty_document_uses_defaults() {
    let config = LicenseConfig::from_toml_str("").unwrap();
    assert_eq!(config, LicenseConfig::default());
}

#[test]
fn toml_overrides_fields() {
    let config = LicenseConfig::from_toml_str(
        r#"
        server_url = "https://licenses.example.de/"
        validate_path = "/v2/validate"
        revalidation_interval_days = 3
        offline_grace_days = 30
        mac_scan = "all-interfaces"
        data_dir = "/var/lib/werkstatt"
        "#,
    )
    .unwrap();

    assert_eq!(config.endpoint_url(), "https://licenses.example.de/v2/validate");
    assert_eq!(config.revalidation_interval_millis(), 3 * 24 * 60 * 60 * 1000);
    assert_eq!(config.offline_grace_millis(), Some(30 * 24 * 60 * 60 * 1000));
    assert_eq!(config.mac_scan, MacScan::AllInterfaces);
    assert_eq!(
        config.license_file(),
        PathBuf::from("/var/lib/werkstatt").join("license.json")
    );
}

#[test]
fn invalid_values_are_rejected() {
    for doc in [
        r#"server_url = """#,
        r#"server_url = "ftp://license.example""#,
        r#"validate_path = "api/validate""#,
        "request_timeout_secs = 0",
        r#"license_file_name = " ""#,
        r#"mac_scan = "every-other""#,
        "this is not toml",
    ] {
        let err = LicenseConfig::from_toml_str(doc).unwrap_err();
        assert!(matches!(err, LicenseError::Config(_)), "{doc}: {err}");
    }
}

#[test]
fn missing_file_is_config_error() {
    let err = LicenseConfig::from_file(std::path::Path::new("/nonexistent/werkstatt.toml"))
        .unwrap_err();
    assert!(format!("{err}").contains("failed to read config file"));
}

#[test]
fn from_file_reads_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("license.toml");
    std::fs::write(&path, "request_timeout_secs = 30\n").unwrap();
    let config = LicenseConfig::from_file(&path).unwrap();
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
}

#[test]
fn environment_overrides_file_values() {
    // Only this test touches these variables.
    unsafe {
        std::env::set_var(ENV_SERVER_URL, "http://localhost:4100");
        std::env::set_var(ENV_DATA_DIR, "/tmp/werkstatt-env");
    }
    let config = LicenseConfig::default().apply_env_overrides().unwrap();
    unsafe {
        std::env::remove_var(ENV_SERVER_URL);
        std::env::remove_var(ENV_DATA_DIR);
    }

    assert_eq!(config.endpoint_url(), "http://localhost:4100/api/license/validate");
    assert_eq!(config.data_dir(), PathBuf::from("/tmp/werkstatt-env"));
}
