mod common;

use common::{days, mount_json, mount_valid, unreachable_url, TestEnv, NOW, VALIDATE_PATH};
use pretty_assertions::assert_eq;
use serde_json::json;
use werkstatt_license::{ErrorKind, LicenseError, LicenseRecord, LicenseState, Redirect};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn expect_no_calls(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(VALIDATE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

// ── validate_on_login ────────────────────────────────────────────

#[tokio::test]
async fn login_without_record_needs_activation_without_network() {
    let server = MockServer::start().await;
    expect_no_calls(&server).await;
    let env = TestEnv::new(&server.uri());

    let mut machine = env.machine();
    let check = machine.validate_on_login().await;

    assert!(!check.valid);
    assert!(check.needs_activation);
    assert!(!check.needs_reactivation);
    assert_eq!(check.state, LicenseState::NeedsActivation);
    assert_eq!(check.error_kind, Some(ErrorKind::NotActivated));
    assert_eq!(machine.state(), LicenseState::NeedsActivation);
}

#[tokio::test]
async fn login_with_blank_key_needs_activation() {
    let server = MockServer::start().await;
    expect_no_calls(&server).await;
    let env = TestEnv::new(&server.uri());
    env.seed("  ", None, NOW);

    let check = env.machine().validate_on_login().await;
    assert!(check.needs_activation);
    assert_eq!(
        check.error.as_deref(),
        Some(LicenseError::MissingLicenseKey.to_string().as_str())
    );
}

#[tokio::test]
async fn login_online_success_refreshes_record() {
    let server = MockServer::start().await;
    mount_valid(&server, Some(NOW + days(365))).await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", Some(NOW + days(2)), NOW - days(20));

    let mut machine = env.machine();
    let check = machine.validate_on_login().await;

    assert!(check.valid);
    assert!(!check.offline);
    assert_eq!(check.state, LicenseState::ValidOnline);
    let license = check.license.unwrap();
    assert_eq!(license.validated_at, NOW);
    assert_eq!(license.expires_at, Some(NOW + days(365)));

    let stored = env.ctx.store().load(&env.hardware_id(), NOW).unwrap().unwrap();
    assert_eq!(stored.validated_at, NOW);
}

#[tokio::test]
async fn login_always_goes_online_even_when_recent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VALIDATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"valid": true})))
        .expect(1)
        .mount(&server)
        .await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", None, NOW - 1_000);

    assert!(env.machine().validate_on_login().await.valid);
}

#[tokio::test]
async fn login_offline_with_valid_cache() {
    let env = TestEnv::new(&unreachable_url());
    let seeded = env.seed("WS-2024-0001", Some(NOW + days(30)), NOW - days(90));

    let mut machine = env.machine();
    let check = machine.validate_on_login().await;

    assert!(check.valid);
    assert!(check.offline);
    assert_eq!(check.state, LicenseState::ValidOffline);
    assert_eq!(check.license, Some(seeded));
    assert_eq!(machine.state(), LicenseState::ValidOffline);
}

#[tokio::test]
async fn login_offline_with_non_expiring_cache() {
    let env = TestEnv::new(&unreachable_url());
    env.seed("WS-2024-0001", None, NOW - days(3650));

    let check = env.machine().validate_on_login().await;
    assert!(check.valid);
    assert!(check.offline);
}

#[tokio::test]
async fn login_offline_with_expired_cache_needs_reactivation() {
    let env = TestEnv::new(&unreachable_url());
    env.seed("WS-2024-0001", Some(NOW - days(1)), NOW - days(40));

    let check = env.machine().validate_on_login().await;

    assert!(!check.valid);
    assert!(check.needs_reactivation);
    assert!(!check.needs_activation);
    assert_eq!(check.state, LicenseState::NeedsReactivation);
    assert_eq!(
        check.error.as_deref(),
        Some(LicenseError::ExpiredWhileOffline.to_string().as_str())
    );
    // The record is kept so the key can be renewed.
    assert!(env.license_file_exists());
}

#[tokio::test]
async fn login_offline_beyond_configured_grace() {
    let env = TestEnv::with_config(&unreachable_url(), |c| c.offline_grace_days = Some(14));
    env.seed("WS-2024-0001", None, NOW - days(15));

    let check = env.machine().validate_on_login().await;
    assert!(check.needs_reactivation);
    assert!(check.error.unwrap().contains("14 days"));

    env.clock.set(NOW - days(2));
    assert!(env.machine().validate_on_login().await.offline);
}

#[tokio::test]
async fn login_offline_with_future_validation_time_exceeds_grace() {
    let env = TestEnv::with_config(&unreachable_url(), |c| c.offline_grace_days = Some(14));
    env.seed("WS-2024-0001", None, NOW + days(3650));

    let check = env.machine().validate_on_login().await;
    assert!(!check.valid);
    assert!(check.needs_reactivation);
    assert!(check.error.unwrap().contains("14 days"));
}

#[tokio::test]
async fn login_with_odd_metadata_is_still_valid_online() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        200,
        json!({"valid": true, "licenseData": {"max_users": -1, "expires_at": "2030-12-31 23:59:59"}}),
    )
    .await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", None, NOW - days(1));

    let check = env.machine().validate_on_login().await;
    assert!(check.valid);
    assert_eq!(check.state, LicenseState::ValidOnline);
    let license = check.license.unwrap();
    assert_eq!(license.max_users, Some(json!(-1)));
    assert_eq!(license.expires_at, Some(1_924_991_999_000));
}

#[tokio::test]
async fn login_rejected_needs_reactivation_with_message() {
    let server = MockServer::start().await;
    mount_json(&server, 200, json!({"valid": false, "error": "Lizenz abgelaufen"})).await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", Some(NOW + days(30)), NOW - days(1));

    let check = env.machine().validate_on_login().await;
    assert!(!check.valid);
    assert!(check.needs_reactivation);
    assert_eq!(check.error_kind, Some(ErrorKind::AuthorityRejected));
    assert!(check.error.unwrap().contains("Lizenz abgelaufen"));
}

#[tokio::test]
async fn login_with_misdeployed_server_needs_reactivation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VALIDATE_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_raw("<html></html>", "text/html"))
        .mount(&server)
        .await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", None, NOW);

    let check = env.machine().validate_on_login().await;
    assert!(check.needs_reactivation);
    assert_eq!(check.error_kind, Some(ErrorKind::MalformedResponse));
    assert!(check.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn login_with_foreign_record_needs_activation() {
    let server = MockServer::start().await;
    expect_no_calls(&server).await;
    let env = TestEnv::new(&server.uri());
    let foreign = LicenseRecord::new("WS-2024-0001", "0123456789abcdef0123456789abcdef", NOW);
    env.ctx.store().save(&foreign).unwrap();

    let check = env.machine().validate_on_login().await;
    assert!(check.needs_activation);
    assert!(!env.license_file_exists());
}

// ── check_license_status ─────────────────────────────────────────

#[tokio::test]
async fn status_within_interval_trusts_cache() {
    let server = MockServer::start().await;
    expect_no_calls(&server).await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", Some(NOW + days(30)), NOW - days(6));

    let check = env.machine().check_license_status().await;
    assert!(check.valid);
    assert!(check.from_cache);
    assert!(!check.offline);
    assert_eq!(check.state, LicenseState::ValidOnline);
}

#[tokio::test]
async fn status_with_future_validation_time_goes_online() {
    let server = MockServer::start().await;
    mount_valid(&server, None).await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", None, NOW + days(3650));

    let check = env.machine().check_license_status().await;
    assert!(check.valid);
    assert!(!check.from_cache);
    assert_eq!(check.license.unwrap().validated_at, NOW);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn status_past_interval_goes_online() {
    let server = MockServer::start().await;
    mount_valid(&server, None).await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", None, NOW - days(8));

    let check = env.machine().check_license_status().await;
    assert!(check.valid);
    assert!(!check.from_cache);
    assert_eq!(check.license.unwrap().validated_at, NOW);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn status_interval_is_configurable() {
    let server = MockServer::start().await;
    mount_valid(&server, None).await;
    let env = TestEnv::with_config(&server.uri(), |c| c.revalidation_interval_days = 1);
    env.seed("WS-2024-0001", None, NOW - days(2));

    let check = env.machine().check_license_status().await;
    assert!(!check.from_cache);
}

#[tokio::test]
async fn status_with_expired_cache_goes_online_even_within_interval() {
    let server = MockServer::start().await;
    mount_valid(&server, Some(NOW + days(365))).await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", Some(NOW - 1), NOW - days(1));

    let check = env.machine().check_license_status().await;
    assert!(check.valid);
    assert!(!check.from_cache);
}

#[tokio::test]
async fn status_explicit_rejection_revokes() {
    let server = MockServer::start().await;
    mount_json(&server, 403, json!({"valid": false, "error": "license invalid"})).await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", None, NOW - days(8));

    let check = env.machine().check_license_status().await;
    assert!(!check.valid);
    assert!(check.needs_reactivation);
}

#[tokio::test]
async fn status_server_trouble_keeps_license() {
    let server = MockServer::start().await;
    mount_json(&server, 503, json!({"valid": false, "error": "maintenance"})).await;
    let env = TestEnv::new(&server.uri());
    env.seed("WS-2024-0001", None, NOW - days(8));

    let check = env.machine().check_license_status().await;
    assert!(check.valid);
    assert!(check.offline);
}

#[tokio::test]
async fn status_unreachable_keeps_license_until_expiry() {
    let env = TestEnv::new(&unreachable_url());
    env.seed("WS-2024-0001", Some(NOW + days(1)), NOW - days(8));

    let mut machine = env.machine();
    assert!(machine.check_license_status().await.offline);

    env.clock.advance(days(2));
    let check = machine.check_license_status().await;
    assert!(check.needs_reactivation);
    assert_eq!(machine.state(), LicenseState::NeedsReactivation);
}

#[tokio::test]
async fn status_without_record_needs_activation() {
    let server = MockServer::start().await;
    expect_no_calls(&server).await;
    let env = TestEnv::new(&server.uri());
    assert!(env.machine().check_license_status().await.needs_activation);
}

// ── activation ───────────────────────────────────────────────────

#[tokio::test]
async fn activate_stores_license() {
    let server = MockServer::start().await;
    mount_valid(&server, None).await;
    let env = TestEnv::new(&server.uri());

    let mut machine = env.machine();
    let check = machine.activate("  WS-2024-0042 ").await.unwrap();
    assert!(check.valid);
    assert_eq!(machine.state(), LicenseState::ValidOnline);

    let stored = env.ctx.store().load(&env.hardware_id(), NOW).unwrap().unwrap();
    assert_eq!(stored.license_key, "WS-2024-0042");
}

#[tokio::test]
async fn activate_rejects_blank_key() {
    let server = MockServer::start().await;
    expect_no_calls(&server).await;
    let env = TestEnv::new(&server.uri());
    let err = env.machine().activate("   ").await.unwrap_err();
    assert!(matches!(err, LicenseError::MissingLicenseKey));
}

#[tokio::test]
async fn activate_surfaces_rejection() {
    let server = MockServer::start().await;
    mount_json(&server, 200, json!({"valid": false, "error": "Schlüssel unbekannt"})).await;
    let env = TestEnv::new(&server.uri());

    let mut machine = env.machine();
    let err = machine.activate("WS-BOGUS").await.unwrap_err();
    assert!(err.to_string().contains("Schlüssel unbekannt"));
    assert_eq!(machine.state(), LicenseState::NeedsActivation);
    assert!(!env.license_file_exists());
}

#[tokio::test]
async fn deactivate_removes_record() {
    let env = TestEnv::new(&unreachable_url());
    env.seed("WS-2024-0001", None, NOW);
    let mut machine = env.machine();
    assert!(machine.deactivate().unwrap());
    assert!(!machine.deactivate().unwrap());
    assert_eq!(machine.state(), LicenseState::Unlicensed);
}

// ── session admission ────────────────────────────────────────────

#[tokio::test]
async fn login_admission_builds_session_info() {
    let env = TestEnv::new(&unreachable_url());
    env.seed("WS-2024-0001", Some(NOW + days(30)), NOW - days(3));

    let info = env.machine().validate_license_on_login().await.unwrap();
    assert!(info.validated);
    assert!(info.offline);
    assert_eq!(info.expires_at, Some(NOW + days(30)));
    assert_eq!(info.customer_name.as_deref(), Some("Karosserie Huber"));
    assert_eq!(info.last_online_validation, Some(NOW - days(3)));
}

#[tokio::test]
async fn login_refusal_redirects_to_activation() {
    let env = TestEnv::new(&unreachable_url());
    let refusal = env.machine().validate_license_on_login().await.unwrap_err();
    assert!(refusal.needs_activation);
    assert_eq!(refusal.redirect, Redirect::Activation);
    assert_eq!(refusal.redirect.path(), "/license/activate");
}

#[tokio::test]
async fn session_refusal_redirects_to_reactivation() {
    let env = TestEnv::new(&unreachable_url());
    env.seed("WS-2024-0001", Some(NOW - 1), NOW - days(10));

    let refusal = env.machine().validate_license_for_session().await.unwrap_err();
    assert!(refusal.needs_reactivation);
    assert_eq!(refusal.redirect, Redirect::Reactivation);
    assert_eq!(refusal.error_kind, Some(ErrorKind::AuthorityRejected));
}

#[tokio::test]
async fn check_serializes_camel_case() {
    let env = TestEnv::new(&unreachable_url());
    let check = env.machine().validate_on_login().await;
    let value = serde_json::to_value(&check).unwrap();
    assert_eq!(value["needsActivation"], true);
    assert_eq!(value["state"], "NEEDS_ACTIVATION");
    assert_eq!(value["errorKind"], "not_activated");
}
