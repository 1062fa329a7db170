//! Shared test helpers for license tests.

#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use werkstatt_license::{
    LicenseConfig, LicenseContext, LicenseRecord, LicenseStateMachine, MachineFacts, ManualClock,
    NetworkInterface, DAY_MILLIS,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fixed "now" for all tests (2025-10-09).
pub const NOW: i64 = 1_760_000_000_000;

pub const VALIDATE_PATH: &str = "/api/license/validate";

/// Facts of the workshop office PC used throughout the tests.
pub fn workshop_facts() -> MachineFacts {
    MachineFacts {
        platform: "win32".into(),
        arch: "x64".into(),
        hostname: "BUERO-PC".into(),
        cpu_model: Some("Intel(R) Core(TM) i5-8500 CPU @ 3.00GHz".into()),
        interfaces: vec![
            NetworkInterface::new("Ethernet", vec!["a4:bb:6d:12:34:56".into()]),
            NetworkInterface::new("WLAN", vec!["f8:59:71:aa:bb:cc".into()]),
        ],
    }
}

/// A temp data dir, a manual clock and a context pointing at `server_url`.
pub struct TestEnv {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub ctx: LicenseContext,
}

impl TestEnv {
    pub fn new(server_url: &str) -> Self {
        Self::with_config(server_url, |_| {})
    }

    pub fn with_config(server_url: &str, tweak: impl FnOnce(&mut LicenseConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LicenseConfig {
            server_url: server_url.to_string(),
            request_timeout_secs: 5,
            data_dir: Some(dir.path().to_path_buf()),
            ..LicenseConfig::default()
        };
        tweak(&mut config);

        let clock = Arc::new(ManualClock::new(NOW));
        let ctx = LicenseContext::new(config)
            .with_probe(Arc::new(workshop_facts()))
            .with_clock(clock.clone());
        Self { dir, clock, ctx }
    }

    pub fn machine(&self) -> LicenseStateMachine {
        LicenseStateMachine::new(self.ctx.clone()).unwrap()
    }

    pub fn hardware_id(&self) -> String {
        self.ctx.fingerprint().id().to_string()
    }

    /// Saves a record bound to this machine.
    pub fn seed(&self, key: &str, expires_at: Option<i64>, validated_at: i64) -> LicenseRecord {
        let mut record = LicenseRecord::new(key, self.hardware_id(), validated_at);
        record.expires_at = expires_at;
        record.customer_name = Some("Karosserie Huber".into());
        self.ctx.store().save(&record).unwrap();
        record
    }

    pub fn license_file_exists(&self) -> bool {
        self.ctx.store().exists()
    }
}

/// A URL nobody listens on.
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

pub fn days(n: i64) -> i64 {
    n * DAY_MILLIS
}

/// Mounts a validation endpoint answering `status` with a JSON `body`.
pub async fn mount_json(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path(VALIDATE_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts a validation endpoint confirming the license until `expires_at`.
pub async fn mount_valid(server: &MockServer, expires_at: Option<i64>) {
    mount_json(
        server,
        200,
        serde_json::json!({
            "valid": true,
            "licenseData": {
                "expires_at": expires_at,
                "features": ["invoices", "vehicle_trading"],
                "max_users": 5,
                "max_companies": 1
            },
            "user_info": {
                "customer_name": "Karosserie Huber",
                "customer_email": "info@karosserie-huber.de"
            }
        }),
    )
    .await;
}
