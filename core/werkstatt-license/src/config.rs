//! License client configuration.
//!
//! Loaded from a TOML file, every field has a default. A handful of
//! environment variables override the file so support can point a single
//! installation at another license server without editing it.

use crate::device::MacScan;
use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides [`LicenseConfig::server_url`].
pub const ENV_SERVER_URL: &str = "WERKSTATT_LICENSE_SERVER";
/// Overrides [`LicenseConfig::validate_path`].
pub const ENV_VALIDATE_PATH: &str = "WERKSTATT_LICENSE_PATH";
/// Overrides [`LicenseConfig::data_dir`].
pub const ENV_DATA_DIR: &str = "WERKSTATT_DATA_DIR";

/// Settings for the license client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Base URL of the license authority.
    pub server_url: String,
    /// Path of the validation endpoint.
    pub validate_path: String,
    /// Version tag sent with every validation request.
    pub app_version: String,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Periodic checks trust a record validated within this many days.
    pub revalidation_interval_days: u64,
    /// Maximum days a cached license may be used offline; `None` is unbounded.
    pub offline_grace_days: Option<u64>,
    /// How the fingerprint picks its MAC address.
    pub mac_scan: MacScan,
    /// Application data directory. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// License file name inside the data directory.
    pub license_file_name: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            server_url: "https://license.werkstatt-manager.de".to_string(),
            validate_path: "/api/license/validate".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            request_timeout_secs: 15,
            revalidation_interval_days: 7,
            offline_grace_days: None,
            mac_scan: MacScan::FirstInterface,
            data_dir: None,
            license_file_name: "license.json".to_string(),
        }
    }
}

impl LicenseConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> LicenseResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LicenseError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: &Path) -> LicenseResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LicenseError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Applies `WERKSTATT_*` environment overrides and re-validates.
    pub fn apply_env_overrides(mut self) -> LicenseResult<Self> {
        if let Some(url) = non_empty_var(ENV_SERVER_URL) {
            self.server_url = url;
        }
        if let Some(path) = non_empty_var(ENV_VALIDATE_PATH) {
            self.validate_path = path;
        }
        if let Some(dir) = non_empty_var(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks that the values are usable.
    pub fn validate(&self) -> LicenseResult<()> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(LicenseError::Config("server_url must not be empty".into()));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(LicenseError::Config(format!(
                "server_url must be an http(s) URL, got '{url}'"
            )));
        }
        if !self.validate_path.starts_with('/') {
            return Err(LicenseError::Config(format!(
                "validate_path must start with '/', got '{}'",
                self.validate_path
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(LicenseError::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.license_file_name.trim().is_empty() {
            return Err(LicenseError::Config("license_file_name must not be empty".into()));
        }
        Ok(())
    }

    /// Full URL of the validation endpoint.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}{}",
            self.server_url.trim().trim_end_matches('/'),
            self.validate_path
        )
    }

    /// Request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Revalidation interval in milliseconds.
    #[must_use]
    pub fn revalidation_interval_millis(&self) -> i64 {
        days_to_millis(self.revalidation_interval_days)
    }

    /// Offline grace period in milliseconds, if bounded.
    #[must_use]
    pub fn offline_grace_millis(&self) -> Option<i64> {
        self.offline_grace_days.map(days_to_millis)
    }

    /// Directory holding the license file.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("werkstatt")
        })
    }

    /// Path of the local license file.
    #[must_use]
    pub fn license_file(&self) -> PathBuf {
        self.data_dir().join(&self.license_file_name)
    }
}

fn days_to_millis(days: u64) -> i64 {
    i64::try_from(days)
        .unwrap_or(i64::MAX)
        .saturating_mul(crate::clock::DAY_MILLIS)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
