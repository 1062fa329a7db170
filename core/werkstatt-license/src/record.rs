//! The locally persisted license record.

use crate::clock::format_millis;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The last license state confirmed by the license server.
///
/// Fields the server sends that are not modelled here are kept in
/// [`extra`](Self::extra) and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Key issued by the license server.
    #[serde(default)]
    pub license_key: String,
    /// Fingerprint of the machine the record was saved on.
    #[serde(default)]
    pub hardware_id: String,
    /// Expiry in epoch milliseconds; `None` never expires.
    #[serde(default, deserialize_with = "deserialize_expiry")]
    pub expires_at: Option<i64>,
    /// Last successful online validation in epoch milliseconds.
    #[serde(default)]
    pub validated_at: i64,
    // Server metadata, kept as sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_users: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_companies: Option<Value>,
    /// Everything else the server sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LicenseRecord {
    /// Creates a minimal record for `license_key` bound to `hardware_id`.
    pub fn new(license_key: impl Into<String>, hardware_id: impl Into<String>, validated_at: i64) -> Self {
        Self {
            license_key: license_key.into(),
            hardware_id: hardware_id.into(),
            expires_at: None,
            validated_at,
            features: None,
            customer_name: None,
            customer_email: None,
            max_users: None,
            max_companies: None,
            extra: Map::new(),
        }
    }

    /// Customer name, if the server sent it as text.
    #[must_use]
    pub fn customer_display_name(&self) -> Option<&str> {
        self.customer_name.as_ref().and_then(Value::as_str)
    }

    /// Returns true if the record carries a usable license key.
    #[must_use]
    pub fn has_license_key(&self) -> bool {
        !self.license_key.trim().is_empty()
    }

    /// Returns true if the license has expired at `now_millis`.
    #[must_use]
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now_millis)
    }

    /// Whole days until expiry, `None` for non-expiring licenses.
    #[must_use]
    pub fn days_remaining(&self, now_millis: i64) -> Option<i64> {
        self.expires_at
            .map(|exp| exp.saturating_sub(now_millis).max(0) / crate::clock::DAY_MILLIS)
    }

    /// Expiry formatted for messages.
    #[must_use]
    pub fn expires_at_display(&self) -> String {
        self.expires_at
            .map(format_millis)
            .unwrap_or_else(|| "never".to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpiry {
    Millis(i64),
    Float(f64),
    Text(String),
}

impl RawExpiry {
    fn into_millis(self) -> Result<Option<i64>, String> {
        match self {
            Self::Millis(ms) => Ok(Some(ms)),
            Self::Float(ms) => Ok(Some(ms as i64)),
            Self::Text(text) => parse_expiry(&text),
        }
    }
}

/// Accepts epoch milliseconds, numeric strings, RFC 3339 timestamps,
/// `YYYY-MM-DD HH:MM:SS` (UTC) and `YYYY-MM-DD` dates (valid through the end
/// of that UTC day).
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawExpiry>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => raw.into_millis().map_err(serde::de::Error::custom),
    }
}

/// Reads an expiry from an arbitrary JSON value.
pub(crate) fn expiry_from_value(value: &Value) -> Result<Option<i64>, String> {
    match value {
        Value::Null => Ok(None),
        other => RawExpiry::deserialize(other)
            .map_err(|_| format!("unrecognised expires_at value {other}"))?
            .into_millis(),
    }
}

/// Parses a textual expiry into epoch milliseconds.
pub(crate) fn parse_expiry(text: &str) -> Result<Option<i64>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    if let Ok(ms) = text.parse::<i64>() {
        return Ok(Some(ms));
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Ok(Some(dt.timestamp_millis()));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(dt.and_utc().timestamp_millis()));
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let end_of_day = date
            .and_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| format!("invalid expiry date '{text}'"))?;
        return Ok(Some(end_of_day.and_utc().timestamp_millis()));
    }
    Err(format!("unrecognised expires_at value '{text}'"))
}
