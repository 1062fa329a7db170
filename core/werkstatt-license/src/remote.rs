//! Online validation against the license server.
//!
//! Request: `POST {server_url}{validate_path}` with
//! `{license_key, hardware_id, timestamp, app_version}`.
//!
//! Response: `{valid, error?, licenseData?, user_info?}`. An HTML body means
//! the request hit a web server or proxy instead of the license service and is
//! reported as a deployment problem, not as a verdict on the license.

use crate::context::LicenseContext;
use crate::error::{LicenseError, LicenseResult};
use crate::record::{expiry_from_value, LicenseRecord};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Field of [`LicenseRecord::extra`] holding an expiry the server sent in an
/// unreadable format.
pub const RAW_EXPIRY_KEY: &str = "expires_at_raw";

/// Body of a validation request.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationRequest<'a> {
    pub license_key: &'a str,
    pub hardware_id: &'a str,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub app_version: &'a str,
}

/// The license server's answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorityResponse {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "licenseData", alias = "license_data")]
    pub license_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub user_info: Option<Map<String, Value>>,
}

/// Client for the license server's validation endpoint.
#[derive(Debug, Clone)]
pub struct RemoteValidator {
    ctx: LicenseContext,
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteValidator {
    /// Creates a validator for the endpoint configured in `ctx`.
    pub fn new(ctx: LicenseContext) -> LicenseResult<Self> {
        let config = ctx.config();
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!("werkstatt/{}", config.app_version))
            .build()
            .map_err(|e| LicenseError::Config(format!("failed to build HTTP client: {e}")))?;
        let endpoint = config.endpoint_url();
        Ok(Self {
            ctx,
            client,
            endpoint,
        })
    }

    /// Returns the validation endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the context this validator was built with.
    #[must_use]
    pub fn context(&self) -> &LicenseContext {
        &self.ctx
    }

    /// Validates `license_key` for this machine with the license server.
    ///
    /// On success the merged license data is stamped with the validation
    /// time and fingerprint, saved to the local store and returned.
    ///
    /// # Errors
    ///
    /// [`LicenseError::NetworkUnreachable`] if the server could not be
    /// reached, [`LicenseError::AuthorityRejected`] if it refused the key,
    /// one of the malformed-response errors for HTML or non-JSON answers, and
    /// [`LicenseError::Storage`] if the record could not be saved.
    pub async fn validate_online(&self, license_key: &str) -> LicenseResult<LicenseRecord> {
        let fingerprint = self.ctx.fingerprint();
        let request = ValidationRequest {
            license_key,
            hardware_id: fingerprint.id(),
            timestamp: self.ctx.now_millis(),
            app_version: &self.ctx.config().app_version,
        };

        debug!(endpoint = %self.endpoint, hardware_id = %fingerprint, "validating license online");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&self.endpoint, &e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&self.endpoint, &e))?;

        let answer = interpret_response(&self.endpoint, status, content_type.as_deref(), &body)?;

        let now = self.ctx.now_millis();
        let record = merge_license_data(answer, license_key, fingerprint.id(), now)?;
        self.ctx.store().save(&record)?;

        info!(
            customer = record.customer_display_name().unwrap_or("-"),
            expires_at = %record.expires_at_display(),
            "license validated online"
        );
        Ok(record)
    }
}

fn transport_error(url: &str, e: &reqwest::Error) -> LicenseError {
    if e.is_builder() {
        LicenseError::Config(format!("invalid license request for {url}: {e}"))
    } else if e.is_timeout() {
        LicenseError::NetworkUnreachable(format!("request to {url} timed out"))
    } else if e.is_connect() {
        LicenseError::NetworkUnreachable(format!("cannot connect to {url}: {e}"))
    } else {
        LicenseError::NetworkUnreachable(format!("request to {url} failed: {e}"))
    }
}

/// Classifies a raw answer. Returns the parsed response only if it
/// confirms the license.
pub(crate) fn interpret_response(
    url: &str,
    status: u16,
    content_type: Option<&str>,
    body: &str,
) -> LicenseResult<AuthorityResponse> {
    let is_html_type = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
    if is_html_type {
        return Err(html_error(url, status));
    }

    let answer: AuthorityResponse = match serde_json::from_str(body) {
        Ok(answer) => answer,
        Err(_) if looks_like_html(body) => return Err(html_error(url, status)),
        Err(e) => {
            return Err(LicenseError::InvalidResponse(format!(
                "HTTP {status} from {url} is not valid JSON: {e}"
            )));
        }
    };

    if status == 200 && answer.valid {
        return Ok(answer);
    }

    let message = answer
        .error
        .or(answer.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("license invalid (HTTP {status})"));
    Err(LicenseError::AuthorityRejected { status, message })
}

fn html_error(url: &str, status: u16) -> LicenseError {
    if status == 404 {
        LicenseError::EndpointNotFound { url: url.to_string() }
    } else {
        LicenseError::HtmlResponse {
            url: url.to_string(),
            status,
        }
    }
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(64).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html") || head.contains("<html")
}

/// Flattens `user_info` (top-level or nested in `licenseData`) onto the
/// license data and stamps key, fingerprint and validation time.
fn merge_license_data(
    answer: AuthorityResponse,
    license_key: &str,
    hardware_id: &str,
    now_millis: i64,
) -> LicenseResult<LicenseRecord> {
    let mut merged = answer.license_data.unwrap_or_default();
    if let Some(Value::Object(nested)) = merged.remove("user_info") {
        merged.extend(nested);
    }
    if let Some(user_info) = answer.user_info {
        merged.extend(user_info);
    }

    let has_key = merged
        .get("license_key")
        .and_then(Value::as_str)
        .is_some_and(|k| !k.trim().is_empty());
    if !has_key {
        merged.insert("license_key".into(), Value::from(license_key));
    }
    merged.insert("hardware_id".into(), Value::from(hardware_id));
    merged.insert("validated_at".into(), Value::from(now_millis));

    // A confirmed license is never refused over an expiry we cannot read.
    if let Some(raw) = merged.remove("expires_at") {
        match expiry_from_value(&raw) {
            Ok(expires_at) => {
                merged.insert("expires_at".into(), Value::from(expires_at));
            }
            Err(reason) => {
                warn!(%reason, "ignoring unreadable expiry from license server");
                merged.insert(RAW_EXPIRY_KEY.into(), raw);
            }
        }
    }

    serde_json::from_value(Value::Object(merged))
        .map_err(|e| LicenseError::InvalidResponse(format!("unusable license data: {e}")))
}
