//! What the authentication layer attaches to a session, or the reason it
//! must refuse one.

use crate::error::ErrorKind;
use crate::record::LicenseRecord;
use crate::state::LicenseCheck;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// License facts attached to an active user session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLicenseInfo {
    pub validated: bool,
    /// True if the license server was unreachable and the cached record was used.
    pub offline: bool,
    pub features: Option<Value>,
    pub expires_at: Option<i64>,
    pub customer_name: Option<String>,
    /// Epoch milliseconds of the last successful online validation.
    pub last_online_validation: Option<i64>,
}

impl SessionLicenseInfo {
    fn from_record(record: &LicenseRecord, offline: bool) -> Self {
        Self {
            validated: true,
            offline,
            features: record.features.clone(),
            expires_at: record.expires_at,
            customer_name: record.customer_display_name().map(str::to_owned),
            last_online_validation: Some(record.validated_at),
        }
    }
}

/// Where the UI sends a refused user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Redirect {
    Activation,
    Reactivation,
}

impl Redirect {
    /// Route of the flow.
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::Activation => "/license/activate",
            Self::Reactivation => "/license/reactivate",
        }
    }
}

/// Why a login was denied or a session must end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRefusal {
    pub message: String,
    pub needs_activation: bool,
    pub needs_reactivation: bool,
    pub redirect: Redirect,
    pub error_kind: Option<ErrorKind>,
}

impl LicenseCheck {
    /// Turns a check into a session admission decision.
    pub fn admission(&self) -> Result<SessionLicenseInfo, LicenseRefusal> {
        if self.valid {
            if let Some(record) = &self.license {
                return Ok(SessionLicenseInfo::from_record(record, self.offline));
            }
        }

        let redirect = if self.needs_reactivation {
            Redirect::Reactivation
        } else {
            Redirect::Activation
        };
        let message = self.error.clone().unwrap_or_else(|| match redirect {
            Redirect::Activation => "license activation required".to_string(),
            Redirect::Reactivation => "license reactivation required".to_string(),
        });

        Err(LicenseRefusal {
            message,
            needs_activation: redirect == Redirect::Activation,
            needs_reactivation: redirect == Redirect::Reactivation,
            redirect,
            error_kind: self.error_kind,
        })
    }
}
