//! Error types for the licensing module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Licensing-specific errors.
///
/// Each variant is created where the failure happens, so callers branch on
/// [`LicenseError::kind`] instead of inspecting message text.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// No license record exists on this machine.
    #[error("license not activated")]
    NotActivated,

    /// A license record exists but carries no license key.
    #[error("stored license has no license key")]
    MissingLicenseKey,

    /// The stored record was bound to a different machine.
    #[error("license is bound to another machine (stored {stored}, current {current})")]
    HardwareMismatch {
        /// Fingerprint found in the record.
        stored: String,
        /// Fingerprint of this machine.
        current: String,
    },

    /// License has expired.
    #[error("license expired on {0}")]
    Expired(String),

    /// The local license file could not be parsed.
    #[error("license file is corrupt: {0}")]
    CorruptRecord(String),

    /// The license expired and the authority could not be reached to renew it.
    #[error("license expired and license server unreachable")]
    ExpiredWhileOffline,

    /// The cached license was last confirmed online too long ago.
    #[error("offline grace period of {days} days exceeded")]
    OfflineGraceExceeded {
        /// Configured grace period.
        days: u64,
    },

    /// DNS failure, refused connection or timeout.
    #[error("license server unreachable: {0}")]
    NetworkUnreachable(String),

    /// The authority answered and refused the license.
    #[error("license rejected by server: {message}")]
    AuthorityRejected {
        /// HTTP status of the answer.
        status: u16,
        /// Message supplied by the authority.
        message: String,
    },

    /// The endpoint answered 404 with an HTML page.
    #[error("license endpoint not found: {url} returned an HTML 404 page, check the server URL")]
    EndpointNotFound {
        /// The endpoint that was called.
        url: String,
    },

    /// The endpoint answered with an HTML error page.
    #[error("license server error: {url} returned an HTML page (HTTP {status}), check the server deployment")]
    HtmlResponse {
        /// The endpoint that was called.
        url: String,
        /// HTTP status of the answer.
        status: u16,
    },

    /// The authority's answer was not the expected JSON document.
    #[error("invalid response from license server: {0}")]
    InvalidResponse(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of a [`LicenseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The local record is missing its key, corrupt, foreign, expired or unwritable.
    LocalStore,
    /// Nothing has been activated yet.
    NotActivated,
    /// The authority could not be reached.
    NetworkUnreachable,
    /// The authority refused the license, or the cached license may no longer be used.
    AuthorityRejected,
    /// The authority answered with something other than the expected JSON.
    MalformedResponse,
    /// The configuration is unusable.
    Configuration,
}

impl LicenseError {
    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotActivated => ErrorKind::NotActivated,
            Self::MissingLicenseKey
            | Self::HardwareMismatch { .. }
            | Self::Expired(_)
            | Self::CorruptRecord(_)
            | Self::Storage(_)
            | Self::Serialization(_) => ErrorKind::LocalStore,
            Self::NetworkUnreachable(_) => ErrorKind::NetworkUnreachable,
            Self::AuthorityRejected { .. }
            | Self::ExpiredWhileOffline
            | Self::OfflineGraceExceeded { .. } => ErrorKind::AuthorityRejected,
            Self::EndpointNotFound { .. } | Self::HtmlResponse { .. } | Self::InvalidResponse(_) => {
                ErrorKind::MalformedResponse
            }
            Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Returns true if the authority could not be reached at all.
    #[must_use]
    pub fn is_network_unreachable(&self) -> bool {
        matches!(self, Self::NetworkUnreachable(_))
    }

    /// Returns true if the authority explicitly declared the license invalid.
    ///
    /// 5xx answers carrying JSON are server trouble, not a verdict.
    #[must_use]
    pub fn is_explicit_invalidity(&self) -> bool {
        match self {
            Self::AuthorityRejected { status, .. } => *status < 500,
            _ => false,
        }
    }

    /// Returns true if the error originates from the online check rather than local state.
    #[must_use]
    pub fn is_online_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkUnreachable | ErrorKind::AuthorityRejected | ErrorKind::MalformedResponse
        )
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
