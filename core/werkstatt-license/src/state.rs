//! License decisions for login and running sessions.
//!
//! ```text
//! UNLICENSED ──(record found)──► PENDING_ONLINE ──► VALID_ONLINE
//!      │                               │
//!      ▼                               ├─ unreachable ──► VALID_OFFLINE | NEEDS_REACTIVATION
//! NEEDS_ACTIVATION                     └─ rejected ─────► NEEDS_REACTIVATION
//! ```
//!
//! Every check starts over from the local record; nothing is retried
//! internally. The caller decides how often to check.

use crate::context::LicenseContext;
use crate::error::{ErrorKind, LicenseError, LicenseResult};
use crate::record::LicenseRecord;
use crate::remote::RemoteValidator;
use crate::session::{LicenseRefusal, SessionLicenseInfo};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Where the license of this machine stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseState {
    /// No local record.
    Unlicensed,
    /// Local record present, online check in flight.
    PendingOnline,
    /// Confirmed by the license server (or recently enough to trust the cache).
    ValidOnline,
    /// Server unreachable; the cached record is used.
    ValidOffline,
    /// The license was rejected or expired and must be reactivated.
    NeedsReactivation,
    /// No usable license; a key must be entered.
    NeedsActivation,
}

impl LicenseState {
    /// Returns true for the two valid states.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::ValidOnline | Self::ValidOffline)
    }
}

/// Outcome of a license check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseCheck {
    pub state: LicenseState,
    pub valid: bool,
    pub offline: bool,
    /// The record was trusted without contacting the server.
    pub from_cache: bool,
    pub needs_activation: bool,
    pub needs_reactivation: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub license: Option<LicenseRecord>,
}

impl LicenseCheck {
    fn admitted(state: LicenseState, record: LicenseRecord) -> Self {
        Self {
            state,
            valid: true,
            offline: state == LicenseState::ValidOffline,
            from_cache: false,
            needs_activation: false,
            needs_reactivation: false,
            error: None,
            error_kind: None,
            license: Some(record),
        }
    }

    fn online(record: LicenseRecord) -> Self {
        Self::admitted(LicenseState::ValidOnline, record)
    }

    fn offline(record: LicenseRecord) -> Self {
        Self::admitted(LicenseState::ValidOffline, record)
    }

    fn cached(record: LicenseRecord) -> Self {
        Self {
            from_cache: true,
            ..Self::admitted(LicenseState::ValidOnline, record)
        }
    }

    fn refused(state: LicenseState, err: &LicenseError, record: Option<LicenseRecord>) -> Self {
        Self {
            state,
            valid: false,
            offline: false,
            from_cache: false,
            needs_activation: state == LicenseState::NeedsActivation,
            needs_reactivation: state == LicenseState::NeedsReactivation,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            license: record,
        }
    }

    fn needs_activation(err: &LicenseError) -> Self {
        Self::refused(LicenseState::NeedsActivation, err, None)
    }

    fn needs_reactivation(err: &LicenseError, record: LicenseRecord) -> Self {
        Self::refused(LicenseState::NeedsReactivation, err, Some(record))
    }
}

/// Runs license checks for one caller.
///
/// Instances are cheap; build one per request from a shared
/// [`LicenseContext`] rather than keeping a global.
#[derive(Debug)]
pub struct LicenseStateMachine {
    ctx: LicenseContext,
    validator: RemoteValidator,
    state: LicenseState,
}

impl LicenseStateMachine {
    /// Creates a state machine with its own HTTP client.
    pub fn new(ctx: LicenseContext) -> LicenseResult<Self> {
        let validator = RemoteValidator::new(ctx.clone())?;
        Ok(Self::with_validator(validator))
    }

    /// Creates a state machine reusing an existing validator.
    #[must_use]
    pub fn with_validator(validator: RemoteValidator) -> Self {
        Self {
            ctx: validator.context().clone(),
            validator,
            state: LicenseState::Unlicensed,
        }
    }

    /// State reached by the last check.
    #[must_use]
    pub fn state(&self) -> LicenseState {
        self.state
    }

    /// The context this machine runs in.
    #[must_use]
    pub fn context(&self) -> &LicenseContext {
        &self.ctx
    }

    /// Full check performed on every login.
    ///
    /// Always contacts the license server when a record exists. Never
    /// returns an error: failures become a refusing [`LicenseCheck`].
    pub async fn validate_on_login(&mut self) -> LicenseCheck {
        let check = match self.try_validate_on_login().await {
            Ok(check) => check,
            Err(e) => {
                warn!(error = %e, "license check failed");
                LicenseCheck::needs_activation(&e)
            }
        };
        self.finish(check)
    }

    /// Periodic in-session check.
    ///
    /// Trusts a record validated within the revalidation interval. Past the
    /// interval one online check is made, and only an explicit rejection by
    /// the server revokes the license.
    pub async fn check_license_status(&mut self) -> LicenseCheck {
        let check = match self.try_check_license_status().await {
            Ok(check) => check,
            Err(e) => {
                warn!(error = %e, "periodic license check failed");
                LicenseCheck::needs_activation(&e)
            }
        };
        self.finish(check)
    }

    /// Login check mapped to a session admission decision.
    pub async fn validate_license_on_login(&mut self) -> Result<SessionLicenseInfo, LicenseRefusal> {
        self.validate_on_login().await.admission()
    }

    /// Periodic check mapped to a session admission decision.
    pub async fn validate_license_for_session(
        &mut self,
    ) -> Result<SessionLicenseInfo, LicenseRefusal> {
        self.check_license_status().await.admission()
    }

    /// Activates `license_key` on this machine.
    ///
    /// # Errors
    ///
    /// [`LicenseError::MissingLicenseKey`] for a blank key, otherwise any
    /// error of [`RemoteValidator::validate_online`].
    pub async fn activate(&mut self, license_key: &str) -> LicenseResult<LicenseCheck> {
        let license_key = license_key.trim();
        if license_key.is_empty() {
            return Err(LicenseError::MissingLicenseKey);
        }

        self.transition(LicenseState::PendingOnline);
        match self.validator.validate_online(license_key).await {
            Ok(record) => {
                info!("license activated");
                Ok(self.finish(LicenseCheck::online(record)))
            }
            Err(e) => {
                self.transition(LicenseState::NeedsActivation);
                Err(e)
            }
        }
    }

    /// Removes the local license record. Returns false if there was none.
    pub fn deactivate(&mut self) -> LicenseResult<bool> {
        let removed = self.ctx.store().clear()?;
        if removed {
            info!("local license removed");
        }
        self.transition(LicenseState::Unlicensed);
        Ok(removed)
    }

    async fn try_validate_on_login(&mut self) -> LicenseResult<LicenseCheck> {
        let Some(record) = self.local_record()? else {
            return Ok(LicenseCheck::needs_activation(&LicenseError::NotActivated));
        };
        if !record.has_license_key() {
            return Ok(LicenseCheck::needs_activation(&LicenseError::MissingLicenseKey));
        }

        self.transition(LicenseState::PendingOnline);
        match self.validator.validate_online(&record.license_key).await {
            Ok(fresh) => Ok(LicenseCheck::online(fresh)),
            Err(e) if e.is_network_unreachable() => Ok(self.offline_fallback(record, &e)),
            Err(e) if e.is_online_failure() => {
                warn!(error = %e, "license server refused the license");
                Ok(LicenseCheck::needs_reactivation(&e, record))
            }
            Err(e) => Err(e),
        }
    }

    async fn try_check_license_status(&mut self) -> LicenseResult<LicenseCheck> {
        let Some(record) = self.local_record()? else {
            return Ok(LicenseCheck::needs_activation(&LicenseError::NotActivated));
        };
        if !record.has_license_key() {
            return Ok(LicenseCheck::needs_activation(&LicenseError::MissingLicenseKey));
        }

        let now = self.ctx.now_millis();
        let age = now.saturating_sub(record.validated_at);
        let interval = self.ctx.config().revalidation_interval_millis();
        // A validation time in the future (clock rollback, edited file) is stale.
        if (0..interval).contains(&age) && !record.is_expired_at(now) {
            debug!(age_ms = age, "license validated recently, trusting local record");
            return Ok(LicenseCheck::cached(record));
        }

        self.transition(LicenseState::PendingOnline);
        match self.validator.validate_online(&record.license_key).await {
            Ok(fresh) => Ok(LicenseCheck::online(fresh)),
            Err(e) if e.is_explicit_invalidity() => {
                warn!(error = %e, "license server declared the license invalid");
                Ok(LicenseCheck::needs_reactivation(&e, record))
            }
            Err(e) if e.is_online_failure() => Ok(self.offline_fallback(record, &e)),
            Err(e) => Err(e),
        }
    }

    fn local_record(&mut self) -> LicenseResult<Option<LicenseRecord>> {
        let fingerprint = self.ctx.fingerprint();
        let record = self.ctx.store().load_for_revalidation(fingerprint.id())?;
        if record.is_none() {
            self.transition(LicenseState::Unlicensed);
        }
        Ok(record)
    }

    fn offline_fallback(&self, record: LicenseRecord, cause: &LicenseError) -> LicenseCheck {
        let now = self.ctx.now_millis();
        if record.is_expired_at(now) {
            return LicenseCheck::needs_reactivation(&LicenseError::ExpiredWhileOffline, record);
        }
        if let (Some(grace), Some(days)) = (
            self.ctx.config().offline_grace_millis(),
            self.ctx.config().offline_grace_days,
        ) {
            let age = now.saturating_sub(record.validated_at);
            if !(0..=grace).contains(&age) {
                return LicenseCheck::needs_reactivation(
                    &LicenseError::OfflineGraceExceeded { days },
                    record,
                );
            }
        }

        warn!(cause = %cause, "license server unavailable, using cached license");
        LicenseCheck::offline(record)
    }

    fn finish(&mut self, check: LicenseCheck) -> LicenseCheck {
        self.transition(check.state);
        check
    }

    fn transition(&mut self, next: LicenseState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "license state transition");
            self.state = next;
        }
    }
}
