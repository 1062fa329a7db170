//! Local persistence of the last validated license.
//!
//! The record is written as plain, pretty-printed JSON so support staff can
//! inspect it on a customer's machine. Saves replace the whole file; the
//! store never patches a record in place.
//!
//! Loading fails closed: a record that cannot be parsed, belongs to another
//! machine or has expired is deleted before the caller sees the result.

use crate::error::{LicenseError, LicenseResult};
use crate::record::LicenseRecord;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-backed store for the [`LicenseRecord`] of this machine.
#[derive(Debug, Clone)]
pub struct LocalLicenseStore {
    path: PathBuf,
}

impl LocalLicenseStore {
    /// Creates a store for the license file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the license file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if a license file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Overwrites the license file with `record`, creating parent directories.
    pub fn save(&self, record: &LicenseRecord) -> LicenseResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LicenseError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_string_pretty(record)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json)
            .map_err(|e| LicenseError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            LicenseError::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "license record saved");
        Ok(())
    }

    /// Loads the record, enforcing hardware binding and expiry.
    ///
    /// Returns `Ok(None)` if no license file exists. A corrupt, foreign or
    /// expired record is deleted and reported as
    /// [`LicenseError::CorruptRecord`], [`LicenseError::HardwareMismatch`] or
    /// [`LicenseError::Expired`].
    pub fn load_checked(&self, hardware_id: &str, now_millis: i64) -> LicenseResult<Option<LicenseRecord>> {
        let Some(record) = self.load_bound_checked(hardware_id)? else {
            return Ok(None);
        };

        if record.is_expired_at(now_millis) {
            let err = LicenseError::Expired(record.expires_at_display());
            self.discard(&err)?;
            return Err(err);
        }

        Ok(Some(record))
    }

    /// Loads the record, treating a discarded record the same as a missing one.
    pub fn load(&self, hardware_id: &str, now_millis: i64) -> LicenseResult<Option<LicenseRecord>> {
        absorb_discarded(self.load_checked(hardware_id, now_millis))
    }

    /// Loads the record enforcing the hardware binding only.
    ///
    /// An expired license is still returned: the license server may have
    /// renewed it, and only an online check can tell.
    pub fn load_for_revalidation(&self, hardware_id: &str) -> LicenseResult<Option<LicenseRecord>> {
        absorb_discarded(self.load_bound_checked(hardware_id))
    }

    /// Deletes the license file. Returns false if there was none.
    pub fn clear(&self) -> LicenseResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(LicenseError::Storage(format!(
                "failed to delete {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn load_bound_checked(&self, hardware_id: &str) -> LicenseResult<Option<LicenseRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LicenseError::Storage(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let record: LicenseRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                let err = LicenseError::CorruptRecord(e.to_string());
                self.discard(&err)?;
                return Err(err);
            }
        };

        if record.hardware_id != hardware_id {
            let err = LicenseError::HardwareMismatch {
                stored: record.hardware_id,
                current: hardware_id.to_string(),
            };
            self.discard(&err)?;
            return Err(err);
        }

        Ok(Some(record))
    }

    fn discard(&self, reason: &LicenseError) -> LicenseResult<()> {
        warn!(path = %self.path.display(), %reason, "deleting invalid license record");
        self.clear().map(|_| ())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn absorb_discarded(result: LicenseResult<Option<LicenseRecord>>) -> LicenseResult<Option<LicenseRecord>> {
    match result {
        Err(
            LicenseError::CorruptRecord(_)
            | LicenseError::HardwareMismatch { .. }
            | LicenseError::Expired(_),
        ) => Ok(None),
        other => other,
    }
}
