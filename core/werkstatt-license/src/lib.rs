//! Licensing for Werkstatt.
//!
//! This module handles:
//! - Hardware fingerprinting for device binding
//! - The locally cached license record
//! - Online validation against the license server
//! - Login and in-session license decisions, including offline use
//!
//! # Design Principles
//!
//! - **Validate on every login**: the server is asked whenever a record exists
//! - **Offline fallback**: an unreachable server does not lock users out of a
//!   license that has not expired
//! - **Fail closed locally**: a foreign, corrupt or expired record is deleted
//! - **Inspectable**: the cached record is plain JSON for support
//!
//! # Example
//!
//! ```no_run
//! use werkstatt_license::{LicenseConfig, LicenseContext, LicenseStateMachine};
//!
//! # async fn login() -> Result<(), werkstatt_license::LicenseError> {
//! let ctx = LicenseContext::new(LicenseConfig::default());
//! let mut machine = LicenseStateMachine::new(ctx)?;
//! match machine.validate_license_on_login().await {
//!     Ok(info) => println!("admitted (offline: {})", info.offline),
//!     Err(refusal) => println!("refused: {} -> {}", refusal.message, refusal.redirect.path()),
//! }
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod context;
mod device;
mod error;
mod record;
mod remote;
mod session;
mod state;
mod store;

pub use clock::{format_millis, Clock, ManualClock, SystemClock, DAY_MILLIS};
pub use config::{LicenseConfig, ENV_DATA_DIR, ENV_SERVER_URL, ENV_VALIDATE_PATH};
pub use context::LicenseContext;
pub use device::{
    HardwareFingerprint, MacScan, MachineFacts, MachineProbe, NetworkInterface, SystemProbe,
    FINGERPRINT_LEN,
};
pub use error::{ErrorKind, LicenseError, LicenseResult};
pub use record::LicenseRecord;
pub use remote::{AuthorityResponse, RemoteValidator, ValidationRequest, RAW_EXPIRY_KEY};
pub use session::{LicenseRefusal, Redirect, SessionLicenseInfo};
pub use state::{LicenseCheck, LicenseState, LicenseStateMachine};
pub use store::LocalLicenseStore;
