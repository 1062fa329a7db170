//! Explicit environment for license operations.

use crate::clock::{Clock, SystemClock};
use crate::config::LicenseConfig;
use crate::device::{HardwareFingerprint, MachineFacts, MachineProbe, SystemProbe};
use crate::store::LocalLicenseStore;
use std::sync::Arc;

/// Configuration, machine facts and time source shared by the license
/// components. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct LicenseContext {
    config: Arc<LicenseConfig>,
    probe: Arc<dyn MachineProbe>,
    clock: Arc<dyn Clock>,
}

impl LicenseContext {
    /// Creates a context that probes the live machine and uses the system clock.
    #[must_use]
    pub fn new(config: LicenseConfig) -> Self {
        Self {
            config: Arc::new(config),
            probe: Arc::new(SystemProbe),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the source of machine facts.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn MachineProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LicenseConfig {
        &self.config
    }

    /// Returns the facts of this machine.
    #[must_use]
    pub fn machine_facts(&self) -> MachineFacts {
        self.probe.facts()
    }

    /// Computes the fingerprint of this machine.
    #[must_use]
    pub fn fingerprint(&self) -> HardwareFingerprint {
        HardwareFingerprint::from_facts(&self.probe.facts(), self.config.mac_scan)
    }

    /// Returns the current time in epoch milliseconds.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Returns the store for the configured license file.
    #[must_use]
    pub fn store(&self) -> LocalLicenseStore {
        LocalLicenseStore::new(self.config.license_file())
    }
}
