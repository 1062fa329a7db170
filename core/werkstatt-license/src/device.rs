//! Hardware fingerprinting for license binding.
//!
//! Generates a stable machine identifier from OS, hostname, CPU and network
//! facts. Licenses are bound to this identifier by the license server.
//!
//! The input format is frozen: every issued license is bound to a hash of
//! exactly these facts, so any change here is a license migration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::fmt;

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 32;

const UNKNOWN: &str = "unknown";
const ZERO_MAC: &str = "00:00:00:00:00:00";

/// How the fingerprint chooses the MAC address it hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MacScan {
    /// Inspect only the first interface; contribute nothing if it has no usable MAC.
    ///
    /// This is what issued licenses are bound to.
    #[default]
    FirstInterface,
    /// Use the first usable MAC of any interface.
    AllInterfaces,
}

/// A network interface as the OS enumerates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Interface name.
    pub name: String,
    /// Hardware addresses reported for the interface, in order.
    pub macs: Vec<String>,
}

impl NetworkInterface {
    /// Creates an interface entry.
    pub fn new(name: impl Into<String>, macs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            macs,
        }
    }

    /// Returns the first non-zero MAC address of this interface.
    #[must_use]
    pub fn first_valid_mac(&self) -> Option<&str> {
        self.macs
            .iter()
            .map(|m| m.trim())
            .find(|m| !m.is_empty() && !m.eq_ignore_ascii_case(ZERO_MAC))
    }
}

/// The machine facts a fingerprint is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineFacts {
    /// Platform identifier (`linux`, `darwin`, `win32`, ...).
    pub platform: String,
    /// CPU architecture (`x64`, `arm64`, ...).
    pub arch: String,
    /// Hostname.
    pub hostname: String,
    /// Model string of the first CPU.
    pub cpu_model: Option<String>,
    /// Network interfaces in OS enumeration order.
    pub interfaces: Vec<NetworkInterface>,
}

impl MachineFacts {
    /// Collects facts about the current machine.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            platform: platform_id(env::consts::OS).to_string(),
            arch: arch_id(env::consts::ARCH).to_string(),
            hostname: get_hostname(),
            cpu_model: get_cpu_model(),
            interfaces: get_interfaces(),
        }
    }

    /// Interface names, sorted.
    #[must_use]
    pub fn sorted_interface_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.interfaces.iter().map(|i| i.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// The MAC address the fingerprint uses under `scan`.
    #[must_use]
    pub fn fingerprint_mac(&self, scan: MacScan) -> Option<&str> {
        match scan {
            MacScan::FirstInterface => self.interfaces.first().and_then(|i| i.first_valid_mac()),
            MacScan::AllInterfaces => self.interfaces.iter().find_map(|i| i.first_valid_mac()),
        }
    }

    fn fingerprint_input(&self, scan: MacScan) -> String {
        let names = self.sorted_interface_names().join(",");
        let components = [
            non_empty_or_unknown(&self.platform),
            non_empty_or_unknown(&self.arch),
            non_empty_or_unknown(&self.hostname),
            self.cpu_model
                .as_deref()
                .map(non_empty_or_unknown)
                .unwrap_or(UNKNOWN),
            names.as_str(),
            self.fingerprint_mac(scan).unwrap_or(""),
        ];
        components.join("|")
    }
}

/// A source of machine facts.
pub trait MachineProbe: Send + Sync + fmt::Debug {
    /// Returns the facts of the machine this process runs on.
    fn facts(&self) -> MachineFacts;
}

/// Probes the live system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl MachineProbe for SystemProbe {
    fn facts(&self) -> MachineFacts {
        MachineFacts::collect()
    }
}

impl MachineProbe for MachineFacts {
    fn facts(&self) -> MachineFacts {
        self.clone()
    }
}

/// A stable fingerprint that identifies this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareFingerprint {
    /// The fingerprint ID (truncated hex SHA-256 of the machine facts).
    id: String,
    /// When the fingerprint was generated.
    generated_at: chrono::DateTime<chrono::Utc>,
}

impl HardwareFingerprint {
    /// Computes the fingerprint of the given facts.
    #[must_use]
    pub fn from_facts(facts: &MachineFacts, scan: MacScan) -> Self {
        let input = facts.fingerprint_input(scan);

        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        let mut id = hex::encode(hasher.finalize());
        id.truncate(FINGERPRINT_LEN);

        Self {
            id,
            generated_at: chrono::Utc::now(),
        }
    }

    /// Computes the fingerprint of the current machine.
    #[must_use]
    pub fn generate(scan: MacScan) -> Self {
        Self::from_facts(&MachineFacts::collect(), scan)
    }

    /// Returns the fingerprint ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns when the fingerprint was generated.
    #[must_use]
    pub fn generated_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.generated_at
    }

    /// Returns true if `id` is this fingerprint.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        self.id == id
    }
}

impl fmt::Display for HardwareFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

fn non_empty_or_unknown(s: &str) -> &str {
    if s.trim().is_empty() { UNKNOWN } else { s }
}

/// Maps Rust's OS names onto the desktop shell's platform identifiers.
fn platform_id(os: &str) -> &str {
    match os {
        "windows" => "win32",
        "macos" => "darwin",
        "solaris" | "illumos" => "sunos",
        other => other,
    }
}

/// Maps Rust's architecture names onto the desktop shell's identifiers.
fn arch_id(arch: &str) -> &str {
    match arch {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        "powerpc" => "ppc",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}

/// Gets the machine hostname.
fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Gets the model string of the first CPU.
fn get_cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo").ok().and_then(|content| {
            content
                .lines()
                .find(|l| l.starts_with("model name"))
                .and_then(|l| l.split_once(':'))
                .map(|(_, model)| model.trim().to_string())
        })
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sysctl")
            .args(["-n", "machdep.cpu.brand_string"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\HARDWARE\DESCRIPTION\System\CentralProcessor\0",
                "/v",
                "ProcessorNameString",
            ])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| parse_reg_processor_name(&output))
            .or_else(|| env::var("PROCESSOR_IDENTIFIER").ok())
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}

/// Lists network interfaces with their hardware addresses.
fn get_interfaces() -> Vec<NetworkInterface> {
    #[cfg(target_os = "linux")]
    {
        // Enumeration order is by interface index, loopback first.
        let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
            return Vec::new();
        };
        let mut indexed: Vec<(u32, NetworkInterface)> = entries
            .filter_map(Result::ok)
            .map(|entry| {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                let index = std::fs::read_to_string(path.join("ifindex"))
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(u32::MAX);
                let macs = std::fs::read_to_string(path.join("address"))
                    .map(|s| vec![s.trim().to_string()])
                    .unwrap_or_default();
                (index, NetworkInterface::new(name, macs))
            })
            .collect();
        indexed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));
        indexed.into_iter().map(|(_, iface)| iface).collect()
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ifconfig")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|output| parse_ifconfig(&output))
            .unwrap_or_default()
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("getmac")
            .args(["/v", "/fo", "csv", "/nh"])
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
            .map(|output| parse_getmac_csv(&output))
            .unwrap_or_default()
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Vec::new()
    }
}

/// Extracts the value of `ProcessorNameString` from `reg query` output.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_reg_processor_name(output: &str) -> Option<String> {
    output
        .lines()
        .find(|l| l.trim_start().starts_with("ProcessorNameString"))
        .and_then(|l| l.split_once("REG_SZ"))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Parses `getmac /v /fo csv /nh` output, one adapter per line:
/// `"Connection Name","Adapter","Physical Address","Transport Name"`.
///
/// Addresses are normalised to lowercase colon notation; adapters without
/// a physical address keep an empty MAC list.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_getmac_csv(output: &str) -> Vec<NetworkInterface> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let fields: Vec<&str> = line
                .strip_prefix('"')?
                .strip_suffix('"')?
                .split("\",\"")
                .collect();
            let name = fields.first()?.trim();
            if name.is_empty() {
                return None;
            }
            let macs = fields
                .get(2)
                .map(|addr| addr.trim())
                .filter(|addr| addr.len() == 17 && addr.chars().filter(|c| *c == '-').count() == 5)
                .map(|addr| vec![addr.replace('-', ":").to_ascii_lowercase()])
                .unwrap_or_default();
            Some(NetworkInterface::new(name, macs))
        })
        .collect()
}

/// Parses BSD `ifconfig` output into interfaces with their `ether` addresses.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_ifconfig(output: &str) -> Vec<NetworkInterface> {
    let mut interfaces: Vec<NetworkInterface> = Vec::new();
    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) {
            if let Some((name, _)) = line.split_once(':') {
                interfaces.push(NetworkInterface::new(name.trim(), Vec::new()));
            }
        } else if let Some(mac) = line.trim().strip_prefix("ether ") {
            if let Some(current) = interfaces.last_mut() {
                if let Some(addr) = mac.split_whitespace().next() {
                    current.macs.push(addr.to_string());
                }
            }
        }
    }
    interfaces
}
