//! Configuration types for the DNS switcher
//!
//! Everything the core needs from its environment is an explicit field here.
//! Nothing is read from process-wide state, so independent instances (and
//! tests) never interfere with each other.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main switcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitcherConfig {
    /// Domain name queried by every latency probe
    pub test_domain: String,

    /// Location of the profile store file
    pub store_path: PathBuf,

    /// Probe settings
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl SwitcherConfig {
    /// Create a configuration with default probe settings
    pub fn new(test_domain: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            test_domain: test_domain.into(),
            store_path: store_path.into(),
            probe: ProbeConfig::default(),
        }
    }

    /// Replace the probe settings
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    /// Validate the configuration
    ///
    /// Both the test domain and the store path are required; there is no
    /// silent fallback for either.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.test_domain.trim().is_empty() {
            return Err(crate::Error::config("Test domain is required"));
        }
        validate_domain_name(self.test_domain.trim().trim_end_matches('.'))?;

        if self.store_path.as_os_str().is_empty() {
            return Err(crate::Error::config("Profile store path is required"));
        }

        self.probe.validate()
    }
}

/// Latency probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Per-probe timeout (in milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// DNS port on the probed servers
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on probes in flight at once
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// Default repeat count for single-target tests
    #[serde(default = "default_test_repeat")]
    pub test_repeat: usize,

    /// Default repeat count for automatic selection
    #[serde(default = "default_auto_repeat")]
    pub auto_repeat: usize,
}

impl ProbeConfig {
    /// Per-probe timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the probe configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.timeout_ms == 0 {
            return Err(crate::Error::config("Probe timeout must be > 0"));
        }
        if self.port == 0 {
            return Err(crate::Error::config("Probe port must be > 0"));
        }
        if self.max_concurrent_probes == 0 {
            return Err(crate::Error::config("Max concurrent probes must be > 0"));
        }
        Ok(())
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            port: default_port(),
            max_concurrent_probes: default_max_concurrent_probes(),
            test_repeat: default_test_repeat(),
            auto_repeat: default_auto_repeat(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_port() -> u16 {
    53
}

fn default_max_concurrent_probes() -> usize {
    16
}

fn default_test_repeat() -> usize {
    1
}

fn default_auto_repeat() -> usize {
    5
}

/// Validate that a string is a usable host name (RFC 1035 label rules)
fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    if domain.is_empty() {
        return Err(crate::Error::config("Test domain cannot be empty"));
    }

    if domain.len() > 253 {
        return Err(crate::Error::config(format!(
            "Test domain too long: {} chars (max 253)",
            domain.len()
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Test domain has empty label: '{}'",
                domain
            )));
        }

        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Test domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(crate::Error::config(format!(
                "Test domain label contains invalid characters: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::config(format!(
                "Test domain label cannot start or end with hyphen: '{}'",
                label
            )));
        }
    }

    Ok(())
}
