//! Test doubles and common utilities for contract tests
//!
//! The doubles here stand in for the network: probes return scripted
//! outcomes and the configurator keeps interface state in memory while
//! recording every call made to it.

#![allow(dead_code)]

use async_trait::async_trait;
use dnsswitch_core::error::{Error, Result};
use dnsswitch_core::traits::{LatencyProber, NetworkConfigurator, ProbeOutcome, ProbeSample};
use dnsswitch_core::{ProbeConfig, SwitcherConfig};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Parse a list of IP literals
pub fn ips(list: &[&str]) -> Vec<IpAddr> {
    list.iter().map(|s| s.parse().unwrap()).collect()
}

/// Owned server strings, as the store's `add` takes them
pub fn servers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Configuration rooted in a temporary directory
pub fn minimal_config(dir: &Path) -> SwitcherConfig {
    SwitcherConfig::new("example.com", dir.join("profiles.json")).with_probe(ProbeConfig {
        timeout_ms: 100,
        max_concurrent_probes: 4,
        ..ProbeConfig::default()
    })
}

/// A prober that answers from a script instead of the network
///
/// Servers without a script entry time out.
pub struct ScriptedProber {
    script: HashMap<IpAddr, ProbeOutcome>,
    rtts: HashMap<IpAddr, Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            rtts: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `server` always succeeds after `ms` milliseconds
    pub fn succeed(mut self, server: &str, ms: u64) -> Self {
        let server = server.parse().unwrap();
        self.script.insert(server, ProbeOutcome::Success);
        self.rtts.insert(server, Duration::from_millis(ms));
        self
    }

    /// `server` always returns a negative response
    pub fn refuse(mut self, server: &str) -> Self {
        self.script.insert(
            server.parse().unwrap(),
            ProbeOutcome::ProtocolError("rcode REFUSED".to_string()),
        );
        self
    }

    /// Number of probes made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LatencyProber for ScriptedProber {
    async fn measure(&self, server: IpAddr, _test_domain: &str, timeout: Duration) -> ProbeSample {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(&server) {
            Some(outcome) => {
                let rtt = self.rtts.get(&server).copied().unwrap_or(Duration::from_millis(1));
                ProbeSample::new(server, rtt, outcome.clone())
            }
            None => ProbeSample::new(server, timeout, ProbeOutcome::Timeout),
        }
    }
}

/// One call received by the `RecordingConfigurator`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfiguratorCall {
    ListInterfaces,
    CurrentDns(String),
    SetPrimary(String, IpAddr),
    Add(String, IpAddr, usize),
    SetDynamic(String),
}

impl ConfiguratorCall {
    fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::SetPrimary(..) | Self::Add(..) | Self::SetDynamic(_)
        )
    }
}

/// An in-memory configurator that records every call
///
/// Cloning shares state, so a test can keep a handle after handing one
/// to the switcher.
#[derive(Clone)]
pub struct RecordingConfigurator {
    interfaces: Vec<String>,
    dns: Arc<Mutex<HashMap<String, Vec<String>>>>,
    calls: Arc<Mutex<Vec<ConfiguratorCall>>>,
    fail_primary: bool,
    fail_add_of: Option<IpAddr>,
    fail_dynamic: bool,
    fail_read: bool,
}

impl RecordingConfigurator {
    pub fn new(interfaces: &[&str]) -> Self {
        Self {
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            dns: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_primary: false,
            fail_add_of: None,
            fail_dynamic: false,
            fail_read: false,
        }
    }

    /// Preset the raw DNS list of `interface`
    pub fn with_dns(self, interface: &str, raw: &[&str]) -> Self {
        self.dns
            .lock()
            .unwrap()
            .insert(interface.to_string(), servers(raw));
        self
    }

    pub fn failing_primary(mut self) -> Self {
        self.fail_primary = true;
        self
    }

    pub fn failing_add_of(mut self, server: &str) -> Self {
        self.fail_add_of = Some(server.parse().unwrap());
        self
    }

    pub fn failing_dynamic(mut self) -> Self {
        self.fail_dynamic = true;
        self
    }

    pub fn failing_read(mut self) -> Self {
        self.fail_read = true;
        self
    }

    pub fn calls(&self) -> Vec<ConfiguratorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_call_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_mutating()).count()
    }

    /// Current raw DNS list of `interface` (empty when dynamic)
    pub fn dns_of(&self, interface: &str) -> Vec<String> {
        self.dns
            .lock()
            .unwrap()
            .get(interface)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: ConfiguratorCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NetworkConfigurator for RecordingConfigurator {
    async fn list_interfaces(&self) -> Result<Vec<String>> {
        self.record(ConfiguratorCall::ListInterfaces);
        Ok(self.interfaces.clone())
    }

    async fn current_dns(&self, interface: &str) -> Result<Vec<String>> {
        self.record(ConfiguratorCall::CurrentDns(interface.to_string()));
        if self.fail_read {
            return Err(Error::configurator("show dns failed"));
        }
        Ok(self.dns_of(interface))
    }

    async fn set_primary_dns(&self, interface: &str, server: IpAddr) -> Result<()> {
        self.record(ConfiguratorCall::SetPrimary(interface.to_string(), server));
        if self.fail_primary {
            return Err(Error::configurator("access denied"));
        }
        self.dns
            .lock()
            .unwrap()
            .insert(interface.to_string(), vec![server.to_string()]);
        Ok(())
    }

    async fn add_dns(&self, interface: &str, server: IpAddr, position: usize) -> Result<()> {
        self.record(ConfiguratorCall::Add(interface.to_string(), server, position));
        if self.fail_add_of == Some(server) {
            return Err(Error::configurator("the object already exists"));
        }
        self.dns
            .lock()
            .unwrap()
            .entry(interface.to_string())
            .or_default()
            .push(server.to_string());
        Ok(())
    }

    async fn set_dynamic_dns(&self, interface: &str) -> Result<()> {
        self.record(ConfiguratorCall::SetDynamic(interface.to_string()));
        if self.fail_dynamic {
            return Err(Error::configurator("dhcp unavailable"));
        }
        self.dns.lock().unwrap().remove(interface);
        Ok(())
    }

    fn configurator_name(&self) -> &'static str {
        "recording"
    }
}
