// # netsh Network Configurator
//
// This crate provides a `NetworkConfigurator` backed by the Windows `netsh`
// command.
//
// ## Commands
//
// | Operation         | netsh arguments                                            |
// |-------------------|------------------------------------------------------------|
// | list interfaces   | `interface show interface`                                 |
// | current DNS       | `interface ip show dns name=<if>`                          |
// | set primary       | `interface ip set dns name=<if> source=static address=<ip>`|
// | add server        | `interface ip add dns name=<if> addr=<ip> index=<n>`       |
// | dynamic (DHCP)    | `interface ip set dns name=<if> source=dhcp`               |
//
// Each operation is exactly one command. Sequencing, idempotency and
// locking belong to `ApplyOrchestrator`.
//
// ## Platform Support
//
// The system runner refuses to run anywhere but Windows. Output parsing is
// plain text and is tested on every platform through the `CommandRunner`
// seam.

use async_trait::async_trait;
use dnsswitch_core::traits::NetworkConfigurator;
use dnsswitch_core::{Error, Result};
use std::net::IpAddr;
use tracing::debug;

/// Header lines that start the server list in `show dns` output
const DNS_HEADERS: [&str; 2] = ["Statically Configured DNS Servers", "DNS Servers"];

/// Captured result of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status 0
    pub success: bool,
    /// Combined stdout and stderr
    pub output: String,
}

/// Executes `netsh` with the given arguments
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<CommandOutput>;
}

/// Runs the real `netsh` executable
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNetsh;

#[async_trait]
impl CommandRunner for SystemNetsh {
    async fn run(&self, args: &[String]) -> Result<CommandOutput> {
        if !cfg!(windows) {
            return Err(Error::configurator("netsh is only available on Windows"));
        }

        let output = tokio::process::Command::new("netsh")
            .args(args)
            .output()
            .await
            .map_err(|e| Error::configurator(format!("Failed to run netsh: {}", e)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            success: output.status.success(),
            output: combined,
        })
    }
}

/// `NetworkConfigurator` over `netsh`
pub struct NetshConfigurator {
    runner: Box<dyn CommandRunner>,
}

impl NetshConfigurator {
    /// Configurator using the system `netsh`
    pub fn new() -> Self {
        Self::with_runner(Box::new(SystemNetsh))
    }

    /// Configurator using a custom runner
    pub fn with_runner(runner: Box<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Run one command; a non-zero exit is an error carrying the output
    async fn netsh(&self, args: &[String]) -> Result<String> {
        debug!("netsh {}", args.join(" "));
        let result = self.runner.run(args).await?;
        if !result.success {
            return Err(Error::configurator(format!(
                "netsh {} failed: {}",
                args.join(" "),
                result.output.trim()
            )));
        }
        Ok(result.output)
    }
}

impl Default for NetshConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Names of connected interfaces in `interface show interface` output
///
/// Rows are `Admin State  State  Type  Interface Name`; the name is
/// everything from the fourth column on.
pub fn parse_connected_interfaces(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 4 && fields[1] == "Connected" {
                Some(fields[3..].join(" "))
            } else {
                None
            }
        })
        .collect()
}

/// Raw server entries in `interface ip show dns` output
///
/// The first server shares a line with its header; the rest follow on
/// their own lines. Everything after the header is kept as-is and
/// normalized by the caller.
pub fn parse_dns_servers(output: &str) -> Vec<String> {
    let mut servers = Vec::new();
    let mut capture = false;

    for line in output.lines().map(str::trim) {
        if DNS_HEADERS.iter().any(|h| line.starts_with(h)) {
            if let Some((_, value)) = line.split_once(':') {
                let value = value.trim();
                if !value.is_empty() {
                    servers.push(value.to_string());
                }
            }
            capture = true;
            continue;
        }
        if capture && !line.is_empty() {
            servers.push(line.to_string());
        }
    }

    servers
}

#[async_trait]
impl NetworkConfigurator for NetshConfigurator {
    async fn list_interfaces(&self) -> Result<Vec<String>> {
        let output = self.netsh(&args(&["interface", "show", "interface"])).await?;
        let interfaces = parse_connected_interfaces(&output);
        if interfaces.is_empty() {
            return Err(Error::NoActiveInterface);
        }
        Ok(interfaces)
    }

    async fn current_dns(&self, interface: &str) -> Result<Vec<String>> {
        let output = self
            .netsh(&args(&["interface", "ip", "show", "dns", &format!("name={}", interface)]))
            .await?;
        Ok(parse_dns_servers(&output))
    }

    async fn set_primary_dns(&self, interface: &str, server: IpAddr) -> Result<()> {
        self.netsh(&args(&[
            "interface",
            "ip",
            "set",
            "dns",
            &format!("name={}", interface),
            "source=static",
            &format!("address={}", server),
        ]))
        .await?;
        Ok(())
    }

    async fn add_dns(&self, interface: &str, server: IpAddr, position: usize) -> Result<()> {
        self.netsh(&args(&[
            "interface",
            "ip",
            "add",
            "dns",
            &format!("name={}", interface),
            &format!("addr={}", server),
            &format!("index={}", position + 1),
        ]))
        .await?;
        Ok(())
    }

    async fn set_dynamic_dns(&self, interface: &str) -> Result<()> {
        self.netsh(&args(&[
            "interface",
            "ip",
            "set",
            "dns",
            &format!("name={}", interface),
            "source=dhcp",
        ]))
        .await?;
        Ok(())
    }

    fn configurator_name(&self) -> &'static str {
        "netsh"
    }
}
