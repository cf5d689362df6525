// # dns-switcher
//
// Thin command-line front end over `dnsswitch-core`. Every subcommand maps
// to one `DnsSwitcher` method; this file only parses arguments, loads the
// environment and formats results.
//
// ## Configuration
//
// - `DNS_SWITCHER_PATH`: Profile store file (required)
// - `DNS_SWITCHER_TEST_DOMAIN`: Domain queried by latency probes (required;
//   `DomainTesting` is read when unset)
// - `DNS_SWITCHER_PROBE_TIMEOUT_MS`: Per-probe timeout (default 2000)
// - `DNS_SWITCHER_MAX_CONCURRENT_PROBES`: Probes in flight (default 16)
// - `DNS_SWITCHER_LOG_LEVEL`: trace, debug, info, warn, error (default warn)
//
// ## Example
//
// ```bash
// export DNS_SWITCHER_PATH="$APPDATA/dns-switcher/profiles.json"
// export DNS_SWITCHER_TEST_DOMAIN=example.com
//
// dns-switcher add-profile -n cloudflare -s 1.1.1.1,1.0.0.1
// dns-switcher auto -r 5 -a -i Ethernet
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dnsswitch_core::selection::{ProfileReport, Selection, ServerReport};
use dnsswitch_core::{ApplyOutcome, DnsSwitcher, ProbeConfig, SwitcherConfig};
use dnsswitch_netsh::NetshConfigurator;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

/// Process exit codes
#[derive(Debug, Clone, Copy)]
enum SwitcherExitCode {
    /// Command completed
    Success = 0,
    /// Configuration or startup error
    ConfigError = 1,
    /// Command failed
    RuntimeError = 2,
}

impl From<SwitcherExitCode> for ExitCode {
    fn from(code: SwitcherExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dns-switcher",
    version,
    about = "Manage DNS profiles, test latency, apply settings and roll back safely"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available DNS profiles
    List {
        /// Show servers in list output
        #[arg(short, long)]
        verbose: bool,
    },
    /// Test latency for a profile or a single server
    Test {
        /// Profile name or server IP
        target: String,
        /// Number of probes per server
        #[arg(short, long)]
        repeat: Option<usize>,
    },
    /// Apply a DNS profile
    Apply {
        profile: String,
        /// Apply even if already active
        #[arg(short, long)]
        force: bool,
        /// Network interface (default: the single connected one)
        #[arg(short = 'i', long = "iface")]
        iface: Option<String>,
    },
    /// Show current DNS settings
    Status {
        #[arg(short = 'i', long = "iface")]
        iface: Option<String>,
        /// Output in JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Restore automatic (DHCP) DNS
    Rollback {
        #[arg(short = 'i', long = "iface")]
        iface: Option<String>,
        /// Suppress success message
        #[arg(short, long)]
        quiet: bool,
    },
    /// Add or replace a DNS profile
    AddProfile {
        /// Profile name
        #[arg(short, long)]
        name: String,
        /// Comma-separated DNS servers
        #[arg(short, long)]
        servers: String,
    },
    /// Select the fastest DNS profile
    Auto {
        /// Number of probes per server
        #[arg(short, long)]
        repeat: Option<usize>,
        /// Apply the fastest profile
        #[arg(short, long)]
        apply: bool,
        #[arg(short = 'i', long = "iface")]
        iface: Option<String>,
    },
    /// Delete one or more DNS profiles
    DeleteProfile {
        #[arg(required = true)]
        names: Vec<String>,
        /// Delete even if the profile is active
        #[arg(short, long)]
        force: bool,
        /// Output results in JSON
        #[arg(short, long)]
        json: bool,
        /// Suppress success messages
        #[arg(short, long)]
        quiet: bool,
        #[arg(short = 'i', long = "iface")]
        iface: Option<String>,
        /// Confirm deletion
        #[arg(short, long)]
        yes: bool,
    },
}

/// Test domain variable used by earlier releases
const LEGACY_TEST_DOMAIN_VAR: &str = "DomainTesting";

/// Settings read from the environment
struct Config {
    store_path: Option<String>,
    test_domain: Option<String>,
    probe_timeout_ms: Option<u64>,
    max_concurrent_probes: Option<usize>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            store_path: lookup("DNS_SWITCHER_PATH"),
            test_domain: lookup("DNS_SWITCHER_TEST_DOMAIN").or_else(|| lookup(LEGACY_TEST_DOMAIN_VAR)),
            probe_timeout_ms: parse_var("DNS_SWITCHER_PROBE_TIMEOUT_MS", lookup("DNS_SWITCHER_PROBE_TIMEOUT_MS"))?,
            max_concurrent_probes: parse_var(
                "DNS_SWITCHER_MAX_CONCURRENT_PROBES",
                lookup("DNS_SWITCHER_MAX_CONCURRENT_PROBES"),
            )?,
            log_level: lookup("DNS_SWITCHER_LOG_LEVEL").unwrap_or_else(|| "warn".to_string()),
        })
    }

    /// Build and validate the core configuration
    fn switcher_config(&self) -> Result<SwitcherConfig> {
        let store_path = self.store_path.as_deref().filter(|p| !p.is_empty()).context(
            "DNS_SWITCHER_PATH is required. Set it via: export DNS_SWITCHER_PATH=/path/to/profiles.json",
        )?;
        let test_domain = self.test_domain.as_deref().filter(|d| !d.is_empty()).context(
            "DNS_SWITCHER_TEST_DOMAIN is required. Set it via: export DNS_SWITCHER_TEST_DOMAIN=example.com",
        )?;

        let mut probe = ProbeConfig::default();
        if let Some(timeout_ms) = self.probe_timeout_ms {
            probe.timeout_ms = timeout_ms;
        }
        if let Some(max) = self.max_concurrent_probes {
            probe.max_concurrent_probes = max;
        }

        let config = SwitcherConfig::new(test_domain, store_path).with_probe(probe);
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>) -> Result<Option<T>> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a positive number, got '{}'", name, value)),
        None => Ok(None),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SwitcherExitCode::ConfigError.into();
        }
    };

    let switcher_config = match config.switcher_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return SwitcherExitCode::ConfigError.into();
        }
    };

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SwitcherExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {}", e);
            return SwitcherExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let configurator = Arc::new(NetshConfigurator::new());
        let switcher = match DnsSwitcher::open(switcher_config, configurator).await {
            Ok(switcher) => switcher,
            Err(e) => {
                eprintln!("Startup error: {}", e);
                return SwitcherExitCode::ConfigError;
            }
        };

        match run(&switcher, cli.command).await {
            Ok(()) => SwitcherExitCode::Success,
            Err(e) => {
                error!("Command failed: {}", e);
                eprintln!("Error: {}", e);
                SwitcherExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run one subcommand
async fn run(switcher: &DnsSwitcher, command: Commands) -> Result<()> {
    match command {
        Commands::List { verbose } => {
            let profiles = switcher.list_profiles().await?;
            if profiles.is_empty() {
                println!("No profiles found");
                return Ok(());
            }
            println!("Available profiles:");
            for profile in profiles {
                if verbose {
                    println!(" - {} : {}", profile.name, join(&profile.servers));
                } else {
                    println!(" - {}", profile.name);
                }
            }
        }

        Commands::Test { target, repeat } => {
            let report = switcher.test_target(&target, repeat).await?;
            println!("Testing '{}'", target);
            print_profile_report(&report);
        }

        Commands::Apply {
            profile,
            force,
            iface,
        } => {
            let outcome = switcher.apply_profile(&profile, iface.as_deref(), force).await?;
            match outcome {
                ApplyOutcome::AlreadyActive { interface } => println!(
                    "Profile '{}' is already active on interface '{}'. Use -f to force reapply.",
                    profile, interface
                ),
                ApplyOutcome::Applied { interface, servers } => {
                    println!("DNS applied to {}: {}", interface, join(&servers))
                }
                ApplyOutcome::RolledBack { interface } => {
                    println!("DNS restored to automatic (DHCP) on interface {}", interface)
                }
            }
        }

        Commands::Status { iface, json } => {
            let state = switcher.status(iface.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                println!("Current DNS servers on '{}':", state.interface);
                for server in &state.servers {
                    println!(" - {}", server);
                }
            }
        }

        Commands::Rollback { iface, quiet } => {
            let outcome = switcher.rollback(iface.as_deref()).await?;
            if !quiet {
                println!(
                    "Rollback successful: DNS restored to automatic (DHCP) on interface {}",
                    outcome.interface()
                );
            }
        }

        Commands::AddProfile { name, servers } => {
            let servers: Vec<String> = servers.split(',').map(|s| s.trim().to_string()).collect();
            let profile = switcher.add_profile(&name, &servers).await?;
            println!("Profile '{}' added: {}", profile.name, join(&profile.servers));
        }

        Commands::Auto {
            repeat,
            apply,
            iface,
        } => {
            let result = switcher.auto_select(repeat, apply, iface.as_deref()).await?;
            if result.report.profiles.is_empty() {
                println!("No profiles found");
                return Ok(());
            }

            for report in &result.report.profiles {
                println!("Testing profile '{}'", report.profile);
                print_profile_report(report);
                println!();
            }

            match (&result.report.selection, result.applied) {
                (Selection::NoViableCandidate, _) => println!("No valid servers found"),
                (Selection::Fastest { profile, average }, Some(Err(e))) => {
                    println!(
                        "Fastest profile is '{}' with average RTT {}",
                        profile,
                        millis(*average)
                    );
                    return Err(e).context(format!("Failed to apply profile '{}'", profile));
                }
                (Selection::Fastest { profile, .. }, Some(Ok(ApplyOutcome::AlreadyActive { interface }))) => {
                    println!(
                        "Fastest profile '{}' is already active on interface '{}'",
                        profile, interface
                    )
                }
                (Selection::Fastest { profile, average }, Some(Ok(outcome))) => println!(
                    "Applied fastest profile '{}' with average RTT {} on interface '{}'",
                    profile,
                    millis(*average),
                    outcome.interface()
                ),
                (Selection::Fastest { profile, average }, None) => println!(
                    "Fastest profile is '{}' with average RTT {} (not applied)",
                    profile,
                    millis(*average)
                ),
            }
        }

        Commands::DeleteProfile {
            names,
            force,
            json,
            quiet,
            iface,
            yes,
        } => {
            if !yes {
                anyhow::bail!("Refusing to delete without confirmation. Re-run with --yes");
            }

            let mut failures = 0;
            for name in &names {
                match switcher.delete_profile(name, iface.as_deref(), force).await {
                    Ok(outcome) => {
                        if json {
                            let payload = serde_json::json!({
                                "deleted": true,
                                "name": outcome.name,
                                "forced": outcome.forced,
                                "active": outcome.was_active,
                            });
                            println!("{}", serde_json::to_string_pretty(&payload)?);
                        } else if !quiet {
                            println!("Profile '{}' deleted", outcome.name);
                        }
                    }
                    Err(dnsswitch_core::Error::ProfileActive { profile, .. }) => {
                        failures += 1;
                        println!("Profile '{}' is currently active. Use --force to delete.", profile);
                    }
                    Err(e) => {
                        failures += 1;
                        println!("Error deleting profile '{}': {}", name, e);
                    }
                }
            }

            if failures > 0 {
                anyhow::bail!("{} of {} profile(s) not deleted", failures, names.len());
            }
        }
    }

    Ok(())
}

fn print_profile_report(report: &ProfileReport) {
    for server in &report.servers {
        print_server_report(server);
    }
    if report.servers.len() > 1 {
        match report.aggregate.average {
            Some(average) => println!("Profile '{}' average RTT: {}", report.profile, millis(average)),
            None => println!("Profile '{}' has no reachable server", report.profile),
        }
    }
}

fn print_server_report(report: &ServerReport) {
    for (attempt, sample) in report.samples.iter().enumerate() {
        match sample.rtt_or_error() {
            Ok(rtt) => println!("{} -> RTT[{}]: {}", report.server, attempt + 1, millis(rtt)),
            Err(e) => println!("error: {}", e),
        }
    }
    if let Some(average) = report.aggregate.average {
        println!("{} -> average RTT: {}", report.server, millis(average));
    }
}

fn millis(duration: Duration) -> String {
    format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
