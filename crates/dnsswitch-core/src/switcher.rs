//! DNS switcher facade
//!
//! Composes the profile store, selection engine and apply orchestrator.
//! Each public method corresponds to one user-facing command.

use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SwitcherConfig;
use crate::error::{Error, Result};
use crate::orchestrator::{ApplyOrchestrator, ApplyOutcome, InterfaceDnsState};
use crate::probe::UdpLatencyProber;
use crate::profile::Profile;
use crate::selection::{ProfileReport, Selection, SelectionEngine, SelectionReport};
use crate::store::FileProfileStore;
use crate::traits::{LatencyProber, NetworkConfigurator, ProfileStore};

/// Result of `auto_select`
///
/// The probe results are kept even when applying the winner fails.
#[derive(Debug)]
pub struct AutoSelectReport {
    pub report: SelectionReport,
    /// Set when `apply` was requested and a winner existed
    pub applied: Option<Result<ApplyOutcome>>,
}

/// Result of `delete_profile`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub name: String,
    /// Whether the profile was live on the interface when deleted
    pub was_active: bool,
    pub forced: bool,
}

/// Library entry point for every switcher command
pub struct DnsSwitcher {
    config: SwitcherConfig,
    store: Arc<dyn ProfileStore>,
    engine: SelectionEngine,
    orchestrator: ApplyOrchestrator,
}

impl DnsSwitcher {
    /// Create a switcher from explicit collaborators
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn new(
        config: SwitcherConfig,
        store: Arc<dyn ProfileStore>,
        prober: Arc<dyn LatencyProber>,
        configurator: Arc<dyn NetworkConfigurator>,
    ) -> Result<Self> {
        config.validate()?;

        let engine = SelectionEngine::new(prober, config.test_domain.trim(), &config.probe);
        let orchestrator = ApplyOrchestrator::new(configurator);

        Ok(Self {
            config,
            store,
            engine,
            orchestrator,
        })
    }

    /// Create a switcher backed by the profile file and UDP probing
    pub async fn open(
        config: SwitcherConfig,
        configurator: Arc<dyn NetworkConfigurator>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(FileProfileStore::new(&config.store_path).await?);
        let prober = Arc::new(UdpLatencyProber::from_config(&config.probe));
        Self::new(config, store, prober, configurator)
    }

    pub fn config(&self) -> &SwitcherConfig {
        &self.config
    }

    /// All stored profiles, in stored order
    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.store.load_all().await
    }

    /// Probe a profile by name, or a single server by IP literal
    ///
    /// A stored profile takes precedence over an IP-shaped target. `None`
    /// uses the configured test repeat count.
    pub async fn test_target(&self, target: &str, repeat: Option<usize>) -> Result<ProfileReport> {
        let repeat = repeat.unwrap_or(self.config.probe.test_repeat);

        if let Some(profile) = self.store.find(target).await? {
            return Ok(self.engine.test_profile(&profile, repeat).await);
        }

        let server: IpAddr = target.trim().parse().map_err(|_| {
            Error::invalid_argument(format!(
                "'{}' is neither a known profile nor an IP address",
                target
            ))
        })?;

        let report = self.engine.test_server(server, repeat).await;
        Ok(ProfileReport::from_servers(&server.to_string(), vec![report]))
    }

    /// Apply a stored profile to `interface` (or the single connected one)
    pub async fn apply_profile(
        &self,
        name: &str,
        interface: Option<&str>,
        force: bool,
    ) -> Result<ApplyOutcome> {
        let profile = self.find_existing(name).await?;
        let interface = self.orchestrator.resolve_interface(interface).await?;
        self.orchestrator.apply(&profile.bound_to(interface), force).await
    }

    /// Current DNS servers on `interface` (or the single connected one)
    pub async fn status(&self, interface: Option<&str>) -> Result<InterfaceDnsState> {
        let interface = self.orchestrator.resolve_interface(interface).await?;
        self.orchestrator.current_dns(&interface).await
    }

    /// Restore dynamic DNS on `interface` (or the single connected one)
    pub async fn rollback(&self, interface: Option<&str>) -> Result<ApplyOutcome> {
        self.orchestrator.rollback(interface).await
    }

    /// Create or replace a profile
    pub async fn add_profile(&self, name: &str, servers: &[String]) -> Result<Profile> {
        self.store.add(name.trim(), servers).await
    }

    /// Probe every stored profile and optionally apply the fastest
    ///
    /// `NoViableCandidate` is reported in the selection, not as an error.
    /// `None` uses the configured auto repeat count. When `apply` is set the
    /// interface is resolved before probing; a failure to apply the winner
    /// is returned inside the report.
    pub async fn auto_select(
        &self,
        repeat: Option<usize>,
        apply: bool,
        interface: Option<&str>,
    ) -> Result<AutoSelectReport> {
        let repeat = repeat.unwrap_or(self.config.probe.auto_repeat);
        let target = if apply {
            Some(self.orchestrator.resolve_interface(interface).await?)
        } else {
            None
        };

        let profiles = self.store.load_all().await?;
        let report = self.engine.select(&profiles, repeat).await;

        let applied = match (&report.selection, target) {
            (Selection::Fastest { profile, .. }, Some(target)) => {
                debug!("Applying selected profile '{}' to '{}'", profile, target);
                Some(self.apply_profile(profile, Some(&target), false).await)
            }
            _ => None,
        };

        Ok(AutoSelectReport { report, applied })
    }

    /// Delete a profile unless it is live on the interface
    ///
    /// Without `force`, the interface must be inspectable and must not
    /// carry the profile's servers. With `force`, the check still runs so
    /// the outcome can report `was_active`, but its failure is ignored.
    ///
    /// # Errors
    ///
    /// - `NotFound`: No such profile
    /// - `ProfileActive`: Profile is live and `force` was not set
    pub async fn delete_profile(
        &self,
        name: &str,
        interface: Option<&str>,
        force: bool,
    ) -> Result<DeleteOutcome> {
        let profile = self.find_existing(name).await?;

        let was_active = match self.check_active(&profile, interface).await {
            Ok(Some(active_on)) if !force => {
                return Err(Error::ProfileActive {
                    profile: profile.name,
                    interface: active_on,
                });
            }
            Ok(active_on) => active_on.is_some(),
            Err(e) if force => {
                warn!(
                    "Could not inspect interface state, deleting '{}' anyway: {}",
                    name, e
                );
                false
            }
            Err(e) => return Err(e),
        };

        self.store.delete(&profile.name).await?;

        Ok(DeleteOutcome {
            name: profile.name,
            was_active,
            forced: force,
        })
    }

    /// Interface name if `profile` is live on it
    async fn check_active(
        &self,
        profile: &Profile,
        interface: Option<&str>,
    ) -> Result<Option<String>> {
        let interface = self.orchestrator.resolve_interface(interface).await?;
        let active = self.orchestrator.is_active(profile, &interface).await?;
        Ok(active.then_some(interface))
    }

    async fn find_existing(&self, name: &str) -> Result<Profile> {
        self.store
            .find(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("Profile '{}'", name)))
    }
}
