//! Apply/rollback orchestrator
//!
//! Sequences `NetworkConfigurator` calls for one interface:
//!
//! 1. Read the current servers (unless forced)
//! 2. Skip if they already match the profile as a set
//! 3. Set the primary server, then append the rest in order
//! 4. On a failure after the primary, restore dynamic addressing
//!
//! Operations on the same interface name are serialized; different
//! interfaces proceed independently.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::profile::{Profile, dedup_servers, normalize_servers};
use crate::traits::NetworkConfigurator;

/// Result of a successful apply or rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Servers were written to the interface
    Applied {
        interface: String,
        servers: Vec<IpAddr>,
    },
    /// Interface already had the profile's servers; nothing was changed
    AlreadyActive { interface: String },
    /// Interface was returned to dynamic addressing
    RolledBack { interface: String },
}

impl ApplyOutcome {
    /// Interface the outcome refers to
    pub fn interface(&self) -> &str {
        match self {
            Self::Applied { interface, .. }
            | Self::AlreadyActive { interface }
            | Self::RolledBack { interface } => interface,
        }
    }
}

/// DNS servers currently configured on an interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceDnsState {
    pub interface: String,
    /// Valid IP literals only, in reported order
    pub servers: Vec<IpAddr>,
}

/// Idempotent, per-interface serialized apply and rollback
pub struct ApplyOrchestrator {
    configurator: Arc<dyn NetworkConfigurator>,
    /// One lock per interface name
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ApplyOrchestrator {
    pub fn new(configurator: Arc<dyn NetworkConfigurator>) -> Self {
        Self {
            configurator,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use `requested` if given, otherwise the single connected interface
    ///
    /// # Returns
    ///
    /// - `Err(Error::NoActiveInterface)`: Nothing connected
    /// - `Err(Error::AmbiguousInterface)`: More than one connected
    pub async fn resolve_interface(&self, requested: Option<&str>) -> Result<String> {
        if let Some(name) = requested.map(str::trim).filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }

        let mut interfaces = self.configurator.list_interfaces().await?;
        match interfaces.len() {
            0 => Err(Error::NoActiveInterface),
            1 => Ok(interfaces.remove(0)),
            _ => Err(Error::AmbiguousInterface {
                candidates: interfaces,
            }),
        }
    }

    /// Normalized DNS servers on `interface`
    pub async fn current_dns(&self, interface: &str) -> Result<InterfaceDnsState> {
        let raw = self.configurator.current_dns(interface).await?;
        Ok(InterfaceDnsState {
            interface: interface.to_string(),
            servers: normalize_servers(&raw),
        })
    }

    /// Whether `profile`'s servers are exactly those live on `interface`
    ///
    /// An interface without static servers never counts as active.
    pub async fn is_active(&self, profile: &Profile, interface: &str) -> Result<bool> {
        let state = self.current_dns(interface).await?;
        Ok(!state.servers.is_empty() && profile.matches(&state.servers))
    }

    /// Configure the profile's servers on its bound interface
    ///
    /// Unless `force` is set, the interface is inspected first and left
    /// untouched when it already carries the same server set. A failed
    /// inspection is logged and the apply proceeds.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: No interface bound, or no servers
    /// - `ConfigurationStepFailed`: The primary server could not be set
    /// - `PartiallyApplied`: A later server failed; dynamic addressing was
    ///   restored if possible
    pub async fn apply(&self, profile: &Profile, force: bool) -> Result<ApplyOutcome> {
        let interface = profile
            .interface
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .ok_or_else(|| {
                Error::invalid_argument(format!("Profile '{}' is not bound to an interface", profile.name))
            })?
            .to_string();

        let servers = dedup_servers(profile.servers.iter().copied());
        let (primary, rest) = servers.split_first().ok_or_else(|| {
            Error::invalid_argument(format!("Profile '{}' has no DNS servers", profile.name))
        })?;

        let lock = self.interface_lock(&interface).await;
        let _guard = lock.lock().await;

        if !force {
            match self.current_dns(&interface).await {
                Ok(state) if profile.matches(&state.servers) => {
                    info!(
                        "Profile '{}' already active on '{}', skipping",
                        profile.name, interface
                    );
                    return Ok(ApplyOutcome::AlreadyActive { interface });
                }
                Ok(state) => debug!("'{}' currently has {:?}", interface, state.servers),
                Err(e) => warn!(
                    "Could not read current DNS on '{}', applying anyway: {}",
                    interface, e
                ),
            }
        }

        if let Err(e) = self.configurator.set_primary_dns(&interface, *primary).await {
            return Err(Error::ConfigurationStepFailed {
                interface,
                step: format!("set primary DNS {}", primary),
                cause: e.to_string(),
            });
        }

        let mut applied = vec![*primary];
        for (offset, server) in rest.iter().enumerate() {
            if let Err(e) = self.configurator.add_dns(&interface, *server, offset + 1).await {
                warn!(
                    "Adding {} on '{}' failed, restoring dynamic DNS: {}",
                    server, interface, e
                );
                let rolled_back = match self.configurator.set_dynamic_dns(&interface).await {
                    Ok(()) => true,
                    Err(undo) => {
                        warn!("Restoring dynamic DNS on '{}' failed: {}", interface, undo);
                        false
                    }
                };
                return Err(Error::PartiallyApplied {
                    interface,
                    applied,
                    failed: *server,
                    cause: e.to_string(),
                    rolled_back,
                });
            }
            applied.push(*server);
        }

        info!(
            "Applied profile '{}' to '{}' via {}",
            profile.name,
            interface,
            self.configurator.configurator_name()
        );
        Ok(ApplyOutcome::Applied {
            interface,
            servers: applied,
        })
    }

    /// Restore dynamic addressing on `interface` (or the single connected one)
    pub async fn rollback(&self, interface: Option<&str>) -> Result<ApplyOutcome> {
        let interface = self.resolve_interface(interface).await?;

        let lock = self.interface_lock(&interface).await;
        let _guard = lock.lock().await;

        self.configurator
            .set_dynamic_dns(&interface)
            .await
            .map_err(|e| Error::ConfigurationStepFailed {
                interface: interface.clone(),
                step: "restore dynamic DNS".to_string(),
                cause: e.to_string(),
            })?;

        info!("Rolled back '{}' to dynamic DNS", interface);
        Ok(ApplyOutcome::RolledBack { interface })
    }

    async fn interface_lock(&self, interface: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(interface.to_string()).or_default())
    }
}
