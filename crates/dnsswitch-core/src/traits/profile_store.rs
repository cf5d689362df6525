// # Profile Store Trait
//
// Defines the interface for durable profile storage.
//
// ## Purpose
//
// The profile store is the single source of truth for named server groups.
// It is the only component that touches persisted state.
//
// ## Implementations
//
// - File-based: JSON document replaced atomically on every mutation
// - Memory: for tests and embedding
//
// ## Usage
//
// ```rust,ignore
// use dnsswitch_core::ProfileStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* ProfileStore implementation */;
//
//     store.add("cloudflare", &["1.1.1.1", "1.0.0.1"]).await?;
//     let profile = store.find("cloudflare").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::profile::{Profile, find_profile};

/// Trait for profile store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Read Semantics
///
/// `load_all` fails soft: a missing or unparsable store is an empty set of
/// profiles, not an error. Entries that do not have the expected shape are
/// skipped individually. Only a store that exists but cannot be read is an
/// error.
///
/// # Write Semantics
///
/// `add` and `delete` are read-modify-write cycles and must be serialized
/// against each other. A concurrent reader must only ever observe the state
/// before or after a write, never a partially written store.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load every profile, in stored order
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Profile>)`: All well-formed profiles (possibly empty)
    /// - `Err(Error)`: The store exists but could not be read
    async fn load_all(&self) -> Result<Vec<Profile>, crate::Error>;

    /// Find a profile by exact, case-sensitive name
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Profile))`: The profile
    /// - `Ok(None)`: No profile with that name
    /// - `Err(Error)`: Storage error
    async fn find(&self, name: &str) -> Result<Option<Profile>, crate::Error> {
        let profiles = self.load_all().await?;
        Ok(find_profile(&profiles, name).cloned())
    }

    /// Create a profile, or replace the servers of an existing one
    ///
    /// An existing profile keeps its position in the stored order.
    ///
    /// # Parameters
    ///
    /// - `name`: Profile name (non-empty)
    /// - `servers`: Server addresses as text; every non-blank entry must be an IP literal
    ///
    /// # Returns
    ///
    /// - `Ok(Profile)`: The profile as stored
    /// - `Err(Error::InvalidArgument)`: Empty name, empty or malformed server list
    /// - `Err(Error::Persistence)`: The store could not be written
    async fn add(&self, name: &str, servers: &[String]) -> Result<Profile, crate::Error>;

    /// Delete a profile
    ///
    /// Deleting a profile that does not exist is an error, so callers can
    /// tell "nothing happened" apart from "removed".
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Profile removed
    /// - `Err(Error::NotFound)`: No profile with that name
    /// - `Err(Error::Persistence)`: The store could not be written
    async fn delete(&self, name: &str) -> Result<(), crate::Error>;
}

/// Shared argument check for `ProfileStore::add` implementations
pub(crate) fn validate_add(
    name: &str,
    servers: &[String],
) -> Result<Vec<std::net::IpAddr>, crate::Error> {
    if name.trim().is_empty() {
        return Err(crate::Error::invalid_argument("Profile name cannot be empty"));
    }
    crate::profile::validate_servers(servers)
}
