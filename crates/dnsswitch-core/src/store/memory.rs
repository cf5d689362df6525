// # Memory Profile Store
//
// In-memory implementation of ProfileStore.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Useful for
// tests and for embedding the switcher where profiles come from elsewhere.
//
// ## Crash Behavior
//
// - All profiles are lost on restart/crash
// - No recovery possible (state is in-memory only)

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::profile::Profile;
use crate::traits::profile_store::{ProfileStore, validate_add};

/// In-memory profile store implementation
///
/// Profiles are kept in a `Vec` so insertion order is preserved for
/// deterministic selection tie-breaks.
///
/// # Example
///
/// ```rust,no_run
/// use dnsswitch_core::store::MemoryProfileStore;
/// use dnsswitch_core::traits::ProfileStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryProfileStore::new();
///
///     store.add("google", &["8.8.8.8".to_string(), "8.8.4.4".to_string()]).await?;
///     assert_eq!(store.len().await, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    inner: Arc<RwLock<Vec<Profile>>>,
}

impl MemoryProfileStore {
    /// Create a new empty memory profile store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `profiles`
    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(profiles)),
        }
    }

    /// Get the number of profiles in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load_all(&self) -> Result<Vec<Profile>, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn add(&self, name: &str, servers: &[String]) -> Result<Profile, Error> {
        let servers = validate_add(name, servers)?;
        let profile = Profile::new(name, servers);

        let mut guard = self.inner.write().await;
        match guard.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.servers = profile.servers.clone(),
            None => guard.push(profile.clone()),
        }

        Ok(profile)
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let index = guard
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::not_found(format!("Profile '{}' not found", name)))?;
        guard.remove(index);
        Ok(())
    }
}
