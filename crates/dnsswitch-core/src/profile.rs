//! Profile model and server-list normalization
//!
//! A profile is a named, ordered list of DNS servers. The name is the only
//! identity; the interface is bound transiently for apply/rollback and is
//! never persisted.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;

/// Named group of DNS servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique, non-empty profile name
    pub name: String,
    /// Servers in configuration order (first is primary)
    pub servers: Vec<IpAddr>,
    /// Interface the profile is bound to for one operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl Profile {
    /// Create an unbound profile
    ///
    /// Repeated servers are dropped after their first occurrence.
    pub fn new(name: impl Into<String>, servers: Vec<IpAddr>) -> Self {
        Self {
            name: name.into(),
            servers: dedup_servers(servers),
            interface: None,
        }
    }

    /// Bind the profile to an interface
    pub fn bound_to(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Whether `current` holds exactly this profile's servers (as a set)
    pub fn matches(&self, current: &[IpAddr]) -> bool {
        same_server_set(&self.servers, current)
    }
}

/// Find a profile by exact, case-sensitive name
pub fn find_profile<'a>(profiles: &'a [Profile], name: &str) -> Option<&'a Profile> {
    profiles.iter().find(|p| p.name == name)
}

/// Keep only entries that parse as IP literals, first occurrence only
///
/// Used on everything read from outside: the store file and the live
/// interface settings. Anything else is dropped without error.
pub fn normalize_servers<S: AsRef<str>>(raw: &[S]) -> Vec<IpAddr> {
    dedup_servers(
        raw.iter()
            .filter_map(|entry| entry.as_ref().trim().parse::<IpAddr>().ok()),
    )
}

/// Drop repeated servers, keeping the first occurrence and the order
pub fn dedup_servers(servers: impl IntoIterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut seen = HashSet::new();
    servers.into_iter().filter(|ip| seen.insert(*ip)).collect()
}

/// Strictly validate a server list supplied for writing
///
/// Blank entries are ignored; any other entry that is not an IP literal
/// is rejected. Repeats are dropped. The result must not be empty.
pub fn validate_servers<S: AsRef<str>>(raw: &[S]) -> crate::Result<Vec<IpAddr>> {
    let mut servers = Vec::with_capacity(raw.len());
    for entry in raw {
        let trimmed = entry.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        let ip = trimmed.parse::<IpAddr>().map_err(|_| {
            crate::Error::invalid_argument(format!("'{}' is not a valid IP address", trimmed))
        })?;
        servers.push(ip);
    }

    let servers = dedup_servers(servers);
    if servers.is_empty() {
        return Err(crate::Error::invalid_argument("Server list cannot be empty"));
    }

    Ok(servers)
}

/// Order- and duplicate-independent comparison of two server lists
pub fn same_server_set(a: &[IpAddr], b: &[IpAddr]) -> bool {
    let left: HashSet<&IpAddr> = a.iter().collect();
    let right: HashSet<&IpAddr> = b.iter().collect();
    left == right
}
