// # Network Configurator Trait
//
// Defines the boundary to the operating system's interface DNS settings.
//
// ## Implementations
//
// - Windows `netsh`: `dnsswitch-netsh` crate
// - Recording doubles in tests
//
// ## Ownership
//
// The live DNS configuration is shared with every other actor on the host.
// Anything read through this trait may be stale by the time it is written
// back; callers treat reads as advisory.

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for network configurator implementations
///
/// Each mutating method is a single OS-level step that either succeeds or
/// fails on its own. Sequencing, idempotency and locking are owned by the
/// `ApplyOrchestrator`, not by implementations.
#[async_trait]
pub trait NetworkConfigurator: Send + Sync {
    /// List connected (usable) interfaces
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<String>)`: At least one interface name
    /// - `Err(Error)`: Listing failed or no interface is connected
    async fn list_interfaces(&self) -> Result<Vec<String>, crate::Error>;

    /// Read the DNS servers currently configured on `interface`
    ///
    /// The result is raw text as reported by the OS; callers normalize it.
    async fn current_dns(&self, interface: &str) -> Result<Vec<String>, crate::Error>;

    /// Set `server` as the only (primary) static DNS server
    async fn set_primary_dns(&self, interface: &str, server: IpAddr) -> Result<(), crate::Error>;

    /// Append `server` as an additional DNS server
    ///
    /// `position` is the zero-based index of the server in the desired
    /// list; the primary is position 0.
    async fn add_dns(
        &self,
        interface: &str,
        server: IpAddr,
        position: usize,
    ) -> Result<(), crate::Error>;

    /// Revert `interface` to dynamically assigned DNS (DHCP)
    async fn set_dynamic_dns(&self, interface: &str) -> Result<(), crate::Error>;

    /// Configure `servers` in order: the first as primary, the rest appended
    ///
    /// Stops at the first failing step.
    async fn set_static_dns(&self, interface: &str, servers: &[IpAddr]) -> Result<(), crate::Error> {
        let (primary, rest) = servers
            .split_first()
            .ok_or_else(|| crate::Error::invalid_argument("No DNS servers provided"))?;
        self.set_primary_dns(interface, *primary).await?;
        for (offset, server) in rest.iter().enumerate() {
            self.add_dns(interface, *server, offset + 1).await?;
        }
        Ok(())
    }

    /// Get the configurator name (for logging/debugging)
    fn configurator_name(&self) -> &'static str;
}
