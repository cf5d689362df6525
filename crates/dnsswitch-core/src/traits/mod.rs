//! Core traits for the DNS switcher
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ProfileStore`]: Durable profile CRUD
//! - [`LatencyProber`]: One round-trip measurement against one server
//! - [`NetworkConfigurator`]: Read and write live interface DNS settings

pub mod profile_store;
pub mod latency_prober;
pub mod network_configurator;

pub use profile_store::ProfileStore;
pub use latency_prober::{LatencyProber, ProbeOutcome, ProbeSample};
pub use network_configurator::NetworkConfigurator;
