// # dnsswitch-core
//
// Core library for the DNS profile switcher.
//
// ## Architecture Overview
//
// This library provides everything needed to keep named groups of DNS
// servers, measure them, and switch an interface over to one of them:
// - **ProfileStore**: Trait for durable profile CRUD (file and memory backends)
// - **LatencyProber**: Trait for a single round-trip measurement against one server
// - **NetworkConfigurator**: Trait for reading/writing live interface DNS settings
// - **SelectionEngine**: Concurrent probing and deterministic aggregation
// - **ApplyOrchestrator**: Idempotent, per-interface serialized apply/rollback
// - **DnsSwitcher**: Caller-layer facade mapping one method to one command
//
// ## Design Principles
//
// 1. **Separation of Concerns**: OS command syntax lives outside the core
// 2. **Library-First**: Every command is usable without the CLI
// 3. **Explicit Configuration**: No process-wide state; config is passed in
// 4. **Idempotency**: Apply skips when the interface already matches
// 5. **Crash Safety**: The profile file is only ever replaced atomically

pub mod traits;
pub mod profile;
pub mod store;
pub mod probe;
pub mod selection;
pub mod orchestrator;
pub mod switcher;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{LatencyProber, NetworkConfigurator, ProfileStore};
pub use profile::Profile;
pub use store::{FileProfileStore, MemoryProfileStore};
pub use probe::UdpLatencyProber;
pub use selection::{SelectionEngine, SelectionReport, Selection};
pub use orchestrator::{ApplyOrchestrator, ApplyOutcome};
pub use switcher::DnsSwitcher;
pub use config::{ProbeConfig, SwitcherConfig};
pub use error::{Error, Result};
