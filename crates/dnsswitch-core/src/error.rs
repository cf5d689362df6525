//! Error types for the DNS switcher
//!
//! This module defines all error types used throughout the crate.

use std::net::IpAddr;
use thiserror::Error;

/// Result type alias for switcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DNS switcher
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input (empty name, empty server list, malformed IP)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Profile or interface absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Profile store unreadable or unwritable
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Probe received no response before its deadline
    #[error("Probe of {server} timed out")]
    ProbeTimeout {
        /// Server that was probed
        server: IpAddr,
    },

    /// Probe received an invalid or negative response
    #[error("Probe of {server} failed: {detail}")]
    ProbeProtocolError {
        /// Server that was probed
        server: IpAddr,
        /// What was wrong with the exchange
        detail: String,
    },

    /// Selection found no reachable server in any profile
    #[error("No viable candidate: every probed server failed")]
    NoViableCandidate,

    /// No connected interface could be found
    #[error("No active network interface found")]
    NoActiveInterface,

    /// More than one connected interface, none chosen
    #[error("Ambiguous interface: {} connected ({})", candidates.len(), candidates.join(", "))]
    AmbiguousInterface {
        /// Every connected interface name
        candidates: Vec<String>,
    },

    /// Profile is live on the interface and deletion was not forced
    #[error("Profile '{profile}' is currently active on interface '{interface}'")]
    ProfileActive {
        /// Profile name
        profile: String,
        /// Interface the profile is active on
        interface: String,
    },

    /// A configuration step failed before anything was applied
    #[error("Configuration step failed on '{interface}' ({step}): {cause}")]
    ConfigurationStepFailed {
        /// Interface being configured
        interface: String,
        /// Description of the failing step
        step: String,
        /// Underlying collaborator error
        cause: String,
    },

    /// A later configuration step failed after earlier ones succeeded
    #[error(
        "Partially applied on '{interface}': {} server(s) set before {failed} failed: {cause} (undo {})",
        applied.len(),
        if *rolled_back { "succeeded" } else { "failed" }
    )]
    PartiallyApplied {
        /// Interface being configured
        interface: String,
        /// Servers that were configured before the failure
        applied: Vec<IpAddr>,
        /// Server whose step failed
        failed: IpAddr,
        /// Underlying collaborator error
        cause: String,
        /// Whether restoring dynamic addressing succeeded
        rolled_back: bool,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network configurator (collaborator) errors
    #[error("Network configurator error: {0}")]
    Configurator(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a network configurator error
    pub fn configurator(msg: impl Into<String>) -> Self {
        Self::Configurator(msg.into())
    }

    /// Returns true for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
