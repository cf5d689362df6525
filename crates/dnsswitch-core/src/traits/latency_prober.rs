// # Latency Prober Trait
//
// Defines the interface for measuring one DNS round trip.
//
// ## Implementations
//
// - UDP/53 A-record query: `probe::UdpLatencyProber`
// - Scripted probers in tests
//
// A prober is stateless. It never retries and never aggregates; repeat
// counts and averaging belong to the `SelectionEngine`.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Classification of one probe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Response in time, NOERROR, at least one answer
    Success,
    /// No response before the deadline
    Timeout,
    /// Response was invalid or negative, or the exchange could not be made
    ProtocolError(String),
}

/// Result of a single probe attempt
///
/// The elapsed time is always recorded, including for failed attempts.
/// Callers must only average samples whose outcome is `Success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSample {
    /// Server that was probed
    pub server: IpAddr,
    /// Time from just before send until receipt or failure
    pub rtt: Duration,
    /// Outcome of the attempt
    pub outcome: ProbeOutcome,
}

impl ProbeSample {
    /// Create a sample
    pub fn new(server: IpAddr, rtt: Duration, outcome: ProbeOutcome) -> Self {
        Self {
            server,
            rtt,
            outcome,
        }
    }

    /// Whether this sample counts towards an average
    pub fn is_success(&self) -> bool {
        self.outcome == ProbeOutcome::Success
    }

    /// The RTT of a successful sample, or the matching probe error
    pub fn rtt_or_error(&self) -> Result<Duration, crate::Error> {
        match &self.outcome {
            ProbeOutcome::Success => Ok(self.rtt),
            ProbeOutcome::Timeout => Err(crate::Error::ProbeTimeout {
                server: self.server,
            }),
            ProbeOutcome::ProtocolError(detail) => Err(crate::Error::ProbeProtocolError {
                server: self.server,
                detail: detail.clone(),
            }),
        }
    }
}

/// Trait for latency prober implementations
///
/// # Thread Safety
///
/// Probers are shared across concurrently running probe tasks and must be
/// `Send + Sync`.
#[async_trait]
pub trait LatencyProber: Send + Sync {
    /// Measure one round trip to `server`
    ///
    /// # Parameters
    ///
    /// - `server`: DNS server to query
    /// - `test_domain`: Name to ask for (A record)
    /// - `timeout`: Deadline for the whole exchange
    ///
    /// # Returns
    ///
    /// A sample; failures are expressed in `ProbeSample::outcome`, never as
    /// an error, so one bad server cannot abort a selection.
    async fn measure(&self, server: IpAddr, test_domain: &str, timeout: Duration) -> ProbeSample;
}
