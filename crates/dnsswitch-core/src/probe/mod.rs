//! UDP latency prober
//!
//! Sends one recursive A-record query to a server and times the exchange.
//! Messages are built and parsed with the `domain` crate.

use async_trait::async_trait;
use domain::base::iana::Rtype;
use domain::base::message::Message;
use domain::base::message_builder::MessageBuilder;
use domain::base::name::Name;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::traits::{LatencyProber, ProbeOutcome, ProbeSample};

/// Largest response we read; anything longer is truncated by the kernel
const MAX_RESPONSE_SIZE: usize = 4096;

/// Prober that queries servers over UDP
#[derive(Debug, Clone)]
pub struct UdpLatencyProber {
    port: u16,
}

impl UdpLatencyProber {
    /// Create a prober targeting `port` on every server
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Create a prober from probe settings
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.port)
    }

    /// Build the query message for `test_domain`
    ///
    /// Returns the message ID together with the wire-format message.
    fn build_query(test_domain: &str) -> Result<(u16, Vec<u8>), String> {
        let mut fqdn = test_domain.trim().to_string();
        if !fqdn.ends_with('.') {
            fqdn.push('.');
        }

        let name = Name::<Vec<u8>>::vec_from_str(&fqdn)
            .map_err(|e| format!("invalid test domain '{}': {}", test_domain, e))?;

        let mut builder = MessageBuilder::new_vec();
        builder.header_mut().set_rd(true);
        builder.header_mut().set_random_id();
        let id = builder.header().id();

        let mut question = builder.question();
        question
            .push((name, Rtype::A))
            .map_err(|e| format!("failed to build query: {}", e))?;

        Ok((id, question.finish()))
    }

    /// Classify a received response
    fn classify(response: &[u8], query_id: u16) -> ProbeOutcome {
        let message = match Message::from_octets(response) {
            Ok(message) => message,
            Err(_) => return ProbeOutcome::ProtocolError("response too short".to_string()),
        };

        let header = message.header();
        if !header.qr() || header.id() != query_id {
            return ProbeOutcome::ProtocolError("response does not match query".to_string());
        }

        let rcode = header.rcode();
        if rcode.to_int() != 0 {
            return ProbeOutcome::ProtocolError(format!("no answer or rcode {}", rcode));
        }

        if message.header_counts().ancount() == 0 {
            return ProbeOutcome::ProtocolError("no answer records".to_string());
        }

        ProbeOutcome::Success
    }

    /// Receive until a datagram carrying `query_id` arrives
    async fn receive_response(socket: &UdpSocket, query_id: u16) -> std::io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; MAX_RESPONSE_SIZE];
        loop {
            let len = socket.recv(&mut buffer).await?;
            if len >= 2 && u16::from_be_bytes([buffer[0], buffer[1]]) == query_id {
                return Ok(buffer[..len].to_vec());
            }
            debug!("Discarding stray datagram of {} bytes", len);
        }
    }

    /// Open a UDP socket connected to `server`
    async fn connect(&self, server: IpAddr) -> std::io::Result<UdpSocket> {
        let local: SocketAddr = match server {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect((server, self.port)).await?;
        Ok(socket)
    }
}

impl Default for UdpLatencyProber {
    fn default() -> Self {
        Self::new(53)
    }
}

#[async_trait]
impl LatencyProber for UdpLatencyProber {
    async fn measure(&self, server: IpAddr, test_domain: &str, timeout: Duration) -> ProbeSample {
        let (query_id, query) = match Self::build_query(test_domain) {
            Ok(query) => query,
            Err(detail) => {
                return ProbeSample::new(server, Duration::ZERO, ProbeOutcome::ProtocolError(detail));
            }
        };

        let socket = match self.connect(server).await {
            Ok(socket) => socket,
            Err(e) => {
                return ProbeSample::new(
                    server,
                    Duration::ZERO,
                    ProbeOutcome::ProtocolError(format!("socket error: {}", e)),
                );
            }
        };

        let start = Instant::now();
        let exchange = async {
            socket.send(&query).await?;
            Self::receive_response(&socket, query_id).await
        };

        let outcome = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(response)) => Self::classify(&response, query_id),
            Ok(Err(e)) => ProbeOutcome::ProtocolError(format!("exchange failed: {}", e)),
            Err(_) => ProbeOutcome::Timeout,
        };
        let rtt = start.elapsed();

        debug!("Probe {} -> {:?} in {:?}", server, outcome, rtt);
        ProbeSample::new(server, rtt, outcome)
    }
}
