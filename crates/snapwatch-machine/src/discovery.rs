//! Machine discovery via UDP broadcast.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use crate::client::parse_address;
use crate::error::{Result, SnapmakerError};

/// Probe payload understood by the machine's discovery service.
const PROBE: &[u8] = b"discover";

/// Reply buffer size.
const BUFFER_SIZE: usize = 1024;

/// Settings for the UDP discovery probe.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Address the probe datagram is sent to.
    pub broadcast_addr: Ipv4Addr,
    /// Discovery port the machine listens on.
    pub port: u16,
    /// Per-attempt reply timeout.
    pub timeout: Duration,
    /// Total attempts before giving up.
    pub attempts: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            broadcast_addr: Ipv4Addr::BROADCAST,
            port: 20054,
            timeout: Duration::from_secs(1),
            attempts: 5,
        }
    }
}

/// Discover a machine on the local network.
///
/// Broadcasts the probe datagram and waits up to the configured timeout for
/// a reply, retrying up to the attempt ceiling. Exhausting every attempt is
/// terminal for the run; the caller must not fall back to polling.
pub fn discover(config: &DiscoveryConfig) -> Result<Ipv4Addr> {
    let socket =
        UdpSocket::bind("0.0.0.0:0").map_err(|e| SnapmakerError::Discovery(e.to_string()))?;
    socket
        .set_broadcast(true)
        .map_err(|e| SnapmakerError::Discovery(e.to_string()))?;
    socket
        .set_read_timeout(Some(config.timeout))
        .map_err(|e| SnapmakerError::Discovery(e.to_string()))?;

    let target = SocketAddr::from((config.broadcast_addr, config.port));
    let mut buf = [0u8; BUFFER_SIZE];

    for attempt in 1..=config.attempts {
        socket
            .send_to(PROBE, target)
            .map_err(|e| SnapmakerError::Discovery(e.to_string()))?;

        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                let reply = String::from_utf8_lossy(&buf[..len]);
                let address = parse_reply(&reply)?;
                tracing::info!(%address, peer = %peer.ip(), "machine discovered");
                return Ok(address);
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                tracing::debug!(attempt, "no discovery reply");
            }
            Err(e) => return Err(SnapmakerError::Discovery(e.to_string())),
        }
    }

    Err(SnapmakerError::DiscoveryExhausted(config.attempts))
}

/// Discover asynchronously (runs the blocking probe on a worker thread).
pub async fn discover_async(config: DiscoveryConfig) -> Result<Ipv4Addr> {
    tokio::task::spawn_blocking(move || discover(&config))
        .await
        .map_err(|e| SnapmakerError::Discovery(e.to_string()))?
}

/// Extract the machine address from a discovery reply.
///
/// The reply is a `|`-delimited record whose first field is the address,
/// sometimes wrapped in stray quote characters.
fn parse_reply(reply: &str) -> Result<Ipv4Addr> {
    let first = reply.split('|').next().unwrap_or("");
    let cleaned: String = first.chars().filter(|c| *c != '\'' && *c != '"').collect();
    parse_address(cleaned.trim())
}
