//! TCP reachability probe.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

/// Check whether `addr` accepts TCP connections within `timeout`.
///
/// Refusal, timeout, and any other error all read as unreachable; the
/// caller owns the retry policy.
pub async fn is_reachable(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}
