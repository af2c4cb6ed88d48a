//! HTTP client for the machine's local API.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{Result, SnapmakerError};
use crate::status::{RawStatus, StatusReport};
use crate::token::PairingApi;

/// Parse a dotted-quad IPv4 machine address.
///
/// Hostnames, empty strings, and malformed octets are rejected; both static
/// configuration and discovery replies funnel through this.
pub fn parse_address(s: &str) -> Result<Ipv4Addr> {
    s.parse()
        .map_err(|_| SnapmakerError::InvalidAddress(s.to_string()))
}

/// Machine connection configuration.
#[derive(Debug, Clone)]
pub struct SnapmakerConfig {
    /// Machine IPv4 address.
    pub ip: Ipv4Addr,
    /// API port (the machine default is 8080).
    pub port: u16,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl SnapmakerConfig {
    /// Configuration with the default request timeout.
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            ip,
            port,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Client for the machine's HTTP API.
pub struct SnapmakerClient {
    config: SnapmakerConfig,
    http: reqwest::Client,
}

impl SnapmakerClient {
    /// Create a client for the given machine.
    pub fn new(config: SnapmakerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Machine address this client talks to.
    pub fn ip(&self) -> Ipv4Addr {
        self.config.ip
    }

    fn connect_url(&self) -> String {
        format!(
            "http://{}:{}/api/v1/connect",
            self.config.ip, self.config.port
        )
    }

    fn status_url(&self) -> String {
        format!(
            "http://{}:{}/api/v1/status",
            self.config.ip, self.config.port
        )
    }

    /// Fetch and normalize the current machine status.
    ///
    /// Never fails past this boundary: any transport, HTTP, or decode
    /// failure yields an `UNAVAILABLE` report carrying the error detail.
    pub async fn status(&self, token: &str) -> StatusReport {
        match self.fetch_status(token).await {
            Ok(raw) => StatusReport::from_raw(raw, self.config.ip),
            Err(e) => {
                tracing::error!(error = %e, "status fetch failed");
                StatusReport::unavailable(e)
            }
        }
    }

    async fn fetch_status(&self, token: &str) -> Result<RawStatus> {
        let body = self
            .http
            .get(self.status_url())
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))?
            .text()
            .await
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| SnapmakerError::MalformedResponse(e.to_string()))
    }
}

impl PairingApi for SnapmakerClient {
    async fn request_token(&self) -> Result<String> {
        self.http
            .post(self.connect_url())
            .send()
            .await
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))?
            .text()
            .await
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))
    }

    async fn confirm_token(&self, token: &str) -> Result<String> {
        self.http
            .post(self.connect_url())
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))?
            .text()
            .await
            .map_err(|e| SnapmakerError::Unreachable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_accepts_dotted_quads() {
        assert_eq!(
            parse_address("172.16.1.5").unwrap(),
            Ipv4Addr::new(172, 16, 1, 5)
        );
        assert_eq!(parse_address("0.0.0.0").unwrap(), Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(
            parse_address("255.255.255.255").unwrap(),
            Ipv4Addr::BROADCAST
        );
    }

    #[test]
    fn test_parse_address_rejects_non_addresses() {
        for bad in ["", "snapmaker.local", "999.1.1.1", "1.2.3", "1.2.3.4.5", "1.2.3.x"] {
            assert!(
                matches!(parse_address(bad), Err(SnapmakerError::InvalidAddress(_))),
                "expected rejection of {bad:?}"
            );
        }
    }

    #[test]
    fn test_api_urls() {
        let client =
            SnapmakerClient::new(SnapmakerConfig::new(Ipv4Addr::new(172, 16, 1, 5), 8080)).unwrap();
        assert_eq!(client.connect_url(), "http://172.16.1.5:8080/api/v1/connect");
        assert_eq!(client.status_url(), "http://172.16.1.5:8080/api/v1/status");
    }
}
