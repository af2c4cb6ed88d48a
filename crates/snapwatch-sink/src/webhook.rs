//! Webhook delivery.

use serde::Serialize;
use url::Url;

use crate::error::{Result, SinkError};

/// HTTP webhook sink.
pub struct WebhookSink {
    url: Url,
    client: reqwest::Client,
}

impl WebhookSink {
    /// Create a sink for `url`.
    ///
    /// The URL must parse with an http or https scheme and a host; anything
    /// else is rejected here, before the first send.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| SinkError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SinkError::InvalidUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        if !url.has_host() {
            return Err(SinkError::InvalidUrl(format!("missing host: {url}")));
        }

        // Receivers are typically self-hosted automation endpoints with
        // self-signed certificates.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| SinkError::Webhook(e.to_string()))?;

        Ok(Self { url, client })
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// POST the JSON-serialized document.
    pub async fn send<T: Serialize>(&self, document: &T) -> Result<()> {
        self.client
            .post(self.url.clone())
            .json(document)
            .send()
            .await
            .map_err(|e| SinkError::Webhook(e.to_string()))?
            .error_for_status()
            .map_err(|e| SinkError::Webhook(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_and_https_urls() {
        assert!(WebhookSink::new("https://example.com/api/webhook/abc").is_ok());
        assert!(WebhookSink::new("http://10.0.0.2:8123/api/webhook/abc").is_ok());
    }

    #[test]
    fn test_rejects_malformed_urls() {
        for bad in ["", "not a url", "webhook-id", "file:///tmp/hook", "http://"] {
            assert!(
                matches!(WebhookSink::new(bad), Err(SinkError::InvalidUrl(_))),
                "expected rejection of {bad:?}"
            );
        }
    }
}
