#![warn(missing_docs)]

//! Downstream sinks for snapwatch status documents.
//!
//! A normalized status document is forwarded to exactly one configured
//! sink: an HTTP webhook or an MQTT topic. Dispatch is best-effort — a
//! delivery failure is logged and swallowed, never propagated back into
//! the polling cycle.

pub mod error;
pub mod mqtt;
pub mod webhook;

pub use error::{Result, SinkError};
pub use mqtt::{MqttSink, MqttSinkConfig};
pub use webhook::WebhookSink;

use serde::Serialize;

/// A configured downstream destination.
pub enum Sink {
    /// HTTP webhook receiver.
    Webhook(WebhookSink),
    /// MQTT broker topic.
    Mqtt(MqttSink),
}

/// Best-effort forwarder for status documents.
pub struct Dispatcher {
    sink: Option<Sink>,
}

impl Dispatcher {
    /// Dispatcher for `sink`; `None` disables forwarding entirely.
    pub fn new(sink: Option<Sink>) -> Self {
        Self { sink }
    }

    /// Forward `document` to the configured sink, swallowing any failure.
    ///
    /// There is no caller left to react to a delivery failure within the
    /// current cycle, so errors only reach the log.
    pub async fn dispatch<T: Serialize>(&self, document: &T) {
        match &self.sink {
            Some(Sink::Webhook(webhook)) => match webhook.send(document).await {
                Ok(()) => tracing::info!(url = %webhook.url(), "status sent to webhook"),
                Err(e) => tracing::error!(error = %e, "webhook dispatch failed"),
            },
            Some(Sink::Mqtt(mqtt)) => match mqtt.publish(document).await {
                Ok(()) => tracing::info!(topic = mqtt.topic(), "status published"),
                Err(e) => tracing::error!(error = %e, "MQTT dispatch failed"),
            },
            None => tracing::debug!("no sink configured, dropping status"),
        }
    }
}
