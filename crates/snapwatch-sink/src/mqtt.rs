//! One-shot MQTT publishing.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;

use crate::error::{Result, SinkError};

/// MQTT broker configuration.
#[derive(Debug, Clone)]
pub struct MqttSinkConfig {
    /// Broker hostname or address.
    pub host: String,
    /// Broker port (default 1883).
    pub port: u16,
    /// Topic the document is published to.
    pub topic: String,
    /// Optional username/password pair.
    pub credentials: Option<(String, String)>,
    /// Connect and publish timeout.
    pub timeout: Duration,
}

impl MqttSinkConfig {
    /// Configuration with the default timeout and no credentials.
    pub fn new(host: impl Into<String>, port: u16, topic: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            topic: topic.into(),
            credentials: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// MQTT sink.
///
/// Each publish opens a fresh broker connection and tears it down
/// afterwards; connections are never pooled across cycles.
pub struct MqttSink {
    config: MqttSinkConfig,
}

impl MqttSink {
    /// Create a sink for the given broker.
    pub fn new(config: MqttSinkConfig) -> Self {
        Self { config }
    }

    /// Topic this sink publishes to.
    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// Serialize `document` and publish it: connect, publish, disconnect.
    pub async fn publish<T: Serialize>(&self, document: &T) -> Result<()> {
        let payload =
            serde_json::to_vec(document).map_err(|e| SinkError::Serialize(e.to_string()))?;

        let client_id = format!("snapwatch_{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);
        if let Some((user, password)) = &self.config.credentials {
            options.set_credentials(user, password);
        }

        let (client, mut event_loop) = AsyncClient::new(options, 10);

        // Wait for the broker to acknowledge the connection.
        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > self.config.timeout {
                return Err(SinkError::Timeout("connection timeout".into()));
            }

            match tokio::time::timeout(Duration::from_millis(500), event_loop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => break,
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(SinkError::Mqtt(e.to_string())),
                Err(_) => continue,
            }
        }

        client
            .publish(&self.config.topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SinkError::Mqtt(e.to_string()))?;

        // Drive the event loop until the broker acknowledges the publish.
        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > self.config.timeout {
                return Err(SinkError::Timeout("publish timeout".into()));
            }

            match tokio::time::timeout(Duration::from_millis(500), event_loop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::PubAck(_)))) => break,
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(SinkError::Mqtt(e.to_string())),
                Err(_) => continue,
            }
        }

        client
            .disconnect()
            .await
            .map_err(|e| SinkError::Mqtt(e.to_string()))?;

        // Flush the disconnect before dropping the connection.
        loop {
            match tokio::time::timeout(Duration::from_millis(500), event_loop.poll()).await {
                Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(_)) => continue,
            }
        }

        Ok(())
    }
}
