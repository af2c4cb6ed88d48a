//! snapwatch agent — polls a Snapmaker machine and forwards its status.
//!
//! Runs one best-effort poll-and-forward cycle per invocation, or a
//! periodic loop when an interval is configured (for running under a
//! container supervisor). Every option is also an environment variable so
//! the agent can be configured entirely from a container definition.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snapwatch_machine::{
    discover_async, is_reachable, parse_address, DiscoveryConfig, SnapmakerClient, SnapmakerConfig,
    StatusReport, TokenManager, TokenStore,
};
use snapwatch_sink::{Dispatcher, MqttSink, MqttSinkConfig, Sink, WebhookSink};

#[derive(Parser, Debug)]
#[command(name = "snapwatch")]
#[command(about = "Snapmaker status polling agent", version)]
struct Cli {
    /// Machine IPv4 address (discovered via UDP broadcast when unset)
    #[arg(long, env = "SM_IP")]
    ip: Option<String>,

    /// Machine API port
    #[arg(long, env = "SM_PORT", default_value_t = 8080)]
    port: u16,

    /// Pairing token override (bypasses the token file)
    #[arg(long, env = "SM_TOKEN")]
    token: Option<String>,

    /// Token file path
    #[arg(long, env = "SM_TOKEN_FILE", default_value = "SMtoken.txt")]
    token_file: PathBuf,

    /// Webhook receiver URL (takes precedence over MQTT)
    #[arg(long, env = "WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER")]
    mqtt_broker: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    /// MQTT topic
    #[arg(long, env = "MQTT_TOPIC", default_value = "snapmaker/status")]
    mqtt_topic: String,

    /// MQTT username
    #[arg(long, env = "MQTT_USER")]
    mqtt_user: Option<String>,

    /// MQTT password
    #[arg(long, env = "MQTT_PASSWORD")]
    mqtt_password: Option<String>,

    /// Poll repeatedly with this many seconds between cycles
    #[arg(long, env = "SM_INTERVAL")]
    interval: Option<u64>,

    /// Discovery reply timeout in milliseconds
    #[arg(long, env = "SM_DISCOVER_TIMEOUT_MS", default_value_t = 1_000)]
    discover_timeout_ms: u64,

    /// Discovery attempts before giving up
    #[arg(long, env = "SM_DISCOVER_RETRIES", default_value_t = 5)]
    discover_retries: u32,

    /// Reachability probe timeout in milliseconds
    #[arg(long, env = "SM_PROBE_TIMEOUT_MS", default_value_t = 1_000)]
    probe_timeout_ms: u64,

    /// Reachability attempts before the cycle fails
    #[arg(long, env = "SM_PROBE_RETRIES", default_value_t = 5)]
    probe_retries: u32,

    /// Delay unit between reachability attempts in seconds (the n-th retry
    /// waits n times this)
    #[arg(long, env = "SM_PROBE_DELAY_SECS", default_value_t = 60)]
    probe_delay_secs: u64,

    /// Wait between pairing attempts in seconds
    #[arg(long, env = "SM_BACKOFF_SECS", default_value_t = 20)]
    backoff_secs: u64,

    /// Wait for touchscreen authorization in seconds
    #[arg(long, env = "SM_SETTLE_SECS", default_value_t = 10)]
    settle_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let dispatcher = Dispatcher::new(build_sink(&cli)?);

    match cli.interval {
        Some(secs) => {
            // Supervised mode: a failed cycle never takes the process down.
            loop {
                if let Err(e) = run_cycle(&cli, &dispatcher).await {
                    tracing::error!(error = %format!("{e:#}"), "poll cycle failed");
                }
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
        }
        None => run_cycle(&cli, &dispatcher).await,
    }
}

/// Select the active sink: webhook first, then MQTT, else none.
///
/// A malformed webhook URL is a configuration error and fails the process
/// before the first cycle.
fn build_sink(cli: &Cli) -> Result<Option<Sink>> {
    if let Some(url) = &cli.webhook_url {
        let webhook = WebhookSink::new(url).context("webhook configuration")?;
        return Ok(Some(Sink::Webhook(webhook)));
    }

    if let Some(host) = &cli.mqtt_broker {
        let mut config = MqttSinkConfig::new(host.clone(), cli.mqtt_port, cli.mqtt_topic.clone());
        if let Some(user) = &cli.mqtt_user {
            config.credentials = Some((
                user.clone(),
                cli.mqtt_password.clone().unwrap_or_default(),
            ));
        }
        return Ok(Some(Sink::Mqtt(MqttSink::new(config))));
    }

    Ok(None)
}

/// One poll-and-forward cycle: discover, probe, pair, fetch, dispatch.
async fn run_cycle(cli: &Cli, dispatcher: &Dispatcher) -> Result<()> {
    let ip = match &cli.ip {
        Some(configured) => parse_address(configured)
            .with_context(|| format!("configured machine address {configured:?}"))?,
        None => {
            tracing::info!("no machine address set, discovering");
            let config = DiscoveryConfig {
                timeout: Duration::from_millis(cli.discover_timeout_ms),
                attempts: cli.discover_retries,
                ..DiscoveryConfig::default()
            };
            discover_async(config).await.context("machine discovery")?
        }
    };

    let addr = SocketAddr::from((ip, cli.port));
    let probe_timeout = Duration::from_millis(cli.probe_timeout_ms);
    let mut attempt = 0;
    while !is_reachable(addr, probe_timeout).await {
        tracing::warn!(%addr, attempt, "machine not reachable");
        dispatcher
            .dispatch(&StatusReport::unavailable("machine not reachable"))
            .await;
        attempt += 1;
        if attempt >= cli.probe_retries {
            anyhow::bail!("machine at {addr} not reachable after {attempt} attempts");
        }
        tokio::time::sleep(Duration::from_secs(
            u64::from(attempt) * cli.probe_delay_secs,
        ))
        .await;
    }

    let client = SnapmakerClient::new(SnapmakerConfig::new(ip, cli.port))?;
    let store = TokenStore::new(cli.token_file.clone());
    let manager = TokenManager::new(&client, store)
        .with_override(cli.token.clone())
        .with_intervals(
            Duration::from_secs(cli.backoff_secs),
            Duration::from_secs(cli.settle_secs),
        );
    let token = manager.load_or_create().await.context("token acquisition")?;

    tracing::info!("reading machine status");
    let report = client.status(&token).await;
    dispatcher.dispatch(&report).await;

    Ok(())
}
