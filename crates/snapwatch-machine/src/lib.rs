#![warn(missing_docs)]

//! Snapmaker machine integration for the snapwatch agent.
//!
//! This crate provides:
//! - Machine discovery via UDP broadcast
//! - TCP reachability probing
//! - Pairing-token acquisition and persistence
//! - Status retrieval and display normalization
//!
//! # Example
//!
//! ```ignore
//! use snapwatch_machine::{
//!     discover_async, DiscoveryConfig, SnapmakerClient, SnapmakerConfig, TokenManager, TokenStore,
//! };
//!
//! // Find the machine and pair with it (first contact requires a
//! // touchscreen authorization).
//! let ip = discover_async(DiscoveryConfig::default()).await?;
//! let client = SnapmakerClient::new(SnapmakerConfig::new(ip, 8080))?;
//! let manager = TokenManager::new(&client, TokenStore::new("SMtoken.txt"));
//! let token = manager.load_or_create().await?;
//!
//! // Read the normalized status.
//! let report = client.status(&token).await;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! ```

pub mod client;
pub mod discovery;
pub mod error;
pub mod probe;
pub mod status;
pub mod token;

pub use client::{parse_address, SnapmakerClient, SnapmakerConfig};
pub use discovery::{discover, discover_async, DiscoveryConfig};
pub use error::{Result, SnapmakerError};
pub use probe::is_reachable;
pub use status::{RawStatus, StatusReport, ToolHead};
pub use token::{PairingApi, TokenManager, TokenStore};
