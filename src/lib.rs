//! Rust library for controlling Teenage Engineering OD-11 networked speakers
//!
//! This library speaks the OD-11's local WebSocket protocol. It supports:
//!
//! - The two-step join handshake (`global_join` then `group_join`)
//! - A live snapshot of group state mirrored from pushed updates
//! - Volume control (relative nudges and absolute targets)
//! - Input source switching, with fuzzy name resolution
//! - Application-level keepalive pings with round-trip measurement
//! - Real-time state update subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use od11::{ConnectOptions, Od11Client};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Dial the speaker and wait for the handshake to finish
//!     let mut client = Od11Client::connect(ConnectOptions::for_host("10.0.0.42")).await?;
//!     client.wait_until_ready(Duration::from_secs(10)).await?;
//!
//!     // Inspect the mirrored state
//!     let snapshot = client.snapshot();
//!     println!("volume: {:?}, source: {:?}", snapshot.volume, snapshot.source_name());
//!
//!     // Switch to Bluetooth by name and settle the volume
//!     let source = client.resolve_source("bt")?;
//!     client.set_input(source)?;
//!     client.set_volume_absolute(35)?;
//!
//!     // Watch updates as the speaker confirms them
//!     let mut updates = client.subscribe();
//!     while let Ok(update) = updates.recv().await {
//!         println!("State update: {:?}", update);
//!         break; // Just show one update
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Client**: Connection lifecycle and the public control API
//! - **Session**: Handshake state machine and the device snapshot
//! - **Connection**: Low-level WebSocket transport tasks
//! - **Protocol**: JSON message structures
//! - **Sources**: Fuzzy input source name resolution
//! - **Types**: Connection and join options, domain aliases

mod client;
mod connection;
mod error;
mod keepalive;
mod protocol;
mod session;
mod sources;
mod state;
mod subscription;
mod types;

// Public exports
pub use client::Od11Client;
pub use error::{Od11Error, Result};
pub use sources::resolve_source;
pub use state::{DeviceSnapshot, SessionPhase};
pub use subscription::{StateReceiver, StateUpdate};
pub use types::{
    ConnectOptions, JoinOptions, SessionId, SourceId, Volume, DEFAULT_COLOR_INDEX,
    DEFAULT_KEEPALIVE, DEFAULT_NAME, DEFAULT_PROTOCOL_MAJOR, DEFAULT_PROTOCOL_MINOR,
    DEFAULT_REALTIME, DEFAULT_UID, DEFAULT_WS_PATH,
};
