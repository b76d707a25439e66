//! Rust client for the Russound RIO control protocol
//!
//! RIO is a line-oriented text protocol spoken over TCP (port 9621) by
//! Russound multi-zone audio controllers. This library provides an async
//! client that supports:
//!
//! - Reading and writing zone, source, controller and system variables
//! - Zone actions (power, source selection, volume, keypad events)
//! - Watch subscriptions for unsolicited change notifications
//! - A local cache of every reported variable
//! - Typed events for every variable change
//!
//! # Quick Start
//!
//! ```no_run
//! use russound_rio::{ControllerConfig, RioClient, RioEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ControllerConfig::from_file("config.json")?;
//!     let client = RioClient::new(config)?;
//!     let mut events = client.subscribe();
//!
//!     client.connect().await?;
//!     println!("Firmware: {}", client.version().await?);
//!
//!     // Fires a single `Zones` event once every name is known
//!     client.zone_names().await?;
//!     client.source_names().await?;
//!
//!     client.set_volume(1, 20).await?;
//!     client.watch_all_zones(true).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             RioEvent::Zones { zones, .. } => println!("{} zones", zones.len()),
//!             RioEvent::Zone { zone_id, variable, value, .. } => {
//!                 println!("zone {}: {} = {}", zone_id, variable, value)
//!             }
//!             RioEvent::Close => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Client**: connection lifecycle and the high-level API
//! - **Connection**: the command queue; one command on the wire at a time,
//!   each paired with the next response line
//! - **Protocol**: command encoding
//! - **Parser**: line framing and response decoding
//! - **Cache**: last known variable values
//! - **Watch**: idempotent watch subscriptions
//! - **Mapping**: configured zones and sources (display names, enabled
//!   entries, per-zone source lists) built from the configuration
//!
//! Logging goes through `tracing`; every client logs under its own `rio`
//! span (see [`RioClient::with_span`]).

mod cache;
mod client;
mod config;
mod connection;
mod dispatch;
mod error;
mod mapping;
mod parser;
mod protocol;
mod subscription;
mod types;
mod watch;

// Public exports
pub use cache::{Collection, StateCache};
pub use client::{ConnectionStatus, RioClient};
pub use config::{ControllerConfig, SourceMapping, ZoneMapping};
pub use connection::REQUEST_TIMEOUT;
pub use error::{Result, RioError};
pub use parser::{
    fallback_assignment, parse_assignment, parse_variable_expr, Assignment, LineBuffer,
    ResponseLine, Status, MAX_LINE_LENGTH,
};
pub use protocol::{
    event, source_target, variable_expr, zone_target, Command, Verb, CONTROLLER_VARIABLES,
    DEFAULT_PORT, SOURCE_VARIABLES, ZONE_VARIABLES,
};
pub use subscription::{EventReceiver, RioEvent};
pub use mapping::{configure_sources, configure_zones};
pub use types::{
    ConfiguredSource, ConfiguredZone, ControllerId, EntityKind, EntityRef, SourceId, SourceState,
    WatchItem, ZoneId, ZoneState, UNASSIGNED_SOURCE_NAME,
};
pub use watch::WatchRegistry;
