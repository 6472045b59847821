//! mintfeed-hub: Broadcast Hub for MintFeed.
//!
//! Consumers connect over WebSocket, receive the replay cache (oldest
//! first) and then every newly published event, one JSON document per text
//! frame. A periodic sweep pings every connection and drops those that did
//! not answer the previous ping.

pub mod config;
pub mod error;
pub mod hub;
pub mod server;

pub use config::HubConfig;
pub use error::HubError;
pub use hub::{ConnectionId, ConnectionState, Hub, Outbound, Registration, SweepReport};
pub use server::{spawn_liveness, HubServer};
