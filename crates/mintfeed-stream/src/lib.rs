//! # mintfeed-stream
//!
//! Ingestion side of MintFeed: program log listeners, the resolver worker
//! pool and the [`Engine`] that wires them to the broadcast hub.
//!
//! ## Architecture
//! ```text
//! SolanaLogListener (per watched program)
//!       │  LogFilter::matches
//!       ▼
//! Job queue ──► Pipeline::process (resolve → extract → enrich)
//!                     │
//!                     ▼
//!               Hub::publish ──► replay cache + WebSocket consumers
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod listener;
pub mod ws_listener;

pub use config::{MetadataConfig, ResolverConfig, RpcConfig, StreamConfig, WatchConfig};
pub use engine::{Engine, EngineMetrics, Job, Outcome, Pipeline};
pub use error::{ConfigError, EngineError};
pub use listener::{LogListener, LogStream};
pub use ws_listener::SolanaLogListener;
