//! mintfeed-rpc: ledger and metadata access for MintFeed.
//!
//! # Features
//! - HTTP JSON-RPC transport ([`HttpRpcClient`])
//! - WebSocket JSON-RPC transport with auto-reconnect and resubscribe ([`WsRpcClient`])
//! - Transaction Resolver with a fixed-delay attempt budget ([`TransactionResolver`])
//! - Metadata Enricher over a pluggable [`DescriptorSource`]

pub mod http;
pub mod metadata;
pub mod resolver;
pub mod subscriptions;
pub mod ws;

pub use http::{HttpClientConfig, HttpRpcClient};
pub use metadata::{DasDescriptorSource, DescriptorSource, MetadataEnricher};
pub use resolver::{parse_transaction, TransactionResolver};
pub use subscriptions::{SubscriptionId, SubscriptionManager, SubscriptionRequest};
pub use ws::{WsClientConfig, WsRpcClient};
