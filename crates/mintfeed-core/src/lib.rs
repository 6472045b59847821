//! mintfeed-core: data model and pure pipeline stages for MintFeed.
//!
//! # Overview
//!
//! MintFeed watches on-chain program logs, resolves matching transactions,
//! enriches the minted token with off-chain metadata and pushes the result to
//! WebSocket consumers. This crate holds everything that does no I/O of its own:
//!
//! - [`types`]: `LogNotification`, `ResolvedTransaction`, `ExtractedRecord`, `EnrichedEvent`
//! - [`filter`]: the instruction-marker predicate (`any_of` / `exact_set`)
//! - [`extract`]: positional field extraction
//! - [`socials`]: social link parsing of descriptor text
//! - [`cache`]: the bounded replay buffer
//! - [`RpcTransport`] and JSON-RPC wire types shared by the RPC clients
//! - [`policy`]: attempt-budgeted retry

pub mod cache;
pub mod error;
pub mod extract;
pub mod filter;
pub mod policy;
pub mod request;
pub mod socials;
pub mod transport;
pub mod types;

pub use cache::{EventCache, DEFAULT_CACHE_CAPACITY};
pub use error::{EnrichError, ResolveError, StreamError, TransportError};
pub use extract::{extract, AccountLayout};
pub use filter::{LogFilter, MatchMode, INSTRUCTION_PREFIX};
pub use policy::{Backoff, RetryConfig, RetryPolicy};
pub use request::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use socials::extract_links;
pub use transport::RpcTransport;
pub use types::{
    Descriptor, EnrichedEvent, ExtractedRecord, LogNotification, ResolvedTransaction,
    SocialLinks, TokenBalance,
};
