//! Reliability policies applied around RPC calls.

pub mod retry;

pub use retry::{Backoff, RetryConfig, RetryPolicy};
