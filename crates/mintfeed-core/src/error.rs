//! Error types shared across the ingestion pipeline.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur during an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, non-2xx status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The background task owning the connection is gone.
    #[error("transport closed")]
    Closed,

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is transient and the call may be repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. }
        )
    }
}

/// Failure to turn a signature into a [`ResolvedTransaction`](crate::types::ResolvedTransaction).
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The node never returned the transaction within the attempt budget.
    #[error("transaction {signature} not found after {attempts} attempts")]
    NotFound { signature: String, attempts: u32 },

    /// The node returned a payload that does not look like a transaction.
    #[error("malformed transaction {signature}: {reason}")]
    Malformed { signature: String, reason: String },
}

impl ResolveError {
    pub fn signature(&self) -> &str {
        match self {
            Self::NotFound { signature, .. } | Self::Malformed { signature, .. } => signature,
        }
    }
}

/// Failure to attach off-chain metadata to a mint.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("metadata unavailable for mint {mint}: {reason}")]
    MetadataUnavailable { mint: String, reason: String },
}

/// Errors raised by the ingestion source. These are fatal for the process.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("subscription to {program} failed: {reason}")]
    SubscriptionFailed { program: String, reason: String },

    #[error("subscription to {program} closed")]
    SubscriptionClosed { program: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_signature_and_attempts() {
        let err = ResolveError::NotFound {
            signature: "5sig".into(),
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("5sig"));
        assert!(msg.contains('3'));
        assert_eq!(err.signature(), "5sig");
    }

    #[test]
    fn retryable_classification() {
        assert!(TransportError::Http("reset".into()).is_retryable());
        assert!(TransportError::Timeout { ms: 10 }.is_retryable());
        assert!(!TransportError::Closed.is_retryable());
        let rpc = TransportError::Rpc(JsonRpcError {
            code: -32009,
            message: "slot skipped".into(),
            data: None,
        });
        assert!(!rpc.is_retryable());
    }
}
