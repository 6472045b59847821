use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("hub is shutting down")]
    ShuttingDown,
}
