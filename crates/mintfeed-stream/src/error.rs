use thiserror::Error;

use mintfeed_core::error::{StreamError, TransportError};
use mintfeed_hub::HubError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that stop the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("ledger connection failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Hub(#[from] HubError),
}
