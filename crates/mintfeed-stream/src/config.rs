//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use mintfeed_core::extract::AccountLayout;
use mintfeed_core::filter::{LogFilter, INSTRUCTION_PREFIX};
use mintfeed_core::policy::RetryPolicy;
use mintfeed_hub::HubConfig;

use crate::error::ConfigError;

/// AMM v4 program whose `initialize2` creates new pools.
pub const AMM_V4_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

/// Ledger node endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Commitment level for subscriptions and lookups.
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Consecutive failed WebSocket reconnects before ingestion is declared
    /// lost. Unset retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
}

fn default_http_url() -> String {
    "https://api.mainnet-beta.solana.com".into()
}

fn default_ws_url() -> String {
    "wss://api.mainnet-beta.solana.com".into()
}

fn default_commitment() -> String {
    "confirmed".into()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            ws_url: default_ws_url(),
            commitment: default_commitment(),
            request_timeout_ms: default_request_timeout_ms(),
            max_reconnect_attempts: None,
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Transaction Resolver and its worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Attempts per signature, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Matched signatures waiting for a worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_workers() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    1_024
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ResolverConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }
}

/// Descriptor lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Endpoint serving the DAS `getAsset` method. Required: plain ledger
    /// nodes do not answer it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub das_url: Option<String>,
    #[serde(default = "default_metadata_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "bool_true")]
    pub fetch_offchain_json: bool,
}

fn default_metadata_timeout_ms() -> u64 {
    5_000
}

fn bool_true() -> bool {
    true
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            das_url: None,
            timeout_ms: default_metadata_timeout_ms(),
            fetch_offchain_json: true,
        }
    }
}

impl MetadataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One watched program: where to listen, what to match, where to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub label: String,
    pub program: String,
    #[serde(flatten)]
    pub filter: LogFilter,
    #[serde(default)]
    pub layout: AccountLayout,
}

impl WatchConfig {
    /// New AMM v4 pools: `InitializeMint` anywhere in the logs.
    pub fn amm_v4_pools() -> Self {
        Self {
            label: "amm-v4-pools".into(),
            program: AMM_V4_PROGRAM.into(),
            filter: LogFilter::any_of([format!("{INSTRUCTION_PREFIX}InitializeMint")]),
            layout: AccountLayout::amm_v4_initialize(),
        }
    }
}

fn default_watch() -> Vec<WatchConfig> {
    vec![WatchConfig::amm_v4_pools()]
}

fn default_shutdown_grace_secs() -> u64 {
    15
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default = "default_watch")]
    pub watch: Vec<WatchConfig>,
    /// How long in-flight resolutions may run after shutdown is requested.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            resolver: ResolverConfig::default(),
            metadata: MetadataConfig::default(),
            hub: HubConfig::default(),
            watch: default_watch(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl StreamConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.rpc.http_url.trim().is_empty() {
            return invalid("rpc.http_url is empty".into());
        }
        if !self.rpc.ws_url.starts_with("ws://") && !self.rpc.ws_url.starts_with("wss://") {
            return invalid(format!("rpc.ws_url must be ws:// or wss://, got {:?}", self.rpc.ws_url));
        }
        match self.metadata.das_url.as_deref().map(str::trim) {
            None | Some("") => {
                return invalid(
                    "metadata.das_url is required: set it to an endpoint serving DAS getAsset".into(),
                )
            }
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                return invalid(format!("metadata.das_url must be http:// or https://, got {url:?}"));
            }
            Some(_) => {}
        }
        if self.resolver.max_retries == 0 {
            return invalid("resolver.max_retries must be at least 1".into());
        }
        if self.resolver.workers == 0 || self.resolver.queue_capacity == 0 {
            return invalid("resolver.workers and resolver.queue_capacity must be positive".into());
        }
        if self.watch.is_empty() {
            return invalid("watch list is empty".into());
        }
        for w in &self.watch {
            if w.program.trim().is_empty() {
                return invalid(format!("watch {:?} has no program", w.label));
            }
            if w.filter.instructions.is_empty() {
                return invalid(format!("watch {:?} has no instructions", w.label));
            }
        }
        Ok(())
    }
}
