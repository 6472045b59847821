use std::time::Duration;

use serde::{Deserialize, Serialize};

use mintfeed_core::cache::DEFAULT_CACHE_CAPACITY;

/// Broadcast hub settings (`hub:` section of the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Listen address for consumer connections.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Events kept for replay to late joiners.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,
    /// Largest inbound frame accepted from a consumer.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Live messages buffered per connection before it is dropped as too slow.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

fn default_bind() -> String {
    "0.0.0.0:8080".into()
}
fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn default_liveness_interval_secs() -> u64 {
    30
}
fn default_max_message_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_outbound_queue() -> usize {
    256
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cache_capacity: default_cache_capacity(),
            liveness_interval_secs: default_liveness_interval_secs(),
            max_message_bytes: default_max_message_bytes(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl HubConfig {
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs.max(1))
    }

    /// Per-connection queue size: room for a full replay plus the live budget.
    pub fn connection_queue(&self) -> usize {
        self.cache_capacity.max(1) + self.outbound_queue.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = HubConfig::default();
        assert_eq!(c.bind, "0.0.0.0:8080");
        assert_eq!(c.cache_capacity, 50);
        assert_eq!(c.liveness_interval(), Duration::from_secs(30));
        assert_eq!(c.max_message_bytes, 10 * 1024 * 1024);
        assert_eq!(c.connection_queue(), 50 + 256);
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let c: HubConfig = serde_json::from_str(r#"{ "cache_capacity": 5 }"#).unwrap();
        assert_eq!(c.cache_capacity, 5);
        assert_eq!(c.outbound_queue, 256);
    }
}
