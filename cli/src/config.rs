//! Config file loading and command-line overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mintfeed_stream::StreamConfig;

use crate::logging::LogConfig;

/// Everything the daemon reads from its YAML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Values given on the command line; each one replaces the file's value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub http_url: Option<String>,
    pub ws_url: Option<String>,
    pub das_url: Option<String>,
    pub bind: Option<String>,
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("invalid config YAML")
    }

    /// Read `path`, or start from defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config file {}", path.display()))?;
                Self::from_yaml(&text).with_context(|| format!("in {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(url) = overrides.http_url {
            self.stream.rpc.http_url = url;
        }
        if let Some(url) = overrides.ws_url {
            self.stream.rpc.ws_url = url;
        }
        if let Some(url) = overrides.das_url {
            self.stream.metadata.das_url = Some(url);
        }
        if let Some(bind) = overrides.bind {
            self.stream.hub.bind = bind;
        }
        if overrides.json_logs {
            self.log.json = true;
        }
        self
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("cannot render config")
    }
}
