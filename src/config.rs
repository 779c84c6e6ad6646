// src/config.rs

//! Gateway configuration: capacity, fetch timeout, base origin and the
//! route→policy table, loadable from a TOML file.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::fetch::FETCH_TIMEOUT;
use crate::core::policy::RouteRule;
use crate::core::store::DEFAULT_CAPACITY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Upper bound on cached entries before insertion-order eviction kicks in.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Hard bound on a single network round trip.
    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    pub fetch_timeout: Duration,

    /// Origin used to resolve relative request URLs.
    #[serde(default = "default_base_origin")]
    pub base_origin: String,

    /// Route→policy table, matched by exact normalized path.
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

fn default_max_entries() -> usize {
    DEFAULT_CAPACITY
}

fn default_fetch_timeout() -> Duration {
    FETCH_TIMEOUT
}

fn default_base_origin() -> String {
    "http://localhost".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            fetch_timeout: default_fetch_timeout(),
            base_origin: default_base_origin(),
            routes: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Creates a `GatewayConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: GatewayConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        Ok(config)
    }
}
