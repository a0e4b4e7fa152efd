//! Configuration surface (spec §6) and worker-pool sizing (spec §5).
//!
//! Mirrors `crates/core/src/config/bot.rs`: a `serde`-deserializable
//! struct with per-field `#[serde(default = "...")]`, a `from_env`
//! constructor, and a global `OnceLock`-backed accessor for call sites
//! that don't want to thread a `&SettlerConfig` everywhere.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Recognized configuration options (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlerConfig {
    /// Endpoint the Chain capability uses.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Included in every built transaction.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Signer material; opaque to this crate.
    #[serde(default)]
    pub private_key: String,

    /// Store connection string.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Producer loop period, milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Transient-retry budget per intent across its lifetime.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound for any gas-bump strategy.
    #[serde(default = "default_max_gas_price_multiplier")]
    pub max_gas_price_multiplier: f64,

    /// Number of concurrent worker tasks (spec §5 default: 2).
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_chain_id() -> u64 {
    1
}
fn default_database_url() -> String {
    "postgres://localhost/settler".to_string()
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_gas_price_multiplier() -> f64 {
    2.0
}
fn default_worker_count() -> usize {
    2
}

impl Default for SettlerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            private_key: String::new(),
            database_url: default_database_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
            max_gas_price_multiplier: default_max_gas_price_multiplier(),
            worker_count: default_worker_count(),
        }
    }
}

impl SettlerConfig {
    /// Load from environment variables, falling back to defaults for
    /// anything unset. Required fields (`rpc_url`, `private_key`,
    /// `database_url`) are left to the binary's composition root to
    /// validate — this crate never dies on missing config, per spec §4.4
    /// ("the producer must never die").
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("RPC_URL") {
            config.rpc_url = v;
        }
        if let Ok(v) = std::env::var("CHAIN_ID") {
            if let Ok(n) = v.parse() {
                config.chain_id = n;
            }
        }
        if let Ok(v) = std::env::var("PRIVATE_KEY") {
            config.private_key = v;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            config.database_url = v;
        }
        if let Ok(v) = std::env::var("POLL_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                config.poll_interval_ms = n;
            }
        }
        if let Ok(v) = std::env::var("MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                config.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("MAX_GAS_PRICE_MULTIPLIER") {
            if let Ok(n) = v.parse() {
                config.max_gas_price_multiplier = n;
            }
        }
        if let Ok(v) = std::env::var("WORKER_COUNT") {
            if let Ok(n) = v.parse() {
                config.worker_count = n;
            }
        }
        config
    }

    pub fn log_config(&self) {
        tracing::info!(
            rpc_url = %self.rpc_url,
            chain_id = self.chain_id,
            poll_interval_ms = self.poll_interval_ms,
            max_retries = self.max_retries,
            worker_count = self.worker_count,
            "settlement worker configuration loaded"
        );
    }
}

static GLOBAL_CONFIG: OnceLock<SettlerConfig> = OnceLock::new();

pub fn init_config(config: SettlerConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

pub fn config() -> &'static SettlerConfig {
    GLOBAL_CONFIG.get_or_init(SettlerConfig::from_env)
}
