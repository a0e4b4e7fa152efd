//! The durable unit of work and its append-only dead-letter record.

use alloy::primitives::{Address, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an [`Intent`].
///
/// `Settled` and `Failed` are the only terminal states (spec invariant 1);
/// `Failed` implies a [`DlqEntry`] row exists for the same intent
/// (invariant 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentStatus {
    Pending,
    Processing,
    Settled,
    Failed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "PENDING",
            IntentStatus::Processing => "PROCESSING",
            IntentStatus::Settled => "SETTLED",
            IntentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable row representing a desired settlement on-chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    pub status: IntentStatus,
    pub hash: Option<String>,
    pub to: Address,
    #[serde(with = "decimal_u256")]
    pub value: U256,
    pub calldata: Bytes,
    #[serde(with = "decimal_u256")]
    pub gas_limit: U256,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Intent {
    /// Build a fresh, PENDING intent as it would be seeded externally
    /// (spec §3 lifecycle: "Intents are created externally").
    pub fn new(id: impl Into<String>, to: Address, value: U256, calldata: Bytes, gas_limit: U256) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: IntentStatus::Pending,
            hash: None,
            to,
            value,
            calldata,
            gas_limit,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An append-only dead-letter row explaining why an [`Intent`] could not
/// reach SETTLED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    pub intent_id: String,
    pub reason: String,
    pub error_details: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

/// Canonical DLQ reason labels (spec.md §9 open question 1 resolves the
/// two source variants to these exact strings).
pub mod dlq_reason {
    pub const PERMANENT_ERROR: &str = "Permanent Error";
    pub const MAX_RETRIES_EXCEEDED: &str = "Max retries exceeded";
}

/// `U256`'s own `Display`/`FromStr` are already base-10, so this module
/// exists only to pair them up behind `#[serde(with = ...)]` — serde's
/// derive does not implicitly use `Display`/`FromStr` for non-string
/// field types.
mod decimal_u256 {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<U256>().map_err(serde::de::Error::custom)
    }
}
