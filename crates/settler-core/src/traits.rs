//! Capability interfaces for the engine's three external collaborators
//! (spec §6). `settler-core` depends only on these traits; concrete
//! implementations live in `settler-chain` (Chain, Signer) and
//! `settler-store` (Store), wired together at the composition root.
//!
//! This inverts the teacher's `core → {chain, api}` dependency edges —
//! here the capability traits are owned by the crate that consumes
//! them, the same shape `r402-evm/src/provider.rs` uses for its
//! `NonceManager` trait.

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;

use crate::error::SettlementError;
use crate::intent::{Intent, IntentStatus};

/// Durable state (spec §6 "Store capability").
#[async_trait]
pub trait Store: Send + Sync {
    /// PENDING intents ordered by `created_at` ascending.
    async fn get_pending(&self) -> Result<Vec<Intent>, SettlementError>;

    async fn get_by_status(&self, status: IntentStatus) -> Result<Vec<Intent>, SettlementError>;

    async fn get(&self, id: &str) -> Result<Option<Intent>, SettlementError>;

    async fn get_by_hash(&self, hash: &str) -> Result<Option<Intent>, SettlementError>;

    /// Atomic status transition; also sets `updated_at`. `hash` is only
    /// ever passed together with `IntentStatus::Settled` (invariant 6).
    async fn set_status(
        &self,
        id: &str,
        status: IntentStatus,
        hash: Option<&str>,
    ) -> Result<(), SettlementError>;

    async fn increment_retry(&self, id: &str) -> Result<(), SettlementError>;

    async fn record_error(&self, id: &str, text: &str) -> Result<(), SettlementError>;

    /// Atomically inserts a DLQ row and sets the intent to FAILED
    /// (invariant 2: a DLQ row exists iff the intent is FAILED).
    async fn dlq(
        &self,
        intent_id: &str,
        reason: &str,
        details: Option<&str>,
    ) -> Result<(), SettlementError>;
}

/// A transaction hash lookup result (spec §6 `getTx`).
#[derive(Debug, Clone)]
pub struct TxResponse {
    pub hash: String,
    pub block_number: Option<u64>,
    pub nonce: u64,
}

/// A confirmed transaction receipt (spec §6 `waitFor`).
#[derive(Debug, Clone)]
pub struct Receipt {
    pub hash: String,
    pub block_number: u64,
    pub status: bool,
}

/// The external EVM-style JSON-RPC endpoint (spec §6 "Chain capability").
#[async_trait]
pub trait Chain: Send + Sync {
    /// Pending-nonce semantics: includes transactions still in the
    /// mempool, matching the teacher's `get_transaction_count` call and
    /// `r402-evm`'s `PendingNonceManager` rationale for using `.pending()`.
    async fn get_nonce(&self, addr: Address) -> Result<u64, SettlementError>;

    async fn get_gas_price(&self) -> Result<u128, SettlementError>;

    async fn send_raw(&self, signed: Bytes) -> Result<String, SettlementError>;

    async fn get_tx(&self, hash: &str) -> Result<Option<TxResponse>, SettlementError>;

    /// Bounded at 60s per confirmation per spec §5.
    async fn wait_for(
        &self,
        hash: &str,
        confirmations: u64,
    ) -> Result<Option<Receipt>, SettlementError>;
}

/// An unsigned transaction as built by the Processor, ready to be
/// handed to a [`Signer`].
#[derive(Debug, Clone)]
pub struct UnsignedTx {
    pub to: Address,
    pub from: Address,
    pub value: alloy::primitives::U256,
    pub data: Bytes,
    pub gas_limit: alloy::primitives::U256,
    pub gas_price: u128,
    pub nonce: u64,
    pub chain_id: u64,
}

/// The signing identity (spec §6 "Signer capability").
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    async fn sign(&self, unsigned: UnsignedTx) -> Result<Bytes, SettlementError>;
}
