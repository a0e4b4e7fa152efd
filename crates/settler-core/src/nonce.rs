//! The single per-signer nonce cell (spec §4.1).
//!
//! The teacher's `NonceManager` (`crates/chain/src/signer.rs`) is
//! lock-free, allocating nonces with an `AtomicU64::fetch_add` because
//! it has no coarser serialization around it. The spec mandates the
//! opposite: all reads/writes happen inside the Submission Lock's
//! critical section (§4.5), so a plain `Mutex` guarding an `Option<u64>`
//! is the correct primitive here — the mutex is for the *value*, the
//! Submission Lock is the *separate*, coarser mutex serializing the
//! whole allocate-through-broadcast sequence around it.

use tokio::sync::Mutex;

use crate::error::SettlementError;
use crate::traits::Chain;
use alloy::primitives::Address;

/// Per-signer monotonic nonce counter, lazily seeded from the chain.
///
/// A generalization to multiple signers would key a map of these by
/// address; this system targets a single signing identity (spec §4.1
/// design note).
pub struct NonceCoordinator {
    value: Mutex<Option<u64>>,
}

impl NonceCoordinator {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    /// Returns the cached value without touching the chain.
    pub async fn current(&self) -> Option<u64> {
        *self.value.lock().await
    }

    /// If uninitialized, queries `Chain::get_nonce` and caches the
    /// result; otherwise returns the cached value. Idempotent.
    pub async fn seed_from_chain(
        &self,
        addr: Address,
        chain: &dyn Chain,
    ) -> Result<u64, SettlementError> {
        let mut guard = self.value.lock().await;
        if let Some(n) = *guard {
            return Ok(n);
        }
        let n = chain.get_nonce(addr).await?;
        *guard = Some(n);
        Ok(n)
    }

    /// Increments the cached value by one. Called after a confirmed
    /// broadcast step (invariant 4: monotonically non-decreasing except
    /// for the explicit resync below).
    pub async fn advance(&self) {
        let mut guard = self.value.lock().await;
        *guard = Some(guard.unwrap_or(0) + 1);
    }

    /// Unconditionally resets the cached value to the chain-authoritative
    /// nonce carried by a `NonceTooLow` error (invariant 4's one
    /// permitted decrease).
    pub async fn resync_to(&self, n: u64) {
        *self.value.lock().await = Some(n);
    }
}

impl Default for NonceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
