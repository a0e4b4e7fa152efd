//! `Chain` over a single HTTP JSON-RPC endpoint via Alloy's provider
//! stack, grounded on `provider.rs`'s `ProviderManager` (the
//! `ProviderBuilder::new().on_http(...)` construction and the
//! `get_block_number`/`get_chain_id` connectivity check on startup) and
//! `signer.rs::TransactionSender`'s broadcast path.
//!
//! Every RPC error is funneled through
//! [`settler_core::parse_rpc_error`] at the boundary (spec §4.8) rather
//! than left as an opaque `anyhow::Error` the way the teacher's
//! `Result<T>` return types do — the teacher only needed to log these,
//! the settlement state machine needs to classify them.

use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use tracing::{debug, info};

use settler_core::{parse_rpc_error, Chain, Receipt, SettlementError, TxResponse};

pub struct AlloyChain {
    provider: DynProvider,
}

impl AlloyChain {
    /// Connects to `rpc_url` and verifies it answers before handing back
    /// a usable `Chain`, matching `ProviderManager::new`'s startup probe.
    pub async fn connect(rpc_url: &str) -> anyhow::Result<Self> {
        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?).erased();
        let block = provider.get_block_number().await?;
        info!(rpc_url, block, "chain provider connected");
        Ok(Self { provider })
    }

    fn parse_hash(hash: &str) -> Result<B256, SettlementError> {
        hash.parse().map_err(|_| SettlementError::ValidationError {
            message: format!("'{hash}' is not a well-formed transaction hash"),
            field: "hash".to_string(),
        })
    }
}

#[async_trait]
impl Chain for AlloyChain {
    async fn get_nonce(&self, addr: Address) -> Result<u64, SettlementError> {
        self.provider
            .get_transaction_count(addr)
            .await
            .map_err(|e| parse_rpc_error(&e.to_string(), None))
    }

    async fn get_gas_price(&self) -> Result<u128, SettlementError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| parse_rpc_error(&e.to_string(), None))
    }

    async fn send_raw(&self, signed: Bytes) -> Result<String, SettlementError> {
        let pending = self
            .provider
            .send_raw_transaction(&signed)
            .await
            .map_err(|e| parse_rpc_error(&e.to_string(), None))?;
        let hash = *pending.tx_hash();
        debug!(hash = %hash, "raw transaction broadcast");
        Ok(format!("{hash:#x}"))
    }

    async fn get_tx(&self, hash: &str) -> Result<Option<TxResponse>, SettlementError> {
        let hash = Self::parse_hash(hash)?;
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| parse_rpc_error(&e.to_string(), None))?;
        Ok(tx.map(|t| TxResponse {
            hash: format!("{:#x}", t.tx_hash()),
            block_number: t.block_number,
            nonce: t.nonce(),
        }))
    }

    /// Polls `get_transaction_receipt` until the receipt's block is at
    /// least `confirmations` behind the chain head, bounded at 60s
    /// total (spec §5).
    async fn wait_for(
        &self,
        hash: &str,
        confirmations: u64,
    ) -> Result<Option<Receipt>, SettlementError> {
        let hash = Self::parse_hash(hash)?;
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(60);

        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| parse_rpc_error(&e.to_string(), None))?;

            if let Some(receipt) = receipt {
                let Some(block_number) = receipt.block_number else {
                    return Ok(None);
                };
                let head = self
                    .provider
                    .get_block_number()
                    .await
                    .map_err(|e| parse_rpc_error(&e.to_string(), None))?;
                if head.saturating_sub(block_number) >= confirmations.saturating_sub(1) {
                    return Ok(Some(Receipt {
                        hash: format!("{hash:#x}"),
                        block_number,
                        status: receipt.status(),
                    }));
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }
    }
}
