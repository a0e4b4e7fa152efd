//! `Signer` over a local private key, grounded on
//! `signer.rs::TransactionSender`'s `PrivateKeySigner`/`EthereumWallet`
//! construction — restructured into a pure sign step, since the spec's
//! `Chain`/`Signer` split hands broadcast to `Chain::send_raw` instead
//! of letting the wallet-wrapped provider sign-and-send in one call the
//! way the teacher's `send_transaction` does.

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, NetworkWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use settler_core::{SettlementError, Signer, UnsignedTx};

pub struct LocalAlloySigner {
    wallet: EthereumWallet,
    address: Address,
}

impl LocalAlloySigner {
    pub fn from_private_key(private_key: &str) -> anyhow::Result<Self> {
        let key = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key.parse()?;
        let address = signer.address();
        Ok(Self {
            wallet: EthereumWallet::from(signer),
            address,
        })
    }
}

#[async_trait]
impl Signer for LocalAlloySigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, unsigned: UnsignedTx) -> Result<Bytes, SettlementError> {
        let gas_limit = unsigned.gas_limit.checked_to::<u64>().ok_or_else(|| {
            SettlementError::ValidationError {
                message: format!("gas limit {} does not fit in a u64", unsigned.gas_limit),
                field: "gasLimit".to_string(),
            }
        })?;

        let request = TransactionRequest::default()
            .with_from(unsigned.from)
            .with_to(unsigned.to)
            .with_value(unsigned.value)
            .with_input(unsigned.data)
            .with_gas_limit(gas_limit)
            .with_gas_price(unsigned.gas_price)
            .with_nonce(unsigned.nonce)
            .with_chain_id(unsigned.chain_id);

        let typed_tx = request.build_typed_tx().map_err(|_| SettlementError::ValidationError {
            message: "unsigned transaction is missing a field required to build a typed transaction".to_string(),
            field: "unsigned".to_string(),
        })?;

        let envelope: TxEnvelope = self
            .wallet
            .sign_transaction_from(unsigned.from, typed_tx)
            .await
            .map_err(|e| SettlementError::Unknown { cause: e.to_string() })?;

        Ok(Bytes::from(envelope.encoded_2718()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_matches_the_key_it_was_constructed_from() {
        let signer = LocalAlloySigner::from_private_key(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        assert_eq!(
            format!("{:#x}", signer.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }
}
