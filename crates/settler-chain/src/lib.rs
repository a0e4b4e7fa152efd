//! Chain and Signer capability implementations (spec §6) over Alloy's
//! provider and signer stack.
//!
//! `settler-core` only knows about the `Chain`/`Signer` traits; this
//! crate is the one place that talks to an actual JSON-RPC endpoint,
//! grounded on the teacher's `provider.rs`/`signer.rs` pair.

mod alloy_chain;
mod alloy_signer;

pub use alloy_chain::AlloyChain;
pub use alloy_signer::LocalAlloySigner;
