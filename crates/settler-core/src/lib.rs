//! Self-healing settlement worker core.
//!
//! This crate is the subject of the specification: the producer/worker
//! pipeline, the in-memory nonce coordinator, the in-flight
//! deduplication registry, the error-classification and retry/DLQ state
//! machine, and the resource lifecycle that binds them. The Store,
//! Chain, and Signer capabilities it depends on are external
//! collaborators, specified here only as traits (see [`traits`]) —
//! concrete implementations live in `settler-chain` and `settler-store`.

pub mod backoff;
pub mod config;
pub mod error;
pub mod intent;
pub mod nonce;
pub mod processor;
pub mod producer;
pub mod queue;
pub mod registry;
pub mod supervisor;
pub mod traits;
pub mod worker;

pub use config::{config, init_config, SettlerConfig};
pub use error::{is_transient, parse_rpc_error, SettlementError};
pub use intent::{dlq_reason, DlqEntry, Intent, IntentStatus};
pub use nonce::NonceCoordinator;
pub use processor::{Processor, ProcessorParams};
pub use producer::Producer;
pub use queue::{work_queue, SharedWorkReceiver, WorkItem, WorkReceiver, WorkSender};
pub use registry::InFlightRegistry;
pub use supervisor::{Supervisor, SupervisorConfig};
pub use traits::{Chain, Receipt, Signer, Store, TxResponse, UnsignedTx};
pub use worker::{SubmissionLock, Worker};
