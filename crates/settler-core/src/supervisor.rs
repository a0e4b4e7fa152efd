//! Resource lifecycle: forks the Producer and N Workers, propagates
//! shutdown, and releases shared state (spec §5).
//!
//! Grounded on `src/main.rs::initialize_components`'s component-wiring
//! shape (there it returns an unused `Vec<JoinHandle<()>>`; here that
//! handle set is actually driven to completion on shutdown).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::intent::IntentStatus;
use crate::nonce::NonceCoordinator;
use crate::processor::{Processor, ProcessorParams};
use crate::producer::Producer;
use crate::queue::work_queue;
use crate::registry::InFlightRegistry;
use crate::traits::{Chain, Signer, Store};
use crate::worker::{SubmissionLock, Worker};

pub struct SupervisorConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub chain_id: u64,
    pub max_retries: u32,
}

/// Owns the per-process singletons (Nonce Coordinator, Registry,
/// Submission Lock) for the lifetime of the worker (spec §9 design
/// notes: "global state is limited to per-process singletons... owned
/// by the worker supervisor").
pub struct Supervisor {
    store: Arc<dyn Store>,
    chain: Arc<dyn Chain>,
    signer: Arc<dyn Signer>,
    config: SupervisorConfig,
    cancellation: CancellationToken,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn Chain>,
        signer: Arc<dyn Signer>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            store,
            chain,
            signer,
            config,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Sweep any intent left at PROCESSING back to PENDING before the
    /// Producer starts. Addresses the documented crash window between
    /// `setStatus(PROCESSING)` and the subsequent DLQ/settle write
    /// (spec.md §9 open item 2; recommended there, implemented here).
    #[instrument(skip(self))]
    pub async fn reconcile_on_boot(&self) -> anyhow::Result<()> {
        let stuck = self.store.get_by_status(IntentStatus::Processing).await?;
        if stuck.is_empty() {
            info!("boot reconciliation found no stuck intents");
            return Ok(());
        }
        info!(count = stuck.len(), "resetting stuck PROCESSING intents to PENDING");
        for intent in stuck {
            if let Err(err) = self
                .store
                .set_status(&intent.id, IntentStatus::Pending, None)
                .await
            {
                warn!(intent_id = %intent.id, error = %err, "failed to reconcile stuck intent");
            }
        }
        Ok(())
    }

    /// Fork the Producer and `worker_count` Workers, then block until
    /// either the cancellation token fires or every task has exited on
    /// its own (a defect in one task is caught inside that task per
    /// spec §5 failure isolation, never here).
    #[instrument(skip(self))]
    pub async fn run(&self) -> anyhow::Result<()> {
        self.reconcile_on_boot().await?;

        let registry = Arc::new(InFlightRegistry::new());
        let nonce = Arc::new(NonceCoordinator::new());
        let submission_lock: Arc<SubmissionLock> = Arc::new(tokio::sync::Mutex::new(()));
        let (sender, receiver) = work_queue();

        let producer = Producer::new(
            self.store.clone(),
            registry.clone(),
            sender,
            self.config.poll_interval,
        );

        let processor = Arc::new(Processor::new(
            nonce,
            self.signer.clone(),
            self.chain.clone(),
            self.store.clone(),
            ProcessorParams {
                chain_id: self.config.chain_id,
                max_retries: self.config.max_retries,
            },
        ));

        let mut tasks = JoinSet::new();

        let producer_cancellation = self.cancellation.clone();
        tasks.spawn(async move {
            producer.run(producer_cancellation).await;
        });

        // Every worker shares one `mpsc::Receiver` end by taking turns
        // under a single `Mutex` — `tokio::sync::mpsc` receivers are not
        // `Clone`, so the pool contends on recv the same way N consumers
        // would against any bounded MPMC queue.
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for id in 0..self.config.worker_count {
            let worker = Worker::new(id, processor.clone(), registry.clone(), submission_lock.clone());
            let worker_cancellation = self.cancellation.clone();
            let receiver = receiver.clone();
            tasks.spawn(async move {
                worker.run(receiver, worker_cancellation).await;
            });
        }

        while tasks.join_next().await.is_some() {}
        info!("all settlement tasks exited");
        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }
}
