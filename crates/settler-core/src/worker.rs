//! Takes intents off the queue and drives them through the Processor
//! under the Submission Lock, retrying transients in-place before
//! falling back to the Producer's re-poll path (spec §4.6).
//!
//! The retry-then-give-up shape is grounded on
//! `other_examples/341a0af5_shanmukanaks-tee-otc…transaction_broadcaster.rs`,
//! which resends with bumped gas on a nonce-class error; here the
//! backoff/attempt-count comes from [`crate::backoff`] instead, since
//! the spec fixes those parameters rather than leaving them a gas-bump
//! policy.

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::backoff::{retry_delay, MAX_ADDITIONAL_ATTEMPTS};
use crate::error::SettlementError;
use crate::processor::Processor;
use crate::queue::{SharedWorkReceiver, WorkItem};
use crate::registry::InFlightRegistry;

/// The coarse mutex serializing nonce-allocation-through-broadcast
/// across all workers (spec §4.5). A single `()`-permit async mutex —
/// held across await points, so it must be the `tokio` mutex, not
/// `parking_lot`'s or `std`'s.
pub type SubmissionLock = AsyncMutex<()>;

pub struct Worker {
    id: usize,
    processor: Arc<Processor>,
    registry: Arc<InFlightRegistry>,
    submission_lock: Arc<SubmissionLock>,
}

impl Worker {
    pub fn new(
        id: usize,
        processor: Arc<Processor>,
        registry: Arc<InFlightRegistry>,
        submission_lock: Arc<SubmissionLock>,
    ) -> Self {
        Self {
            id,
            processor,
            registry,
            submission_lock,
        }
    }

    /// Drain the shared queue until cancelled. `tokio::sync::mpsc`
    /// receivers have exactly one owner, so a pool of N workers shares
    /// one end behind a `Mutex` and takes turns — the same effect as a
    /// true MPMC queue, since only one worker is ever blocked inside
    /// `recv()` holding the lock at a time. A panic inside
    /// [`Self::handle_item`] is not expected (all fallible paths return
    /// `Result`), but task isolation still applies — a defect here does
    /// not affect sibling workers, since each worker is its own `tokio`
    /// task (spec §5 failure isolation).
    #[instrument(skip(self, receiver, cancellation), fields(worker_id = self.id))]
    pub async fn run(&self, receiver: SharedWorkReceiver, cancellation: CancellationToken) {
        loop {
            let item = {
                let mut guard = receiver.lock().await;
                tokio::select! {
                    item = guard.recv() => item,
                    _ = cancellation.cancelled() => {
                        info!("worker shutting down");
                        return;
                    }
                }
            };

            let Some(item) = item else {
                info!("work queue closed, worker exiting");
                return;
            };

            self.handle_item(item, &cancellation).await;

            if cancellation.is_cancelled() {
                return;
            }
        }
    }

    async fn handle_item(&self, item: WorkItem, cancellation: &CancellationToken) {
        let intent_id = item.intent.id.clone();
        let outcome = self.process_with_retries(&item, cancellation).await;

        // Release thunk: always runs, success or failure, because the
        // terminal state was already persisted by the Processor either
        // way (spec §4.6 step 3).
        self.registry.release(&intent_id);

        match outcome {
            Ok(hash) => info!(intent_id = %intent_id, hash = %hash, "intent settled"),
            Err(err) => warn!(intent_id = %intent_id, error = %err, "intent did not settle this cycle"),
        }
    }

    /// Runs the Processor under the Submission Lock, retrying up to
    /// [`MAX_ADDITIONAL_ATTEMPTS`] additional times when the result is a
    /// transient `SettlementError`. The lock is released between
    /// attempts so other workers can interleave (spec §4.6 step 2b).
    async fn process_with_retries(
        &self,
        item: &WorkItem,
        cancellation: &CancellationToken,
    ) -> Result<String, SettlementError> {
        let mut attempt = 0u32;
        loop {
            let result = {
                let _permit = self.submission_lock.lock().await;
                self.processor.process(&item.intent).await
            };

            match result {
                Ok(hash) => return Ok(hash),
                Err(err) if err.is_transient() && attempt < MAX_ADDITIONAL_ATTEMPTS => {
                    let delay = retry_delay(attempt);
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancellation.cancelled() => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SettlementError;
    use crate::intent::{dlq_reason, Intent, IntentStatus};
    use crate::nonce::NonceCoordinator;
    use crate::processor::ProcessorParams;
    use crate::queue::{work_queue, WorkItem};
    use crate::traits::{Chain, Receipt, Signer, Store, TxResponse, UnsignedTx};
    use crate::producer::Producer;
    use alloy::primitives::{Address, Bytes, U256};
    use async_trait::async_trait;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct ScriptedChain {
        nonce: StdMutex<u64>,
        send_result: StdMutex<Vec<Result<String, SettlementError>>>,
    }

    #[async_trait]
    impl Chain for ScriptedChain {
        async fn get_nonce(&self, _addr: Address) -> Result<u64, SettlementError> {
            Ok(*self.nonce.lock().unwrap())
        }
        async fn get_gas_price(&self) -> Result<u128, SettlementError> {
            Ok(1)
        }
        async fn send_raw(&self, _signed: Bytes) -> Result<String, SettlementError> {
            self.send_result.lock().unwrap().remove(0)
        }
        async fn get_tx(&self, _hash: &str) -> Result<Option<TxResponse>, SettlementError> {
            Ok(None)
        }
        async fn wait_for(&self, _hash: &str, _confirmations: u64) -> Result<Option<Receipt>, SettlementError> {
            Ok(None)
        }
    }

    /// A chain whose `send_raw` sleeps before answering, standing in for
    /// spec §8 S6's "sendRaw sleeps" — long enough that several
    /// `Producer::poll_once` calls can race it within one test.
    struct SlowChain {
        nonce: u64,
        delay: Duration,
    }

    #[async_trait]
    impl Chain for SlowChain {
        async fn get_nonce(&self, _addr: Address) -> Result<u64, SettlementError> {
            Ok(self.nonce)
        }
        async fn get_gas_price(&self) -> Result<u128, SettlementError> {
            Ok(1)
        }
        async fn send_raw(&self, _signed: Bytes) -> Result<String, SettlementError> {
            tokio::time::sleep(self.delay).await;
            Ok("0xslow".to_string())
        }
        async fn get_tx(&self, _hash: &str) -> Result<Option<TxResponse>, SettlementError> {
            Ok(None)
        }
        async fn wait_for(&self, _hash: &str, _confirmations: u64) -> Result<Option<Receipt>, SettlementError> {
            Ok(None)
        }
    }

    struct FixedSigner(Address);

    #[async_trait]
    impl Signer for FixedSigner {
        fn address(&self) -> Address {
            self.0
        }
        async fn sign(&self, _unsigned: UnsignedTx) -> Result<Bytes, SettlementError> {
            Ok(Bytes::from(vec![0xbe, 0xef]))
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        intents: DashMap<String, Intent>,
        dlq_rows: DashMap<String, String>,
        processing_writes: AtomicUsize,
        settled_writes: AtomicUsize,
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn get_pending(&self) -> Result<Vec<Intent>, SettlementError> {
            Ok(self
                .intents
                .iter()
                .filter(|e| e.status == IntentStatus::Pending)
                .map(|e| e.clone())
                .collect())
        }
        async fn get_by_status(&self, status: IntentStatus) -> Result<Vec<Intent>, SettlementError> {
            Ok(self
                .intents
                .iter()
                .filter(|e| e.status == status)
                .map(|e| e.clone())
                .collect())
        }
        async fn get(&self, id: &str) -> Result<Option<Intent>, SettlementError> {
            Ok(self.intents.get(id).map(|e| e.clone()))
        }
        async fn get_by_hash(&self, hash: &str) -> Result<Option<Intent>, SettlementError> {
            Ok(self
                .intents
                .iter()
                .find(|e| e.hash.as_deref() == Some(hash))
                .map(|e| e.clone()))
        }
        async fn set_status(
            &self,
            id: &str,
            status: IntentStatus,
            hash: Option<&str>,
        ) -> Result<(), SettlementError> {
            match status {
                IntentStatus::Processing => {
                    self.processing_writes.fetch_add(1, Ordering::SeqCst);
                }
                IntentStatus::Settled => {
                    self.settled_writes.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
            if let Some(mut entry) = self.intents.get_mut(id) {
                entry.status = status;
                if let Some(h) = hash {
                    entry.hash = Some(h.to_string());
                }
            }
            Ok(())
        }
        async fn increment_retry(&self, id: &str) -> Result<(), SettlementError> {
            if let Some(mut entry) = self.intents.get_mut(id) {
                entry.retry_count += 1;
            }
            Ok(())
        }
        async fn record_error(&self, id: &str, text: &str) -> Result<(), SettlementError> {
            if let Some(mut entry) = self.intents.get_mut(id) {
                entry.last_error = Some(text.to_string());
            }
            Ok(())
        }
        async fn dlq(
            &self,
            intent_id: &str,
            reason: &str,
            _details: Option<&str>,
        ) -> Result<(), SettlementError> {
            self.dlq_rows.insert(intent_id.to_string(), reason.to_string());
            if let Some(mut entry) = self.intents.get_mut(intent_id) {
                entry.status = IntentStatus::Failed;
            }
            Ok(())
        }
    }

    fn seed(store: &RecordingStore, id: &str) {
        store.intents.insert(
            id.to_string(),
            Intent::new(
                id,
                "0x2222222222222222222222222222222222222222".parse().unwrap(),
                U256::from(1u64),
                Bytes::new(),
                U256::from(21_000u64),
            ),
        );
    }

    /// S5: one worker drains a batch where the first intent reverts
    /// permanently and the second settles. The revert must not stop the
    /// worker from reaching the second item, and each intent's terminal
    /// state must be independent of the other's outcome.
    #[tokio::test]
    async fn s5_mixed_batch_one_dlq_one_settles_without_stopping_the_worker() {
        let store = Arc::new(RecordingStore::default());
        seed(&store, "reverts");
        seed(&store, "settles");

        let chain = Arc::new(ScriptedChain {
            nonce: StdMutex::new(1),
            send_result: StdMutex::new(vec![
                Err(SettlementError::ExecutionReverted {
                    reason: "bad state".to_string(),
                    data: None,
                }),
                Ok("0xsettled".to_string()),
            ]),
        });
        let signer = Arc::new(FixedSigner(Address::ZERO));
        let nonce = Arc::new(NonceCoordinator::new());
        let processor = Arc::new(crate::processor::Processor::new(
            nonce,
            signer,
            chain,
            store.clone(),
            ProcessorParams {
                chain_id: 1,
                max_retries: 3,
            },
        ));
        let registry = Arc::new(InFlightRegistry::new());
        let submission_lock: Arc<SubmissionLock> = Arc::new(AsyncMutex::new(()));
        let worker = Worker::new(0, processor, registry.clone(), submission_lock);

        let (sender, receiver) = work_queue();
        let receiver = Arc::new(AsyncMutex::new(receiver));
        registry.claim(&["reverts".to_string(), "settles".to_string()]);
        sender
            .send(WorkItem {
                intent: store.get("reverts").await.unwrap().unwrap(),
            })
            .await
            .unwrap();
        sender
            .send(WorkItem {
                intent: store.get("settles").await.unwrap().unwrap(),
            })
            .await
            .unwrap();
        drop(sender);

        let cancellation = CancellationToken::new();
        worker.run(receiver, cancellation).await;

        let reverted = store.get("reverts").await.unwrap().unwrap();
        assert_eq!(reverted.status, IntentStatus::Failed);
        assert_eq!(
            store.dlq_rows.get("reverts").unwrap().clone(),
            dlq_reason::PERMANENT_ERROR
        );

        let settled = store.get("settles").await.unwrap().unwrap();
        assert_eq!(settled.status, IntentStatus::Settled);
        assert_eq!(settled.hash.as_deref(), Some("0xsettled"));

        assert!(registry.is_empty(), "both slots must be released after settling");
    }

    /// S2: the first broadcast fails `NonceTooLow{current: 7, tx: 5}`,
    /// the second (in-worker retry) succeeds. The worker's own retry
    /// schedule — not a Producer re-poll — must be what recovers here,
    /// so this drives `Worker::process_with_retries` directly rather
    /// than the Processor in isolation.
    #[tokio::test]
    async fn s2_nonce_conflict_recovers_on_in_worker_retry() {
        let store = Arc::new(RecordingStore::default());
        seed(&store, "t2");

        let chain = Arc::new(ScriptedChain {
            nonce: StdMutex::new(5),
            send_result: StdMutex::new(vec![
                Err(SettlementError::NonceTooLow {
                    current_nonce: 7,
                    tx_nonce: 5,
                    address: String::new(),
                }),
                Ok("0xdef".to_string()),
            ]),
        });
        let signer = Arc::new(FixedSigner(Address::ZERO));
        let nonce = Arc::new(NonceCoordinator::new());
        let processor = Arc::new(crate::processor::Processor::new(
            nonce.clone(),
            signer,
            chain,
            store.clone(),
            ProcessorParams {
                chain_id: 1,
                max_retries: 3,
            },
        ));
        let registry = Arc::new(InFlightRegistry::new());
        let submission_lock: Arc<SubmissionLock> = Arc::new(AsyncMutex::new(()));
        let worker = Worker::new(0, processor, registry.clone(), submission_lock);

        let (sender, receiver) = work_queue();
        let receiver = Arc::new(AsyncMutex::new(receiver));
        registry.claim(&["t2".to_string()]);
        sender
            .send(WorkItem {
                intent: store.get("t2").await.unwrap().unwrap(),
            })
            .await
            .unwrap();
        drop(sender);

        let cancellation = CancellationToken::new();
        worker.run(receiver, cancellation).await;

        let settled = store.get("t2").await.unwrap().unwrap();
        assert_eq!(settled.status, IntentStatus::Settled);
        assert_eq!(settled.hash.as_deref(), Some("0xdef"));
        assert_eq!(settled.retry_count, 1, "exactly one retry increment, not one per in-worker attempt");
        assert_eq!(nonce.current().await, Some(8), "resync to 7 then advance on the successful retry");
        assert!(registry.is_empty());
    }

    /// S6: one PENDING intent is returned by repeated `Producer::poll_once`
    /// calls while a worker's `sendRaw` is still in flight on it. Dedup
    /// must hold across the whole pipeline, not just at the Registry: one
    /// PROCESSING write, one SETTLED write, one queue offer.
    #[tokio::test]
    async fn s6_concurrent_polls_against_a_slow_worker_write_each_transition_once() {
        let store = Arc::new(RecordingStore::default());
        seed(&store, "slow");

        let chain = Arc::new(SlowChain {
            nonce: 1,
            delay: Duration::from_millis(150),
        });
        let signer = Arc::new(FixedSigner(Address::ZERO));
        let nonce = Arc::new(NonceCoordinator::new());
        let processor = Arc::new(crate::processor::Processor::new(
            nonce,
            signer,
            chain,
            store.clone(),
            ProcessorParams {
                chain_id: 1,
                max_retries: 3,
            },
        ));
        let registry = Arc::new(InFlightRegistry::new());
        let submission_lock: Arc<SubmissionLock> = Arc::new(AsyncMutex::new(()));
        let worker = Worker::new(0, processor, registry.clone(), submission_lock);

        let (sender, receiver) = work_queue();
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let producer = Producer::new(store.clone(), registry.clone(), sender, Duration::from_millis(10));

        let cancellation = CancellationToken::new();
        let worker_cancellation = cancellation.clone();
        let worker_handle = tokio::spawn(async move { worker.run(receiver, worker_cancellation).await });

        // None of these three polls yield to the scheduler on a pending
        // future (DashMap reads and an unbounded-enough mpsc send both
        // resolve immediately), so all three race the intent while it is
        // still PENDING and before the spawned worker has had a chance
        // to run at all — exactly spec §8 S6's "three consecutive polls".
        producer.poll_once().await;
        producer.poll_once().await;
        producer.poll_once().await;

        tokio::time::sleep(Duration::from_millis(400)).await;
        cancellation.cancel();
        worker_handle.await.unwrap();

        assert_eq!(store.processing_writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.settled_writes.load(Ordering::SeqCst), 1);

        let settled = store.get("slow").await.unwrap().unwrap();
        assert_eq!(settled.status, IntentStatus::Settled);
        assert_eq!(settled.hash.as_deref(), Some("0xslow"));
        assert!(registry.is_empty());
    }
}
