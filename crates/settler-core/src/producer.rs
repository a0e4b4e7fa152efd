//! Polls the Store for PENDING intents and offers new ones to the
//! Worker pool, deduplicating against the in-flight registry (spec §4.4).
//!
//! Shaped after `crates/core/src/scanner.rs`'s tiered interval loops:
//! catch every error at the loop boundary, log, and resume on the next
//! tick — the producer must never die.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::queue::{WorkItem, WorkSender};
use crate::registry::InFlightRegistry;
use crate::traits::Store;

pub struct Producer {
    store: Arc<dyn Store>,
    registry: Arc<InFlightRegistry>,
    sender: WorkSender,
    poll_interval: Duration,
}

impl Producer {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<InFlightRegistry>,
        sender: WorkSender,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            sender,
            poll_interval,
        }
    }

    #[instrument(skip(self, cancellation))]
    pub async fn run(&self, cancellation: CancellationToken) {
        loop {
            self.poll_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancellation.cancelled() => {
                    debug!("producer shutting down");
                    return;
                }
            }
        }
    }

    /// One poll cycle. Never returns an error: every failure is logged
    /// and the loop simply tries again next tick (spec §4.4 step 1).
    async fn poll_once(&self) {
        let pending = match self.store.get_pending().await {
            Ok(intents) => intents,
            Err(err) => {
                warn!(error = %err, "failed to poll store for pending intents");
                return;
            }
        };

        if pending.is_empty() {
            debug!("no pending intents");
            return;
        }

        let ids: Vec<String> = pending.iter().map(|i| i.id.clone()).collect();
        let new_ids = self.registry.claim(&ids);
        if new_ids.is_empty() {
            debug!(candidates = pending.len(), "all candidates already in flight");
            return;
        }

        for intent in pending.into_iter().filter(|i| new_ids.contains(&i.id)) {
            let id = intent.id.clone();
            if let Err(err) = self.sender.send(WorkItem { intent }).await {
                warn!(intent_id = %id, error = %err, "failed to offer intent to work queue");
                self.registry.release(&id);
            }
        }
    }
}
