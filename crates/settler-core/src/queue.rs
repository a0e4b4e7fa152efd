//! Bounded FIFO handoff from Producer to Worker pool (spec §4.3).
//!
//! Capacity is fixed at 100 — the spec names this as the sole
//! backpressure mechanism, so it is not exposed as a config knob.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::intent::Intent;

pub const QUEUE_CAPACITY: usize = 100;

/// A single handoff item. A thin wrapper rather than a bare `Intent` so
/// the channel's element type can grow (e.g. a trace span) without
/// disturbing call sites.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub intent: Intent,
}

pub type WorkSender = mpsc::Sender<WorkItem>;
pub type WorkReceiver = mpsc::Receiver<WorkItem>;

/// `mpsc::Receiver` has exactly one owner; a pool of N workers shares
/// one behind a `Mutex` so multiple tasks can `take` from the same
/// bounded queue, matching spec §4.3's "take blocks the Worker" for an
/// arbitrary worker count.
pub type SharedWorkReceiver = Arc<Mutex<WorkReceiver>>;

/// Construct the bounded channel pair used between the Producer and the
/// Worker pool.
pub fn work_queue() -> (WorkSender, WorkReceiver) {
    mpsc::channel(QUEUE_CAPACITY)
}
