//! ConfirmationTracker processor.
//!
//! The ConfirmationTracker is responsible for:
//! - Owning every in-flight candidate of one watch, keyed by `tx_hash`
//! - Announcing each new candidate through `on_detected`, at most once per
//!   `tx_hash` for the lifetime of the process
//! - Running one check task per candidate that recomputes confirmations
//!   against the chain head and moves it to Confirmed or Failed
//! - Firing `on_confirmed` exactly once and evicting terminal records
//! - Failing candidates whose transaction vanished or was reverted
//!
//! Records are only mutated under a short `std::sync::Mutex` section that
//! never spans an `.await`.

use crate::chain::{ChainClient, ChainError};
use crate::entities::{CandidateTransfer, TransferStatus};
use crate::events::{DispatchGate, TransferEventKind};
use crate::utils::backoff::check_delay;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Confirmation arithmetic
// ---------------------------------------------------------------------------

/// Confirmations of a transaction mined at `observed_block` when the head is
/// `current_height`: `max(0, current - observed + 1)`.
pub fn confirmations_at(observed_block: u64, current_height: u64) -> u64 {
    current_height
        .saturating_add(1)
        .saturating_sub(observed_block)
}

pub fn status_for(confirmations: u64, required: u64) -> TransferStatus {
    if confirmations >= required {
        TransferStatus::Confirmed
    } else {
        TransferStatus::Pending
    }
}

/// Result of one evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub confirmations: u64,
    pub status: TransferStatus,
}

/// One step of the Pending state machine.
///
/// `located` is whether the transaction can still be found in a block. A
/// lagging node reporting a lower head never lowers the count, and terminal
/// states are returned unchanged.
pub fn evaluate(
    transfer: &CandidateTransfer,
    current_height: u64,
    located: bool,
    required: u64,
) -> Outcome {
    if transfer.status.is_terminal() {
        return Outcome {
            confirmations: transfer.confirmations,
            status: transfer.status,
        };
    }
    if !located {
        return Outcome {
            confirmations: transfer.confirmations,
            status: TransferStatus::Failed,
        };
    }
    let confirmations = confirmations_at(transfer.observed_block, current_height)
        .max(transfer.confirmations);
    Outcome {
        confirmations,
        status: status_for(confirmations, required),
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// What [`ConfirmationTracker::observe`] did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// New candidate: announced (if never announced before) and tracked.
    Tracked,
    /// Already in flight: an immediate re-check was requested.
    Known,
    /// Already confirmed or failed in this process.
    Settled,
    /// The dispatch gate is closed; nothing was tracked.
    Rejected,
}

struct InFlight {
    transfer: CandidateTransfer,
    recheck: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct TrackerState {
    in_flight: HashMap<String, InFlight>,
    /// Hashes already passed to `on_detected`, with their observed block.
    /// Survives `clear()`.
    announced: HashMap<String, u64>,
    /// Hashes that reached a terminal state, with their observed block.
    /// Survives `clear()`.
    settled: HashMap<String, u64>,
}

struct TrackerInner {
    client: Arc<dyn ChainClient>,
    gate: Arc<DispatchGate>,
    required: u64,
    check_interval: Duration,
    state: Mutex<TrackerState>,
}

#[derive(Clone)]
pub struct ConfirmationTracker {
    inner: Arc<TrackerInner>,
}

impl ConfirmationTracker {
    pub fn new(
        client: Arc<dyn ChainClient>,
        gate: Arc<DispatchGate>,
        required: u64,
        check_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                client,
                gate,
                required,
                check_interval,
                state: Mutex::new(TrackerState::default()),
            }),
        }
    }

    /// Hand a freshly detected candidate to the tracker.
    pub async fn observe(&self, transfer: CandidateTransfer) -> Observation {
        let hash = transfer.tx_hash.clone();
        let announce = {
            let mut state = self.inner.lock();
            if let Some(record) = state.in_flight.get(&hash) {
                record.recheck.notify_one();
                return Observation::Known;
            }
            if state.settled.contains_key(&hash) {
                return Observation::Settled;
            }
            state.in_flight.insert(
                hash.clone(),
                InFlight {
                    transfer: transfer.clone(),
                    recheck: Arc::new(Notify::new()),
                    task: None,
                },
            );
            !state.announced.contains_key(&hash)
        };

        if announce {
            let delivered = self
                .inner
                .gate
                .dispatch(TransferEventKind::TransferDetected, &transfer)
                .await;
            if !delivered {
                self.inner.lock().in_flight.remove(&hash);
                return Observation::Rejected;
            }
            info!(
                tx_hash = %hash,
                amount = %transfer.amount,
                block = transfer.observed_block,
                "Transfer detected"
            );
        }

        let mut state = self.inner.lock();
        if announce {
            state.announced.insert(hash.clone(), transfer.observed_block);
        }
        // `clear()` may have run while the detection was dispatched.
        let Some(record) = state.in_flight.get_mut(&hash) else {
            return Observation::Rejected;
        };
        let recheck = record.recheck.clone();
        record.task = Some(tokio::spawn(
            self.inner.clone().track(hash.clone(), recheck),
        ));
        Observation::Tracked
    }

    /// Abort every check task and forget in-flight records. Announced and
    /// settled hashes are kept.
    pub fn clear(&self) {
        let drained: Vec<InFlight> = {
            let mut state = self.inner.lock();
            state.in_flight.drain().map(|(_, record)| record).collect()
        };
        for record in drained {
            if let Some(task) = record.task {
                task.abort();
            }
        }
    }

    /// Forget announced and settled hashes observed below `height`. Blocks
    /// below a fresh scan start are not scanned again by this process.
    pub fn forget_below(&self, height: u64) {
        let mut state = self.inner.lock();
        state.announced.retain(|_, block| *block >= height);
        state.settled.retain(|_, block| *block >= height);
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Current state of an in-flight record.
    pub fn get(&self, tx_hash: &str) -> Option<CandidateTransfer> {
        self.inner
            .lock()
            .in_flight
            .get(tx_hash)
            .map(|record| record.transfer.clone())
    }
}

impl TrackerInner {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check loop of one candidate. Returns once it is terminal or evicted.
    async fn track(self: Arc<Self>, hash: String, recheck: Arc<Notify>) {
        let mut failures = 0u32;
        loop {
            match self.check_once(&hash).await {
                Ok(true) => return,
                Ok(false) => failures = 0,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(tx_hash = %hash, failures, error = %e, "Confirmation check failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(check_delay(self.check_interval, failures)) => {}
                _ = recheck.notified() => {
                    debug!(tx_hash = %hash, "Re-check requested");
                }
            }
        }
    }

    /// One check. `Ok(true)` means the task is done.
    async fn check_once(&self, hash: &str) -> Result<bool, ChainError> {
        let current_height = self.client.current_height().await?;
        let located = self
            .client
            .transaction(hash)
            .await?
            .is_some_and(|tx| tx.block_number.is_some());
        // Mined but reverted: no value moved.
        let reverted = located
            && self
                .client
                .transaction_receipt(hash)
                .await?
                .is_some_and(|receipt| receipt.status == Some(false));

        let settled = {
            let mut state = self.lock();
            let Some(record) = state.in_flight.get_mut(hash) else {
                return Ok(true);
            };
            let mut outcome = evaluate(&record.transfer, current_height, located, self.required);
            if reverted {
                outcome.status = TransferStatus::Failed;
            }
            record.transfer.confirmations = outcome.confirmations;
            record.transfer.status = outcome.status;
            record.transfer.last_checked_at = OffsetDateTime::now_utc();

            if !outcome.status.is_terminal() {
                debug!(
                    tx_hash = %hash,
                    confirmations = outcome.confirmations,
                    required = self.required,
                    "Transfer still pending"
                );
                return Ok(false);
            }
            let observed_block = record.transfer.observed_block;
            let transfer = state
                .in_flight
                .remove(hash)
                .map(|record| record.transfer);
            state.settled.insert(hash.to_string(), observed_block);
            transfer
        };
        let Some(transfer) = settled else {
            return Ok(true);
        };

        match transfer.status {
            TransferStatus::Confirmed => {
                let delivered = self
                    .gate
                    .dispatch(TransferEventKind::TransferConfirmed, &transfer)
                    .await;
                if delivered {
                    info!(
                        tx_hash = %hash,
                        confirmations = transfer.confirmations,
                        "Transfer confirmed"
                    );
                } else {
                    // Stopped before the callback ran; let a later run pick
                    // it up again.
                    self.lock().settled.remove(hash);
                }
            }
            TransferStatus::Failed if reverted => {
                warn!(
                    tx_hash = %hash,
                    observed_block = transfer.observed_block,
                    "Transaction reverted, marking transfer failed"
                );
            }
            TransferStatus::Failed => {
                warn!(
                    tx_hash = %hash,
                    observed_block = transfer.observed_block,
                    "Transaction disappeared from the chain, marking transfer failed"
                );
            }
            TransferStatus::Pending => {}
        }
        Ok(true)
    }
}
