//! PaymentMonitor processor.
//!
//! The PaymentMonitor is responsible for:
//! - Wiring one chain client, detector, tracker and verifier for a watch
//! - Running the watch loop: wait for a new head, scan the unscanned range
//!   (bounded by `max_blocks_per_poll`) and hand candidates to the tracker
//! - Starting and stopping that loop, with a dispatch gate guaranteeing no
//!   callback runs once `stop()` has returned
//!
//! Scanning always resumes from the chain head current at `start()`; hashes
//! the tracker remembers from below that head are dropped at that point.

use crate::chain::{ChainClient, ChainError, HeadSource, head_source};
use crate::config::NetworkConfig;
use crate::entities::CandidateTransfer;
use crate::events::{DispatchGate, HandlerRegistry};
use crate::processors::detector::TransferDetector;
use crate::processors::tracker::ConfirmationTracker;
use crate::processors::verifier::{ManualVerifier, VerifyError};
use crate::utils::units::{AmountError, to_display_amount};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("amount error: {0}")]
    Amount(#[from] AmountError),
}

/// Snapshot reported by [`PaymentMonitor::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStatus {
    pub running: bool,
    /// Highest block fully scanned since the last start.
    pub scanned_height: Option<u64>,
    pub in_flight: usize,
}

struct RunningLoop {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Sentinel for "nothing scanned yet" in `next_height`.
const UNSCANNED: u64 = u64::MAX;

pub struct PaymentMonitor {
    config: Arc<NetworkConfig>,
    client: Arc<dyn ChainClient>,
    handlers: Arc<HandlerRegistry>,
    gate: Arc<DispatchGate>,
    detector: Arc<TransferDetector>,
    tracker: ConfirmationTracker,
    verifier: ManualVerifier,
    next_height: Arc<AtomicU64>,
    run: Mutex<Option<RunningLoop>>,
}

impl PaymentMonitor {
    pub fn new(config: NetworkConfig, client: Arc<dyn ChainClient>) -> Self {
        let config = Arc::new(config);
        let handlers = Arc::new(HandlerRegistry::new());
        let gate = Arc::new(DispatchGate::new(handlers.clone()));
        Self {
            detector: Arc::new(TransferDetector::new(config.clone(), client.clone())),
            tracker: ConfirmationTracker::new(
                client.clone(),
                gate.clone(),
                config.required_confirmations,
                config.check_interval,
            ),
            verifier: ManualVerifier::new(config.clone(), client.clone()),
            config,
            client,
            handlers,
            gate,
            next_height: Arc::new(AtomicU64::new(UNSCANNED)),
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Called once per `tx_hash` when a qualifying transfer is first seen.
    pub fn on_detected<F>(&self, handler: F)
    where
        F: Fn(&CandidateTransfer) + Send + Sync + 'static,
    {
        self.handlers.on_detected(handler);
    }

    /// Called exactly once per `tx_hash` that reaches the required depth.
    pub fn on_confirmed<F>(&self, handler: F)
    where
        F: Fn(&CandidateTransfer) + Send + Sync + 'static,
    {
        self.handlers.on_confirmed(handler);
    }

    /// Start the watch loop. Calling it on a running monitor only logs a
    /// warning.
    pub async fn start(&self) {
        let mut run = self.run.lock().await;
        if run.is_some() {
            warn!(watch = %self.config.name, "Monitor already running");
            return;
        }

        self.next_height.store(UNSCANNED, Ordering::Relaxed);
        self.gate.open().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watch_loop = WatchLoop {
            config: self.config.clone(),
            heads: head_source(&self.config, self.client.clone()),
            detector: self.detector.clone(),
            tracker: self.tracker.clone(),
            next_height: self.next_height.clone(),
        };
        let handle = tokio::spawn(watch_loop.run(shutdown_rx));
        *run = Some(RunningLoop {
            shutdown_tx,
            handle,
        });

        info!(
            watch = %self.config.name,
            network = %self.config.network,
            asset = %self.config.asset.symbol(),
            recipient = %self.config.recipient,
            required_confirmations = self.config.required_confirmations,
            "Monitor started"
        );
    }

    /// Stop polling, cancel every check task and drop in-flight state. Safe
    /// to call on a monitor that was never started.
    pub async fn stop(&self) {
        self.gate.close().await;

        let running = self.run.lock().await.take();
        if let Some(running) = running {
            let _ = running.shutdown_tx.send(true);
            running.handle.abort();
            let _ = running.handle.await;
            info!(watch = %self.config.name, "Monitor stopped");
        }
        self.tracker.clear();
    }

    /// Current balance of the watched address, in display units.
    pub async fn balance(&self) -> Result<Decimal, MonitorError> {
        let raw = self
            .client
            .balance_of(&self.config.recipient, self.config.token_contract())
            .await?;
        Ok(to_display_amount(raw, self.config.decimals())?)
    }

    pub async fn verify(&self, tx_hash: &str) -> Result<Option<CandidateTransfer>, VerifyError> {
        self.verifier.verify(tx_hash).await
    }

    /// Highest block fully scanned since the last start.
    pub fn scanned_height(&self) -> Option<u64> {
        match self.next_height.load(Ordering::Relaxed) {
            UNSCANNED => None,
            next => next.checked_sub(1),
        }
    }

    pub async fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.run.lock().await.is_some(),
            scanned_height: self.scanned_height(),
            in_flight: self.tracker.in_flight(),
        }
    }
}

// ---------------------------------------------------------------------------
// Watch loop
// ---------------------------------------------------------------------------

struct WatchLoop {
    config: Arc<NetworkConfig>,
    heads: Box<dyn HeadSource>,
    detector: Arc<TransferDetector>,
    tracker: ConfirmationTracker,
    next_height: Arc<AtomicU64>,
}

impl WatchLoop {
    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let name = self.config.name.clone();
        let mut head = 0u64;
        let mut caught_up = true;

        loop {
            if caught_up {
                let next = tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }

                    next = self.heads.next_head() => next,
                };
                match next {
                    Ok(h) => head = h,
                    Err(e) => {
                        warn!(watch = %name, error = %e, "Failed to get chain head");
                        tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => {
                                if *shutdown_rx.borrow() {
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(self.config.poll_interval) => {}
                        }
                        continue;
                    }
                }
            }

            caught_up = self.tick(head).await;
        }

        debug!(watch = %name, "Watch loop exited");
    }

    /// Scan one window up to `head`. Returns whether the scan caught up with
    /// `head` (or cannot progress right now).
    async fn tick(&mut self, head: u64) -> bool {
        let mut from = self.next_height.load(Ordering::Relaxed);
        if from == UNSCANNED {
            from = head;
            self.next_height.store(from, Ordering::Relaxed);
            self.tracker.forget_below(from);
            debug!(watch = %self.config.name, height = head, "Scanning from current head");
        }
        if from > head {
            return true;
        }
        let to = head.min(from.saturating_add(self.config.max_blocks_per_poll - 1));

        let scan = match self.detector.scan(from, to).await {
            Ok(scan) => scan,
            Err(e) => {
                warn!(watch = %self.config.name, from, to, error = %e, "Scan failed");
                return true;
            }
        };

        for transfer in scan.transfers {
            self.tracker.observe(transfer).await;
        }
        self.next_height.store(scan.next_height, Ordering::Relaxed);

        // A fully processed window that is still behind the head: go again
        // without waiting for the next head.
        let behind = scan.next_height > to && to < head;
        !behind
    }
}
