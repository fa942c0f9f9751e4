//! Handler registry and dispatch gate.

use crate::entities::CandidateTransfer;
use paywatch_sdk::objects::TransferEventKind;
use std::sync::{Arc, PoisonError, RwLock};

/// Callback invoked with the transfer that triggered it.
///
/// Handlers run on the monitor's tasks while the dispatch gate is held, so
/// they must return quickly and must not call `PaymentMonitor::stop`.
pub type TransferHandler = Arc<dyn Fn(&CandidateTransfer) + Send + Sync>;

/// `on_detected` / `on_confirmed` subscribers of one monitor.
#[derive(Default)]
pub struct HandlerRegistry {
    detected: RwLock<Vec<TransferHandler>>,
    confirmed: RwLock<Vec<TransferHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_detected<F>(&self, handler: F)
    where
        F: Fn(&CandidateTransfer) + Send + Sync + 'static,
    {
        self.slot(TransferEventKind::TransferDetected)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    pub fn on_confirmed<F>(&self, handler: F)
    where
        F: Fn(&CandidateTransfer) + Send + Sync + 'static,
    {
        self.slot(TransferEventKind::TransferConfirmed)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    fn slot(&self, kind: TransferEventKind) -> &RwLock<Vec<TransferHandler>> {
        match kind {
            TransferEventKind::TransferDetected => &self.detected,
            TransferEventKind::TransferConfirmed => &self.confirmed,
        }
    }

    /// Snapshot so handlers can register further handlers without
    /// deadlocking.
    fn handlers(&self, kind: TransferEventKind) -> Vec<TransferHandler> {
        self.slot(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Open/closed switch in front of a [`HandlerRegistry`].
///
/// Dispatch holds the read side for the whole handler fan-out; closing
/// takes the write side, so once [`close`](DispatchGate::close) returns no
/// handler is running and none will run until the gate is reopened.
pub struct DispatchGate {
    open: tokio::sync::RwLock<bool>,
    registry: Arc<HandlerRegistry>,
}

impl DispatchGate {
    /// A closed gate.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            open: tokio::sync::RwLock::new(false),
            registry,
        }
    }

    pub async fn open(&self) {
        *self.open.write().await = true;
    }

    pub async fn close(&self) {
        *self.open.write().await = false;
    }

    /// Run every handler of `kind`. Returns `false` without calling anything
    /// when the gate is closed.
    pub async fn dispatch(&self, kind: TransferEventKind, transfer: &CandidateTransfer) -> bool {
        let open = self.open.read().await;
        if !*open {
            return false;
        }
        for handler in self.registry.handlers(kind) {
            handler(transfer);
        }
        true
    }
}
