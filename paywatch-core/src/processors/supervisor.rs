//! MonitorSupervisor processor.
//!
//! The MonitorSupervisor is responsible for:
//! - Owning one [`PaymentMonitor`] per configured watch
//! - Reacting to config changes by diffing running monitors (stopping
//!   removed or changed watches, starting new ones, leaving unchanged
//!   watches running)
//! - Bridging monitor callbacks onto the `TransferEvent` queue
//! - Stopping everything on shutdown

use crate::chain::{ChainClient, ChainError, JsonRpcClient};
use crate::config::{ConfigStore, ConfigWatcher, NetworkConfig};
use crate::events::{TransferEvent, TransferEventSender};
use crate::processors::monitor::PaymentMonitor;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::{error, info, warn};

/// Builds the chain client for a watch.
pub type ClientFactory =
    Arc<dyn Fn(&NetworkConfig) -> Result<Arc<dyn ChainClient>, ChainError> + Send + Sync>;

/// JSON-RPC over HTTP against the watch's `endpoint`.
pub fn json_rpc_factory() -> ClientFactory {
    Arc::new(|config: &NetworkConfig| {
        let client: Arc<dyn ChainClient> = Arc::new(JsonRpcClient::new(config.endpoint.clone()));
        Ok(client)
    })
}

pub struct MonitorSupervisor {
    factory: ClientFactory,
    events: Option<TransferEventSender>,
    /// Running monitors. Stored as a `Vec`: a process watches a handful of
    /// pairs at most.
    monitors: RwLock<Vec<Arc<PaymentMonitor>>>,
}

impl MonitorSupervisor {
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            events: None,
            monitors: RwLock::new(Vec::new()),
        }
    }

    /// Forward every detection and confirmation of every monitor to `events`.
    pub fn with_event_sink(mut self, events: TransferEventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn get(&self, name: &str) -> Option<Arc<PaymentMonitor>> {
        self.monitors
            .read()
            .await
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    pub async fn list(&self) -> Vec<Arc<PaymentMonitor>> {
        self.monitors.read().await.clone()
    }

    /// Reconcile running monitors with `configs`.
    pub async fn apply(&self, configs: &[NetworkConfig]) {
        let mut monitors = self.monitors.write().await;

        // 1. Stop monitors whose watch was removed or changed.
        let mut kept = Vec::with_capacity(monitors.len());
        for monitor in monitors.drain(..) {
            if configs.iter().any(|c| c == monitor.config()) {
                kept.push(monitor);
            } else {
                info!(watch = %monitor.name(), "Stopping removed or changed watch");
                monitor.stop().await;
            }
        }
        *monitors = kept;

        // 2. Start monitors for watches not running yet.
        for config in configs {
            if monitors.iter().any(|m| m.config() == config) {
                continue;
            }
            let client = match (self.factory)(config) {
                Ok(client) => client,
                Err(e) => {
                    error!(watch = %config.name, error = %e, "Failed to build chain client");
                    continue;
                }
            };
            let monitor = Arc::new(PaymentMonitor::new(config.clone(), client));
            self.bridge_events(&monitor);
            monitor.start().await;
            monitors.push(monitor);
        }
    }

    fn bridge_events(&self, monitor: &PaymentMonitor) {
        let Some(events) = &self.events else {
            return;
        };
        let required = monitor.config().required_confirmations;

        let tx = events.clone();
        monitor.on_detected(move |transfer| {
            if tx.send(TransferEvent::detected(transfer.clone(), required)).is_err() {
                warn!(tx_hash = %transfer.tx_hash, "Transfer event queue closed");
            }
        });
        let tx = events.clone();
        monitor.on_confirmed(move |transfer| {
            if tx.send(TransferEvent::confirmed(transfer.clone(), required)).is_err() {
                warn!(tx_hash = %transfer.tx_hash, "Transfer event queue closed");
            }
        });
    }

    pub async fn stop_all(&self) {
        let monitors: Vec<_> = self.monitors.write().await.drain(..).collect();
        for monitor in monitors {
            monitor.stop().await;
        }
    }

    /// Run until shutdown is signaled, reconciling on every config change.
    pub async fn run(
        &self,
        mut shutdown_rx: watch::Receiver<bool>,
        config_store: ConfigStore<Vec<NetworkConfig>>,
        mut config_watcher: ConfigWatcher<Vec<NetworkConfig>>,
    ) {
        // -- Bootstrap from initial config ----------------------------------
        self.apply(&config_store.read()).await;
        info!(
            "MonitorSupervisor started with {} watches",
            self.monitors.read().await.len()
        );

        // -- Main event loop ------------------------------------------------
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("MonitorSupervisor received shutdown signal");
                        break;
                    }
                }

                Ok(()) = config_watcher.changed() => {
                    let configs = config_watcher.latest();
                    self.apply(&configs).await;
                    info!(
                        "MonitorSupervisor reconciled config, {} active watches",
                        self.monitors.read().await.len()
                    );
                }

                else => {
                    info!("Config store dropped");
                    break;
                }
            }
        }

        // -- Cleanup --------------------------------------------------------
        self.stop_all().await;
        info!("MonitorSupervisor shutdown complete");
    }
}
