//! Signal handling for graceful shutdown and config reload.

use crate::config::{AdminSettings, ConfigLoader, LedgerSettings};
use paywatch_core::config::{ConfigStore, NetworkConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = sigterm => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Config stores refreshed on every successful reload.
#[derive(Clone)]
pub struct ReloadTargets {
    pub watches: ConfigStore<Vec<NetworkConfig>>,
    pub admin: ConfigStore<AdminSettings>,
    pub ledger: ConfigStore<LedgerSettings>,
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// The supervisor reconciles monitors on its own once the watch store
/// changes. A failed reload keeps the previous configuration running.
///
/// Returns a Notify that can be used to signal when shutdown is complete.
pub fn spawn_config_reload_handler(
    config_loader: Arc<ConfigLoader>,
    targets: ReloadTargets,
    listen: SocketAddr,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            if loaded_config.server.listen != listen {
                                tracing::warn!(
                                    listen = %loaded_config.server.listen,
                                    "Listen address changes take effect after a restart"
                                );
                            }
                            targets.admin.update(loaded_config.admin);
                            targets.ledger.update(loaded_config.ledger);
                            targets.watches.update(loaded_config.watches);
                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload configuration");
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
