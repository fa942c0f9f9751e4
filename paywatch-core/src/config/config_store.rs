//! Generic config store with change notification.
//!
//! `ConfigStore<T>` keeps the current value as an `Arc<T>` inside a
//! `tokio::sync::watch` channel, so readers get a cheap snapshot and
//! consumers can await the next change without polling.

use std::sync::Arc;
use tokio::sync::watch;

/// A shared, reloadable configuration value.
///
/// Readers get an `Arc<T>` snapshot that stays valid even if the store is
/// updated while they hold it. Subscribers receive a [`ConfigWatcher`]
/// that can `await` the next change.
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<Arc<T>>>,
}

/// Receives notifications when a [`ConfigStore`] is updated.
///
/// Call [`changed()`](ConfigWatcher::changed) to wait for the next update.
pub struct ConfigWatcher<T> {
    rx: watch::Receiver<Arc<T>>,
}

// -- ConfigStore --------------------------------------------------------

impl<T> ConfigStore<T> {
    /// Create a new `ConfigStore` with the given initial value.
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Replace the stored value and notify all watchers.
    pub fn update(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    /// Snapshot of the current value.
    pub fn read(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> ConfigWatcher<T> {
        ConfigWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

// -- ConfigWatcher ------------------------------------------------------

impl<T> ConfigWatcher<T> {
    /// Wait until the config store is updated.
    ///
    /// Returns `Ok(())` when a new version is available, or `Err` if every
    /// [`ConfigStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }

    /// Snapshot of the value that triggered the last notification.
    pub fn latest(&mut self) -> Arc<T> {
        self.rx.borrow_and_update().clone()
    }
}
