//! Application state shared across all request handlers.

use crate::config::AdminSettings;
use paywatch_core::config::ConfigStore;
use paywatch_core::processors::MonitorSupervisor;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Owns every running payment monitor.
    pub supervisor: Arc<MonitorSupervisor>,
    /// Admin credentials (can be reloaded via SIGHUP).
    pub admin: ConfigStore<AdminSettings>,
}

impl AppState {
    pub fn new(supervisor: Arc<MonitorSupervisor>, admin: ConfigStore<AdminSettings>) -> Self {
        Self { supervisor, admin }
    }
}
