//! Webhook payload types delivered to the crediting ledger.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transfer::TransferPayload;
use crate::signature::Signature;

/// Which lifecycle edge a webhook reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferEventKind {
    /// First sighting; the ledger should record a pending payment.
    TransferDetected,
    /// Required depth reached; the ledger should credit, idempotently by `tx_hash`.
    TransferConfirmed,
}

impl std::fmt::Display for TransferEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferEventKind::TransferDetected => write!(f, "transfer_detected"),
            TransferEventKind::TransferConfirmed => write!(f, "transfer_confirmed"),
        }
    }
}

/// Body of every ledger webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEventPayload {
    /// Stable across delivery retries of the same event.
    pub event_id: Uuid,
    pub event_type: TransferEventKind,
    pub transfer: TransferPayload,
    pub timestamp: i64,
}

impl Signature for TransferEventPayload {}
