//! Transfer DTOs.

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::blockchains::{Asset, Network};

/// Lifecycle state of an observed transfer.
///
/// `Confirmed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Confirmed => write!(f, "confirmed"),
            TransferStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A candidate transfer as seen by API and webhook consumers.
///
/// Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub watch: CompactString,
    pub network: Network,
    pub asset: Asset,
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub observed_block: u64,
    pub confirmations: u64,
    pub required_confirmations: u64,
    pub status: TransferStatus,
    pub first_seen_at: i64,
    pub last_checked_at: i64,
}
