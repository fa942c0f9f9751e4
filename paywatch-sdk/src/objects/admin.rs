//! Admin API response types.

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::blockchains::{Asset, Network};
use super::transfer::TransferPayload;

/// Runtime status of one watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminWatchResponse {
    pub name: CompactString,
    pub network: Network,
    pub asset: Asset,
    pub recipient: String,
    pub required_confirmations: u64,
    pub running: bool,
    /// Last block height fully scanned, if the watch has scanned anything.
    pub scanned_height: Option<u64>,
    pub in_flight: usize,
}

/// Balance of the watched address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBalanceResponse {
    pub watch: CompactString,
    pub address: String,
    pub asset: Asset,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

/// Result of a manual verification. `transfer` is `None` when the
/// transaction does not exist or does not pay the watched address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminVerifyResponse {
    pub watch: CompactString,
    pub tx_hash: String,
    pub transfer: Option<TransferPayload>,
}
