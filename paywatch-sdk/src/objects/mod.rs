//! Wire objects exchanged with Paywatch consumers.

pub mod admin;
pub mod blockchains;
pub mod transfer;
pub mod webhook;

pub use blockchains::{Asset, Network, Stablecoin, TokenContract};
pub use transfer::{TransferPayload, TransferStatus};
pub use webhook::{TransferEventKind, TransferEventPayload};
