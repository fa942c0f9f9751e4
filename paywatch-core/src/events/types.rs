use crate::entities::CandidateTransfer;
use paywatch_sdk::objects::{TransferEventKind, TransferPayload};

/// A detection or confirmation, as queued for the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub kind: TransferEventKind,
    pub transfer: CandidateTransfer,
    pub required_confirmations: u64,
}

impl TransferEvent {
    pub fn detected(transfer: CandidateTransfer, required_confirmations: u64) -> Self {
        Self {
            kind: TransferEventKind::TransferDetected,
            transfer,
            required_confirmations,
        }
    }

    pub fn confirmed(transfer: CandidateTransfer, required_confirmations: u64) -> Self {
        Self {
            kind: TransferEventKind::TransferConfirmed,
            transfer,
            required_confirmations,
        }
    }

    pub fn payload(&self) -> TransferPayload {
        self.transfer.to_payload(self.required_confirmations)
    }
}
