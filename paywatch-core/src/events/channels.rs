//! Event channel factories and handles.

use super::types::TransferEvent;
use tokio::sync::mpsc;

/// Sender handle for TransferEvent events.
pub type TransferEventSender = mpsc::UnboundedSender<TransferEvent>;
/// Receiver handle for TransferEvent events.
pub type TransferEventReceiver = mpsc::UnboundedReceiver<TransferEvent>;

/// Create a new TransferEvent channel.
///
/// Unbounded: handlers run synchronously inside the monitor and must never
/// block, and a confirmation must never be dropped for lack of buffer.
pub fn transfer_event_channel() -> (TransferEventSender, TransferEventReceiver) {
    mpsc::unbounded_channel()
}
