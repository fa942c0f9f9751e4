//! Transfer notifications.
//!
//! Monitors report to in-process handlers registered on a
//! [`HandlerRegistry`]. Every dispatch passes through a [`DispatchGate`]
//! that `stop()` closes before tearing anything down, so no handler runs
//! after a monitor has stopped.
//!
//! The server bridges handlers onto an unbounded [`TransferEvent`] queue
//! consumed by the ledger webhook sender.

pub mod channels;
pub mod handlers;
pub mod types;

pub use channels::{TransferEventReceiver, TransferEventSender, transfer_event_channel};
pub use handlers::{DispatchGate, HandlerRegistry, TransferHandler};
pub use types::TransferEvent;
pub use paywatch_sdk::objects::TransferEventKind;
