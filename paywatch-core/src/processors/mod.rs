//! Processors of the payment monitoring pipeline.
//!
//! - `TransferDetector`: scans block ranges, emits `CandidateTransfer`s
//! - `ConfirmationTracker`: drives each candidate to Confirmed or Failed
//! - `PaymentMonitor`: start/stop-able watch loop over one watch
//! - `ManualVerifier`: read-only lookup of a single transaction
//! - `MonitorSupervisor`: keeps the set of monitors in line with config

pub mod detector;
pub mod monitor;
pub mod supervisor;
pub mod tracker;
pub mod verifier;

pub use detector::{DecodeError, DetectError, Scan, TransferDetector};
pub use monitor::{MonitorError, MonitorStatus, PaymentMonitor};
pub use supervisor::{ClientFactory, MonitorSupervisor, json_rpc_factory};
pub use tracker::{ConfirmationTracker, Observation};
pub use verifier::{ManualVerifier, VerifyError, VerifyTransfer};
