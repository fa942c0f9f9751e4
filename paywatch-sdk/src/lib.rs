//! Paywatch SDK
//!
//! Wire types shared between the Paywatch monitor and its consumers: network
//! and asset identifiers, transfer DTOs, webhook payloads, and the
//! HMAC-SHA256 body signing scheme used for ledger webhooks.
//!
//! Enable the `client` feature for a typed admin API client.

#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
pub mod signature;
