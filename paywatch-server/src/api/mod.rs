//! HTTP API.
//!
//! Only the Admin API is exposed; transfer notifications leave the process
//! as ledger webhooks.

pub mod admin;
pub mod extractors;
