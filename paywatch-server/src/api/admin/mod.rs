//! Admin API handlers.
//!
//! These endpoints are called by operator tooling and require the
//! `Paywatch-Admin-Authorization` header with the plaintext admin secret.
//!
//! # Endpoints
//!
//! - `GET /watches`                             : status of every watch
//! - `GET /watches/{watch}/balance`             : balance of the watched address
//! - `GET /watches/{watch}/transfers/{tx_hash}` : manual verification

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use paywatch_core::processors::{MonitorError, PaymentMonitor, VerifyError};
use std::sync::Arc;

use crate::state::AppState;

mod balance;
mod list_watches;
mod verify_transfer;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/watches", get(list_watches::list_watches))
        .route("/watches/{watch}/balance", get(balance::balance))
        .route(
            "/watches/{watch}/transfers/{tx_hash}",
            get(verify_transfer::verify_transfer),
        )
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum AdminApiError {
    UnknownWatch(String),
    Monitor(MonitorError),
    Verify(VerifyError),
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminApiError::UnknownWatch(watch) => {
                (StatusCode::NOT_FOUND, format!("unknown watch {watch}")).into_response()
            }
            AdminApiError::Monitor(e) => {
                tracing::error!(error = %e, "Admin API chain query failed");
                (StatusCode::BAD_GATEWAY, "chain query failed").into_response()
            }
            AdminApiError::Verify(e) => {
                tracing::error!(error = %e, "Admin API verification failed");
                (StatusCode::BAD_GATEWAY, "chain query failed").into_response()
            }
        }
    }
}

pub(crate) async fn find_watch(
    state: &AppState,
    watch: &str,
) -> Result<Arc<PaymentMonitor>, AdminApiError> {
    state
        .supervisor
        .get(watch)
        .await
        .ok_or_else(|| AdminApiError::UnknownWatch(watch.to_string()))
}
