use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use paywatch_sdk::objects::admin::AdminVerifyResponse;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{AdminApiError, find_watch};

/// `GET /watches/{watch}/transfers/{tx_hash}`: look one transaction up on
/// chain without touching the monitor's tracker.
///
/// Answers `200` with `transfer: null` when the transaction is unknown or
/// does not pay the watched address.
pub async fn verify_transfer(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path((watch, tx_hash)): Path<(String, String)>,
) -> Result<impl IntoResponse, AdminApiError> {
    let monitor = find_watch(&state, &watch).await?;
    let transfer = monitor
        .verify(&tx_hash)
        .await
        .map_err(AdminApiError::Verify)?;
    let required = monitor.config().required_confirmations;

    Ok(Json(AdminVerifyResponse {
        watch: monitor.config().name.clone(),
        tx_hash,
        transfer: transfer.map(|t| t.to_payload(required)),
    }))
}
