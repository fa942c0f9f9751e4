use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use paywatch_sdk::objects::admin::AdminBalanceResponse;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{AdminApiError, find_watch};

/// `GET /watches/{watch}/balance`: current balance of the watched address.
pub async fn balance(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(watch): Path<String>,
) -> Result<impl IntoResponse, AdminApiError> {
    let monitor = find_watch(&state, &watch).await?;
    let balance = monitor.balance().await.map_err(AdminApiError::Monitor)?;
    let config = monitor.config();

    Ok(Json(AdminBalanceResponse {
        watch: config.name.clone(),
        address: config.recipient.clone(),
        asset: config.asset.clone(),
        balance,
    }))
}
