use axum::{Json, extract::State, response::IntoResponse};
use paywatch_sdk::objects::admin::AdminWatchResponse;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// `GET /watches`: status of every running watch.
pub async fn list_watches(State(state): State<AppState>, _auth: AdminAuth) -> impl IntoResponse {
    let monitors = state.supervisor.list().await;

    let mut response = Vec::with_capacity(monitors.len());
    for monitor in monitors {
        let status = monitor.status().await;
        let config = monitor.config();
        response.push(AdminWatchResponse {
            name: config.name.clone(),
            network: config.network,
            asset: config.asset.clone(),
            recipient: config.recipient.clone(),
            required_confirmations: config.required_confirmations,
            running: status.running,
            scanned_height: status.scanned_height,
            in_flight: status.in_flight,
        });
    }

    Json(response)
}
