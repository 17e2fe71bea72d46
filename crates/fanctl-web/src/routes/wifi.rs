//! Connectivity routes.
//!
//! # Endpoints
//!
//! ### `GET /api/wifi/scan`
//! Scans for nearby networks. Returns at most 10 entries
//! `[{"ssid", "rssi", "channel"}]`, or an empty array if the scan failed.
//!
//! ### `POST /api/wifi/sta`
//! Body `{"ssid", "password", "save"?}`. Switches the station to the given
//! network, leaving access-point mode if needed. With `"save": true` the
//! credentials are also used on the next boot.
//!
//! ### `GET /api/wifi/status`
//! Connectivity snapshot `{"state", "retry_count", "ip"?, "mode"}`.
//!
//! ### `GET /api/mode/get`
//! `{"mode": 0}` in station mode, `{"mode": 1}` in access-point mode.

use axum::{
    body::Bytes,
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};

use fanctl_protocol::{Ack, ModeResponse, ScanEntry, WifiStatusResponse};

use crate::{AppState, WebError};

/// Create connectivity routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wifi/scan", get(scan))
        .route("/wifi/sta", post(set_station))
        .route("/wifi/status", get(status))
        .route("/mode/get", get(mode))
}

/// GET /api/wifi/scan
async fn scan(State(state): State<AppState>) -> Result<Json<Vec<ScanEntry>>, WebError> {
    // The scan blocks on the radio for seconds.
    let entries = tokio::task::spawn_blocking(move || state.api.scan())
        .await
        .map_err(|e| WebError::Internal(e.to_string()))?;
    Ok(Json(entries))
}

/// POST /api/wifi/sta
async fn set_station(State(state): State<AppState>, body: Bytes) -> Result<Json<Ack>, WebError> {
    let ack = tokio::task::spawn_blocking(move || state.api.post_station(&body))
        .await
        .map_err(|e| WebError::Internal(e.to_string()))??;
    Ok(Json(ack))
}

/// GET /api/wifi/status
async fn status(State(state): State<AppState>) -> Json<WifiStatusResponse> {
    Json(state.api.get_wifi_status())
}

/// GET /api/mode/get
async fn mode(State(state): State<AppState>) -> Json<ModeResponse> {
    Json(state.api.get_mode())
}
