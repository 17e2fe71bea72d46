//! Fan speed routes.
//!
//! # Endpoints
//!
//! ### `GET /api/rpm/get`
//! Returns the measured speed of the last completed sampling window,
//! `{"rpm": N}`.
//!
//! ### `GET /api/fan/speed`
//! Returns the persisted speed command, `{"speed": N}`, 0 if none is stored.
//!
//! ### `PUT /api/fan/speed`
//! Body `{"speed": N}`. The value is clamped to 0..=100, persisted and
//! applied to the fan.

use axum::{body::Bytes, extract::State, response::Json, routing::get, Router};

use fanctl_protocol::{Ack, RpmResponse, SpeedResponse};

use crate::{AppState, WebError};

/// Create fan routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rpm/get", get(get_rpm))
        .route("/fan/speed", get(get_speed).put(put_speed))
}

/// GET /api/rpm/get
async fn get_rpm(State(state): State<AppState>) -> Json<RpmResponse> {
    Json(state.api.get_rpm())
}

/// GET /api/fan/speed
async fn get_speed(State(state): State<AppState>) -> Json<SpeedResponse> {
    Json(state.api.get_fan_speed())
}

/// PUT /api/fan/speed
async fn put_speed(State(state): State<AppState>, body: Bytes) -> Result<Json<Ack>, WebError> {
    // Persists to the store, which may block on disk.
    let ack = tokio::task::spawn_blocking(move || state.api.put_fan_speed(&body))
        .await
        .map_err(|e| WebError::Internal(e.to_string()))??;
    Ok(Json(ack))
}
