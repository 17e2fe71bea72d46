//! Device name routes.

use axum::{body::Bytes, extract::State, response::Json, routing::get, Router};

use fanctl_protocol::{Ack, NameMessage};

use crate::{AppState, WebError};

pub fn routes() -> Router<AppState> {
    Router::new().route("/name", get(get_name).put(put_name))
}

/// GET /api/name
async fn get_name(State(state): State<AppState>) -> Json<NameMessage> {
    Json(state.api.get_name())
}

/// PUT /api/name
async fn put_name(State(state): State<AppState>, body: Bytes) -> Result<Json<Ack>, WebError> {
    let ack = tokio::task::spawn_blocking(move || state.api.put_name(&body))
        .await
        .map_err(|e| WebError::Internal(e.to_string()))??;
    Ok(Json(ack))
}
