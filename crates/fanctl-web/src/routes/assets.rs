//! Static web UI files.
//!
//! Files are read from the configured web root. Unknown paths fall back to
//! `index.html` so client-side routes resolve; html/js/css files are stored
//! gzip-compressed and served with `Content-Encoding: gzip`.

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use fanctl_core::assets;

use crate::AppState;

/// GET /*
pub async fn serve(State(state): State<AppState>, uri: Uri) -> Response {
    let path = match assets::resolve(&state.web_root, uri.path()) {
        Ok(path) => path,
        Err(e) => {
            warn!("Rejected asset request: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let (path, bytes) = match tokio::fs::read(&path).await {
        Ok(bytes) => (path, bytes),
        Err(_) => {
            let index = assets::index(&state.web_root);
            match tokio::fs::read(&index).await {
                Ok(bytes) => (index, bytes),
                Err(e) => {
                    error!("Failed to read file {}: {}", index.display(), e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to read existing file",
                    )
                        .into_response();
                }
            }
        }
    };

    debug!("Serving {} ({} bytes)", path.display(), bytes.len());

    let kind = assets::asset_type(&path);
    if kind.gzip {
        (
            [
                (header::CONTENT_TYPE, kind.content_type),
                (header::CONTENT_ENCODING, "gzip"),
            ],
            bytes,
        )
            .into_response()
    } else {
        ([(header::CONTENT_TYPE, kind.content_type)], bytes).into_response()
    }
}
