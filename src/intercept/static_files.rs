use std::path::Path;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::path::normalize;
use super::response::AssetResponse;

/// Serves the UI bundle with an index.html fallback for client-side routes.
/// Requests under `prefix` never reach the file service; they get a plain
/// 404 so a missing asset can't be mistaken for the app shell.
pub fn static_router(ui_dir: impl AsRef<Path>, prefix: impl Into<String>) -> Router {
    let ui_dir = ui_dir.as_ref();
    let files = ServeDir::new(ui_dir).fallback(ServeFile::new(ui_dir.join("index.html")));
    Router::new()
        .fallback_service(files)
        .layer(middleware::from_fn_with_state(prefix.into(), guard_reserved))
        .layer(TraceLayer::new_for_http())
}

async fn guard_reserved(State(prefix): State<String>, request: Request, next: Next) -> Response {
    let raw = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_else(|| request.uri().path());
    let bare = request.uri().path() == prefix.trim_end_matches('/');
    match normalize(raw, &prefix).or_else(|| bare.then(String::new)) {
        Some(relative) => {
            warn!("[static] refusing to serve {relative} outside the asset responders");
            AssetResponse::not_found(&relative).into_response()
        }
        None => next.run(request).await,
    }
}
