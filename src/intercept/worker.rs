use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use axum::{extract::State, http::Uri, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::path::normalize;
use super::response::{answer, AssetResponse};
use crate::bridge::SharedResponseCache;
use crate::output::logs::ActivityLog;

/// Whether the persistent responder currently owns the reserved prefix.
#[derive(Clone, Default)]
pub struct WorkerHandle {
    controlling: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_controlling(&self) {
        self.controlling.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.controlling.store(false, Ordering::SeqCst);
    }

    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct WorkerState {
    pub cache: Arc<SharedResponseCache>,
    pub activity: Arc<ActivityLog>,
}

impl WorkerState {
    pub fn new(cache: Arc<SharedResponseCache>, activity: Arc<ActivityLog>) -> Self {
        Self { cache, activity }
    }
}

/// Router for the persistent responder. It answers from the shared cache
/// only and never serves anything but assets or plain-text 404s.
pub fn worker_router(state: WorkerState) -> Router {
    let route = format!("{}*path", state.cache.prefix());
    Router::new()
        .route(&route, get(serve_asset))
        .fallback(outside_prefix)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn serve_asset(State(state): State<WorkerState>, uri: Uri) -> AssetResponse {
    let raw = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_else(|| uri.path());
    match normalize(raw, state.cache.prefix()) {
        Some(relative) => answer(state.cache.as_ref(), &relative, "worker", &state.activity),
        None => AssetResponse::not_found(uri.path()),
    }
}

async fn outside_prefix(uri: Uri) -> AssetResponse {
    AssetResponse::not_found(uri.path())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use bytes::Bytes;
    use tower::ServiceExt;

    use super::*;
    use crate::bridge::{CachedResponse, ResponseCache};

    fn state() -> WorkerState {
        let cache = Arc::new(SharedResponseCache::new("/custom-model/"));
        cache
            .put(
                "/custom-model/config.json",
                CachedResponse::ok("application/json", Bytes::from_static(b"{\"model_type\":\"marian\"}")),
            )
            .unwrap();
        cache
            .put(
                "/custom-model/model_merged.onnx",
                CachedResponse::ok("application/octet-stream", Bytes::from_static(b"onnx")),
            )
            .unwrap();
        WorkerState::new(cache, Arc::new(ActivityLog::new()))
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String, Bytes) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|value| value.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, body)
    }

    #[tokio::test]
    async fn serves_config_with_query_suffix() {
        let (status, content_type, body) =
            get(worker_router(state()), "/custom-model/config.json?v=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json");
        assert_eq!(body, Bytes::from_static(b"{\"model_type\":\"marian\"}"));
    }

    #[tokio::test]
    async fn decoder_request_uses_merged_graph() {
        let (status, _, body) =
            get(worker_router(state()), "/custom-model/some/path/decoder_model.onnx").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"onnx"));
    }

    #[tokio::test]
    async fn misses_are_404_text_never_html() {
        let (status, content_type, body) =
            get(worker_router(state()), "/custom-model/tokenizer.json").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(content_type.starts_with("text/plain"));
        assert_eq!(
            body,
            Bytes::from_static(b"Custom model file not found: tokenizer.json")
        );

        let (status, _, _) = get(worker_router(state()), "/index.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn head_requests_are_answered() {
        let response = worker_router(state())
            .oneshot(
                Request::builder()
                    .method(Method::HEAD)
                    .uri("/custom-model/config.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn handle_tracks_control() {
        let handle = WorkerHandle::new();
        assert!(!handle.is_controlling());
        handle.clone().mark_controlling();
        assert!(handle.is_controlling());
        handle.release();
        assert!(!handle.is_controlling());
    }
}
