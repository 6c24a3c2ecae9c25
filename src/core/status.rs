//! Control routes: readiness, activity, imports and load preparation.

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use super::error::{LoadFailure, ResolverError};
use super::loader::{LoadGate, LoadPlan};
use super::source::ModelSource;
use crate::bridge::SyncReport;
use crate::intercept::WorkerHandle;
use crate::models::{
    from_path, AssetStore, AssetSummary, ChecklistItem, ImportError, ManifestState, ModelManifest,
};
use crate::output::logs::{ActivityEntry, ActivityLog};

#[derive(Clone)]
pub struct StatusState {
    pub store: Arc<AssetStore>,
    pub worker: WorkerHandle,
    pub activity: Arc<ActivityLog>,
    pub gate: Arc<LoadGate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub generation: Uuid,
    pub controlling: bool,
    pub manifest: Option<ModelManifest>,
    pub manifest_error: Option<String>,
    pub checklist: Vec<ChecklistItem>,
    pub assets: Vec<AssetSummary>,
    pub last_sync: Option<SyncReport>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    failure: Option<LoadFailure>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "failure": self.failure,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<ResolverError> for ApiError {
    fn from(error: ResolverError) -> Self {
        let status = match error {
            ResolverError::ConfigurationAbsent
            | ResolverError::ConfigurationMalformed(_)
            | ResolverError::NoAssets => StatusCode::UNPROCESSABLE_ENTITY,
            ResolverError::InterceptionNotReady => StatusCode::SERVICE_UNAVAILABLE,
            ResolverError::AssetMissing(_) => StatusCode::NOT_FOUND,
            ResolverError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            failure: Some(LoadFailure::from(&error)),
            message: error.to_string(),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(error: ImportError) -> Self {
        let status = match error {
            ImportError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: error.to_string(),
            failure: None,
        }
    }
}

pub fn status_router(state: StatusState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/activity", get(activity))
        .route("/import", post(import))
        .route("/clear", post(clear))
        .route("/load", post(load))
        .with_state(state)
}

async fn status(State(state): State<StatusState>) -> Json<StatusResponse> {
    let manifest = state.store.manifest();
    let (manifest, manifest_error) = match manifest.as_ref() {
        ManifestState::Ready(manifest) => (Some(manifest.clone()), None),
        ManifestState::Malformed(reason) => (None, Some(reason.clone())),
        ManifestState::Absent => (None, None),
    };
    Json(StatusResponse {
        generation: state.store.generation(),
        controlling: state.worker.is_controlling(),
        manifest,
        manifest_error,
        checklist: state.store.checklist(),
        assets: state.store.snapshot().summaries(),
        last_sync: state.store.last_report(),
    })
}

async fn activity(State(state): State<StatusState>) -> Json<Vec<ActivityEntry>> {
    Json(state.activity.snapshot())
}

async fn import(
    State(state): State<StatusState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<SyncReport>, ApiError> {
    let path = request.path;
    let bag = tokio::task::spawn_blocking(move || from_path(&path))
        .await
        .map_err(|error| ImportError::Other(anyhow::anyhow!("import task failed: {error}")))??;
    Ok(Json(state.store.replace(bag).await))
}

async fn clear(State(state): State<StatusState>) -> Json<SyncReport> {
    Json(state.store.clear().await)
}

async fn load(
    State(state): State<StatusState>,
    Json(source): Json<ModelSource>,
) -> Result<Json<LoadPlan>, ApiError> {
    match state.gate.prepare(&source).await {
        Ok(plan) => Ok(Json(plan)),
        Err(error) => {
            warn!("Load refused: {error}");
            state.activity.warn(error.to_string());
            Err(error.into())
        }
    }
}
