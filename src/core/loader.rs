use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::error::{LoadFailure, ResolverError};
use super::source::{ModelSource, SourceConfig};
use crate::bridge::SyncReport;
use crate::intercept::WorkerHandle;
use crate::models::manifest::{
    CONFIG_DOCUMENT, GENERATION_CONFIG_DOCUMENT, QUANTIZE_CONFIG_DOCUMENT, TOKENIZER_DOCUMENTS,
};
use crate::models::{missing_required, AssetStore, ModelManifest};
use crate::output::logs::ActivityLog;

/// What the caller hands the inference library once the gate opens.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadPlan {
    pub config: SourceConfig,
    pub files: Vec<String>,
    pub missing: Vec<String>,
    pub sync: Option<SyncReport>,
}

/// Checks that must pass before a model load may be triggered.
pub struct LoadGate {
    store: Arc<AssetStore>,
    worker: WorkerHandle,
    activity: Arc<ActivityLog>,
    asset_origin: String,
}

impl LoadGate {
    pub fn new(
        store: Arc<AssetStore>,
        worker: WorkerHandle,
        activity: Arc<ActivityLog>,
        asset_origin: impl Into<String>,
    ) -> Self {
        Self {
            store,
            worker,
            activity,
            asset_origin: asset_origin.into(),
        }
    }

    pub async fn prepare(&self, source: &ModelSource) -> Result<LoadPlan, ResolverError> {
        let prefix = self.store.bridge().prefix().to_string();
        let config = SourceConfig::derive(source, &prefix, &self.asset_origin);
        if !config.intercept {
            info!("Loading {} model {}", source.label(), config.model_id);
            return Ok(LoadPlan {
                config,
                files: Vec::new(),
                missing: Vec::new(),
                sync: None,
            });
        }

        if self.store.snapshot().is_empty() {
            return Err(ResolverError::NoAssets);
        }
        let manifest_state = self.store.manifest();
        let manifest = manifest_state.require()?;
        if !self.worker.is_controlling() {
            return Err(ResolverError::InterceptionNotReady);
        }

        let sync = match self.store.last_report() {
            Some(report) if report.is_clean() && report.generation == Some(self.store.generation()) => report,
            _ => self.store.resync().await,
        };
        if !sync.is_clean() {
            warn!(
                "Loading despite {} cache sync failure(s): {}",
                sync.failures.len(),
                sync.failures.join("; ")
            );
        }

        let missing: Vec<String> = missing_required(&self.store.checklist())
            .into_iter()
            .map(ToOwned::to_owned)
            .collect();
        if !missing.is_empty() {
            let message = format!("Model files still missing: {}", missing.join(", "));
            warn!("{message}");
            self.activity.warn(message);
        }

        let files = expected_files(manifest);
        info!(
            "Loading uploaded {} model from {} ({} files)",
            manifest.architecture,
            config.base_url,
            files.len()
        );
        Ok(LoadPlan {
            config,
            files,
            missing,
            sync: Some(sync),
        })
    }

    /// Classifies a failed load and records it for the user.
    pub fn fail(&self, message: &str) -> LoadFailure {
        let failure = LoadFailure::classify(message);
        warn!("Model load failed ({failure:?}): {message}");
        self.activity.warn(failure.to_string());
        failure
    }
}

/// Logical names the inference library asks for, in request order.
fn expected_files(manifest: &ModelManifest) -> Vec<String> {
    let mut files = vec![CONFIG_DOCUMENT.to_string()];
    files.extend(TOKENIZER_DOCUMENTS.iter().rev().map(|name| name.to_string()));
    if manifest.has_generation_config {
        files.push(GENERATION_CONFIG_DOCUMENT.to_string());
    }
    if manifest.has_quantize_config {
        files.push(QUANTIZE_CONFIG_DOCUMENT.to_string());
    }
    files.extend(
        manifest
            .required_weights
            .iter()
            .map(|role| role.logical_name().to_string()),
    );
    files
}
