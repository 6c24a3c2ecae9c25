use serde::{Deserialize, Serialize};

pub const DEFAULT_REGISTRY: &str = "https://huggingface.co";
const DEFAULT_REVISION: &str = "main";

/// Where the inference library should get model files from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ModelSource {
    /// A model id on a remote registry.
    #[serde(rename_all = "camelCase")]
    Remote {
        model_id: String,
        #[serde(default)]
        revision: Option<String>,
        #[serde(default)]
        registry: Option<String>,
    },
    /// Files shipped alongside the UI under a fixed path.
    #[serde(rename_all = "camelCase")]
    Bundled { path: String, model_id: String },
    /// Files the user supplied, served from the reserved prefix.
    Upload,
}

impl Default for ModelSource {
    fn default() -> Self {
        ModelSource::Upload
    }
}

impl ModelSource {
    pub fn remote(model_id: impl Into<String>) -> Self {
        ModelSource::Remote {
            model_id: model_id.into(),
            revision: None,
            registry: None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelSource::Remote { .. } => "remote",
            ModelSource::Bundled { .. } => "bundled",
            ModelSource::Upload => "upload",
        }
    }
}

/// Everything the inference library must be told for one source. Derived,
/// never mutated in place.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub allow_remote: bool,
    pub local_path_prefix: Option<String>,
    pub intercept: bool,
    pub model_id: String,
    pub base_url: String,
}

impl SourceConfig {
    /// `asset_origin` is where the persistent responder listens. Uploaded
    /// files are only answerable there, so the upload base URL carries it.
    pub fn derive(source: &ModelSource, prefix: &str, asset_origin: &str) -> Self {
        match source {
            ModelSource::Remote {
                model_id,
                revision,
                registry,
            } => {
                let registry = registry
                    .as_deref()
                    .unwrap_or(DEFAULT_REGISTRY)
                    .trim_end_matches('/');
                let revision = revision.as_deref().unwrap_or(DEFAULT_REVISION);
                Self {
                    allow_remote: true,
                    local_path_prefix: None,
                    intercept: false,
                    model_id: model_id.clone(),
                    base_url: format!("{registry}/{model_id}/resolve/{revision}/"),
                }
            }
            ModelSource::Bundled { path, model_id } => {
                let path = format!("/{}/", path.trim_matches('/'));
                Self {
                    allow_remote: false,
                    base_url: format!("{path}{model_id}/"),
                    local_path_prefix: Some(path),
                    intercept: false,
                    model_id: model_id.clone(),
                }
            }
            ModelSource::Upload => Self {
                allow_remote: false,
                local_path_prefix: Some(prefix.to_string()),
                intercept: true,
                model_id: String::new(),
                base_url: format!("{}{prefix}", asset_origin.trim_end_matches('/')),
            },
        }
    }
}
