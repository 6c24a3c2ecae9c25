use serde::Serialize;
use thiserror::Error;

/// Failures that make a requested operation meaningless.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("configuration needed: upload a config.json describing the model")]
    ConfigurationAbsent,
    #[error("config.json was found but is invalid: {0}")]
    ConfigurationMalformed(String),
    #[error(
        "the model file service is not answering requests yet; reload the page (or restart the resolver) and try again"
    )]
    InterceptionNotReady,
    #[error("custom model file not found: {0}")]
    AssetMissing(String),
    #[error("no model files have been supplied")]
    NoAssets,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// User-facing classification of a failed model load.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Error)]
#[serde(rename_all = "kebab-case")]
pub enum LoadFailure {
    #[error(
        "model failed to load: decoder weights are missing; upload decoder_model_merged.onnx or a decoder_*.onnx file"
    )]
    MissingDecoder,
    #[error("model failed to load: config.json or tokenizer files are invalid; re-export them and upload again")]
    MalformedConfiguration,
    #[error("model failed to load: a required model file is missing; check the file checklist")]
    MissingAsset,
    #[error("model failed to load: the model file service was not active; reload and try again")]
    InterceptionNotReady,
    #[error("something went wrong while loading the model")]
    Unexpected,
}

impl LoadFailure {
    /// Picks the most likely cause from the inference library's error text.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("decoder") || lower.contains("merged") {
            LoadFailure::MissingDecoder
        } else if lower.contains("service worker") || lower.contains("not controlling") {
            LoadFailure::InterceptionNotReady
        } else if lower.contains("config")
            || lower.contains("json")
            || lower.contains("parse")
            || lower.contains("unexpected token")
        {
            LoadFailure::MalformedConfiguration
        } else if lower.contains("404") || lower.contains("not found") {
            LoadFailure::MissingAsset
        } else {
            LoadFailure::Unexpected
        }
    }
}

impl From<&ResolverError> for LoadFailure {
    fn from(error: &ResolverError) -> Self {
        match error {
            ResolverError::ConfigurationAbsent | ResolverError::ConfigurationMalformed(_) => {
                LoadFailure::MalformedConfiguration
            }
            ResolverError::InterceptionNotReady => LoadFailure::InterceptionNotReady,
            ResolverError::AssetMissing(name) => LoadFailure::classify(name),
            ResolverError::NoAssets => LoadFailure::MissingAsset,
            ResolverError::Other(error) => LoadFailure::classify(&error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_failures_are_recognised() {
        assert_eq!(
            LoadFailure::classify("Could not locate file: onnx/decoder_model_merged.onnx"),
            LoadFailure::MissingDecoder
        );
    }

    #[test]
    fn html_in_json_is_a_configuration_problem() {
        assert_eq!(
            LoadFailure::classify("Unexpected token '<', \"<!doctype \"... is not valid JSON"),
            LoadFailure::MalformedConfiguration
        );
    }

    #[test]
    fn plain_404_is_a_missing_asset() {
        assert_eq!(
            LoadFailure::classify("HTTP 404 for /custom-model/onnx/encoder_model.onnx"),
            LoadFailure::MissingAsset
        );
        assert_eq!(LoadFailure::classify("out of memory"), LoadFailure::Unexpected);
    }

    #[test]
    fn resolver_errors_map_to_failures() {
        assert_eq!(
            LoadFailure::from(&ResolverError::InterceptionNotReady),
            LoadFailure::InterceptionNotReady
        );
        assert_eq!(
            LoadFailure::from(&ResolverError::AssetMissing("onnx/decoder_model.onnx".into())),
            LoadFailure::MissingDecoder
        );
    }
}
