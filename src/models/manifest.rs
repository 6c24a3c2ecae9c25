use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::asset::AssetBag;
use super::resolver::resolve;
use crate::core::error::ResolverError;

pub const CONFIG_DOCUMENT: &str = "config.json";
pub const TOKENIZER_DOCUMENTS: [&str; 2] = ["tokenizer_config.json", "tokenizer.json"];
pub const GENERATION_CONFIG_DOCUMENT: &str = "generation_config.json";
pub const QUANTIZE_CONFIG_DOCUMENT: &str = "quantize_config.json";

pub const UNKNOWN: &str = "unknown";
pub const TOKENIZER_UNDETERMINED: &str = "custom";

static ENCODER_DECODER_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(ForConditionalGeneration|MarianMT|MTModel|Seq2Seq|EncoderDecoder|T5|Bart|M2M100|Nllb|Pegasus)",
    )
    .expect("encoder-decoder marker pattern")
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum WeightRole {
    EncoderWeights,
    DecoderWeights,
    UnifiedWeights,
}

impl WeightRole {
    pub fn label(&self) -> &'static str {
        match self {
            WeightRole::EncoderWeights => "encoder weights",
            WeightRole::DecoderWeights => "merged/decoder weights",
            WeightRole::UnifiedWeights => "unified weights",
        }
    }

    /// Path the inference library asks for when it loads this role.
    pub fn logical_name(&self) -> &'static str {
        match self {
            WeightRole::EncoderWeights => "onnx/encoder_model.onnx",
            WeightRole::DecoderWeights => "onnx/decoder_model_merged.onnx",
            WeightRole::UnifiedWeights => "onnx/model.onnx",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelManifest {
    pub architecture: String,
    pub model_type: String,
    pub tokenizer_kind: String,
    pub is_encoder_decoder: bool,
    pub required_weights: Vec<WeightRole>,
    pub has_generation_config: bool,
    pub has_quantize_config: bool,
}

impl ModelManifest {
    pub fn required_labels(&self) -> Vec<&'static str> {
        self.required_weights.iter().map(WeightRole::label).collect()
    }
}

/// Outcome of reading the configuration document out of a bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestState {
    Absent,
    Malformed(String),
    Ready(ModelManifest),
}

impl ManifestState {
    pub fn manifest(&self) -> Option<&ModelManifest> {
        match self {
            ManifestState::Ready(manifest) => Some(manifest),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ManifestState::Ready(_))
    }

    pub fn require(&self) -> Result<&ModelManifest, ResolverError> {
        match self {
            ManifestState::Ready(manifest) => Ok(manifest),
            ManifestState::Absent => Err(ResolverError::ConfigurationAbsent),
            ManifestState::Malformed(reason) => {
                Err(ResolverError::ConfigurationMalformed(reason.clone()))
            }
        }
    }
}

pub fn interpret(assets: &AssetBag) -> ManifestState {
    let Some(config_name) = resolve(CONFIG_DOCUMENT, assets.names()) else {
        return ManifestState::Absent;
    };

    let Some(text) = assets.text(config_name) else {
        return ManifestState::Malformed(format!("{config_name} is not valid UTF-8 text"));
    };

    let document: Value = match serde_json::from_str(text) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(_) => {
            return ManifestState::Malformed(format!("{config_name} is not a JSON object"));
        }
        Err(error) => {
            return ManifestState::Malformed(format!("{config_name} could not be parsed: {error}"));
        }
    };

    let architecture = document
        .get("architectures")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN)
        .to_string();
    let model_type = document
        .get("model_type")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN)
        .to_string();

    let declared_encoder_decoder = document
        .get("is_encoder_decoder")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let is_encoder_decoder =
        declared_encoder_decoder || ENCODER_DECODER_MARKERS.is_match(&architecture);

    let required_weights = if is_encoder_decoder {
        vec![WeightRole::EncoderWeights, WeightRole::DecoderWeights]
    } else {
        vec![WeightRole::UnifiedWeights]
    };

    let has_quantize_config = document.get("quantization_config").is_some()
        || resolve(QUANTIZE_CONFIG_DOCUMENT, assets.names()).is_some();
    let has_generation_config = resolve(GENERATION_CONFIG_DOCUMENT, assets.names()).is_some();

    ManifestState::Ready(ModelManifest {
        architecture,
        model_type,
        tokenizer_kind: tokenizer_kind(assets),
        is_encoder_decoder,
        required_weights,
        has_generation_config,
        has_quantize_config,
    })
}

fn tokenizer_kind(assets: &AssetBag) -> String {
    let Some((document, name)) = TOKENIZER_DOCUMENTS
        .iter()
        .find_map(|document| resolve(document, assets.names()).map(|name| (*document, name)))
    else {
        return TOKENIZER_UNDETERMINED.into();
    };

    let parsed = assets
        .text(name)
        .and_then(|text| serde_json::from_str::<Value>(text).ok());
    let kind = parsed.as_ref().and_then(|value| {
        if document == TOKENIZER_DOCUMENTS[0] {
            value.get("tokenizer_class").and_then(Value::as_str)
        } else {
            value
                .get("model")
                .and_then(|model| model.get("type"))
                .and_then(Value::as_str)
        }
    });

    match kind {
        Some(kind) if !kind.trim().is_empty() => kind.to_string(),
        _ => {
            tracing::debug!("tokenizer kind undetermined from {name}");
            TOKENIZER_UNDETERMINED.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetBlob;

    fn bag(entries: &[(&str, &str)]) -> AssetBag {
        entries
            .iter()
            .map(|(name, body)| (name.to_string(), AssetBlob::new(body.as_bytes().to_vec())))
            .collect()
    }

    #[test]
    fn marian_upload_is_encoder_decoder() {
        let assets = bag(&[
            ("config.json", r#"{"architectures":["MarianMTModel"],"model_type":"marian"}"#),
            ("tokenizer.json", r#"{"model":{"type":"Unigram"}}"#),
            ("encoder_model.onnx", "e"),
            ("decoder_model_merged.onnx", "d"),
        ]);
        let state = interpret(&assets);
        let manifest = state.manifest().unwrap();
        assert!(manifest.is_encoder_decoder);
        assert_eq!(manifest.architecture, "MarianMTModel");
        assert_eq!(manifest.model_type, "marian");
        assert_eq!(manifest.tokenizer_kind, "Unigram");
        assert_eq!(
            manifest.required_labels(),
            vec!["encoder weights", "merged/decoder weights"]
        );
        assert!(!manifest.has_generation_config);
    }

    #[test]
    fn missing_config_means_no_manifest() {
        let assets = bag(&[("model.onnx", "w"), ("tokenizer.json", "{}")]);
        assert_eq!(interpret(&assets), ManifestState::Absent);
        assert!(matches!(
            interpret(&assets).require(),
            Err(ResolverError::ConfigurationAbsent)
        ));
        assert_eq!(interpret(&AssetBag::new()), ManifestState::Absent);
    }

    #[test]
    fn unparseable_config_is_reported_distinctly() {
        let assets = bag(&[("config.json", "<!doctype html><html></html>")]);
        let state = interpret(&assets);
        assert!(matches!(state, ManifestState::Malformed(_)));
        assert!(matches!(
            state.require(),
            Err(ResolverError::ConfigurationMalformed(_))
        ));
    }

    #[test]
    fn missing_fields_default_to_unknown() {
        let assets = bag(&[("config.json", "{}")]);
        let manifest = interpret(&assets).manifest().cloned().unwrap();
        assert_eq!(manifest.architecture, UNKNOWN);
        assert_eq!(manifest.model_type, UNKNOWN);
        assert_eq!(manifest.tokenizer_kind, TOKENIZER_UNDETERMINED);
        assert_eq!(manifest.required_weights, vec![WeightRole::UnifiedWeights]);
    }

    #[test]
    fn explicit_flag_marks_encoder_decoder() {
        let assets = bag(&[(
            "config.json",
            r#"{"architectures":["CustomTranslator"],"is_encoder_decoder":true}"#,
        )]);
        assert!(interpret(&assets).manifest().unwrap().is_encoder_decoder);
    }

    #[test]
    fn tokenizer_config_takes_precedence_and_degrades_on_garbage() {
        let assets = bag(&[
            ("config.json", r#"{"architectures":["GPT2LMHeadModel"]}"#),
            ("tokenizer_config.json", r#"{"tokenizer_class":"MarianTokenizer"}"#),
            ("tokenizer.json", r#"{"model":{"type":"BPE"}}"#),
        ]);
        assert_eq!(
            interpret(&assets).manifest().unwrap().tokenizer_kind,
            "MarianTokenizer"
        );

        let broken = bag(&[
            ("config.json", r#"{"architectures":["GPT2LMHeadModel"]}"#),
            ("tokenizer_config.json", "not json"),
        ]);
        let manifest = interpret(&broken).manifest().cloned().unwrap();
        assert_eq!(manifest.tokenizer_kind, TOKENIZER_UNDETERMINED);
        assert!(!manifest.is_encoder_decoder);
    }

    #[test]
    fn feature_documents_set_flags() {
        let assets = bag(&[
            ("onnx/config.json", r#"{"architectures":["T5ForConditionalGeneration"]}"#),
            ("generation_config.json", "{}"),
            ("quantize_config.json", "{}"),
        ]);
        let manifest = interpret(&assets).manifest().cloned().unwrap();
        assert!(manifest.is_encoder_decoder);
        assert!(manifest.has_generation_config);
        assert!(manifest.has_quantize_config);
    }
}
