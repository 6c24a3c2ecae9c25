use serde::{Deserialize, Serialize};

use super::manifest::{
    ModelManifest, WeightRole, CONFIG_DOCUMENT, GENERATION_CONFIG_DOCUMENT,
    QUANTIZE_CONFIG_DOCUMENT, TOKENIZER_DOCUMENTS,
};
use super::resolver::Resolver;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub label: String,
    pub required: bool,
    pub satisfied: bool,
}

impl ChecklistItem {
    fn new(label: impl Into<String>, required: bool, satisfied: bool) -> Self {
        Self {
            label: label.into(),
            required,
            satisfied,
        }
    }
}

/// Which files are present for the current model, in display order.
///
/// Uses the same [`Resolver`] the responders use, so an item is satisfied
/// exactly when the corresponding request would be answered.
pub fn checklist<'a, I>(manifest: Option<&ModelManifest>, names: I) -> Vec<ChecklistItem>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&'a str> = names.into_iter().collect();
    let resolver = Resolver::for_manifest(manifest);
    let present = |requested: &str| resolver.resolve(requested, names.iter().copied()).is_some();

    let mut items = vec![
        ChecklistItem::new(CONFIG_DOCUMENT, true, present(CONFIG_DOCUMENT)),
        ChecklistItem::new(
            "tokenizer.json",
            true,
            TOKENIZER_DOCUMENTS.iter().any(|document| present(document)),
        ),
    ];

    let roles = manifest
        .map(|manifest| manifest.required_weights.clone())
        .unwrap_or_else(|| vec![WeightRole::UnifiedWeights]);
    items.extend(
        roles
            .iter()
            .map(|role| ChecklistItem::new(role.label(), true, present(role.logical_name()))),
    );

    items.push(ChecklistItem::new(
        GENERATION_CONFIG_DOCUMENT,
        false,
        present(GENERATION_CONFIG_DOCUMENT),
    ));
    items.push(ChecklistItem::new(
        QUANTIZE_CONFIG_DOCUMENT,
        false,
        present(QUANTIZE_CONFIG_DOCUMENT),
    ));
    items
}

pub fn missing_required(items: &[ChecklistItem]) -> Vec<&str> {
    items
        .iter()
        .filter(|item| item.required && !item.satisfied)
        .map(|item| item.label.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::manifest::interpret;
    use crate::models::{AssetBag, AssetBlob};

    fn bag(entries: &[(&str, &str)]) -> AssetBag {
        entries
            .iter()
            .map(|(name, body)| (name.to_string(), AssetBlob::new(body.as_bytes().to_vec())))
            .collect()
    }

    #[test]
    fn complete_translation_upload_is_satisfied() {
        let assets = bag(&[
            ("config.json", r#"{"architectures":["MarianMTModel"]}"#),
            ("tokenizer.json", "{}"),
            ("encoder_model.onnx", "e"),
            ("decoder_model_merged.onnx", "d"),
        ]);
        let state = interpret(&assets);
        let items = checklist(state.manifest(), assets.names());
        let labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "config.json",
                "tokenizer.json",
                "encoder weights",
                "merged/decoder weights",
                "generation_config.json",
                "quantize_config.json",
            ]
        );
        assert!(items[..4].iter().all(|item| item.required && item.satisfied));
        assert!(items[4..].iter().all(|item| !item.required && !item.satisfied));
        assert!(missing_required(&items).is_empty());
    }

    #[test]
    fn weights_only_upload_flags_configuration() {
        let assets = bag(&[("model.onnx", "w")]);
        let state = interpret(&assets);
        assert!(state.manifest().is_none());
        let items = checklist(state.manifest(), assets.names());
        assert_eq!(items[0].label, "config.json");
        assert!(!items[0].satisfied);
        assert_eq!(items[2].label, "unified weights");
        assert!(items[2].satisfied);
        assert_eq!(missing_required(&items), vec!["config.json", "tokenizer.json"]);
    }

    #[test]
    fn decoder_without_encoder_is_reported() {
        let assets = bag(&[
            ("config.json", r#"{"architectures":["MarianMTModel"]}"#),
            ("tokenizer_config.json", "{}"),
            ("decoder_model_merged.onnx", "d"),
            ("decoder_model.onnx", "d"),
        ]);
        let state = interpret(&assets);
        let items = checklist(state.manifest(), assets.names());
        assert_eq!(missing_required(&items), vec!["encoder weights"]);
    }
}
