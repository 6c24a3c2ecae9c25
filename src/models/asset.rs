use std::collections::btree_map::{self, BTreeMap};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::metadata::infer_content_type;

/// A single uploaded model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBlob {
    bytes: Bytes,
    content_type: Option<String>,
}

impl AssetBlob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        Self {
            bytes: bytes.into(),
            content_type: if content_type.trim().is_empty() {
                None
            } else {
                Some(content_type)
            },
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn declared_content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Declared type, or one inferred from `name`.
    pub fn content_type_for(&self, name: &str) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| infer_content_type(name).to_string())
    }
}

/// The full set of files the user currently supplies, keyed by the name
/// they were uploaded under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetBag {
    entries: BTreeMap<String, AssetBlob>,
}

impl AssetBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, blob: AssetBlob) -> Option<AssetBlob> {
        self.entries.insert(name.into(), blob)
    }

    pub fn get(&self, name: &str) -> Option<&AssetBlob> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, AssetBlob> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.values().map(AssetBlob::size).sum()
    }

    /// Text of a JSON-ish document, if present and valid UTF-8.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|blob| std::str::from_utf8(blob.bytes()).ok())
    }
}

impl FromIterator<(String, AssetBlob)> for AssetBag {
    fn from_iter<I: IntoIterator<Item = (String, AssetBlob)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AssetBag {
    type Item = (&'a String, &'a AssetBlob);
    type IntoIter = btree_map::Iter<'a, String, AssetBlob>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Size and type summary of one asset, used for status listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl AssetBag {
    pub fn summaries(&self) -> Vec<AssetSummary> {
        self.entries
            .iter()
            .map(|(name, blob)| AssetSummary {
                name: name.clone(),
                content_type: blob.content_type_for(name),
                size_bytes: blob.size(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_declared_type_falls_back_to_inference() {
        let blob = AssetBlob::with_content_type(b"{}".to_vec(), "  ");
        assert_eq!(blob.declared_content_type(), None);
        assert_eq!(blob.content_type_for("config.json"), "application/json");
    }

    #[test]
    fn declared_type_wins() {
        let blob = AssetBlob::with_content_type(b"x".to_vec(), "text/plain");
        assert_eq!(blob.content_type_for("model.onnx"), "text/plain");
    }

    #[test]
    fn summaries_follow_name_order() {
        let bag: AssetBag = [
            ("b.onnx".to_string(), AssetBlob::new(vec![0u8; 4])),
            ("a.json".to_string(), AssetBlob::new(b"{}".to_vec())),
        ]
        .into_iter()
        .collect();
        let summaries = bag.summaries();
        assert_eq!(summaries[0].name, "a.json");
        assert_eq!(summaries[1].size_bytes, 4);
        assert_eq!(bag.total_size(), 6);
    }
}
