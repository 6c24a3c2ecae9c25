//! Maps a requested logical file name onto one of the uploaded asset names.
//!
//! Uploaded files carry whatever names the user's tooling produced, so the
//! lookup falls through a fixed sequence of tiers: exact name, basename, role
//! keyword (encoder / decoder / merged) and finally a lone weight file. Every
//! responder and the readiness checklist go through [`Resolver`], so they can
//! never disagree about which blob answers a request.

use serde::{Deserialize, Serialize};

use super::asset::{AssetBag, AssetBlob};
use super::manifest::ModelManifest;

pub const WEIGHT_EXTENSION: &str = ".onnx";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MatchTier {
    Exact,
    Basename,
    Encoder,
    Decoder,
    Merged,
    Singleton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub name: &'a str,
    pub tier: MatchTier,
}

/// Tiered name matcher. The role tiers that run are decided by the manifest:
/// a single-graph model never asks for encoder weights, so that tier is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolver {
    encoder_tier: bool,
    decoder_tier: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::permissive()
    }
}

impl Resolver {
    /// All tiers enabled; used while no manifest is known.
    pub const fn permissive() -> Self {
        Self {
            encoder_tier: true,
            decoder_tier: true,
        }
    }

    pub fn for_manifest(manifest: Option<&ModelManifest>) -> Self {
        match manifest {
            Some(manifest) if !manifest.is_encoder_decoder => Self {
                encoder_tier: false,
                decoder_tier: true,
            },
            _ => Self::permissive(),
        }
    }

    pub fn resolve<'a, I>(&self, requested: &str, names: I) -> Option<Resolution<'a>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut names: Vec<&'a str> = names.into_iter().collect();
        names.sort_unstable();
        names.dedup();

        if let Some(name) = names.iter().copied().find(|name| *name == requested) {
            return Some(Resolution {
                name,
                tier: MatchTier::Exact,
            });
        }

        let requested = strip_suffix(requested);
        if requested.is_empty() {
            return None;
        }

        if let Some(name) = names.iter().copied().find(|name| *name == requested) {
            return Some(Resolution {
                name,
                tier: MatchTier::Exact,
            });
        }

        let base = basename(requested);
        if let Some(name) = names
            .iter()
            .copied()
            .find(|name| *name == base)
            .or_else(|| names.iter().copied().find(|name| basename(name) == base))
        {
            return Some(Resolution {
                name,
                tier: MatchTier::Basename,
            });
        }

        let base_lower = base.to_ascii_lowercase();
        if !base_lower.ends_with(WEIGHT_EXTENSION) {
            return None;
        }

        let weights: Vec<&'a str> = names
            .iter()
            .copied()
            .filter(|name| is_weight_file(name))
            .collect();

        if self.encoder_tier && base_lower.contains("encoder") {
            if let Some(name) = find_containing(&weights, "encoder") {
                return Some(Resolution {
                    name,
                    tier: MatchTier::Encoder,
                });
            }
        }

        if self.decoder_tier && (base_lower.contains("decoder") || base_lower.contains("merged")) {
            if let Some(name) = find_containing(&weights, "decoder") {
                return Some(Resolution {
                    name,
                    tier: MatchTier::Decoder,
                });
            }
            if let Some(name) = find_containing(&weights, "merged") {
                return Some(Resolution {
                    name,
                    tier: MatchTier::Merged,
                });
            }
        }

        match weights.as_slice() {
            [only] => Some(Resolution {
                name: *only,
                tier: MatchTier::Singleton,
            }),
            _ => None,
        }
    }

    pub fn resolve_in<'a>(
        &self,
        requested: &str,
        bag: &'a AssetBag,
    ) -> Option<(&'a str, &'a AssetBlob, MatchTier)> {
        let resolution = self.resolve(requested, bag.names())?;
        let (name, blob) = bag
            .iter()
            .find(|(name, _)| name.as_str() == resolution.name)?;
        Some((name.as_str(), blob, resolution.tier))
    }
}

/// Resolves with every tier enabled.
pub fn resolve<'a, I>(requested: &str, names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    Resolver::permissive()
        .resolve(requested, names)
        .map(|resolution| resolution.name)
}

pub fn resolve_in<'a>(requested: &str, bag: &'a AssetBag) -> Option<(&'a str, &'a AssetBlob)> {
    Resolver::permissive()
        .resolve_in(requested, bag)
        .map(|(name, blob, _)| (name, blob))
}

pub fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

pub fn is_weight_file(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(WEIGHT_EXTENSION)
}

fn strip_suffix(name: &str) -> &str {
    name.split(['?', '#']).next().unwrap_or(name).trim()
}

fn find_containing<'a>(candidates: &[&'a str], keyword: &str) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|name| name.to_ascii_lowercase().contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::manifest::{interpret, ModelManifest};

    fn bag(names: &[&str]) -> AssetBag {
        names
            .iter()
            .map(|name| (name.to_string(), AssetBlob::new(name.as_bytes().to_vec())))
            .collect()
    }

    #[test]
    fn exact_names_always_win() {
        let names = [
            "onnx/encoder_model.onnx",
            "encoder_model.onnx",
            "config.json",
        ];
        for name in names {
            let resolution = Resolver::permissive().resolve(name, names).unwrap();
            assert_eq!(resolution.name, name);
            assert_eq!(resolution.tier, MatchTier::Exact);
        }
    }

    #[test]
    fn basename_matches_prefixed_requests() {
        let names = ["tokenizer.json", "onnx/model.onnx"];
        assert_eq!(
            resolve("Xenova/opus-mt-en-de/resolve/main/tokenizer.json", names),
            Some("tokenizer.json")
        );
        let resolution = Resolver::permissive()
            .resolve("onnx-int8/model.onnx", names)
            .unwrap();
        assert_eq!(resolution.name, "onnx/model.onnx");
        assert_eq!(resolution.tier, MatchTier::Basename);
    }

    #[test]
    fn lone_weight_file_answers_any_weight_request() {
        let names = ["config.json", "my-export-final.onnx"];
        for requested in ["onnx/model.onnx", "encoder_model.onnx", "whatever.onnx"] {
            let resolution = Resolver::permissive().resolve(requested, names).unwrap();
            assert_eq!(resolution.name, "my-export-final.onnx");
            assert_eq!(resolution.tier, MatchTier::Singleton);
        }
    }

    #[test]
    fn singleton_does_not_answer_non_weight_requests() {
        let names = ["model.onnx"];
        assert_eq!(resolve("generation_config.json", names), None);
    }

    #[test]
    fn encoder_and_decoder_never_cross() {
        let names = ["Encoder-FP16.onnx", "decoder_with_past.ONNX", "config.json"];
        assert_eq!(
            resolve("onnx/encoder_model.onnx", names),
            Some("Encoder-FP16.onnx")
        );
        assert_eq!(
            resolve("onnx/decoder_model.onnx", names),
            Some("decoder_with_past.ONNX")
        );
        assert_eq!(
            resolve("onnx/decoder_model_merged.onnx", names),
            Some("decoder_with_past.ONNX")
        );
        assert_eq!(resolve("onnx/model.onnx", names), None);
    }

    #[test]
    fn decoder_request_falls_back_to_merged_graph() {
        let names = ["model_merged.onnx", "config.json"];
        let resolution = Resolver::permissive()
            .resolve("some/path/decoder_model.onnx", names)
            .unwrap();
        assert_eq!(resolution.name, "model_merged.onnx");
        assert_eq!(resolution.tier, MatchTier::Merged);
    }

    #[test]
    fn query_suffix_is_ignored() {
        let names = ["config.json"];
        let resolution = Resolver::permissive()
            .resolve("config.json?v=3", names)
            .unwrap();
        assert_eq!(resolution.tier, MatchTier::Exact);
    }

    #[test]
    fn ambiguous_weights_without_role_resolve_to_nothing() {
        let names = ["a.onnx", "b.onnx"];
        assert_eq!(resolve("model.onnx", names), None);
        assert_eq!(resolve("", names), None);
    }

    #[test]
    fn unified_manifest_disables_encoder_tier() {
        let assets = {
            let mut assets = bag(&["encoder_part.onnx", "model_b.onnx"]);
            assets.insert(
                "config.json",
                AssetBlob::new(br#"{"architectures":["BertModel"]}"#.to_vec()),
            );
            assets
        };
        let state = interpret(&assets);
        let manifest: &ModelManifest = state.manifest().unwrap();
        let resolver = Resolver::for_manifest(Some(manifest));
        assert_eq!(resolver.resolve("encoder_model.onnx", assets.names()), None);
        assert_eq!(
            Resolver::permissive()
                .resolve("encoder_model.onnx", assets.names())
                .map(|r| r.name),
            Some("encoder_part.onnx")
        );
    }

    #[test]
    fn resolve_in_returns_the_stored_blob() {
        let assets = bag(&["decoder_model_merged.onnx"]);
        let (name, blob) = resolve_in("onnx/decoder_model_merged.onnx", &assets).unwrap();
        assert_eq!(name, "decoder_model_merged.onnx");
        assert_eq!(blob.bytes().as_ref(), b"decoder_model_merged.onnx");
    }
}
