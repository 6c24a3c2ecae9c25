use std::collections::{HashMap, HashSet};

use anyhow::Result;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::intercept::{AssetLookup, Located};
use crate::models::metadata::sha256_bytes;
use crate::models::Resolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn ok(content_type: impl Into<String>, body: Bytes) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            body,
        }
    }
}

/// A URL-keyed response cache. The shared cache read by the worker responder
/// implements it, and so must the inference library's own cache so stale
/// entries under the reserved prefix can be purged.
pub trait ResponseCache: Send + Sync {
    fn put(&self, key: &str, response: CachedResponse) -> Result<()>;
    fn get(&self, key: &str) -> Option<CachedResponse>;
    fn delete(&self, key: &str) -> Result<bool>;
    fn keys(&self) -> Vec<String>;
}

/// Plain in-memory cache.
#[derive(Default)]
pub struct MemoryResponseCache {
    entries: RwLock<HashMap<String, CachedResponse>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ResponseCache for MemoryResponseCache {
    fn put(&self, key: &str, response: CachedResponse) -> Result<()> {
        self.entries.write().insert(key.to_string(), response);
        Ok(())
    }

    fn get(&self, key: &str) -> Option<CachedResponse> {
        self.entries.read().get(key).cloned()
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

/// Counts from one [`SharedResponseCache::replace_namespace`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceSwap {
    pub written: usize,
    pub purged: usize,
}

#[derive(Debug, Clone)]
struct EntryMeta {
    status: u16,
    content_type: String,
    digest: String,
}

#[derive(Default)]
struct SharedInner {
    entries: HashMap<String, EntryMeta>,
    bodies: HashMap<String, Bytes>,
    resolver: Resolver,
}

impl SharedInner {
    fn release(&mut self, digest: &str) {
        if !self.entries.values().any(|meta| meta.digest == digest) {
            self.bodies.remove(digest);
        }
    }
}

/// Content-addressed cache the worker responder answers from. Bodies are
/// stored once per sha256 digest no matter how many keys point at them.
pub struct SharedResponseCache {
    prefix: String,
    inner: RwLock<SharedInner>,
}

impl SharedResponseCache {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: RwLock::new(SharedInner::default()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn set_resolver(&self, resolver: Resolver) {
        self.inner.write().resolver = resolver;
    }

    /// Swaps every entry under the prefix for `entries` together with the
    /// resolver, under one write lock. Readers see the old namespace or the
    /// new one, never a mix. `entries` are keyed by relative asset name.
    pub fn replace_namespace(
        &self,
        entries: Vec<(String, CachedResponse)>,
        resolver: Resolver,
    ) -> NamespaceSwap {
        let prepared: Vec<(String, EntryMeta, Bytes)> = entries
            .into_iter()
            .map(|(name, response)| {
                let meta = EntryMeta {
                    status: response.status,
                    content_type: response.content_type,
                    digest: sha256_bytes(&response.body),
                };
                (self.key_for(&name), meta, response.body)
            })
            .collect();

        let mut inner = self.inner.write();
        let stale: Vec<String> = {
            let fresh: HashSet<&str> = prepared.iter().map(|(key, _, _)| key.as_str()).collect();
            inner
                .entries
                .keys()
                .filter(|key| key.starts_with(self.prefix.as_str()) && !fresh.contains(key.as_str()))
                .cloned()
                .collect()
        };
        for key in &stale {
            inner.entries.remove(key);
        }

        let written = prepared.len();
        for (key, meta, body) in prepared {
            inner.bodies.entry(meta.digest.clone()).or_insert(body);
            inner.entries.insert(key, meta);
        }
        inner.resolver = resolver;

        let live: HashSet<String> = inner.entries.values().map(|meta| meta.digest.clone()).collect();
        inner.bodies.retain(|digest, _| live.contains(digest));

        NamespaceSwap {
            written,
            purged: stale.len(),
        }
    }

    pub fn body_count(&self) -> usize {
        self.inner.read().bodies.len()
    }

    fn key_for(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl ResponseCache for SharedResponseCache {
    fn put(&self, key: &str, response: CachedResponse) -> Result<()> {
        let digest = sha256_bytes(&response.body);
        let mut inner = self.inner.write();
        inner
            .bodies
            .entry(digest.clone())
            .or_insert_with(|| response.body.clone());
        let previous = inner.entries.insert(
            key.to_string(),
            EntryMeta {
                status: response.status,
                content_type: response.content_type,
                digest,
            },
        );
        if let Some(previous) = previous {
            inner.release(&previous.digest);
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Option<CachedResponse> {
        let inner = self.inner.read();
        let meta = inner.entries.get(key)?;
        let body = inner.bodies.get(&meta.digest)?.clone();
        Some(CachedResponse {
            status: meta.status,
            content_type: meta.content_type.clone(),
            body,
        })
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        match inner.entries.remove(key) {
            Some(meta) => {
                inner.release(&meta.digest);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn keys(&self) -> Vec<String> {
        self.inner.read().entries.keys().cloned().collect()
    }
}

impl SharedResponseCache {
    /// Asset names currently answerable, relative to the prefix.
    pub fn asset_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = self
            .relative_names(&inner)
            .map(ToOwned::to_owned)
            .collect();
        names.sort();
        names
    }

    fn relative_names<'a>(&'a self, inner: &'a SharedInner) -> impl Iterator<Item = &'a str> + 'a {
        inner
            .entries
            .iter()
            .filter(|(_, meta)| meta.status == 200)
            .filter_map(move |(key, _)| key.strip_prefix(self.prefix.as_str()))
    }
}

impl AssetLookup for SharedResponseCache {
    fn locate(&self, relative: &str) -> Option<Located> {
        let inner = self.inner.read();
        let resolution = inner
            .resolver
            .resolve(relative, self.relative_names(&inner))?;
        let meta = inner.entries.get(&self.key_for(resolution.name))?;
        let body = inner.bodies.get(&meta.digest)?.clone();
        Some(Located {
            name: resolution.name.to_string(),
            tier: resolution.tier,
            content_type: meta.content_type.clone(),
            body,
        })
    }
}
