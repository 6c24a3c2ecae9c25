use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cache::{CachedResponse, ResponseCache, SharedResponseCache};
use crate::models::{AssetBag, AssetPersistence, Resolver};

/// Outcome of one synchronization pass. Returned only once every step has
/// run, so awaiting it is the signal that a model load may start.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub generation: Option<Uuid>,
    pub written: usize,
    pub purged_shared: usize,
    pub purged_library: usize,
    pub persisted: bool,
    pub failures: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, step: &str, error: impl std::fmt::Display) {
        let message = format!("{step}: {error}");
        warn!("Cache sync step failed, {message}");
        self.failures.push(message);
    }
}

/// Mirrors the asset bag into the shared response cache, purges stale
/// reserved-prefix entries from the inference library's cache and writes
/// the durable record.
pub struct CacheBridge {
    prefix: String,
    shared: Arc<SharedResponseCache>,
    library: Option<Arc<dyn ResponseCache>>,
    persistence: Arc<dyn AssetPersistence>,
}

impl CacheBridge {
    pub fn new(
        shared: Arc<SharedResponseCache>,
        persistence: Arc<dyn AssetPersistence>,
    ) -> Self {
        Self {
            prefix: shared.prefix().to_string(),
            shared,
            library: None,
            persistence,
        }
    }

    /// Registers the inference library's own response cache for purging.
    pub fn with_library_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.library = Some(cache);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn shared(&self) -> Arc<SharedResponseCache> {
        self.shared.clone()
    }

    pub async fn sync(
        &self,
        bag: Arc<AssetBag>,
        resolver: Resolver,
        generation: Uuid,
    ) -> SyncReport {
        let mut report = self.mirror(&bag, resolver, generation);
        self.persist(bag, &mut report).await;
        report
    }

    /// Cache steps only; used after a restore, when the record is already
    /// on disk.
    pub fn mirror(&self, bag: &AssetBag, resolver: Resolver, generation: Uuid) -> SyncReport {
        let mut report = SyncReport {
            generation: Some(generation),
            ..SyncReport::default()
        };

        let entries = bag
            .iter()
            .map(|(name, blob)| {
                let response = CachedResponse::ok(blob.content_type_for(name), blob.bytes().clone());
                (name.clone(), response)
            })
            .collect();
        let swap = self.shared.replace_namespace(entries, resolver);
        report.written = swap.written;
        report.purged_shared = swap.purged;

        report.purged_library = self.purge_library(&mut report);
        debug!(
            "Mirrored {} assets into shared cache, purged {} shared and {} library entries",
            report.written, report.purged_shared, report.purged_library
        );
        report
    }

    pub async fn clear(&self) -> SyncReport {
        let swap = self.shared.replace_namespace(Vec::new(), Resolver::permissive());
        let mut report = SyncReport {
            purged_shared: swap.purged,
            ..SyncReport::default()
        };
        report.purged_library = self.purge_library(&mut report);

        let persistence = self.persistence.clone();
        match tokio::task::spawn_blocking(move || persistence.remove()).await {
            Ok(Ok(())) => report.persisted = true,
            Ok(Err(error)) => report.fail("remove persisted assets", format!("{error:#}")),
            Err(error) => report.fail("remove persisted assets", error),
        }
        report
    }

    pub async fn load_persisted(&self) -> Result<Option<AssetBag>> {
        let persistence = self.persistence.clone();
        tokio::task::spawn_blocking(move || persistence.load())
            .await
            .map_err(|error| anyhow!("persistence task failed: {error}"))?
    }

    /// Drops every reserved-prefix entry from the library cache. Entries
    /// outside the prefix belong to the library and are left alone.
    fn purge_library(&self, report: &mut SyncReport) -> usize {
        let Some(library) = self.library.as_ref() else {
            return 0;
        };
        let mut purged = 0;
        for key in library.keys() {
            if !self.is_reserved_key(&key) {
                continue;
            }
            match library.delete(&key) {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(error) => report.fail(&format!("purge library {key}"), error),
            }
        }
        purged
    }

    /// Library caches key by full URL, so the prefix may follow an origin.
    fn is_reserved_key(&self, key: &str) -> bool {
        crate::intercept::is_reserved(key, &self.prefix)
    }

    async fn persist(&self, bag: Arc<AssetBag>, report: &mut SyncReport) {
        let persistence = self.persistence.clone();
        match tokio::task::spawn_blocking(move || persistence.save(&bag)).await {
            Ok(Ok(())) => report.persisted = true,
            Ok(Err(error)) => report.fail("persist assets", format!("{error:#}")),
            Err(error) => report.fail("persist assets", error),
        }
    }
}
