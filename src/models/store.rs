use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::asset::{AssetBag, AssetBlob};
use super::manifest::{interpret, ManifestState};
use super::readiness::{checklist, ChecklistItem};
use super::resolver::Resolver;
use super::view::AssetView;
use crate::bridge::{CacheBridge, SyncReport};
use crate::output::logs::format_size;

struct StoreState {
    bag: Arc<AssetBag>,
    manifest: Arc<ManifestState>,
    resolver: Resolver,
    generation: Uuid,
}

impl StoreState {
    fn empty() -> Self {
        Self {
            bag: Arc::new(AssetBag::new()),
            manifest: Arc::new(ManifestState::Absent),
            resolver: Resolver::permissive(),
            generation: Uuid::new_v4(),
        }
    }

    fn from_bag(bag: AssetBag, generation: Uuid) -> Self {
        let manifest = interpret(&bag);
        let resolver = Resolver::for_manifest(manifest.manifest());
        Self {
            bag: Arc::new(bag),
            manifest: Arc::new(manifest),
            resolver,
            generation,
        }
    }
}

/// Owner of the current asset bag.
///
/// Every mutation is a wholesale swap: readers see the old bag or the new one,
/// never a mix. Writers are serialized so the caches and the durable record
/// are updated in the same order the bags were installed.
pub struct AssetStore {
    state: RwLock<Arc<StoreState>>,
    view: AssetView,
    bridge: CacheBridge,
    writer: Mutex<()>,
    last_report: RwLock<Option<SyncReport>>,
}

impl AssetStore {
    pub fn new(bridge: CacheBridge) -> Self {
        Self {
            state: RwLock::new(Arc::new(StoreState::empty())),
            view: AssetView::new(),
            bridge,
            writer: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    /// Replaces the whole bag. Cache and persistence failures end up in the
    /// returned report; the in-memory swap always happens.
    pub async fn replace(&self, assets: AssetBag) -> SyncReport {
        let _writer = self.writer.lock().await;
        let generation = {
            let current = self.state.read();
            if *current.bag == assets {
                current.generation
            } else {
                Uuid::new_v4()
            }
        };
        let installed = self.install(StoreState::from_bag(assets, generation));
        info!(
            "Custom model assets replaced: {} files ({}), manifest {}",
            installed.bag.len(),
            format_size(installed.bag.total_size()),
            describe(&installed.manifest)
        );

        let report = self
            .bridge
            .sync(installed.bag.clone(), installed.resolver, installed.generation)
            .await;
        self.record(report)
    }

    /// Loads the persisted record, if any. Storage that can't be read is
    /// treated as empty.
    pub async fn restore(&self) -> Arc<AssetBag> {
        let _writer = self.writer.lock().await;
        let bag = match self.bridge.load_persisted().await {
            Ok(Some(bag)) => bag,
            Ok(None) => {
                info!("No persisted custom model assets found");
                return self.snapshot();
            }
            Err(error) => {
                warn!("Discarding persisted custom model assets: {error:#}");
                return self.snapshot();
            }
        };

        let installed = self.install(StoreState::from_bag(bag, Uuid::new_v4()));
        info!(
            "Restored {} custom model files ({})",
            installed.bag.len(),
            format_size(installed.bag.total_size())
        );
        let report = self
            .bridge
            .mirror(&installed.bag, installed.resolver, installed.generation);
        let report = SyncReport {
            persisted: true,
            ..report
        };
        self.record(report);
        installed.bag.clone()
    }

    pub async fn clear(&self) -> SyncReport {
        let _writer = self.writer.lock().await;
        self.install(StoreState::empty());
        info!("Custom model assets cleared");
        let report = self.bridge.clear().await;
        self.record(report)
    }

    /// Runs the cache bridge again for the current bag.
    pub async fn resync(&self) -> SyncReport {
        let _writer = self.writer.lock().await;
        let current = self.state.read().clone();
        let report = self
            .bridge
            .sync(current.bag.clone(), current.resolver, current.generation)
            .await;
        self.record(report)
    }

    pub fn get(&self, name: &str) -> Option<AssetBlob> {
        self.state.read().bag.get(name).cloned()
    }

    pub fn snapshot(&self) -> Arc<AssetBag> {
        self.state.read().bag.clone()
    }

    pub fn manifest(&self) -> Arc<ManifestState> {
        self.state.read().manifest.clone()
    }

    pub fn resolver(&self) -> Resolver {
        self.state.read().resolver
    }

    pub fn generation(&self) -> Uuid {
        self.state.read().generation
    }

    pub fn checklist(&self) -> Vec<ChecklistItem> {
        let current = self.state.read().clone();
        checklist(current.manifest.manifest(), current.bag.names())
    }

    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().clone()
    }

    /// Read-only handle for the same-process responder.
    pub fn view(&self) -> AssetView {
        self.view.clone()
    }

    pub fn bridge(&self) -> &CacheBridge {
        &self.bridge
    }

    fn install(&self, next: StoreState) -> Arc<StoreState> {
        let next = Arc::new(next);
        *self.state.write() = next.clone();
        self.view.publish(next.bag.clone(), next.resolver);
        next
    }

    fn record(&self, report: SyncReport) -> SyncReport {
        if !report.is_clean() {
            warn!(
                "Custom model sync finished with {} failure(s)",
                report.failures.len()
            );
        }
        *self.last_report.write() = Some(report.clone());
        report
    }
}

fn describe(manifest: &ManifestState) -> String {
    match manifest {
        ManifestState::Absent => "absent".to_string(),
        ManifestState::Malformed(reason) => format!("malformed ({reason})"),
        ManifestState::Ready(manifest) => format!(
            "{} ({}), requires {}",
            manifest.architecture,
            manifest.model_type,
            manifest.required_labels().join(", ")
        ),
    }
}
