use std::sync::Arc;

use parking_lot::RwLock;

use super::asset::AssetBag;
use super::resolver::Resolver;
use crate::intercept::{AssetLookup, Located};

#[derive(Default)]
struct Published {
    bag: Arc<AssetBag>,
    resolver: Resolver,
}

/// Read-only window onto the store's current bag, handed to the
/// same-process responder at construction. Only the store publishes.
#[derive(Clone, Default)]
pub struct AssetView {
    inner: Arc<RwLock<Published>>,
}

impl AssetView {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(&self, bag: Arc<AssetBag>, resolver: Resolver) {
        let mut guard = self.inner.write();
        guard.bag = bag;
        guard.resolver = resolver;
    }

    pub fn snapshot(&self) -> Arc<AssetBag> {
        self.inner.read().bag.clone()
    }
}

impl AssetLookup for AssetView {
    fn locate(&self, relative: &str) -> Option<Located> {
        let (bag, resolver) = {
            let guard = self.inner.read();
            (guard.bag.clone(), guard.resolver)
        };
        let (name, blob, tier) = resolver.resolve_in(relative, &bag)?;
        Some(Located {
            name: name.to_string(),
            tier,
            content_type: blob.content_type_for(name),
            body: blob.bytes().clone(),
        })
    }
}
