mod cache;
mod sync;

pub use cache::{
    CachedResponse, MemoryResponseCache, NamespaceSwap, ResponseCache, SharedResponseCache,
};
pub use sync::{CacheBridge, SyncReport};
