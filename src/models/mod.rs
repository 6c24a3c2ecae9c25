mod asset;
pub mod import;
pub mod manifest;
pub mod metadata;
mod persistence;
mod readiness;
mod resolver;
mod store;
mod view;

pub use asset::{AssetBag, AssetBlob, AssetSummary};
pub use import::{
    fetch_remote, from_archive, from_archive_path, from_directory, from_path, ArchiveFormat,
    ImportError, RemoteFile,
};
pub use manifest::{interpret, ManifestState, ModelManifest, WeightRole};
pub use metadata::compute_sha256;
#[cfg(test)]
pub(crate) use persistence::FlakyPersistence;
pub use persistence::{
    AssetPersistence, DirectoryPersistence, MemoryPersistence, PERSISTENCE_KEY,
};
pub use readiness::{checklist, missing_required, ChecklistItem};
pub use resolver::{basename, is_weight_file, resolve, resolve_in, MatchTier, Resolution, Resolver};
pub use store::AssetStore;
pub use view::AssetView;
