use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::asset::{AssetBag, AssetBlob};
use super::metadata::{compute_sha256, sha256_bytes};

/// Key of the single durable record holding the current bag.
pub const PERSISTENCE_KEY: &str = "custom-model-assets";

/// Durable home of the asset bag. The whole bag is one record: it is written
/// on every replace, read once at startup and removed on clear.
pub trait AssetPersistence: Send + Sync + 'static {
    fn load(&self) -> Result<Option<AssetBag>>;
    fn save(&self, bag: &AssetBag) -> Result<()>;
    fn remove(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedRecord {
    key: String,
    saved_at: OffsetDateTime,
    entries: Vec<PersistedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntry {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    size_bytes: u64,
    sha256: String,
}

/// Stores the record as `<key>.json` next to a `<key>.blobs/` directory of
/// content-addressed blob files.
pub struct DirectoryPersistence {
    index: PathBuf,
    blobs: PathBuf,
    key: String,
}

impl DirectoryPersistence {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_key(root, PERSISTENCE_KEY)
    }

    pub fn with_key(root: impl AsRef<Path>, key: &str) -> Self {
        let root = root.as_ref();
        Self {
            index: root.join(format!("{key}.json")),
            blobs: root.join(format!("{key}.blobs")),
            key: key.to_string(),
        }
    }

    pub fn index_path(&self) -> &Path {
        self.index.as_path()
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.blobs.join(digest)
    }

    fn collect_garbage(&self, keep: &HashSet<String>) -> Result<()> {
        let entries = match fs::read_dir(&self.blobs) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !keep.contains(&name) {
                fs::remove_file(entry.path())
                    .with_context(|| format!("remove stale blob {}", entry.path().display()))?;
            }
        }
        Ok(())
    }
}

impl AssetPersistence for DirectoryPersistence {
    fn load(&self) -> Result<Option<AssetBag>> {
        if !self.index.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.index)
            .with_context(|| format!("read asset index {}", self.index.display()))?;
        let record: PersistedRecord =
            serde_json::from_slice(&bytes).context("asset index could not be parsed")?;
        if record.key != self.key {
            return Err(anyhow!(
                "asset index key mismatch: expected {}, found {}",
                self.key,
                record.key
            ));
        }

        let mut bag = AssetBag::new();
        for entry in record.entries {
            let path = self.blob_path(&entry.sha256);
            let checksum = compute_sha256(&path)?;
            if checksum != entry.sha256 {
                return Err(anyhow!(
                    "checksum mismatch for {}: expected {}, got {}",
                    entry.name,
                    entry.sha256,
                    checksum
                ));
            }
            let data = fs::read(&path)
                .with_context(|| format!("read blob for {}", entry.name))?;
            if data.len() as u64 != entry.size_bytes {
                return Err(anyhow!(
                    "size mismatch for {}: expected {} bytes, got {}",
                    entry.name,
                    entry.size_bytes,
                    data.len()
                ));
            }
            let blob = match entry.content_type {
                Some(content_type) => AssetBlob::with_content_type(data, content_type),
                None => AssetBlob::new(data),
            };
            bag.insert(entry.name, blob);
        }
        Ok(Some(bag))
    }

    fn save(&self, bag: &AssetBag) -> Result<()> {
        fs::create_dir_all(&self.blobs).context("create blob directory")?;

        let mut entries = Vec::with_capacity(bag.len());
        let mut keep = HashSet::new();
        for (name, blob) in bag {
            let digest = sha256_bytes(blob.bytes());
            let path = self.blob_path(&digest);
            if !path.exists() {
                fs::write(&path, blob.bytes())
                    .with_context(|| format!("write blob for {name}"))?;
            }
            keep.insert(digest.clone());
            entries.push(PersistedEntry {
                name: name.clone(),
                content_type: blob.declared_content_type().map(ToOwned::to_owned),
                size_bytes: blob.size(),
                sha256: digest,
            });
        }

        let record = PersistedRecord {
            key: self.key.clone(),
            saved_at: OffsetDateTime::now_utc(),
            entries,
        };
        let serialized =
            serde_json::to_vec_pretty(&record).context("serialize asset index failed")?;
        let staging = self.index.with_extension("json.tmp");
        fs::write(&staging, serialized)
            .with_context(|| format!("write asset index to {staging:?}"))?;
        fs::rename(&staging, &self.index).context("commit asset index")?;

        self.collect_garbage(&keep)
    }

    fn remove(&self) -> Result<()> {
        if self.index.exists() {
            fs::remove_file(&self.index)
                .with_context(|| format!("remove asset index {}", self.index.display()))?;
        }
        if self.blobs.exists() {
            fs::remove_dir_all(&self.blobs)
                .with_context(|| format!("remove blob directory {}", self.blobs.display()))?;
        }
        Ok(())
    }
}

/// Keeps the record in memory only; nothing survives the process.
#[derive(Default)]
pub struct MemoryPersistence {
    record: Mutex<Option<AssetBag>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<AssetBag>> {
        Ok(self.record.lock().clone())
    }

    fn save(&self, bag: &AssetBag) -> Result<()> {
        *self.record.lock() = Some(bag.clone());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.record.lock() = None;
        Ok(())
    }
}

/// Memory persistence whose writes fail until `recover` is called.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FlakyPersistence {
    failing: std::sync::atomic::AtomicBool,
    inner: MemoryPersistence,
}

#[cfg(test)]
impl FlakyPersistence {
    pub fn failing() -> Self {
        let persistence = Self::default();
        persistence.failing.store(true, std::sync::atomic::Ordering::SeqCst);
        persistence
    }

    pub fn recover(&self) {
        self.failing.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(anyhow!("storage quota exceeded"));
        }
        Ok(())
    }
}

#[cfg(test)]
impl AssetPersistence for FlakyPersistence {
    fn load(&self) -> Result<Option<AssetBag>> {
        self.inner.load()
    }

    fn save(&self, bag: &AssetBag) -> Result<()> {
        self.check()?;
        self.inner.save(bag)
    }

    fn remove(&self) -> Result<()> {
        self.check()?;
        self.inner.remove()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssetBag {
        let mut bag = AssetBag::new();
        bag.insert(
            "config.json",
            AssetBlob::new(br#"{"architectures":["MarianMTModel"]}"#.to_vec()),
        );
        bag.insert(
            "onnx/encoder_model.onnx",
            AssetBlob::with_content_type(vec![1u8, 2, 3], "application/x-onnx"),
        );
        bag.insert("copy.onnx", AssetBlob::new(vec![1u8, 2, 3]));
        bag
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryPersistence::new(dir.path());
        assert!(store.load().unwrap().is_none());

        let bag = sample();
        store.save(&bag).unwrap();
        let restored = store.load().unwrap().unwrap();
        assert_eq!(restored, bag);
        assert_eq!(
            restored
                .get("onnx/encoder_model.onnx")
                .unwrap()
                .declared_content_type(),
            Some("application/x-onnx")
        );
        // identical bytes share one blob file
        assert_eq!(fs::read_dir(dir.path().join("custom-model-assets.blobs")).unwrap().count(), 2);
    }

    #[test]
    fn saving_a_smaller_bag_drops_old_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryPersistence::new(dir.path());
        store.save(&sample()).unwrap();

        let mut smaller = AssetBag::new();
        smaller.insert("model.onnx", AssetBlob::new(vec![9u8]));
        store.save(&smaller).unwrap();

        assert_eq!(store.load().unwrap().unwrap(), smaller);
        assert_eq!(fs::read_dir(dir.path().join("custom-model-assets.blobs")).unwrap().count(), 1);
    }

    #[test]
    fn tampered_blob_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryPersistence::new(dir.path());
        store.save(&sample()).unwrap();
        let digest = sha256_bytes(&[1u8, 2, 3]);
        fs::write(store.blob_path(&digest), b"corrupt").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn garbage_index_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryPersistence::new(dir.path());
        fs::write(store.index_path(), b"{ not json").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn remove_deletes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryPersistence::new(dir.path());
        store.save(&sample()).unwrap();
        store.remove().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!dir.path().join("custom-model-assets.blobs").exists());
        store.remove().unwrap();
    }
}
