use std::{
    fs::{self, File},
    io::Read,
    path::{Component, Path, PathBuf},
};

use anyhow::{anyhow, Context};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};
use zip::read::ZipArchive;

use super::asset::{AssetBag, AssetBlob};
use super::metadata::sha256_bytes;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("cannot tell the archive format of {0}; expected .zip, .tar.gz or .tar.bz2")]
    UnknownFormat(PathBuf),
    #[error("no model files found in {0}")]
    Empty(String),
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarBz2,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(ArchiveFormat::TarBz2)
        } else {
            None
        }
    }

    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
        }
    }
}

/// A file to pull from a remote model registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub name: String,
    #[serde(default)]
    pub sha256: Option<String>,
}

impl RemoteFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sha256: None,
        }
    }
}

/// Reads every file below `root`. Names are relative to `root` with `/`
/// separators.
pub fn from_directory(root: &Path) -> Result<AssetBag, ImportError> {
    if !root.is_dir() {
        return Err(ImportError::NotADirectory(root.to_path_buf()));
    }
    let mut bag = AssetBag::new();
    collect_directory(root, root, &mut bag)?;
    if bag.is_empty() {
        return Err(ImportError::Empty(root.display().to_string()));
    }
    info!(
        "Imported {} model files from {}",
        bag.len(),
        root.display()
    );
    Ok(bag)
}

fn collect_directory(root: &Path, dir: &Path, bag: &mut AssetBag) -> anyhow::Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.context("read directory entry")?;
        let path = entry.path();
        let file_type = entry.file_type().context("stat directory entry")?;
        if file_type.is_dir() {
            collect_directory(root, &path, bag)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("{} escapes {}", path.display(), root.display()))?;
            let Some(name) = asset_name(relative) else {
                continue;
            };
            let data = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            bag.insert(name, AssetBlob::new(data));
        }
    }
    Ok(())
}

/// Unpacks an archive straight into a bag. A single directory wrapping every
/// entry is dropped from the names.
pub fn from_archive(path: &Path, format: ArchiveFormat) -> Result<AssetBag, ImportError> {
    let file = File::open(path).with_context(|| format!("open archive {}", path.display()))?;
    let entries = match format {
        ArchiveFormat::TarGz => read_tar(GzDecoder::new(file))?,
        ArchiveFormat::TarBz2 => read_tar(BzDecoder::new(file))?,
        ArchiveFormat::Zip => read_zip(file)?,
    };
    let strip = u8::from(shares_single_root(&entries));
    let mut bag = AssetBag::new();
    for (entry_path, data) in entries {
        let stripped = strip_components(&entry_path, strip).ok_or_else(|| {
            anyhow!("unable to strip {strip} components from {entry_path:?}")
        })?;
        if let Some(name) = asset_name(&stripped) {
            bag.insert(name, AssetBlob::new(data));
        }
    }
    if bag.is_empty() {
        return Err(ImportError::Empty(path.display().to_string()));
    }
    info!(
        "Imported {} model files from {} archive {}",
        bag.len(),
        format.extension(),
        path.display()
    );
    Ok(bag)
}

/// Picks the archive format from the file name.
pub fn from_archive_path(path: &Path) -> Result<AssetBag, ImportError> {
    let format =
        ArchiveFormat::from_path(path).ok_or_else(|| ImportError::UnknownFormat(path.to_path_buf()))?;
    from_archive(path, format)
}

/// Directory or archive, whichever `path` is.
pub fn from_path(path: &Path) -> Result<AssetBag, ImportError> {
    if path.is_dir() {
        from_directory(path)
    } else {
        from_archive_path(path)
    }
}

fn read_tar<R: Read>(reader: R) -> anyhow::Result<Vec<(PathBuf, Vec<u8>)>> {
    let mut archive = Archive::new(reader);
    let mut files = Vec::new();
    for entry in archive.entries().context("iterate tar entries")? {
        let mut entry = entry.context("read tar entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path().context("read entry path")?.into_owned();
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("read tar entry {path:?}"))?;
        files.push((path, data));
    }
    Ok(files)
}

fn read_zip(file: File) -> anyhow::Result<Vec<(PathBuf, Vec<u8>)>> {
    let mut archive = ZipArchive::new(file).context("open zip archive")?;
    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("read zip entry")?;
        if entry.is_dir() {
            continue;
        }
        let path = entry.mangled_name();
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("read zip entry {path:?}"))?;
        files.push((path, data));
    }
    Ok(files)
}

/// Downloads `files` relative to `base_uri`.
pub async fn fetch_remote(base_uri: &str, files: Vec<RemoteFile>) -> Result<AssetBag, ImportError> {
    let base_uri = base_uri.trim_end_matches('/').to_string();
    tokio::task::spawn_blocking(move || fetch_blocking(&base_uri, &files))
        .await
        .map_err(|error| anyhow!("download task failed: {error}"))?
}

fn fetch_blocking(base_uri: &str, files: &[RemoteFile]) -> Result<AssetBag, ImportError> {
    if files.is_empty() {
        return Err(ImportError::Empty(base_uri.to_string()));
    }
    let client = Client::builder().build().context("create http client")?;
    let mut bag = AssetBag::new();
    for file in files {
        let uri = format!("{base_uri}/{}", file.name.trim_start_matches('/'));
        let mut response = client
            .get(&uri)
            .send()
            .with_context(|| format!("request {uri}"))?
            .error_for_status()
            .with_context(|| format!("download {uri}"))?;
        let mut data = Vec::new();
        response
            .read_to_end(&mut data)
            .with_context(|| format!("read {uri}"))?;
        verify(file, &data)?;
        debug!("Downloaded {} ({} bytes)", file.name, data.len());
        bag.insert(file.name.clone(), AssetBlob::new(data));
    }
    info!("Fetched {} model files from {}", bag.len(), base_uri);
    Ok(bag)
}

fn verify(file: &RemoteFile, data: &[u8]) -> Result<(), ImportError> {
    let Some(expected) = file.sha256.as_deref() else {
        return Ok(());
    };
    let actual = sha256_bytes(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ImportError::ChecksumMismatch {
            name: file.name.clone(),
            expected: expected.to_string(),
            actual,
        })
    }
}

fn shares_single_root(entries: &[(PathBuf, Vec<u8>)]) -> bool {
    let mut root = None;
    for (path, _) in entries {
        let mut components = path.components();
        let first = components.next();
        if !matches!(first, Some(Component::Normal(_))) || components.next().is_none() {
            return false;
        }
        match (root, first) {
            (None, Some(first)) => root = Some(first),
            (Some(existing), Some(first)) if existing == first => {}
            _ => return false,
        }
    }
    root.is_some()
}

fn strip_components(path: &Path, count: u8) -> Option<PathBuf> {
    let mut components = path.components();
    for _ in 0..count {
        components.next()?;
    }
    Some(components.collect())
}

/// `/`-joined name for a relative path; `None` for anything that is not a
/// plain relative file path.
fn asset_name(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
