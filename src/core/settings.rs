use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::source::ModelSource;
use crate::intercept::{normalize_prefix, DEFAULT_PREFIX};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverSettings {
    pub host: String,
    pub worker_port: u16,
    pub static_port: u16,
    pub prefix: String,
    pub ui_dir: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub source: ModelSource,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            worker_port: 8787,
            static_port: 5173,
            prefix: DEFAULT_PREFIX.into(),
            ui_dir: PathBuf::from("ui/dist"),
            data_dir: None,
            source: ModelSource::Upload,
        }
    }
}

impl ResolverSettings {
    /// Applies `MODEL_HOST`, `MODEL_PORT` and `MODEL_STATIC_PORT`.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("MODEL_HOST").filter(|host| !host.trim().is_empty()) {
            self.host = host;
        }
        self.worker_port = port_override(&lookup, "MODEL_PORT", self.worker_port);
        self.static_port = port_override(&lookup, "MODEL_STATIC_PORT", self.static_port);
        self.prefix = normalize_prefix(&self.prefix);
    }

    pub fn worker_addr(&self) -> String {
        format!("{}:{}", self.host, self.worker_port)
    }

    pub fn static_addr(&self) -> String {
        format!("{}:{}", self.host, self.static_port)
    }

    /// Origin clients use to reach the persistent responder. A wildcard
    /// bind address is not dialable, so it becomes loopback.
    pub fn worker_origin(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
            host => host,
        };
        format!("http://{}:{}", host, self.worker_port)
    }
}

fn port_override(lookup: &impl Fn(&str) -> Option<String>, key: &str, fallback: u16) -> u16 {
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<u16>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid {key}='{raw}', falling back to {fallback}");
                fallback
            }
        },
        None => fallback,
    }
}

pub struct SettingsManager {
    path: PathBuf,
    data_dir: PathBuf,
    inner: RwLock<ResolverSettings>,
}

impl SettingsManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "CustomModel", "CustomModelResolver")
            .context("missing project directories")?;
        let dir = project_dirs.config_dir();
        fs::create_dir_all(dir).context("creating config directory failed")?;
        Ok(Self::at(dir.join(CONFIG_FILE), project_dirs.data_dir().to_path_buf()))
    }

    /// Settings stored at an explicit path.
    pub fn at(path: PathBuf, data_dir: PathBuf) -> Self {
        let persisted = match load_settings(&path) {
            Ok(settings) => settings,
            Err(error) => {
                warn!("Ignoring unreadable settings at {path:?}: {error:#}");
                ResolverSettings::default()
            }
        };
        Self {
            path,
            data_dir,
            inner: RwLock::new(persisted),
        }
    }

    pub fn read(&self) -> ResolverSettings {
        self.inner.read().clone()
    }

    pub fn write(&self, settings: ResolverSettings) -> Result<()> {
        let mut guard = self.inner.write();
        *guard = settings;
        persist_settings(self.path.as_path(), &guard)
    }

    pub fn set_source(&self, source: ModelSource) -> Result<()> {
        let mut guard = self.inner.write();
        if guard.source == source {
            return Ok(());
        }
        guard.source = source;
        persist_settings(self.path.as_path(), &guard)
    }

    /// Directory holding the persisted asset record.
    pub fn data_dir(&self) -> PathBuf {
        self.inner
            .read()
            .data_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.clone())
    }
}

fn load_settings(path: &Path) -> Result<ResolverSettings> {
    if !path.exists() {
        return Ok(ResolverSettings::default());
    }
    let bytes = fs::read(path).with_context(|| format!("failed reading {path:?}"))?;
    let parsed: ResolverSettings =
        serde_json::from_slice(&bytes).context("config json could not be parsed")?;
    Ok(parsed)
}

fn persist_settings(path: &Path, settings: &ResolverSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {parent:?}"))?;
    }
    let serialized =
        serde_json::to_vec_pretty(settings).context("serialize settings to json failed")?;
    fs::write(path, serialized).with_context(|| format!("write settings to {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: ResolverSettings = serde_json::from_str(r#"{"workerPort":9000}"#).unwrap();
        assert_eq!(parsed.worker_port, 9000);
        assert_eq!(parsed.prefix, DEFAULT_PREFIX);
        assert_eq!(parsed.source, ModelSource::Upload);
    }

    #[test]
    fn bad_ports_fall_back() {
        let env: HashMap<&str, &str> =
            HashMap::from([("MODEL_PORT", "not-a-port"), ("MODEL_STATIC_PORT", "4000")]);
        let mut settings = ResolverSettings {
            prefix: "models".into(),
            ..ResolverSettings::default()
        };
        settings.apply_overrides(|key| env.get(key).map(|value| value.to_string()));
        assert_eq!(settings.worker_port, 8787);
        assert_eq!(settings.static_port, 4000);
        assert_eq!(settings.prefix, "/models/");
        assert_eq!(settings.static_addr(), "127.0.0.1:4000");
    }

    #[test]
    fn worker_origin_is_dialable() {
        let mut settings = ResolverSettings::default();
        assert_eq!(settings.worker_origin(), "http://127.0.0.1:8787");
        settings.host = "0.0.0.0".into();
        settings.worker_port = 9100;
        assert_eq!(settings.worker_origin(), "http://127.0.0.1:9100");
    }

    #[test]
    fn writes_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let manager = SettingsManager::at(path.clone(), dir.path().join("data"));
        manager
            .set_source(ModelSource::remote("Xenova/opus-mt-en-de"))
            .unwrap();

        let reloaded = SettingsManager::at(path, dir.path().join("data"));
        assert_eq!(
            reloaded.read().source,
            ModelSource::remote("Xenova/opus-mt-en-de")
        );
        assert_eq!(reloaded.data_dir(), dir.path().join("data"));
    }

    #[test]
    fn corrupt_settings_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{").unwrap();
        let manager = SettingsManager::at(path, dir.path().to_path_buf());
        assert_eq!(manager.read(), ResolverSettings::default());
    }
}
