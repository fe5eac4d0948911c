//! Key-value storage for provider credentials and small persisted blobs
//!
//! Credentials are plain named strings. Their presence decides which
//! providers the orchestrator attempts; nothing validates them up front.

use anyhow::Context;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// String get/set store (credentials, history, preferences)
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Volatile store, used by tests and as a fallback when no file is usable
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { entries: RwLock::new(map) }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

/// Store persisted as one JSON object; rewritten on every mutation
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store {}", path.display()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse store {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        info!(path = %path.display(), entries = entries.len(), "store_opened");
        Ok(Self { path, entries: RwLock::new(entries) })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) {
        if let Err(e) = self.write_file(entries) {
            error!(path = %self.path.display(), error = %e, "store_write_failed");
        }
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), entries = entries.len(), "store_written");
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

/// The four named provider credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKey {
    MapKey,
    MapSecret,
    DomesticLlmKey,
    MultimodalKey,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 4] = [
        CredentialKey::MapKey,
        CredentialKey::MapSecret,
        CredentialKey::DomesticLlmKey,
        CredentialKey::MultimodalKey,
    ];

    /// Store key, also the environment variable name
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::MapKey => "AMAP_KEY",
            CredentialKey::MapSecret => "AMAP_SECRET",
            CredentialKey::DomesticLlmKey => "DEEPSEEK_KEY",
            CredentialKey::MultimodalKey => "GEMINI_API_KEY",
        }
    }
}

impl std::str::FromStr for CredentialKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown credential '{}'", s))
    }
}

/// Map provider key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapCredentials {
    pub key: String,
    pub secret: String,
}

/// Snapshot of configured credentials, read at the start of each capability call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub map_key: Option<String>,
    pub map_secret: Option<String>,
    pub domestic_llm_key: Option<String>,
    pub multimodal_key: Option<String>,
}

impl Credentials {
    /// Read from the store. Environment values reach the store via [`seed_from_env`].
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let read = |key: CredentialKey| non_empty(store.get(key.as_str()));
        Self {
            map_key: read(CredentialKey::MapKey),
            map_secret: read(CredentialKey::MapSecret),
            domestic_llm_key: read(CredentialKey::DomesticLlmKey),
            multimodal_key: read(CredentialKey::MultimodalKey),
        }
    }

    pub fn map(&self) -> Option<MapCredentials> {
        match (&self.map_key, &self.map_secret) {
            (Some(key), Some(secret)) => {
                Some(MapCredentials { key: key.clone(), secret: secret.clone() })
            }
            _ => None,
        }
    }

    pub fn domestic_llm(&self) -> Option<&str> {
        self.domestic_llm_key.as_deref()
    }

    pub fn multimodal(&self) -> Option<&str> {
        self.multimodal_key.as_deref()
    }

    /// True when at least one remote provider can be attempted
    pub fn has_any_remote(&self) -> bool {
        self.map().is_some() || self.domestic_llm_key.is_some() || self.multimodal_key.is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Copy credentials from the environment into the store where the store has none.
/// Returns the number of keys copied.
pub fn seed_from_env(store: &dyn KeyValueStore) -> usize {
    let mut seeded = 0;
    for key in CredentialKey::ALL {
        if non_empty(store.get(key.as_str())).is_some() {
            continue;
        }
        if let Some(value) = non_empty(env::var(key.as_str()).ok()) {
            store.set(key.as_str(), &value);
            info!(key = key.as_str(), "credential_seeded_from_env");
            seeded += 1;
        }
    }
    seeded
}
