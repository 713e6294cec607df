//! Key-value persistence for the corpus, report blocks, and settings.
//!
//! Values are opaque JSON. The store guarantees same-key read-after-write
//! consistency and nothing more; callers that need cross-key ordering should
//! not rely on it. Interested parties subscribe to a change channel instead
//! of polling the backing file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

/// Well-known store keys.
pub mod keys {
    pub const STANDARDIZED_FILES: &str = "standardized_files";
    pub const REPORT_BLOCKS: &str = "report_blocks";
    pub const DEFAULT_CONTEXT: &str = "default_context";
    pub const INFERENCE_SETTINGS: &str = "inference_settings";
}

/// Storage seam for everything the pipeline persists.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    /// Approximate size of the stored data in bytes.
    async fn size_estimate(&self) -> Result<u64>;
}

/// A change notification: the key that was written or removed, or `None`
/// after a `clear`.
pub type ChangeEvent = Option<String>;

/// Store backed by a single JSON file, rewritten atomically on every write.
///
/// The whole map is held in memory behind a mutex; writes serialize the map
/// to a sibling temp file and rename it over the original.
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<BTreeMap<String, serde_json::Value>>,
    changes: watch::Sender<ChangeEvent>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing contents if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store file: {}", path.display()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Store file is not valid JSON: {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        let (changes, _) = watch::channel(None);
        Ok(Self {
            path,
            state: Mutex::new(state),
            changes,
        })
    }

    /// Subscribe to change notifications. The receiver observes the key of
    /// the most recent write.
    pub fn subscribe(&self) -> watch::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, state: &BTreeMap<String, serde_json::Value>) -> Result<()> {
        let serialized = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serialized)
            .with_context(|| format!("Failed to write store file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace store file: {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let state = self.state.lock().await;
        Ok(state.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert(key.to_string(), value);
        self.flush(&state)?;
        let _ = self.changes.send(Some(key.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.remove(key).is_some() {
            self.flush(&state)?;
            let _ = self.changes.send(Some(key.to_string()));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.clear();
        self.flush(&state)?;
        let _ = self.changes.send(None);
        Ok(())
    }

    async fn size_estimate(&self) -> Result<u64> {
        let state = self.state.lock().await;
        let serialized = serde_json::to_string(&*state)?;
        Ok(serialized.len() as u64)
    }
}
