//! Settings persistence
//!
//! A store keeps one serialized blob per [`Domain`], keyed by the domain's
//! storage key. Loading is fail-soft: a missing or unreadable slot yields an
//! empty blob and the problem is only logged. Saving replaces the whole slot.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::{Domain, Error, Result, SettingsBlob};

/// Durable per-domain settings storage
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the blob for `domain`, or an empty blob if none is usable
    async fn load(&self, domain: Domain) -> SettingsBlob;

    /// Replace the blob for `domain`
    async fn save(&self, domain: Domain, blob: &SettingsBlob) -> Result<()>;

    /// Store name for logging
    fn name(&self) -> &str;
}

/// Decode a raw slot, substituting an empty blob for anything unreadable
pub fn decode_slot(domain: Domain, raw: Option<&str>) -> SettingsBlob {
    let Some(raw) = raw else {
        debug!(domain = %domain, "No stored settings");
        return SettingsBlob::new();
    };

    match SettingsBlob::parse(raw) {
        Ok(blob) => blob,
        Err(e) => {
            warn!(domain = %domain, error = %e, "Discarding malformed settings blob");
            SettingsBlob::new()
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-process store holding raw string slots, like browser local storage
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw string into a slot without validation
    pub fn put_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), raw.into());
    }

    /// Read a raw slot
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self, domain: Domain) -> SettingsBlob {
        let raw = self.get_raw(domain.storage_key());
        decode_slot(domain, raw.as_deref())
    }

    async fn save(&self, domain: Domain, blob: &SettingsBlob) -> Result<()> {
        let raw = blob.to_json()?;
        self.put_raw(domain.storage_key(), raw);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Single JSON file mapping storage keys to serialized blobs
///
/// The file layout is `{ "apiSettings": "<blob json>", ... }`, mirroring a
/// string-valued key-value store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_slots(&self) -> HashMap<String, String> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to read settings file");
                return HashMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(slots) => slots,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Settings file is malformed, ignoring it");
                HashMap::new()
            }
        }
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load(&self, domain: Domain) -> SettingsBlob {
        let slots = self.read_slots().await;
        decode_slot(domain, slots.get(domain.storage_key()).map(String::as_str))
    }

    async fn save(&self, domain: Domain, blob: &SettingsBlob) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut slots = self.read_slots().await;
        slots.insert(domain.storage_key().to_string(), blob.to_json()?);
        let content = serde_json::to_string_pretty(&slots)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::StorageError(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
        }

        // Write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| Error::StorageError(format!("Failed to write settings: {}", e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::StorageError(format!("Failed to replace settings: {}", e)))?;

        debug!(domain = %domain, path = ?self.path, "Settings saved");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
