//! File-backed JSON document store
//!
//! Persisted state (zone tables, regime verdicts, risk state, trail state) is
//! shared across processes through flat JSON files under one state directory.
//! Writers replace documents wholesale and skip the write when the new
//! content hashes identically to what is already on disk, so downstream file
//! watchers see no churn. Readers must tolerate missing or corrupt documents
//! and fall back to their caller's safe default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors returned by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create state directory {dir}: {source}")]
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write document '{key}': {source}")]
    Write {
        key: String,
        source: std::io::Error,
    },

    #[error("failed to serialize document '{key}': {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },
}

/// Key-value store over flat JSON files.
///
/// Each key maps to `<dir>/<key>.json`. Replacement is atomic: documents are
/// written to a sibling temp file and renamed into place.
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            dir: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read and deserialize a document.
    ///
    /// Returns `None` on missing file or malformed content; the caller
    /// substitutes its documented safe default.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Document '{}' not found, using default", key);
                return None;
            }
            Err(e) => {
                warn!("Failed to read document '{}': {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Document '{}' is malformed ({}), using default", key, e);
                None
            }
        }
    }

    /// Serialize and persist a document, replacing any previous version.
    ///
    /// Returns `Ok(true)` when a write happened and `Ok(false)` when the new
    /// content was identical to the existing document and the write was
    /// skipped.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, StoreError> {
        let json =
            serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
                key: key.to_string(),
                source,
            })?;

        if let Some(existing) = self.content_hash(key) {
            if existing == hash_hex(&json) {
                debug!("Document '{}' unchanged, skipping write", key);
                return Ok(false);
            }
        }

        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, &json)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|source| StoreError::Write {
                key: key.to_string(),
                source,
            })?;

        debug!("Document '{}' written ({} bytes)", key, json.len());
        Ok(true)
    }

    /// SHA-256 of the stored document content, if the document exists
    pub fn content_hash(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key))
            .ok()
            .map(|raw| hash_hex(&raw))
    }

    /// Remove a document; missing documents are not an error
    pub fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove document '{}': {}", key, e);
            }
        }
    }
}

fn hash_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Well-known document keys
pub mod keys {
    pub const ZONES: &str = "shoot_values";
    pub const CHOPPY: &str = "choppy_market_detection";
    pub const RANGE_HIGHER: &str = "ranging_market_h4";
    pub const RANGE_LOWER: &str = "ranging_market_m2";
    pub const RISK_STATE: &str = "drawdown_state";
    pub const TRAIL_STATE: &str = "trail_state";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        value: f64,
    }

    fn sample() -> Doc {
        Doc {
            name: "zone9".to_string(),
            value: 3500.0,
        }
    }

    #[test]
    fn test_put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();

        assert!(store.put("doc", &sample()).unwrap());
        let loaded: Doc = store.get("doc").unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_missing_document_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        assert!(store.get::<Doc>("absent").is_none());
    }

    #[test]
    fn test_corrupt_document_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert!(store.get::<Doc>("bad").is_none());
    }

    #[test]
    fn test_identical_put_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();

        assert!(store.put("doc", &sample()).unwrap());
        let hash_before = store.content_hash("doc").unwrap();

        // Same content: no write
        assert!(!store.put("doc", &sample()).unwrap());
        assert_eq!(store.content_hash("doc").unwrap(), hash_before);

        // Changed content: written, hash moves
        let mut changed = sample();
        changed.value = 3600.0;
        assert!(store.put("doc", &changed).unwrap());
        assert_ne!(store.content_hash("doc").unwrap(), hash_before);
    }

    #[test]
    fn test_whole_document_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();

        store.put("doc", &sample()).unwrap();
        let replacement = Doc {
            name: "zone1".to_string(),
            value: 3400.0,
        };
        store.put("doc", &replacement).unwrap();

        let loaded: Doc = store.get("doc").unwrap();
        assert_eq!(loaded, replacement);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store.put("doc", &sample()).unwrap();
        store.remove("doc");
        store.remove("doc");
        assert!(store.get::<Doc>("doc").is_none());
    }
}
