//! Key/value record collections stored as a single JSON object
//!
//! Records are kept as raw JSON until requested, so a malformed record only
//! fails its own `get` and can be skipped by batch callers.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ChordError;

/// Collection of records keyed by string, iterated in key order
#[derive(Debug, Clone)]
pub struct Stash<R> {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Value>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Default for Stash<R> {
    fn default() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
            _record: PhantomData,
        }
    }
}

impl<R: DeserializeOwned> Stash<R> {
    /// Create an empty in-memory stash
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a stash file
    ///
    /// # Errors
    ///
    /// - `MissingInputFile` if `path` does not exist
    /// - `Serialization` if the file is not a JSON object
    pub fn open(path: &Path) -> Result<Self, ChordError> {
        if !path.exists() {
            return Err(ChordError::MissingInputFile(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let entries: BTreeMap<String, Value> = serde_json::from_str(&text)?;
        log::debug!("Opened stash {} with {} records", path.display(), entries.len());
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
            _record: PhantomData,
        })
    }

    /// File this stash was opened from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the stash holds no records
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Decode the record stored under `key`
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if no record has this key
    /// - `Serialization` (or the record's own validation error) if it cannot be decoded
    pub fn get(&self, key: &str) -> Result<R, ChordError> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| ChordError::InvalidParameter(format!("No record with key: {}", key)))?;
        R::deserialize(value).map_err(|e| ChordError::Serialization(format!("{}: {}", key, e)))
    }
}

impl<R: DeserializeOwned + Serialize> Stash<R> {
    /// Store `record` under `key`, replacing any previous record
    pub fn insert(&mut self, key: &str, record: &R) -> Result<(), ChordError> {
        self.entries.insert(key.to_string(), serde_json::to_value(record)?);
        Ok(())
    }

    /// Write the whole stash as one JSON object
    pub fn save(&self, path: &Path) -> Result<(), ChordError> {
        super::output::write_json(path, &self.entries)
    }
}
