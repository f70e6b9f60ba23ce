//! File-backed key store
//!
//! Persists signing keys and their managed records as a single JSON document
//! so the key manager can run as a periodic job against the same state.
//!
//! Every mutation takes an exclusive advisory lock on `<file>.lock`, re-reads
//! the document from disk, applies the change and writes it back. Two stores
//! opened on the same path (in one process or several) therefore never hand
//! out the same id or overwrite each other's changes.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::store::{KeyId, KeyMaterial, KeyStore, ManagedKeyRecord, SigningKey};
use crate::error::ConsistencyViolation;
use crate::{Error, Result};

/// On-disk layout of the key store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreDocument {
    /// Next id to hand out (ids are never reused)
    next_id: u64,
    signing_keys: Vec<SigningKey>,
    managed_records: Vec<ManagedKeyRecord>,
}

impl StoreDocument {
    fn allocate_id(&mut self) -> Result<KeyId> {
        let exhausted = || Error::Store("Signing key id space exhausted".to_string());

        let mut floor = 1;
        for key in &self.signing_keys {
            floor = floor.max(key.id.0.checked_add(1).ok_or_else(exhausted)?);
        }
        let id = self.next_id.max(floor);
        self.next_id = id.checked_add(1).ok_or_else(exhausted)?;
        Ok(KeyId(id))
    }

    /// Two signing keys with one id would share a record and be deleted
    /// together, so such a document is refused outright.
    fn check_unique_ids(&self, path: &Path) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.signing_keys.len());
        for key in &self.signing_keys {
            if !seen.insert(key.id) {
                return Err(Error::Store(format!(
                    "Key store {} holds more than one signing key with id {}",
                    path.display(),
                    key.id
                )));
            }
        }
        Ok(())
    }

    fn has_key(&self, key_id: KeyId) -> bool {
        self.signing_keys.iter().any(|k| k.id == key_id)
    }
}

/// Key store persisted to a JSON file.
///
/// Writes go through a temp file, `fsync` and a rename, so a crash mid-write
/// leaves the previous state intact. Reads always see the latest document on
/// disk.
pub struct FileKeyStore {
    path: PathBuf,
    lock_path: PathBuf,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

impl FileKeyStore {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// A missing file is an empty store; it is written on the first mutation.
    /// A document that cannot be parsed, or that repeats a signing key id, is
    /// rejected with [`Error::Store`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Store(format!(
                    "Failed to create key store dir {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let store = Self {
            lock_path: sibling(&path, ".lock"),
            path,
        };
        let document = store.load()?;

        info!(
            path = %store.path.display(),
            keys = document.signing_keys.len(),
            records = document.managed_records.len(),
            "Opened key store"
        );

        Ok(store)
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreDocument> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Key store file not found, starting empty");
                return Ok(StoreDocument::default());
            }
            Err(e) => {
                return Err(Error::Store(format!(
                    "Failed to read key store {}: {e}",
                    self.path.display()
                )));
            }
        };

        let document: StoreDocument = serde_json::from_str(&content).map_err(|e| {
            Error::Store(format!(
                "Failed to parse key store {}: {e}",
                self.path.display()
            ))
        })?;
        document.check_unique_ids(&self.path)?;
        Ok(document)
    }

    /// Exclusive lock on the store, released when the returned file drops.
    fn lock(&self) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    /// Re-read the document under the lock, apply `f` and persist the result.
    ///
    /// Nothing is written if `f` fails.
    fn update<T>(&self, f: impl FnOnce(&mut StoreDocument) -> Result<T>) -> Result<T> {
        let _lock = self.lock()?;
        let mut document = self.load()?;
        let out = f(&mut document)?;
        self.persist(&document)?;
        Ok(out)
    }

    fn persist(&self, document: &StoreDocument) -> Result<()> {
        let content = serde_json::to_string_pretty(document)?;
        let tmp_path = sibling(&self.path, ".tmp");
        let write_err =
            |e: std::io::Error| Error::Store(format!("Failed to write {}: {e}", tmp_path.display()));

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Private key material: owner read/write only, from the first byte
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path).map_err(write_err)?;

        // `mode` only applies on creation; a leftover temp file keeps its own
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(write_err)?;
        }

        file.write_all(content.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            Error::Store(format!(
                "Failed to replace key store {}: {e}",
                self.path.display()
            ))
        })?;

        debug!(path = %self.path.display(), "Persisted key store");
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyStore for FileKeyStore {
    async fn list_signing_keys(&self) -> Result<Vec<SigningKey>> {
        let mut keys = self.load()?.signing_keys;
        keys.sort_by_key(|k| k.id);
        Ok(keys)
    }

    async fn insert_signing_key(&self, material: KeyMaterial) -> Result<SigningKey> {
        self.update(|doc| {
            let key = SigningKey {
                id: doc.allocate_id()?,
                private_key_pem: material.expose().to_string(),
            };
            doc.signing_keys.push(key.clone());
            Ok(key)
        })
    }

    async fn get_managed_record(&self, key_id: KeyId) -> Result<Option<ManagedKeyRecord>> {
        let doc = self.load()?;
        let mut matches = doc.managed_records.iter().filter(|r| r.key_id == key_id);

        let Some(first) = matches.next() else {
            return Ok(None);
        };
        let extra = matches.count();
        if extra > 0 {
            return Err(ConsistencyViolation::DuplicateRecords {
                key_id,
                count: extra + 1,
            }
            .into());
        }
        Ok(Some(first.clone()))
    }

    async fn save_managed_record(&self, record: &ManagedKeyRecord) -> Result<()> {
        self.update(|doc| {
            if !doc.has_key(record.key_id) {
                return Err(Error::Store(format!(
                    "Signing key {} no longer exists",
                    record.key_id
                )));
            }
            match doc
                .managed_records
                .iter_mut()
                .find(|r| r.key_id == record.key_id)
            {
                Some(existing) => *existing = record.clone(),
                None => doc.managed_records.push(record.clone()),
            }
            Ok(())
        })
    }

    async fn delete_managed_record(&self, key_id: KeyId) -> Result<()> {
        self.update(|doc| {
            doc.managed_records.retain(|r| r.key_id != key_id);
            Ok(())
        })
    }

    async fn delete_signing_key(&self, key_id: KeyId) -> Result<()> {
        self.update(|doc| {
            doc.managed_records.retain(|r| r.key_id != key_id);
            doc.signing_keys.retain(|k| k.id != key_id);
            Ok(())
        })
    }
}
