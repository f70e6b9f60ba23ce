//! Key store — signing keys and their lifecycle metadata.
//!
//! The [`KeyStore`] trait abstracts over the provider's key table. Two
//! implementations ship with the crate: [`InMemoryKeyStore`] (two `DashMap`
//! indices) and [`FileKeyStore`](super::file_store::FileKeyStore) (a JSON
//! document on disk).
//!
//! # Ownership
//!
//! A [`ManagedKeyRecord`] is keyed by the [`KeyId`] of exactly one
//! [`SigningKey`]. Deleting the signing key deletes its record too; deleting a
//! record leaves the key in place, unmanaged.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Store-assigned signing key identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub u64);

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for KeyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Serialized private key material, as produced by a key generator.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    /// Wrap an exported private key (PEM).
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    /// The exported private key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial([redacted; {} bytes])", self.0.len())
    }
}

/// A signing keypair held by the provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    /// Store-assigned identifier.
    pub id: KeyId,
    /// Exported private key (PEM).
    #[serde(rename = "key")]
    pub private_key_pem: String,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("private_key_pem", &"[redacted]")
            .finish()
    }
}

/// Lifecycle metadata attached to a signing key under management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedKeyRecord {
    /// The signing key this record describes.
    pub key_id: KeyId,
    /// Date the key was brought under management.
    pub created: NaiveDate,
    /// Date the key stopped being used for new signatures, if it has.
    #[serde(default)]
    pub expired: Option<NaiveDate>,
}

impl ManagedKeyRecord {
    /// Start managing `key_id` as of `created`, as an active key.
    #[must_use]
    pub fn new(key_id: KeyId, created: NaiveDate) -> Self {
        Self {
            key_id,
            created,
            expired: None,
        }
    }

    /// Whether the key may still sign new tokens.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.expired.is_none()
    }

    /// Retire the key as of `on`.
    ///
    /// Retirement happens once: returns `false` and leaves the record alone if
    /// it was already retired.
    pub fn retire(&mut self, on: NaiveDate) -> bool {
        if self.expired.is_some() {
            return false;
        }
        self.expired = Some(on);
        true
    }
}

impl fmt::Display for ManagedKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expired {
            Some(expired) => write!(
                f,
                "key {} (created {}, expired {expired})",
                self.key_id, self.created
            ),
            None => write!(f, "key {} (created {})", self.key_id, self.created),
        }
    }
}

/// Trait abstracting the signing key storage backend.
///
/// Each method completes synchronously from the caller's point of view or
/// fails; a management pass never retries.
#[async_trait::async_trait]
pub trait KeyStore: Send + Sync + 'static {
    /// All signing keys, ordered by id.
    async fn list_signing_keys(&self) -> Result<Vec<SigningKey>>;

    /// Persist freshly generated key material and assign it an id.
    async fn insert_signing_key(&self, material: KeyMaterial) -> Result<SigningKey>;

    /// Look up the managed record for a key.
    ///
    /// `Ok(None)` means the key is unmanaged. Stores that can hold more than
    /// one record per key report that as
    /// [`ConsistencyViolation::DuplicateRecords`](crate::error::ConsistencyViolation::DuplicateRecords).
    async fn get_managed_record(&self, key_id: KeyId) -> Result<Option<ManagedKeyRecord>>;

    /// Insert or replace the record for `record.key_id`.
    ///
    /// Fails with [`Error::Store`](crate::Error::Store) if the signing key no
    /// longer exists, so a record never outlives its key.
    async fn save_managed_record(&self, record: &ManagedKeyRecord) -> Result<()>;

    /// Remove the record for a key. Missing records are not an error.
    async fn delete_managed_record(&self, key_id: KeyId) -> Result<()>;

    /// Remove a signing key and any record attached to it.
    async fn delete_signing_key(&self, key_id: KeyId) -> Result<()>;
}

/// In-memory key store backed by two `DashMap` indices.
///
/// - `keys`:    id → `SigningKey`
/// - `records`: id → `ManagedKeyRecord`
pub struct InMemoryKeyStore {
    keys: DashMap<KeyId, SigningKey>,
    records: DashMap<KeyId, ManagedKeyRecord>,
    next_id: AtomicU64,
}

impl InMemoryKeyStore {
    /// Create an empty key store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of signing keys held.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of managed records held.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn list_signing_keys(&self) -> Result<Vec<SigningKey>> {
        let mut keys: Vec<SigningKey> = self.keys.iter().map(|e| e.value().clone()).collect();
        keys.sort_by_key(|k| k.id);
        Ok(keys)
    }

    async fn insert_signing_key(&self, material: KeyMaterial) -> Result<SigningKey> {
        let id = KeyId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let key = SigningKey {
            id,
            private_key_pem: material.expose().to_string(),
        };
        self.keys.insert(id, key.clone());
        debug!(key_id = %id, "Inserted signing key");
        Ok(key)
    }

    async fn get_managed_record(&self, key_id: KeyId) -> Result<Option<ManagedKeyRecord>> {
        Ok(self.records.get(&key_id).map(|e| e.value().clone()))
    }

    async fn save_managed_record(&self, record: &ManagedKeyRecord) -> Result<()> {
        if !self.keys.contains_key(&record.key_id) {
            return Err(Error::Store(format!(
                "Signing key {} no longer exists",
                record.key_id
            )));
        }
        self.records.insert(record.key_id, record.clone());
        Ok(())
    }

    async fn delete_managed_record(&self, key_id: KeyId) -> Result<()> {
        self.records.remove(&key_id);
        Ok(())
    }

    async fn delete_signing_key(&self, key_id: KeyId) -> Result<()> {
        self.records.remove(&key_id);
        self.keys.remove(&key_id);
        debug!(key_id = %key_id, "Deleted signing key");
        Ok(())
    }
}
