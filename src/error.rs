//! Error types for the OIDC key manager

use std::io;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::key_manager::KeyId;

/// Result type alias for the key manager
pub type Result<T> = std::result::Result<T, Error>;

/// Key manager errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The key generator could not produce a key
    #[error("Could not create RSA key of length {bits}: {reason}")]
    Generation {
        /// Requested key length in bits
        bits: u32,
        /// What went wrong
        reason: String,
    },

    /// Key store failure (read, write, corrupt document)
    #[error("Key store error: {0}")]
    Store(String),

    /// Lifecycle metadata contradicts itself
    #[error("Inconsistent key state: {0}")]
    Consistency(#[from] ConsistencyViolation),

    /// IO error outside the document itself (e.g. taking the store lock)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a generation error for the given key length
    pub fn generation(bits: u32, reason: impl Into<String>) -> Self {
        Self::Generation {
            bits,
            reason: reason.into(),
        }
    }
}

/// Lifecycle metadata that cannot be acted on safely.
///
/// Keys in this state are skipped by the management pass and never count as
/// active signers.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyViolation {
    /// More than one managed record references the same signing key.
    #[error("key {key_id} has {count} managed records")]
    DuplicateRecords {
        /// The signing key
        key_id: KeyId,
        /// Number of records found
        count: usize,
    },

    /// The store answered a lookup for one key with another key's record.
    #[error("lookup for key {key_id} returned the record of key {record_key_id}")]
    MismatchedRecord {
        /// The key that was looked up
        key_id: KeyId,
        /// The key the returned record belongs to
        record_key_id: KeyId,
    },

    /// A retired record whose retirement date lies after the current date.
    #[error("key {key_id} retired on {expired}, which is after {today}")]
    ExpiredInFuture {
        /// The signing key
        key_id: KeyId,
        /// Recorded retirement date
        expired: NaiveDate,
        /// Date of the pass
        today: NaiveDate,
    },
}

impl ConsistencyViolation {
    /// The signing key this violation concerns
    #[must_use]
    pub fn key_id(&self) -> KeyId {
        match self {
            Self::DuplicateRecords { key_id, .. }
            | Self::MismatchedRecord { key_id, .. }
            | Self::ExpiredInFuture { key_id, .. } => *key_id,
        }
    }
}
