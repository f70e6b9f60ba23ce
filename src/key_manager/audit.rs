//! Audit logging for signing key lifecycle events.
//!
//! Every event is emitted via `tracing::info!` with the event serialized as
//! JSON in the `audit` field, so rotations can be reconstructed from logs.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `key.created` | A fresh key was generated and put under management as active |
//! | `key.adopted` | An unmanaged key was taken under management (already retired) |
//! | `key.retired` | An active key passed its maximum age |
//! | `key.deleted` | A retired key passed its hold period and was removed |
//! | `key.violation` | A key's lifecycle metadata is inconsistent and was skipped |

use chrono::NaiveDate;
use serde::Serialize;

use super::store::{KeyId, ManagedKeyRecord};
use crate::error::ConsistencyViolation;

/// Structured audit event emitted for every key lifecycle transition.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"key.retired"`).
    pub event: &'static str,
    /// The signing key concerned.
    pub key_id: KeyId,
    /// Management start date, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<NaiveDate>,
    /// Retirement date, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<NaiveDate>,
    /// Key length in bits (for `key.created`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_length: Option<u32>,
    /// Human-readable reason for violation events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn from_record(event: &'static str, record: &ManagedKeyRecord) -> Self {
        Self {
            event,
            key_id: record.key_id,
            created: Some(record.created),
            expired: record.expired,
            key_length: None,
            reason: None,
        }
    }

    /// Construct a `key.created` event.
    #[must_use]
    pub fn created(record: &ManagedKeyRecord, key_length: u32) -> Self {
        Self {
            key_length: Some(key_length),
            ..Self::from_record("key.created", record)
        }
    }

    /// Construct a `key.adopted` event.
    #[must_use]
    pub fn adopted(record: &ManagedKeyRecord) -> Self {
        Self::from_record("key.adopted", record)
    }

    /// Construct a `key.retired` event.
    #[must_use]
    pub fn retired(record: &ManagedKeyRecord) -> Self {
        Self::from_record("key.retired", record)
    }

    /// Construct a `key.deleted` event.
    #[must_use]
    pub fn deleted(record: &ManagedKeyRecord) -> Self {
        Self::from_record("key.deleted", record)
    }

    /// Construct a `key.violation` event.
    #[must_use]
    pub fn violation(violation: &ConsistencyViolation) -> Self {
        Self {
            event: "key.violation",
            key_id: violation.key_id(),
            created: None,
            expired: None,
            key_length: None,
            reason: Some(violation.to_string()),
        }
    }
}

/// Emit an audit event via `tracing::info!` with structured fields.
///
/// ```text
/// INFO key_manager::audit audit={"event":"key.retired","key_id":3,...}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "key_manager audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
