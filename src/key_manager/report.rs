//! Human- and machine-readable summaries of key state.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use super::store::KeyId;
use crate::error::ConsistencyViolation;

/// Where a single key stands in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeyStatus {
    /// Managed and eligible to sign.
    Active {
        /// Management start date
        created: NaiveDate,
    },
    /// Managed, no longer signing, kept for verification.
    Retired {
        /// Management start date
        created: NaiveDate,
        /// Retirement date
        expired: NaiveDate,
        /// Last day the key is guaranteed to exist; `None` if it never leaves.
        removal_after: Option<NaiveDate>,
    },
    /// Present in the store without a managed record.
    Unmanaged,
    /// Metadata cannot be trusted; see the reason.
    Inconsistent {
        /// What is wrong
        reason: String,
    },
}

/// Status of one key in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatusEntry {
    /// The signing key
    pub key_id: KeyId,
    /// Its lifecycle state
    #[serde(flatten)]
    pub status: KeyStatus,
}

impl KeyStatusEntry {
    /// Whether the key carries a usable managed record.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        matches!(
            self.status,
            KeyStatus::Active { .. } | KeyStatus::Retired { .. }
        )
    }
}

impl fmt::Display for KeyStatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.key_id;
        match &self.status {
            KeyStatus::Active { created } => {
                write!(f, "Managed key {id}: active since {created}")
            }
            KeyStatus::Retired {
                expired,
                removal_after: Some(after),
                ..
            } => write!(f, "Managed key {id}: retired on {expired}, removal after {after}"),
            KeyStatus::Retired {
                expired,
                removal_after: None,
                ..
            } => write!(f, "Managed key {id}: retired on {expired}, kept indefinitely"),
            KeyStatus::Unmanaged => write!(f, "Unmanaged key: {id}"),
            KeyStatus::Inconsistent { reason } => write!(f, "Inconsistent key {id}: {reason}"),
        }
    }
}

/// Every key in the store, in id order, as of `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatusReport {
    /// Date the report was taken
    pub date: NaiveDate,
    /// One entry per signing key
    pub keys: Vec<KeyStatusEntry>,
}

impl KeyStatusReport {
    /// Number of keys eligible to sign.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.keys
            .iter()
            .filter(|k| matches!(k.status, KeyStatus::Active { .. }))
            .count()
    }

    /// Number of keys without a managed record.
    #[must_use]
    pub fn unmanaged_count(&self) -> usize {
        self.keys
            .iter()
            .filter(|k| k.status == KeyStatus::Unmanaged)
            .count()
    }

    /// Look up one key's status.
    #[must_use]
    pub fn get(&self, key_id: KeyId) -> Option<&KeyStatus> {
        self.keys
            .iter()
            .find(|k| k.key_id == key_id)
            .map(|k| &k.status)
    }
}

impl fmt::Display for KeyStatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.keys.is_empty() {
            return writeln!(f, "No signing keys in store");
        }
        for entry in &self.keys {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Outcome of one management pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// The pass date ("today", read once)
    pub date: NaiveDate,
    /// Unmanaged keys taken under management as retired
    pub adopted: Vec<KeyId>,
    /// Active keys retired for age
    pub retired: Vec<KeyId>,
    /// Retired keys removed after their hold period
    pub deleted: Vec<KeyId>,
    /// Replacement key generated because no active key remained
    pub created: Option<KeyId>,
    /// Keys skipped because their metadata was inconsistent
    pub violations: Vec<ConsistencyViolation>,
    /// Key state after the pass
    pub status: KeyStatusReport,
}

impl PassReport {
    /// Whether the pass changed anything in the store.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.created.is_some()
            || !self.adopted.is_empty()
            || !self.retired.is_empty()
            || !self.deleted.is_empty()
    }
}

fn join_ids(ids: &[KeyId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Key management pass for {}", self.date)?;
        if let Some(id) = self.created {
            writeln!(f, "  created: {id}")?;
        }
        for (label, ids) in [
            ("adopted", &self.adopted),
            ("retired", &self.retired),
            ("deleted", &self.deleted),
        ] {
            if !ids.is_empty() {
                writeln!(f, "  {label}: {}", join_ids(ids))?;
            }
        }
        if !self.changed() {
            writeln!(f, "  no changes")?;
        }
        for violation in &self.violations {
            writeln!(f, "  violation: {violation}")?;
        }
        writeln!(f)?;
        write!(f, "{}", self.status)
    }
}
