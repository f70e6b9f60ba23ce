//! The rotation pass: classify every key, retire, purge, replace.
//!
//! # Pass order
//!
//! 1. Read "today" once and list every signing key.
//! 2. Classify each key as unmanaged, active, retired or inconsistent.
//! 3. Delete retired keys whose hold period has passed (`today > expired + hold`).
//! 4. Retire active keys past their maximum age (`today > created + max_age`).
//! 5. Take unmanaged keys under management *already retired*.
//! 6. If no active key survived, generate exactly one replacement.
//!
//! A key discovered in step 5 is never deleted in the same pass: it has to be
//! observed as retired by a later pass, so it always gets a full hold period.
//!
//! # Unmanaged keys are retired, not adopted
//!
//! A key of unknown age and provenance is never trusted as a signer. Even a
//! long-lived key seeded into the provider by hand ends up retired on the
//! first pass and deleted once the hold period runs out, while a freshly
//! generated key takes over signing.
//!
//! # Concurrency
//!
//! Every store write is atomic, and [`FileKeyStore`](super::FileKeyStore)
//! serializes writes from separate processes with a file lock, so overlapping
//! passes never lose keys or reuse ids. They can still each generate a
//! replacement key; the extra one ages out. A pass that tries to record a key
//! another pass has just deleted fails with [`Error::Store`] and the next pass
//! starts from the current state.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{error, info, warn};

use super::audit::{self, AuditEvent};
use super::clock::Clock;
use super::generator::KeyGenerator;
use super::report::{KeyStatus, KeyStatusEntry, KeyStatusReport, PassReport};
use super::store::{KeyId, KeyStore, ManagedKeyRecord};
use crate::config::RotationConfig;
use crate::error::ConsistencyViolation;
use crate::{Error, Result};

/// Classification of one signing key at the start of a pass.
#[derive(Debug)]
enum Classified {
    Unmanaged,
    Active(ManagedKeyRecord),
    Retired {
        record: ManagedKeyRecord,
        expired: NaiveDate,
    },
    Inconsistent(ConsistencyViolation),
}

/// `start + days`, or `None` if the calendar runs out.
fn days_after(start: NaiveDate, days: u32) -> Option<NaiveDate> {
    start.checked_add_days(Days::new(u64::from(days)))
}

/// Strictly past the threshold. A threshold beyond the calendar is never passed.
fn past(start: NaiveDate, days: u32, today: NaiveDate) -> bool {
    days_after(start, days).is_some_and(|threshold| today > threshold)
}

/// Owns the signing key rotation policy.
///
/// Holds the store, generator and clock it works against, plus the rotation
/// settings fixed at construction.
pub struct KeyLifecycleManager {
    store: Arc<dyn KeyStore>,
    generator: Arc<dyn KeyGenerator>,
    clock: Arc<dyn Clock>,
    rotation: RotationConfig,
}

impl KeyLifecycleManager {
    /// Create a manager over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyStore>,
        generator: Arc<dyn KeyGenerator>,
        clock: Arc<dyn Clock>,
        rotation: RotationConfig,
    ) -> Self {
        Self {
            store,
            generator,
            clock,
            rotation,
        }
    }

    /// The rotation settings in force.
    #[must_use]
    pub fn rotation(&self) -> &RotationConfig {
        &self.rotation
    }

    /// The key store this manager operates on.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    /// Run one management pass.
    ///
    /// Safe to repeat: a second pass on the same day with no outside changes
    /// does nothing. Store failures abort the pass. Failing to generate a
    /// needed replacement key is returned as [`Error::Generation`]; the pass
    /// never reports success without an active key.
    pub async fn run_management_pass(&self) -> Result<PassReport> {
        let today = self.clock.today();
        let keys = self.store.list_signing_keys().await?;
        info!(%today, keys = keys.len(), "Starting key management pass");

        let mut unmanaged = Vec::new();
        let mut active = Vec::new();
        let mut retired = Vec::new();
        let mut violations = Vec::new();

        for key in &keys {
            match self.classify(key.id, today).await? {
                Classified::Unmanaged => unmanaged.push(key.id),
                Classified::Active(record) => active.push(record),
                Classified::Retired { record, expired } => retired.push((record, expired)),
                Classified::Inconsistent(violation) => {
                    warn!(key_id = %key.id, %violation, "Skipping key with inconsistent metadata");
                    audit::emit(&AuditEvent::violation(&violation));
                    violations.push(violation);
                }
            }
        }

        let mut deleted = Vec::new();
        for (record, expired) in retired {
            if past(expired, self.rotation.expiration_hold_days, today) {
                self.store.delete_managed_record(record.key_id).await?;
                self.store.delete_signing_key(record.key_id).await?;
                info!(key_id = %record.key_id, %expired, "Deleted key after hold period");
                audit::emit(&AuditEvent::deleted(&record));
                deleted.push(record.key_id);
            }
        }

        let mut retired_now = Vec::new();
        let mut valid_keys = false;
        for mut record in active {
            if past(record.created, self.rotation.max_age_days, today) {
                record.retire(today);
                self.store.save_managed_record(&record).await?;
                info!(key_id = %record.key_id, created = %record.created, "Retired key past max age");
                audit::emit(&AuditEvent::retired(&record));
                retired_now.push(record.key_id);
            } else {
                valid_keys = true;
            }
        }

        let mut adopted = Vec::new();
        for key_id in unmanaged {
            let mut record = ManagedKeyRecord::new(key_id, today);
            record.retire(today);
            self.store.save_managed_record(&record).await?;
            info!(key_id = %key_id, "Took unmanaged key under management as retired");
            audit::emit(&AuditEvent::adopted(&record));
            adopted.push(key_id);
        }

        let created = if valid_keys {
            None
        } else {
            Some(self.create_managed_key(today).await?)
        };

        let status = self.status_report_for(today).await?;
        info!(
            active = status.active_count(),
            retired = retired_now.len(),
            deleted = deleted.len(),
            adopted = adopted.len(),
            created = created.is_some(),
            "Key management pass complete"
        );

        Ok(PassReport {
            date: today,
            adopted,
            retired: retired_now,
            deleted,
            created,
            violations,
            status,
        })
    }

    /// Status of every key as of today, without changing anything.
    pub async fn status_report(&self) -> Result<KeyStatusReport> {
        self.status_report_for(self.clock.today()).await
    }

    async fn status_report_for(&self, today: NaiveDate) -> Result<KeyStatusReport> {
        let keys = self.store.list_signing_keys().await?;
        let mut entries = Vec::with_capacity(keys.len());

        for key in keys {
            let status = match self.classify(key.id, today).await? {
                Classified::Unmanaged => KeyStatus::Unmanaged,
                Classified::Active(record) => KeyStatus::Active {
                    created: record.created,
                },
                Classified::Retired { record, expired } => KeyStatus::Retired {
                    created: record.created,
                    expired,
                    removal_after: days_after(expired, self.rotation.expiration_hold_days),
                },
                Classified::Inconsistent(violation) => KeyStatus::Inconsistent {
                    reason: violation.to_string(),
                },
            };
            entries.push(KeyStatusEntry {
                key_id: key.id,
                status,
            });
        }

        Ok(KeyStatusReport {
            date: today,
            keys: entries,
        })
    }

    async fn classify(&self, key_id: KeyId, today: NaiveDate) -> Result<Classified> {
        let record = match self.store.get_managed_record(key_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(Classified::Unmanaged),
            Err(Error::Consistency(violation)) => return Ok(Classified::Inconsistent(violation)),
            Err(e) => return Err(e),
        };

        if record.key_id != key_id {
            return Ok(Classified::Inconsistent(
                ConsistencyViolation::MismatchedRecord {
                    key_id,
                    record_key_id: record.key_id,
                },
            ));
        }

        Ok(match record.expired {
            None => Classified::Active(record),
            Some(expired) if expired > today => {
                Classified::Inconsistent(ConsistencyViolation::ExpiredInFuture {
                    key_id,
                    expired,
                    today,
                })
            }
            Some(expired) => Classified::Retired { record, expired },
        })
    }

    /// Generate a key and take it under management as active.
    async fn create_managed_key(&self, today: NaiveDate) -> Result<KeyId> {
        let bits = self.rotation.key_length;
        let material = self.generator.generate(bits).await.inspect_err(|e| {
            error!(bits, error = %e, "No active signing key and key generation failed");
        })?;

        let key = self.store.insert_signing_key(material).await?;
        let record = ManagedKeyRecord::new(key.id, today);
        self.store.save_managed_record(&record).await?;

        info!(key_id = %key.id, bits, "Created new key of length {bits} with id {}", key.id);
        audit::emit(&AuditEvent::created(&record, bits));
        Ok(key.id)
    }
}
