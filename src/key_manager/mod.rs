//! Signing key lifecycle — rotation of the provider's RSA ID-token keys.
//!
//! A management pass keeps the provider's key table healthy:
//!
//! - keys older than `max_age_days` stop signing (they are *retired*),
//! - retired keys stay published for `expiration_hold_days` so tokens signed
//!   before retirement still verify, then they are deleted,
//! - there is always at least one active key afterwards.
//!
//! # Lifecycle
//!
//! ```text
//! generated by the manager:  (absent) -> active -> retired -> deleted
//! found in the store:        (absent) -> retired -> deleted
//! ```
//!
//! Keys that appear in the store without a managed record are never adopted
//! as signers; see [`lifecycle`] for why.
//!
//! The pass is meant to be run periodically by an outside scheduler (cron, a
//! systemd timer, a Kubernetes `CronJob`). [`FileKeyStore`] locks the document
//! for each write, so overlapping runs cannot lose each other's changes.

pub mod audit;
pub mod clock;
pub mod file_store;
pub mod generator;
pub mod lifecycle;
pub mod report;
pub mod store;

use std::sync::Arc;

use crate::Result;
use crate::config::Config;

pub use audit::AuditEvent;
pub use clock::{Clock, FixedClock, SystemClock};
pub use file_store::FileKeyStore;
pub use generator::{KeyGenerator, RsaKeyGenerator};
pub use lifecycle::KeyLifecycleManager;
pub use report::{KeyStatus, KeyStatusEntry, KeyStatusReport, PassReport};
pub use store::{InMemoryKeyStore, KeyId, KeyMaterial, KeyStore, ManagedKeyRecord, SigningKey};

impl KeyLifecycleManager {
    /// Build the production manager: file store, RSA generator, system clock.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = FileKeyStore::open(config.store.resolved_path())?;

        Ok(Self::new(
            Arc::new(store),
            Arc::new(RsaKeyGenerator::new()),
            Arc::new(SystemClock),
            config.rotation.clone(),
        ))
    }
}
