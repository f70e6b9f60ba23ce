//! OIDC Key Manager Library
//!
//! Lifecycle management for the RSA keys an OpenID Connect provider signs ID
//! tokens with.
//!
//! # Features
//!
//! - **Rotation**: active keys are retired after a maximum age
//! - **Hold period**: retired keys stay published so issued tokens still verify
//! - **Availability**: every pass leaves at least one active signing key
//! - **Audit trail**: each transition is logged as a structured event
//!
//! The provider's key table is reached through the [`key_manager::KeyStore`]
//! trait; [`key_manager::FileKeyStore`] persists it as JSON.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod key_manager;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// Logs go to stderr; stdout is reserved for reports.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        Some("text") | None => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        Some(other) => {
            return Err(Error::Config(format!(
                "Unknown log format '{other}' (expected text or json)"
            )));
        }
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
