//! Key generation — fresh RSA signing keys for the provider.

use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use tracing::debug;

use super::store::KeyMaterial;
use crate::{Error, Result};

/// Smallest RSA modulus the generator will produce.
pub const MIN_KEY_LENGTH: u32 = 1024;
/// Largest RSA modulus the generator will produce.
pub const MAX_KEY_LENGTH: u32 = 16384;

/// Produces new signing key material.
#[async_trait::async_trait]
pub trait KeyGenerator: Send + Sync + 'static {
    /// Generate a private key of `bits` length.
    ///
    /// Fails with [`Error::Generation`] for unsupported lengths or backend
    /// failures.
    async fn generate(&self, bits: u32) -> Result<KeyMaterial>;
}

/// RSA key generator exporting PKCS#1 PEM (`BEGIN RSA PRIVATE KEY`).
///
/// Prime search runs on the blocking pool; a 4096-bit key can take seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaKeyGenerator;

impl RsaKeyGenerator {
    /// Create a generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Reject lengths outside `MIN_KEY_LENGTH..=MAX_KEY_LENGTH` or not a whole
    /// number of bytes.
    pub fn check_length(bits: u32) -> Result<()> {
        if !(MIN_KEY_LENGTH..=MAX_KEY_LENGTH).contains(&bits) {
            return Err(Error::generation(
                bits,
                format!("key length must be between {MIN_KEY_LENGTH} and {MAX_KEY_LENGTH} bits"),
            ));
        }
        if bits % 8 != 0 {
            return Err(Error::generation(bits, "key length must be a multiple of 8"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyGenerator for RsaKeyGenerator {
    async fn generate(&self, bits: u32) -> Result<KeyMaterial> {
        Self::check_length(bits)?;
        debug!(bits, "Generating RSA key");

        let pem = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut rng = rsa::rand_core::OsRng;
            let key = RsaPrivateKey::new(&mut rng, bits as usize)
                .map_err(|e| Error::generation(bits, e.to_string()))?;
            let pem = key
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(|e| Error::generation(bits, format!("PEM export failed: {e}")))?;
            Ok(pem.to_string())
        })
        .await
        .map_err(|e| Error::generation(bits, format!("generator task failed: {e}")))??;

        Ok(KeyMaterial::new(pem))
    }
}
