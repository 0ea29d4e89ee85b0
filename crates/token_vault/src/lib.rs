//! Symmetric encryption at rest for OAuth tokens (§4.A of the design).
//!
//! Opaques are `[nonce: 12 bytes][ciphertext || AEAD tag]`, AES-256-GCM,
//! stored as-is in a `BLOB` column — no base64 layer, since the schema
//! already types these columns as bytes rather than text.

use std::{fs, path::Path, sync::Arc};

use aws_lc_rs::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN},
    rand::{SecureRandom, SystemRandom},
};
use thiserror::Error;

const KEY_LEN: usize = 32;
const KEY_FILE_NAME: &str = "token_vault.key";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unable to read data protection key at {path}: {source}")]
    KeyRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to persist data protection key at {path}: {source}")]
    KeyWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("data protection key must be exactly {KEY_LEN} bytes, got {0}")]
    KeySize(usize),
    #[error("random number generation failed")]
    Rng,
    #[error("opaque value is corrupt or truncated")]
    Truncated,
    #[error("opaque value could not be authenticated under the configured key")]
    Unsealable,
}

/// A single initialized-once holder of the master key, as required by the
/// design note against reading key material from any other path.
pub struct TokenVault {
    key_material: [u8; KEY_LEN],
    rng: SystemRandom,
}

impl TokenVault {
    /// `DataProtection.KeyDirectory` absent: ephemeral, process-lifetime key.
    /// Dev only — every opaque produced under this key is unreadable after restart.
    pub fn ephemeral() -> Arc<Self> {
        let rng = SystemRandom::new();
        let mut key_material = [0u8; KEY_LEN];
        rng.fill(&mut key_material).expect("system rng must succeed");
        Arc::new(Self { key_material, rng })
    }

    /// Loads the master key from `{key_directory}/token_vault.key`, generating
    /// and persisting one on first run. Rotating (replacing) this file
    /// invalidates every opaque sealed under the previous key — documented,
    /// acceptable behavior per §4.A.
    pub fn load_from_directory(key_directory: &Path) -> Result<Arc<Self>, CryptoError> {
        let key_path = key_directory.join(KEY_FILE_NAME);
        let rng = SystemRandom::new();

        let key_material = match fs::read(&key_path) {
            Ok(bytes) => {
                let len = bytes.len();
                <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| CryptoError::KeySize(len))?
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %key_path.display(), "generating new data protection key");
                let mut fresh = [0u8; KEY_LEN];
                rng.fill(&mut fresh).map_err(|_| CryptoError::Rng)?;
                fs::write(&key_path, fresh).map_err(|source| CryptoError::KeyWrite {
                    path: key_path.clone(),
                    source,
                })?;
                fresh
            }
            Err(source) => {
                return Err(CryptoError::KeyRead {
                    path: key_path,
                    source,
                });
            }
        };

        Ok(Arc::new(Self { key_material, rng }))
    }

    fn key(&self) -> LessSafeKey {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key_material)
            .expect("32-byte key is always valid for AES-256-GCM");
        LessSafeKey::new(unbound)
    }

    /// Empty input maps to empty output — avoids ambiguity with "absent".
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Rng)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key()
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Unsealable)?;

        let mut opaque = Vec::with_capacity(NONCE_LEN + in_out.len());
        opaque.extend_from_slice(&nonce_bytes);
        opaque.extend_from_slice(&in_out);
        Ok(opaque)
    }

    pub fn decrypt(&self, opaque: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if opaque.is_empty() {
            return Ok(Vec::new());
        }
        if opaque.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }

        let (nonce_bytes, ciphertext) = opaque.split_at(NONCE_LEN);
        let nonce = Nonce::assume_unique_for_key(
            nonce_bytes
                .try_into()
                .expect("split_at(NONCE_LEN) guarantees the right length"),
        );

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key()
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Unsealable)?;

        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_plaintext_round_trips_to_empty_opaque() {
        let vault = TokenVault::ephemeral();
        let opaque = vault.encrypt(b"").unwrap();
        assert!(opaque.is_empty());
        assert!(vault.decrypt(&opaque).unwrap().is_empty());
    }

    #[test]
    fn round_trips_arbitrary_plaintext() {
        let vault = TokenVault::ephemeral();
        let opaque = vault.encrypt(b"ya29.some-access-token").unwrap();
        assert_eq!(vault.decrypt(&opaque).unwrap(), b"ya29.some-access-token");
    }

    #[test]
    fn two_encryptions_of_same_plaintext_differ() {
        let vault = TokenVault::ephemeral();
        let a = vault.encrypt(b"same plaintext").unwrap();
        let b = vault.encrypt(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let vault_a = TokenVault::ephemeral();
        let vault_b = TokenVault::ephemeral();

        let opaque = vault_a.encrypt(b"secret").unwrap();
        assert!(matches!(
            vault_b.decrypt(&opaque),
            Err(CryptoError::Unsealable)
        ));
    }

    #[test]
    fn truncated_opaque_is_rejected() {
        let vault = TokenVault::ephemeral();
        let opaque = vault.encrypt(b"secret").unwrap();
        assert!(matches!(
            vault.decrypt(&opaque[..4]),
            Err(CryptoError::Truncated)
        ));
    }

    #[test]
    fn persists_and_reloads_key_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::load_from_directory(dir.path()).unwrap();
        let opaque = vault.encrypt(b"persisted").unwrap();

        let reloaded = TokenVault::load_from_directory(dir.path()).unwrap();
        assert_eq!(reloaded.decrypt(&opaque).unwrap(), b"persisted");
    }

    #[test]
    fn rotating_key_invalidates_prior_opaques() {
        let dir = tempfile::tempdir().unwrap();
        let vault = TokenVault::load_from_directory(dir.path()).unwrap();
        let opaque = vault.encrypt(b"pre-rotation").unwrap();

        fs::remove_file(dir.path().join(KEY_FILE_NAME)).unwrap();
        let rotated = TokenVault::load_from_directory(dir.path()).unwrap();

        assert!(matches!(
            rotated.decrypt(&opaque),
            Err(CryptoError::Unsealable)
        ));
    }
}
