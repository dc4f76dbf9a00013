//! Encrypted-at-rest wrapper.
//!
//! User-owned blobs are sealed with a key expanded from the 16-byte
//! storage seed, with the blob path as AAD so a blob cannot be replayed
//! at a different path. Host-signed deltas are sealed for the client's
//! public key by the checkpoint layer instead; this wrapper is for the
//! user's own data.

use crate::adapter::StorageAdapter;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{AeadCore, KeyInit, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

const KDF_INFO: &[u8] = b"infermesh/storage-at-rest/v1";
const NONCE_LEN: usize = 24;

/// Wraps any [`StorageAdapter`], sealing on `put` and opening on `get`.
/// Stored layout: `nonce ‖ ciphertext`.
pub struct EncryptedStore<S> {
    inner: S,
    key: [u8; 32],
}

impl<S> Drop for EncryptedStore<S> {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl<S: StorageAdapter> EncryptedStore<S> {
    /// Expand the 16-byte derived seed entropy into the at-rest key.
    pub fn new(inner: S, seed_entropy: &[u8; 16]) -> Self {
        let hk = Hkdf::<Sha256>::new(None, seed_entropy);
        let mut key = [0u8; 32];
        hk.expand(KDF_INFO, &mut key).expect("32 bytes is a valid hkdf output length");
        Self { inner, key }
    }

    fn seal(&self, path: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let nonce = XChaCha20Poly1305::generate_nonce(&mut rand::rngs::OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad: path.as_bytes() })
            .map_err(|_| StorageError::Encryption(format!("seal {path}")))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, path: &str, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_LEN {
            return Err(StorageError::Encryption(format!("blob at {path} too short")));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        cipher
            .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad: path.as_bytes() })
            .map_err(|_| StorageError::Encryption(format!("open {path}")))
    }
}

#[async_trait]
impl<S: StorageAdapter> StorageAdapter for EncryptedStore<S> {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let sealed = self.seal(path, &bytes)?;
        self.inner.put(path, sealed).await
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let blob = self.inner.get(path).await?;
        self.open(path, &blob)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }
}
