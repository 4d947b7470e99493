//! Pluggable record cipher
//!
//! The edge store never calls AES directly; it seals and opens envelope
//! payloads through a `Cipher`, so the authenticated-encryption scheme can be
//! replaced without touching the `encrypted` envelope contract.

use super::{derive_key, generate_key, KEY_SIZE, NONCE_SIZE};
use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric authenticated encryption for record payloads.
pub trait Cipher: Send + Sync {
    /// Encrypt and authenticate `plaintext`.
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Verify and decrypt `sealed`. Fails with `Error::Crypto` on a wrong or
    /// rotated key or on tampered bytes.
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// 256-bit record key.
///
/// Zeroized on drop to prevent key material from lingering in memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RecordKey([u8; KEY_SIZE]);

impl RecordKey {
    /// Derive from configured secret material
    pub fn derive(secret: &str) -> Result<Self> {
        Ok(Self(derive_key(secret.as_bytes())?))
    }

    /// Fresh random key
    pub fn random() -> Self {
        Self(generate_key())
    }

    /// Access the raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// AES-256-GCM with a random 96-bit nonce prefixed to every ciphertext.
///
/// Sealed layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct AesGcmCipher {
    key: RecordKey,
}

impl AesGcmCipher {
    /// Create a cipher from a record key
    pub fn new(key: RecordKey) -> Self {
        Self { key }
    }

    fn aead(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(self.key.as_bytes())
            .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))
    }
}

impl Cipher for AesGcmCipher {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let aead = self.aead()?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = aead
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_SIZE {
            return Err(Error::Crypto(format!(
                "sealed payload is {} bytes, shorter than the nonce",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        self.aead()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
    }

    fn name(&self) -> &str {
        "aes-256-gcm"
    }
}
