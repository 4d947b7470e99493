//! Cryptographic utilities for records at rest
//!
//! Record keys are derived from configured secret material with
//! HKDF-SHA256, or generated per process. Sealing goes through the `Cipher`
//! seam; `AesGcmCipher` is the default.

mod cipher;

pub use cipher::{AesGcmCipher, Cipher, RecordKey};

use crate::error::{Error, Result};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

/// AES-256-GCM encryption key size
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM
pub const NONCE_SIZE: usize = 12;

/// HKDF info string binding derived keys to the record envelope format
const KEY_INFO: &[u8] = b"edgemem record envelope v1";

/// Generate a random record key
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Derive a 256-bit record key from arbitrary secret material (HKDF-SHA256)
pub fn derive_key(secret: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let hk = Hkdf::<Sha256>::new(None, secret);
    let mut key = [0u8; KEY_SIZE];
    hk.expand(KEY_INFO, &mut key)
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}
