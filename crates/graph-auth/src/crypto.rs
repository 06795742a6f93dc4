//! AES-256-GCM encryption for stored token text
//!
//! Credential rows hold access and refresh tokens as base64 envelopes of
//! `nonce || ciphertext`, each encrypted with a fresh random nonce. The
//! 32-byte master key arrives base64-encoded from the environment and never
//! touches disk or logs.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{Error, Result};

/// Key size in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Symmetric authenticated cipher over UTF-8 token text.
///
/// Cloneable and cheap to share; the underlying AES key schedule is computed
/// once at construction.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64(key_base64: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key_base64)
            .map_err(|_| Error::InvalidKey("key is not valid base64".into()))?;
        Self::from_bytes(&key_bytes)
    }

    /// Build a cipher from raw key bytes. The key must be exactly 32 bytes.
    pub fn from_bytes(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(Error::InvalidKey(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| Error::InvalidKey("cipher construction failed".into()))?;
        Ok(Self { cipher })
    }

    /// Encrypt token text into a storable envelope: base64(nonce || ciphertext).
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::EncryptionFailed)?;

        let mut envelope = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt a stored envelope back to token text.
    ///
    /// Any failure — bad base64, truncated envelope, wrong key, tampered
    /// ciphertext — collapses to `DecryptionFailed` without detail.
    pub fn decrypt(&self, envelope: &str) -> Result<String> {
        let bytes = BASE64.decode(envelope).map_err(|_| Error::DecryptionFailed)?;
        if bytes.len() <= NONCE_SIZE {
            return Err(Error::DecryptionFailed);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
    }
}
