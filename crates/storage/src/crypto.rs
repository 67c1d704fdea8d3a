// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! At-rest payload encryption.
//!
//! The legacy format is AES-256-ECB with Pkcs7 padding, hex encoded; the key
//! is the UTF-8 bytes of the configured secret, NUL-padded or truncated to
//! exactly 32 bytes. ECB is deterministic and reveals payload structure;
//! the format is kept so existing payload files stay readable. The
//! authenticated format is AES-256-GCM with a random nonce prefixed to the
//! hex ciphertext, and falls back to the legacy format on reads so queues
//! can opt in without migrating old files.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use aes::Aes256;
use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use bbq_core::SecretMode;
use thiserror::Error;

/// AES-256-GCM nonce length in bytes.
const GCM_NONCE_LEN: usize = 12;

/// Errors produced while sealing or opening payloads.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ciphertext is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("plaintext is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("decryption failed")]
    Decrypt,
    #[error("encryption failed")]
    Encrypt,
}

/// The configured at-rest format of one queue's payload files.
#[derive(Clone)]
pub enum PayloadCipher {
    /// No secret key configured; payloads are stored as UTF-8 plaintext.
    Plain,
    /// AES-256-ECB, hex encoded.
    Legacy([u8; 32]),
    /// AES-256-GCM, hex(nonce || ciphertext), with legacy read fallback.
    Authenticated([u8; 32]),
}

impl PayloadCipher {
    /// Build the cipher for a queue's options.
    pub fn from_options(secret_key: &str, mode: SecretMode) -> Self {
        if secret_key.is_empty() {
            return Self::Plain;
        }
        let key = derive_key(secret_key);
        match mode {
            SecretMode::Legacy => Self::Legacy(key),
            SecretMode::Authenticated => Self::Authenticated(key),
        }
    }

    /// True when payloads are encrypted at rest.
    pub fn is_secret(&self) -> bool {
        !matches!(self, Self::Plain)
    }

    /// Seal a canonical payload for storage.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        match self {
            Self::Plain => Ok(plaintext.to_string()),
            Self::Legacy(key) => Ok(hex::encode(ecb_encrypt(key, plaintext))),
            Self::Authenticated(key) => {
                let cipher = Aes256Gcm::new(key.into());
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let sealed = cipher
                    .encrypt(&nonce, plaintext.as_bytes())
                    .map_err(|_| CryptoError::Encrypt)?;
                let mut body = nonce.to_vec();
                body.extend_from_slice(&sealed);
                Ok(hex::encode(body))
            }
        }
    }

    /// Open a stored payload back into its canonical form.
    pub fn open(&self, stored: &str) -> Result<String, CryptoError> {
        match self {
            Self::Plain => Ok(stored.to_string()),
            Self::Legacy(key) => ecb_decrypt(key, stored),
            Self::Authenticated(key) => {
                match gcm_decrypt(key, stored) {
                    Ok(plain) => Ok(plain),
                    // Payload written before the authenticated mode was
                    // enabled for this queue.
                    Err(_) => ecb_decrypt(key, stored),
                }
            }
        }
    }
}

/// NUL-pad or truncate the secret's UTF-8 bytes to exactly 32.
pub fn derive_key(secret: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    let bytes = secret.as_bytes();
    let len = bytes.len().min(32);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

fn ecb_encrypt(key: &[u8; 32], plaintext: &str) -> Vec<u8> {
    ecb::Encryptor::<Aes256>::new(key.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes())
}

fn ecb_decrypt(key: &[u8; 32], stored: &str) -> Result<String, CryptoError> {
    let body = hex::decode(stored)?;
    let plain = ecb::Decryptor::<Aes256>::new(key.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&body)
        .map_err(|_| CryptoError::Decrypt)?;
    Ok(String::from_utf8(plain)?)
}

fn gcm_decrypt(key: &[u8; 32], stored: &str) -> Result<String, CryptoError> {
    let body = hex::decode(stored)?;
    if body.len() < GCM_NONCE_LEN {
        return Err(CryptoError::Decrypt);
    }
    let (nonce, sealed) = body.split_at(GCM_NONCE_LEN);
    let plain = Aes256Gcm::new(key.into())
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Decrypt)?;
    Ok(String::from_utf8(plain)?)
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
