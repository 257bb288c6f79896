//! Field-level encryption for delivery data at rest.
//!
//! AES-256-GCM with a key derived from the configured service secret
//! (SHA-256 of the secret string). Output format: `base64(nonce || ciphertext)`.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Symmetric cipher for individual record fields.
#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; 32],
}

impl FieldCipher {
    /// Derive the cipher key from the configured secret string.
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        Self { key: digest.into() }
    }

    /// Encrypt a field value for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        use rand::RngCore;
        use rand::rngs::OsRng;
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(&out))
    }

    /// Decrypt a stored field value.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| CipherError::Decrypt(format!("base64 decode failed: {e}")))?;

        if bytes.len() < NONCE_SIZE + 1 {
            return Err(CipherError::Decrypt("ciphertext too short".to_string()));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CipherError::Decrypt(e.to_string()))?;

        let nonce = Nonce::from_slice(&bytes[..NONCE_SIZE]);
        let plaintext = cipher
            .decrypt(nonce, &bytes[NONCE_SIZE..])
            .map_err(|e| CipherError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CipherError::Decrypt(e.to_string()))
    }
}

impl core::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("FieldCipher(..)")
    }
}
