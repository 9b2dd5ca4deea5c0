//! Authenticated packet encryption.
//!
//! A session with a shared secret seals every outbound body with
//! AES-256-GCM; the key is SHA-256 over the secret string. Sessions
//! without a secret skip this layer entirely and exchange plaintext
//! envelopes.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::chat::error::ChatError;

/// Nonce size for AES-GCM.
const NONCE_SIZE: usize = 12;

/// The authenticated-encryption contract used by the transport layer.
pub trait PacketCipher: Send + Sync {
    /// Encrypt a plaintext, returning a fresh nonce alongside the ciphertext.
    fn encrypt(&self, plain: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ChatError>;

    /// Verify and recover the plaintext for a sealed message.
    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, ChatError>;
}

/// AES-256-GCM keyed by SHA-256 of a shared secret string.
pub struct AesGcmCipher {
    gcm: Aes256Gcm,
}

impl AesGcmCipher {
    /// Construct a cipher from a non-empty shared secret.
    pub fn new(secret: &str) -> Result<Self, ChatError> {
        if secret.is_empty() {
            return Err(ChatError::InvalidSecret("secret cannot be empty".into()));
        }
        let key = Sha256::digest(secret.as_bytes());
        let gcm = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ChatError::InvalidSecret(e.to_string()))?;
        Ok(Self { gcm })
    }
}

impl PacketCipher for AesGcmCipher {
    fn encrypt(&self, plain: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ChatError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .gcm
            .encrypt(nonce, plain)
            .map_err(|e| ChatError::EncryptionFailed(e.to_string()))?;
        Ok((nonce_bytes.to_vec(), ciphertext))
    }

    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, ChatError> {
        if nonce.len() != NONCE_SIZE {
            return Err(ChatError::DecryptionFailed("invalid nonce length".into()));
        }
        self.gcm
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| ChatError::DecryptionFailed(e.to_string()))
    }
}
