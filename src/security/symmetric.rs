//! Per-layer symmetric encryption of deck elements

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CryptoError, PokerError, PokerResult};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// Key of one onion layer. Each shuffle layer uses its own.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> PokerResult<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKey {
            message: format!("symmetric key must be {} bytes, got {}", KEY_LEN, bytes.len()),
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Encrypt arbitrary bytes; output is `nonce || ciphertext`.
    ///
    /// A fresh random nonce is drawn on every call, so encrypting the same
    /// input twice yields unlinkable outputs.
    pub fn encrypt(&self, plaintext: &[u8]) -> PokerResult<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| PokerError::from(CryptoError::EncryptionFailed))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Reverse [`SymmetricKey::encrypt`]. Fails on a wrong key or a damaged blob.
    pub fn decrypt(&self, blob: &[u8]) -> PokerResult<Vec<u8>> {
        if blob.len() < NONCE_LEN {
            return Err(CryptoError::DecryptionFailed.into());
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed.into())
    }

    /// Encrypt a plaintext card value (8 bytes, big endian)
    pub fn encrypt_number(&self, number: u64) -> PokerResult<Vec<u8>> {
        self.encrypt(&number.to_be_bytes())
    }

    /// Decrypt the innermost layer back to a card value
    pub fn decrypt_number(&self, blob: &[u8]) -> PokerResult<u64> {
        let plaintext = self.decrypt(blob)?;
        let bytes: [u8; 8] = plaintext.as_slice().try_into().map_err(|_| {
            PokerError::from(CryptoError::InvalidKey {
                message: format!("decrypted value has {} bytes, expected 8", plaintext.len()),
            })
        })?;
        Ok(u64::from_be_bytes(bytes))
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

impl Serialize for SymmetricKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for SymmetricKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(serde::de::Error::custom)?;
        SymmetricKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
