//! Signing identities: schnorr keys over secp256k1 and signatures over canonical messages

use std::fmt;
use std::sync::OnceLock;

use nostr::secp256k1::{schnorr, All, Keypair, Message as Digest, Secp256k1, SecretKey, XOnlyPublicKey};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{utils, CryptoError, PokerResult};
use crate::protocol::Message;

fn context() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}

/// Transportable public half of a signing identity
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(XOnlyPublicKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> PokerResult<Self> {
        XOnlyPublicKey::from_slice(bytes).map(PublicKey).map_err(|e| {
            CryptoError::InvalidKey {
                message: e.to_string(),
            }
            .into()
        })
    }

    pub fn from_hex(encoded: &str) -> PokerResult<Self> {
        let bytes = hex::decode(encoded)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.serialize()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Check `signature` over raw bytes. Never fails loudly.
    pub fn verify_bytes(&self, data: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = schnorr::Signature::from_slice(signature) else {
            return false;
        };
        let digest = Digest::from_digest(utils::sha256(data));
        context().verify_schnorr(&signature, &digest, &self.0).is_ok()
    }

    /// Check `signature` over the canonical serialisation of `message`
    pub fn verify(&self, message: &Message, signature: &[u8]) -> bool {
        match message.canonical_bytes() {
            Ok(bytes) => self.verify_bytes(&bytes, signature),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Private signing key of a participant or of the Playing Area
#[derive(Clone)]
pub struct SigningKey {
    keypair: Keypair,
}

impl SigningKey {
    /// Generate a fresh key pair from the operating system RNG
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return Self {
                    keypair: Keypair::from_secret_key(context(), &secret),
                };
            }
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> PokerResult<Self> {
        let secret = SecretKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKey {
            message: e.to_string(),
        })?;
        Ok(Self {
            keypair: Keypair::from_secret_key(context(), &secret),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.keypair.x_only_public_key().0)
    }

    /// Deterministic signature over raw bytes
    pub fn sign_bytes(&self, data: &[u8]) -> Vec<u8> {
        let digest = Digest::from_digest(utils::sha256(data));
        context()
            .sign_schnorr_no_aux_rand(&digest, &self.keypair)
            .serialize()
            .to_vec()
    }

    /// Deterministic signature over the canonical serialisation of `message`
    pub fn sign(&self, message: &Message) -> PokerResult<Vec<u8>> {
        Ok(self.sign_bytes(&message.canonical_bytes()?))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}
