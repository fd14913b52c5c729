//! Strong-identity registration: certificate-bearing signatures
//!
//! A hardware token is modelled by two seams. [`IdentityCard`] produces a
//! signature plus a certificate for a payload, and [`CertificateValidator`]
//! checks both and extracts the holder's identity for allow-list decisions.
//! The software authority below implements both with schnorr keys so the
//! registration path can run without any token library.

use serde::{Deserialize, Serialize};

use crate::error::{PokerError, PokerResult};
use crate::security::{PublicKey, SigningKey};

/// Identity asserted by a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertifiedIdentity {
    pub name: String,
    pub number: u64,
}

/// Something that can seal a payload with an identity proof
pub trait IdentityCard: Send + Sync {
    /// Returns `(signature, certificate)` over `payload`
    fn sign(&self, payload: &[u8]) -> PokerResult<(Vec<u8>, Vec<u8>)>;
}

/// Receiving side of the strong-identity path
pub trait CertificateValidator: Send + Sync {
    /// Whether `signature` over `payload` was produced by the holder of a valid `certificate`
    fn validate(&self, signature: &[u8], payload: &[u8], certificate: &[u8]) -> bool;

    /// Identity named by the certificate
    fn extract_identity(&self, certificate: &[u8]) -> PokerResult<CertifiedIdentity>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateBody {
    name: String,
    number: u64,
    holder_key: PublicKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Certificate {
    body: CertificateBody,
    #[serde(with = "hex::serde")]
    authority_signature: Vec<u8>,
}

impl Certificate {
    fn parse(bytes: &[u8]) -> PokerResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| PokerError::violation(format!("malformed certificate: {}", e)))
    }
}

/// Software certificate authority issuing identity cards
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    key: SigningKey,
}

impl CertificateAuthority {
    pub fn new() -> Self {
        Self {
            key: SigningKey::generate(),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Issue a card for `holder` certifying `name` and serial `number`
    pub fn issue(&self, name: &str, number: u64, holder: SigningKey) -> PokerResult<SoftwareCard> {
        let body = CertificateBody {
            name: name.to_string(),
            number,
            holder_key: holder.public_key(),
        };
        let authority_signature = self.key.sign_bytes(&serde_json::to_vec(&body)?);
        let certificate = serde_json::to_vec(&Certificate {
            body,
            authority_signature,
        })?;
        Ok(SoftwareCard { holder, certificate })
    }

    pub fn validator(&self) -> AuthorityValidator {
        AuthorityValidator::new(self.public_key())
    }
}

impl Default for CertificateAuthority {
    fn default() -> Self {
        Self::new()
    }
}

/// A card whose private key lives in memory
#[derive(Debug, Clone)]
pub struct SoftwareCard {
    holder: SigningKey,
    certificate: Vec<u8>,
}

impl SoftwareCard {
    /// Key the holder also uses for ordinary protocol traffic
    pub fn signing_key(&self) -> &SigningKey {
        &self.holder
    }
}

impl IdentityCard for SoftwareCard {
    fn sign(&self, payload: &[u8]) -> PokerResult<(Vec<u8>, Vec<u8>)> {
        Ok((self.holder.sign_bytes(payload), self.certificate.clone()))
    }
}

/// Validates certificates issued by one known authority
#[derive(Debug, Clone)]
pub struct AuthorityValidator {
    authority: PublicKey,
}

impl AuthorityValidator {
    pub fn new(authority: PublicKey) -> Self {
        Self { authority }
    }
}

impl CertificateValidator for AuthorityValidator {
    fn validate(&self, signature: &[u8], payload: &[u8], certificate: &[u8]) -> bool {
        let Ok(certificate) = Certificate::parse(certificate) else {
            return false;
        };
        let Ok(body) = serde_json::to_vec(&certificate.body) else {
            return false;
        };
        self.authority.verify_bytes(&body, &certificate.authority_signature)
            && certificate.body.holder_key.verify_bytes(payload, signature)
    }

    fn extract_identity(&self, certificate: &[u8]) -> PokerResult<CertifiedIdentity> {
        let certificate = Certificate::parse(certificate)?;
        Ok(CertifiedIdentity {
            name: certificate.body.name,
            number: certificate.body.number,
        })
    }
}
