//! Signature envelope around a [`Message`]

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PokerError, PokerResult};
use crate::protocol::{Message, ParticipantId, Payload};
use crate::security::{IdentityCard, PublicKey, SigningKey};

/// A message plus its optional signature and certificate.
///
/// On the wire an unsigned envelope is the bare message object, a signed one
/// is `{"message": .., "signature": hex, "certificate"?: hex}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message: Message,
    pub signature: Option<Vec<u8>>,
    pub certificate: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct SignedWire {
    message: Message,
    #[serde(with = "hex::serde")]
    signature: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_hex")]
    certificate: Option<Vec<u8>>,
}

mod optional_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| hex::decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

impl Envelope {
    /// Registration-time envelope without signature
    pub fn unsigned(message: Message) -> Self {
        Self {
            message,
            signature: None,
            certificate: None,
        }
    }

    /// Sign `message` with `key`
    pub fn signed(message: Message, key: &SigningKey) -> PokerResult<Self> {
        let signature = key.sign(&message)?;
        Ok(Self {
            message,
            signature: Some(signature),
            certificate: None,
        })
    }

    /// Seal `message` with an identity card, attaching its certificate
    pub fn certified(message: Message, card: &dyn IdentityCard) -> PokerResult<Self> {
        let (signature, certificate) = card.sign(&message.canonical_bytes()?)?;
        Ok(Self {
            message,
            signature: Some(signature),
            certificate: Some(certificate),
        })
    }

    pub fn sender(&self) -> Option<ParticipantId> {
        self.message.sender
    }

    pub fn payload(&self) -> &Payload {
        &self.message.payload
    }

    pub fn command(&self) -> &'static str {
        self.message.command()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Whether the envelope carries a valid signature by `key`
    pub fn verify_with(&self, key: &PublicKey) -> bool {
        match &self.signature {
            Some(signature) => key.verify(&self.message, signature),
            None => false,
        }
    }

    /// Serialise to the frame body
    pub fn to_json_bytes(&self) -> PokerResult<Vec<u8>> {
        let bytes = match &self.signature {
            None => serde_json::to_vec(&self.message)?,
            Some(signature) => serde_json::to_vec(&SignedWire {
                message: self.message.clone(),
                signature: signature.clone(),
                certificate: self.certificate.clone(),
            })?,
        };
        Ok(bytes)
    }

    /// Parse a frame body in either wire shape
    pub fn from_json_bytes(body: &[u8]) -> PokerResult<Self> {
        let value: Value = serde_json::from_slice(body)?;
        let is_signed = value
            .as_object()
            .map(|object| object.contains_key("message"))
            .ok_or_else(|| PokerError::Serialization {
                message: "frame body is not a JSON object".to_string(),
            })?;

        if is_signed {
            let wire: SignedWire = serde_json::from_value(value)?;
            Ok(Self {
                message: wire.message,
                signature: Some(wire.signature),
                certificate: wire.certificate,
            })
        } else {
            Ok(Self::unsigned(serde_json::from_value(value)?))
        }
    }
}
