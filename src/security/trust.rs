//! Which key must have signed a message, and what a bad signature means

use std::collections::BTreeMap;

use crate::error::{PokerError, PokerResult};
use crate::protocol::{Envelope, ParticipantId};
use crate::security::PublicKey;

/// Known signing keys, indexed by the sender id they vouch for
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    area: Option<PublicKey>,
    participants: BTreeMap<ParticipantId, PublicKey>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the Playing Area key. Later attempts to change it are refused.
    pub fn pin_area(&mut self, key: PublicKey) -> PokerResult<()> {
        match self.area {
            Some(existing) if existing != key => Err(PokerError::SignatureForgedByServer {
                sender: "playing area".to_string(),
            }),
            _ => {
                self.area = Some(key);
                Ok(())
            }
        }
    }

    pub fn area_key(&self) -> Option<PublicKey> {
        self.area
    }

    pub fn insert(&mut self, id: ParticipantId, key: PublicKey) {
        self.participants.insert(id, key);
    }

    pub fn remove(&mut self, id: ParticipantId) {
        self.participants.remove(&id);
    }

    pub fn key_of(&self, id: ParticipantId) -> Option<PublicKey> {
        self.participants.get(&id).copied()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participants.contains_key(&id)
    }

    /// Verify `envelope` against the key of its claimed sender.
    ///
    /// A bad signature from the Playing Area, or from the Caller when
    /// `caller_is_arbiter` is set, means the trust root is broken. A bad
    /// signature from anyone else only implicates that peer.
    pub fn verify(&self, envelope: &Envelope, caller_is_arbiter: bool) -> PokerResult<()> {
        match envelope.sender() {
            None => {
                let key = self.area.ok_or_else(|| PokerError::violation("playing area key is not known yet"))?;
                if envelope.verify_with(&key) {
                    Ok(())
                } else {
                    Err(PokerError::SignatureForgedByServer {
                        sender: "playing area".to_string(),
                    })
                }
            }
            Some(id) => {
                let key = self
                    .key_of(id)
                    .ok_or_else(|| PokerError::violation(format!("no key known for participant {}", id)))?;
                if envelope.verify_with(&key) {
                    Ok(())
                } else if id.is_caller() && caller_is_arbiter {
                    Err(PokerError::SignatureForgedByServer {
                        sender: "caller".to_string(),
                    })
                } else {
                    Err(PokerError::SignatureForgedByPeer { id })
                }
            }
        }
    }
}
