//! Caller and Player roles
//!
//! Both roles are synchronous state machines behind the [`Participant`]
//! trait: they take one verified envelope at a time and return the envelopes
//! to send back to the Playing Area. [`session`] drives any of them over TCP.

pub mod caller;
pub mod console;
pub mod player;
pub mod session;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{PokerError, PokerResult};
use crate::observability::{AuditLog, Direction};
use crate::protocol::{Envelope, Message, ParticipantId, Payload, PlayerInfo, Role};
use crate::security::{IdentityCard, PublicKey, SigningKey, TrustStore};

pub use caller::Caller;
pub use console::{spawn_stdin_console, ConsoleCommand};
pub use player::{Behavior, Player};
pub use session::run_session;

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Finished { winners: Vec<ParticipantId> },
    Disqualified,
    Aborted { reason: String },
}

/// A role that can be driven by a session
pub trait Participant: Send {
    fn role(&self) -> Role;

    fn nick(&self) -> &str;

    /// The first envelope sent on a fresh connection
    fn registration(&mut self) -> PokerResult<Envelope>;

    /// Process one envelope from the Playing Area and return the replies.
    ///
    /// An error means this participant cannot go on.
    fn handle(&mut self, envelope: Envelope) -> PokerResult<Vec<Envelope>>;

    /// Signed `GetPlayersList`, once registered
    fn players_list_request(&mut self) -> PokerResult<Envelope>;

    /// Latest `PlayersList` answer, if one arrived since the last call
    fn take_players_list(&mut self) -> Option<BTreeMap<ParticipantId, PlayerInfo>>;

    fn audit(&self) -> &AuditLog;

    /// Set once the participant has nothing left to do
    fn outcome(&self) -> Option<SessionOutcome>;
}

/// Identity, keys and audit trail shared by both roles
pub(crate) struct ClientCore {
    nick: String,
    key: SigningKey,
    card: Option<Arc<dyn IdentityCard>>,
    id: Option<ParticipantId>,
    trust: TrustStore,
    audit: AuditLog,
    players_list: Option<BTreeMap<ParticipantId, PlayerInfo>>,
}

impl ClientCore {
    pub(crate) fn new(nick: &str, key: SigningKey) -> Self {
        Self {
            nick: nick.to_string(),
            key,
            card: None,
            id: None,
            trust: TrustStore::new(),
            audit: AuditLog::new(),
            players_list: None,
        }
    }

    pub(crate) fn nick(&self) -> &str {
        &self.nick
    }

    pub(crate) fn id(&self) -> Option<ParticipantId> {
        self.id
    }

    pub(crate) fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    pub(crate) fn trust_mut(&mut self) -> &mut TrustStore {
        &mut self.trust
    }

    pub(crate) fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub(crate) fn set_card(&mut self, card: Arc<dyn IdentityCard>) {
        self.card = Some(card);
    }

    pub(crate) fn set_audit_log(&mut self, audit: AuditLog) {
        self.audit = audit;
    }

    /// `Register` for this identity, sealed with the identity card when one is configured
    pub(crate) fn registration(&mut self, role: Role, num_players: Option<u32>) -> PokerResult<Envelope> {
        let message = Message::from_area(Payload::Register {
            role,
            nick: self.nick.clone(),
            public_key: self.key.public_key(),
            num_players,
            assigned_id: None,
        });
        let envelope = match &self.card {
            Some(card) => Envelope::certified(message, card.as_ref())?,
            None => Envelope::unsigned(message),
        };
        self.audit.record(Direction::Sent, &envelope);
        Ok(envelope)
    }

    /// Accept `RegisterAck`: check it against the key it carries and pin that key
    pub(crate) fn accept_registration(&mut self, envelope: &Envelope) -> PokerResult<ParticipantId> {
        self.audit.record(Direction::Received, envelope);
        match envelope.payload() {
            Payload::RegisterAck { id, server_public_key } => {
                if envelope.sender().is_some() || !envelope.verify_with(server_public_key) {
                    return Err(PokerError::SignatureForgedByServer {
                        sender: "playing area".to_string(),
                    });
                }
                self.trust.pin_area(*server_public_key)?;
                self.trust.insert(*id, self.key.public_key());
                self.id = Some(*id);
                info!(nick = %self.nick, id = %id, area = %server_public_key, "Registered");
                Ok(*id)
            }
            Payload::RegisterNack { reason } => Err(PokerError::RegistrationRejected {
                reason: reason.clone().unwrap_or_else(|| "no reason given".to_string()),
            }),
            other => Err(PokerError::violation(format!("expected a registration reply, got {}", other.command()))),
        }
    }

    /// Verify an incoming envelope and record it
    pub(crate) fn receive(&mut self, envelope: &Envelope, caller_is_arbiter: bool) -> PokerResult<()> {
        self.audit.record(Direction::Received, envelope);
        self.trust.verify(envelope, caller_is_arbiter)
    }

    /// Sign `payload` under this participant's id and record it
    pub(crate) fn send(&mut self, payload: Payload) -> PokerResult<Envelope> {
        let id = self
            .id
            .ok_or_else(|| PokerError::violation("cannot send before registration completed"))?;
        let envelope = Envelope::signed(Message::from_participant(id, payload), &self.key)?;
        debug!(id = %id, command = envelope.command(), "Sending");
        self.audit.record(Direction::Sent, &envelope);
        Ok(envelope)
    }

    pub(crate) fn store_players_list(&mut self, players: BTreeMap<ParticipantId, PlayerInfo>) {
        self.players_list = Some(players);
    }

    pub(crate) fn take_players_list(&mut self) -> Option<BTreeMap<ParticipantId, PlayerInfo>> {
        self.players_list.take()
    }
}
