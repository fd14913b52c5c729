//! The Player: shuffles its layer, commits a card and audits everyone else

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::client::{ClientCore, Participant, SessionOutcome};
use crate::error::{PokerError, PokerResult};
use crate::game::card::{draw_short_card, invalid_cards};
use crate::game::deck::{encrypt_layer, reencrypt_and_shuffle};
use crate::game::{draw_card, find_winners, peel, DecryptionReport};
use crate::observability::AuditLog;
use crate::protocol::{Blob, Envelope, ParticipantId, Payload, PlayerInfo, Role};
use crate::security::{IdentityCard, SigningKey, SymmetricKey};

/// How a Player behaves when it gets a chance to cheat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Honest,
    /// Commit a card with too few values
    ShortCard,
    /// Duplicate one element inside its own deck layer
    TamperDeck,
    /// Claim to be the winner
    FalseWinner,
    /// Cheat at every opportunity with the given probability
    Random { percent: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trick {
    ShortCard,
    TamperDeck,
    FalseWinner,
}

impl Behavior {
    fn attempts<R: Rng + ?Sized>(&self, trick: Trick, rng: &mut R) -> bool {
        match self {
            Behavior::Honest => false,
            Behavior::ShortCard => trick == Trick::ShortCard,
            Behavior::TamperDeck => trick == Trick::TamperDeck,
            Behavior::FalseWinner => trick == Trick::FalseWinner,
            Behavior::Random { percent } => rng.gen_range(0..100u32) < u32::from(*percent),
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behavior::Honest => f.write_str("honest"),
            Behavior::ShortCard => f.write_str("short-card"),
            Behavior::TamperDeck => f.write_str("tamper-deck"),
            Behavior::FalseWinner => f.write_str("false-winner"),
            Behavior::Random { percent } => write!(f, "random:{}", percent),
        }
    }
}

impl FromStr for Behavior {
    type Err = PokerError;

    /// `honest`, `short-card`, `tamper-deck`, `false-winner` or `random:<percent>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PokerError::Configuration {
            message: format!("unknown behavior '{}'", s),
            field: "behavior".to_string(),
        };
        match s.trim().to_ascii_lowercase().as_str() {
            "honest" => Ok(Behavior::Honest),
            "short-card" => Ok(Behavior::ShortCard),
            "tamper-deck" => Ok(Behavior::TamperDeck),
            "false-winner" => Ok(Behavior::FalseWinner),
            other => {
                let percent = other.strip_prefix("random:").ok_or_else(invalid)?;
                let percent: u8 = percent.parse().map_err(|_| invalid())?;
                if percent > 100 {
                    return Err(invalid());
                }
                Ok(Behavior::Random { percent })
            }
        }
    }
}

/// Player role state machine
pub struct Player {
    core: ClientCore,
    behavior: Behavior,
    sym_key: SymmetricKey,
    fixed_card: Option<Vec<u64>>,
    deck_size: Option<usize>,
    card: Vec<u64>,
    cards: BTreeMap<ParticipantId, Vec<u64>>,
    disqualified: BTreeSet<ParticipantId>,
    report: Option<DecryptionReport>,
    claim: Vec<ParticipantId>,
    outcome: Option<SessionOutcome>,
}

impl Player {
    pub fn new(nick: &str, key: SigningKey) -> Self {
        Self {
            core: ClientCore::new(nick, key),
            behavior: Behavior::Honest,
            sym_key: SymmetricKey::generate(),
            fixed_card: None,
            deck_size: None,
            card: Vec::new(),
            cards: BTreeMap::new(),
            disqualified: BTreeSet::new(),
            report: None,
            claim: Vec::new(),
            outcome: None,
        }
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Commit this card instead of drawing one
    pub fn with_fixed_card(mut self, card: Vec<u64>) -> Self {
        self.fixed_card = Some(card);
        self
    }

    /// Register with a certificate-bearing signature
    pub fn with_identity_card(mut self, card: Arc<dyn IdentityCard>) -> Self {
        self.core.set_card(card);
        self
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.core.set_audit_log(audit);
        self
    }

    pub fn id(&self) -> Option<ParticipantId> {
        self.core.id()
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn card(&self) -> &[u64] {
        &self.card
    }

    /// This Player's own peel of the published layers
    pub fn report(&self) -> Option<&DecryptionReport> {
        self.report.as_ref()
    }

    /// Winners this Player claimed
    pub fn claim(&self) -> &[ParticipantId] {
        &self.claim
    }

    fn me(&self) -> PokerResult<ParticipantId> {
        self.core
            .id()
            .ok_or_else(|| PokerError::violation("player is not registered"))
    }

    fn deck_size(&self) -> PokerResult<usize> {
        self.deck_size
            .ok_or_else(|| PokerError::violation("deck size unknown before the shuffle"))
    }

    fn dispatch(&mut self, envelope: Envelope) -> PokerResult<Vec<Envelope>> {
        let sender = envelope.sender();
        let from_area = sender.is_none();
        let from_caller = sender == Some(ParticipantId::CALLER);
        let command = envelope.command();
        let me = self.me()?;

        match envelope.message.payload {
            Payload::BeginGame { public_keys } if from_area => {
                if public_keys.get(&me) != Some(&self.core.public_key()) {
                    return Err(PokerError::violation("Begin_Game lists a different key for this player"));
                }
                if !public_keys.contains_key(&ParticipantId::CALLER) {
                    return Err(PokerError::violation("Begin_Game does not name the caller"));
                }
                info!(id = %me, players = public_keys.len() - 1, "Game begins");
                for (id, key) in public_keys {
                    self.core.trust_mut().insert(id, key);
                }
                Ok(Vec::new())
            }
            Payload::DeckMessage { deck } if from_area => self.shuffle(me, deck),
            Payload::Disqualify { disqualified_id } if from_area || from_caller => {
                if disqualified_id == me {
                    warn!(id = %me, "Disqualified");
                    self.outcome = Some(SessionOutcome::Disqualified);
                } else {
                    info!(id = %disqualified_id, "Player disqualified");
                    self.disqualified.insert(disqualified_id);
                }
                Ok(Vec::new())
            }
            Payload::VerifyCards { playing_cards } if from_area => {
                let invalid_ids = invalid_cards(&playing_cards, self.deck_size()?, Some(me));
                self.cards = playing_cards;
                let reply = if invalid_ids.is_empty() {
                    Payload::VerifyCardOk
                } else {
                    warn!(invalid = ?invalid_ids, "Invalid cards");
                    Payload::VerifyCardNok { invalid_ids }
                };
                Ok(vec![self.core.send(reply)?])
            }
            Payload::AskSymKeys if from_area => {
                let mut sym_keys = BTreeMap::new();
                sym_keys.insert(me, self.sym_key.clone());
                Ok(vec![self.core.send(Payload::PostSymKeys { sym_keys })?])
            }
            Payload::PostFinalDecks { decks, signed_deck } if from_caller => {
                let report = peel(&decks, &signed_deck, self.deck_size()?);
                let cheater_ids: Vec<ParticipantId> =
                    report.cheaters().iter().copied().filter(|id| *id != me).collect();
                self.report = Some(report);
                let reply = if cheater_ids.is_empty() {
                    Payload::VerifyDeckOk
                } else {
                    warn!(cheaters = ?cheater_ids, "Inconsistent deck layers");
                    Payload::VerifyDeckNok { cheater_ids }
                };
                Ok(vec![self.core.send(reply)?])
            }
            Payload::AskForWinner if from_caller => self.claim_winners(me),
            Payload::WinnerAck { winners } if from_caller => {
                if winners != self.claim {
                    warn!(announced = ?winners, claimed = ?self.claim, "Announced winners differ from this player's claim");
                }
                info!(winners = ?winners, won = winners.contains(&me), "Game over");
                self.outcome = Some(SessionOutcome::Finished { winners });
                Ok(Vec::new())
            }
            Payload::PlayersList { players } if from_area => {
                self.core.store_players_list(players);
                Ok(Vec::new())
            }
            _ => {
                warn!(sender = ?sender, command, "Ignoring unexpected message");
                Ok(Vec::new())
            }
        }
    }

    /// Add this Player's layer to the deck and commit a card
    fn shuffle(&mut self, me: ParticipantId, deck: Vec<Blob>) -> PokerResult<Vec<Envelope>> {
        let deck_size = deck.len();
        self.deck_size = Some(deck_size);
        let mut rng = rand::thread_rng();
        let mut out = Vec::new();

        let card = match &self.fixed_card {
            Some(card) => card.clone(),
            None if self.behavior.attempts(Trick::ShortCard, &mut rng) => {
                out.push(self.confess(me)?);
                draw_short_card(deck_size, &mut rng)
            }
            None => draw_card(deck_size, &mut rng),
        };

        let layer = if deck_size >= 2 && self.behavior.attempts(Trick::TamperDeck, &mut rng) {
            out.push(self.confess(me)?);
            let mut layer = encrypt_layer(&deck, &self.sym_key)?;
            layer[0] = Blob::new(self.sym_key.encrypt(deck[1].as_bytes())?);
            layer.shuffle(&mut rng);
            layer
        } else {
            reencrypt_and_shuffle(&deck, &self.sym_key, &mut rng)?
        };

        debug!(id = %me, card = ?card, "Committing card");
        self.card = card.clone();
        out.push(self.core.send(Payload::CommitCard { deck: layer, card })?);
        Ok(out)
    }

    fn claim_winners(&mut self, me: ParticipantId) -> PokerResult<Vec<Envelope>> {
        let cards: BTreeMap<ParticipantId, Vec<u64>> = self
            .cards
            .iter()
            .filter(|(id, _)| !self.disqualified.contains(id))
            .map(|(id, card)| (*id, card.clone()))
            .collect();
        let honest = match self.report.as_ref().and_then(|report| report.plaintext()) {
            Some(plaintext) => find_winners(plaintext, &cards),
            None => Vec::new(),
        };

        let mut out = Vec::new();
        let mut rng = rand::thread_rng();
        self.claim = if self.behavior.attempts(Trick::FalseWinner, &mut rng) {
            out.push(self.confess(me)?);
            vec![me]
        } else {
            honest
        };
        info!(id = %me, claim = ?self.claim, "Claiming winners");
        out.push(self.core.send(Payload::Winner {
            winners: self.claim.clone(),
        })?);
        Ok(out)
    }

    fn confess(&mut self, me: ParticipantId) -> PokerResult<Envelope> {
        warn!(id = %me, behavior = %self.behavior, "Cheating");
        self.core.send(Payload::Cheat { cheater_id: me })
    }
}

impl Participant for Player {
    fn role(&self) -> Role {
        Role::Player
    }

    fn nick(&self) -> &str {
        self.core.nick()
    }

    fn registration(&mut self) -> PokerResult<Envelope> {
        self.core.registration(Role::Player, None)
    }

    fn handle(&mut self, envelope: Envelope) -> PokerResult<Vec<Envelope>> {
        if self.outcome.is_some() {
            debug!(command = envelope.command(), "Session over, ignoring message");
            return Ok(Vec::new());
        }
        if self.core.id().is_none() {
            self.core.accept_registration(&envelope)?;
            return Ok(Vec::new());
        }
        if let Err(err) = self.core.receive(&envelope, true) {
            if err.is_fatal() {
                return Err(err);
            }
            warn!(error = %err, command = envelope.command(), "Dropping unverifiable message");
            return Ok(Vec::new());
        }
        self.dispatch(envelope)
    }

    fn players_list_request(&mut self) -> PokerResult<Envelope> {
        self.core.send(Payload::GetPlayersList)
    }

    fn take_players_list(&mut self) -> Option<BTreeMap<ParticipantId, PlayerInfo>> {
        self.core.take_players_list()
    }

    fn audit(&self) -> &AuditLog {
        self.core.audit()
    }

    fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome.clone()
    }
}
