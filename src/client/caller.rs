//! The Caller: deals the root deck, collects verdicts and settles the game

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::client::{ClientCore, Participant, SessionOutcome};
use crate::config::validate_deck_size;
use crate::error::{PokerError, PokerResult};
use crate::game::card::invalid_cards;
use crate::game::deck::{encrypt_plaintext, generate_plaintext, is_permutation_of_range};
use crate::game::{find_winners, peel, DecryptionReport, Roster};
use crate::observability::AuditLog;
use crate::protocol::{Blob, Envelope, LayerEntry, ParticipantId, Payload, PlayerInfo, Role, Stage};
use crate::security::{IdentityCard, SigningKey, SymmetricKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallerPhase {
    Registering,
    Gathering,
    Shuffling,
    AwaitingCardVerdict,
    AwaitingKeys,
    AwaitingDeckVerdict,
    AwaitingWinners,
    Done,
}

impl CallerPhase {
    fn name(&self) -> &'static str {
        match self {
            CallerPhase::Registering => "registering",
            CallerPhase::Gathering => "gathering",
            CallerPhase::Shuffling => "shuffling",
            CallerPhase::AwaitingCardVerdict => "awaiting-card-verdict",
            CallerPhase::AwaitingKeys => "awaiting-keys",
            CallerPhase::AwaitingDeckVerdict => "awaiting-deck-verdict",
            CallerPhase::AwaitingWinners => "awaiting-winners",
            CallerPhase::Done => "done",
        }
    }
}

/// Caller role state machine
pub struct Caller {
    core: ClientCore,
    deck_size: usize,
    quota: u32,
    phase: CallerPhase,
    roster: Roster,
    sym_key: SymmetricKey,
    plaintext: Option<Vec<u64>>,
    initial_deck: Vec<Blob>,
    final_deck: Vec<Blob>,
    shuffle_order: Vec<ParticipantId>,
    card_flags: BTreeSet<ParticipantId>,
    report: Option<DecryptionReport>,
    expected_claim: Vec<ParticipantId>,
    winners: Vec<ParticipantId>,
    confirmed: BTreeSet<ParticipantId>,
    confessions: Vec<ParticipantId>,
    outcome: Option<SessionOutcome>,
}

impl Caller {
    pub fn new(nick: &str, key: SigningKey, deck_size: usize, quota: u32) -> PokerResult<Self> {
        validate_deck_size(deck_size)?;
        if quota == 0 {
            return Err(PokerError::Configuration {
                message: "a game needs at least one player".to_string(),
                field: "game.players".to_string(),
            });
        }
        Ok(Self {
            core: ClientCore::new(nick, key),
            deck_size,
            quota,
            phase: CallerPhase::Registering,
            roster: Roster::new(),
            sym_key: SymmetricKey::generate(),
            plaintext: None,
            initial_deck: Vec::new(),
            final_deck: Vec::new(),
            shuffle_order: Vec::new(),
            card_flags: BTreeSet::new(),
            report: None,
            expected_claim: Vec::new(),
            winners: Vec::new(),
            confirmed: BTreeSet::new(),
            confessions: Vec::new(),
            outcome: None,
        })
    }

    /// Deal this plaintext order instead of a random one
    pub fn with_plaintext_deck(mut self, deck: Vec<u64>) -> PokerResult<Self> {
        if !is_permutation_of_range(&deck, self.deck_size) {
            return Err(PokerError::Configuration {
                message: format!("the dealt deck must be a permutation of 0..{}", self.deck_size),
                field: "deck".to_string(),
            });
        }
        self.plaintext = Some(deck);
        Ok(self)
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

    pub fn phase_name(&self) -> &'static str {
        self.phase.name()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// The Caller's own peel of the final deck, once the keys are in
    pub fn report(&self) -> Option<&DecryptionReport> {
        self.report.as_ref()
    }

    /// Players that confessed to cheating
    pub fn confessions(&self) -> &[ParticipantId] {
        &self.confessions
    }

    fn dispatch(&mut self, envelope: Envelope, out: &mut Vec<Envelope>) -> PokerResult<()> {
        let sender = envelope.sender();
        if let Some(id) = sender {
            if !self.roster.is_active(id) {
                debug!(id = %id, command = envelope.command(), "Ignoring message from inactive player");
                return Ok(());
            }
        }
        let command = envelope.command();

        match (self.phase, envelope.message.payload) {
            (_, Payload::PlayersList { players }) if sender.is_none() => {
                self.core.store_players_list(players);
                Ok(())
            }
            (_, Payload::Cheat { cheater_id }) => {
                warn!(reporter = ?sender, cheater = %cheater_id, "Cheat confession");
                self.confessions.push(cheater_id);
                Ok(())
            }
            (
                CallerPhase::Gathering,
                Payload::Register {
                    nick,
                    public_key,
                    assigned_id: Some(id),
                    ..
                },
            ) if sender.is_none() => {
                self.roster.insert_assigned(id, &nick, public_key)?;
                self.core.trust_mut().insert(id, public_key);
                info!(id = %id, nick = %nick, registered = self.roster.active_count(), quota = self.quota, "Player joined");
                if self.roster.active_count() == self.quota as usize {
                    self.begin(out)?;
                }
                Ok(())
            }
            (CallerPhase::Gathering, Payload::Disqualify { disqualified_id }) if sender.is_none() => {
                info!(id = %disqualified_id, "Player left before the game started");
                self.roster.remove(disqualified_id);
                self.core.trust_mut().remove(disqualified_id);
                Ok(())
            }
            (_, Payload::Disqualify { disqualified_id }) if sender.is_none() => {
                if self.roster.disqualify(disqualified_id) {
                    warn!(id = %disqualified_id, "Playing area disqualified a player");
                    self.forget(disqualified_id)?;
                }
                self.check_winners(out)
            }
            (CallerPhase::Shuffling, Payload::CommitCard { deck, card }) => {
                let Some(id) = sender else {
                    return Err(PokerError::violation("card commitment without a sender"));
                };
                debug!(id = %id, card = ?card, "Card committed");
                if let Some(entry) = self.roster.get_mut(id) {
                    entry.committed_card = Some(card);
                    entry.shuffled_deck = Some(deck);
                }
                self.shuffle_order.push(id);
                Ok(())
            }
            (CallerPhase::Shuffling, Payload::DeckMessage { deck }) if sender.is_none() => {
                self.final_deck = deck;
                self.sign_final_deck(out)
            }
            (CallerPhase::AwaitingCardVerdict, Payload::CheatVerify { results, stage: Stage::Cards })
                if sender.is_none() =>
            {
                self.settle_cards(results, out)
            }
            (CallerPhase::AwaitingKeys, Payload::PostSymKeys { sym_keys }) if sender.is_none() => {
                self.publish_decks(sym_keys, out)
            }
            (CallerPhase::AwaitingDeckVerdict, Payload::CheatVerify { results, stage: Stage::Deck })
                if sender.is_none() =>
            {
                self.settle_deck(results, out)
            }
            (CallerPhase::AwaitingWinners, Payload::Winner { winners }) => {
                let Some(id) = sender else {
                    return Err(PokerError::violation("winner claim without a sender"));
                };
                self.on_claim(id, winners, out)
            }
            (phase, _) if sender.is_none() => Err(PokerError::violation(format!(
                "playing area sent {} during {}",
                command,
                phase.name()
            ))),
            (phase, _) => {
                warn!(sender = ?sender, command, phase = phase.name(), "Ignoring unexpected relayed message");
                Ok(())
            }
        }
    }

    /// Quota reached: publish the keys and hand out the root deck
    fn begin(&mut self, out: &mut Vec<Envelope>) -> PokerResult<()> {
        let mut rng = rand::thread_rng();
        let plaintext = match &self.plaintext {
            Some(deck) => deck.clone(),
            None => generate_plaintext(self.deck_size, &mut rng),
        };
        self.initial_deck = encrypt_plaintext(&plaintext, &self.sym_key)?;

        let mut public_keys = self.roster.public_keys();
        public_keys.insert(ParticipantId::CALLER, self.core.public_key());
        info!(players = self.roster.active_count(), deck_size = self.deck_size, "Starting the game");

        out.push(self.core.send(Payload::BeginGame { public_keys })?);
        out.push(self.core.send(Payload::DeckMessage {
            deck: self.initial_deck.clone(),
        })?);
        self.phase = CallerPhase::Shuffling;
        Ok(())
    }

    fn sign_final_deck(&mut self, out: &mut Vec<Envelope>) -> PokerResult<()> {
        let playing_cards = self.roster.active_cards();
        self.card_flags = invalid_cards(&playing_cards, self.deck_size, None).into_iter().collect();
        if !self.card_flags.is_empty() {
            warn!(invalid = ?self.card_flags, "Committed cards failed local validation");
        }
        info!(layers = self.shuffle_order.len(), "Final deck received");
        out.push(self.core.send(Payload::SignFinalDeckAck { playing_cards })?);
        self.phase = CallerPhase::AwaitingCardVerdict;
        Ok(())
    }

    fn settle_cards(&mut self, results: BTreeMap<ParticipantId, bool>, out: &mut Vec<Envelope>) -> PokerResult<()> {
        let flagged: BTreeSet<ParticipantId> = flagged(&results).chain(self.card_flags.iter().copied()).collect();
        info!(stage = %Stage::Cards, flagged = ?flagged, "Card verdict");
        for id in flagged {
            self.disqualify(id, "invalid card", out)?;
        }
        out.push(self.core.send(Payload::CardsValidated)?);
        self.phase = CallerPhase::AwaitingKeys;
        Ok(())
    }

    /// Assemble every layer with its key, check it locally and publish it
    fn publish_decks(
        &mut self,
        sym_keys: BTreeMap<ParticipantId, SymmetricKey>,
        out: &mut Vec<Envelope>,
    ) -> PokerResult<()> {
        let mut decks = BTreeMap::new();
        decks.insert(
            ParticipantId::CALLER,
            LayerEntry {
                deck: self.initial_deck.clone(),
                sym_key: Some(self.sym_key.clone()),
            },
        );
        for id in &self.shuffle_order {
            let Some(entry) = self.roster.get_mut(*id) else {
                continue;
            };
            entry.sym_key = sym_keys.get(id).cloned();
            decks.insert(
                *id,
                LayerEntry {
                    deck: entry.shuffled_deck.clone().unwrap_or_default(),
                    sym_key: entry.sym_key.clone(),
                },
            );
        }

        let report = peel(&decks, &self.final_deck, self.deck_size);
        if !report.is_clean() {
            warn!(cheaters = ?report.cheaters(), "Local deck check found inconsistent layers");
        }
        self.report = Some(report);

        out.push(self.core.send(Payload::PostFinalDecks {
            decks,
            signed_deck: self.final_deck.clone(),
        })?);
        self.phase = CallerPhase::AwaitingDeckVerdict;
        Ok(())
    }

    fn settle_deck(&mut self, results: BTreeMap<ParticipantId, bool>, out: &mut Vec<Envelope>) -> PokerResult<()> {
        let report = self
            .report
            .clone()
            .ok_or_else(|| PokerError::violation("deck verdict before the decks were published"))?;
        let flagged: BTreeSet<ParticipantId> = flagged(&results).chain(report.cheaters().iter().copied()).collect();
        info!(stage = %Stage::Deck, flagged = ?flagged, "Deck verdict");

        if flagged.contains(&ParticipantId::CALLER) {
            error!("The caller layer was implicated, aborting");
            return Err(PokerError::DeckCompromised);
        }
        let plaintext = report.plaintext().ok_or(PokerError::DeckCompromised)?.to_vec();

        for id in flagged {
            self.disqualify(id, "inconsistent deck layer", out)?;
        }

        self.expected_claim = find_winners(&plaintext, &self.roster.active_cards());
        self.winners = self.expected_claim.clone();
        self.confirmed.clear();
        info!(winners = ?self.winners, "Winners determined, asking players to confirm");

        out.push(self.core.send(Payload::AskForWinner)?);
        self.phase = CallerPhase::AwaitingWinners;
        Ok(())
    }

    fn on_claim(&mut self, id: ParticipantId, claimed: Vec<ParticipantId>, out: &mut Vec<Envelope>) -> PokerResult<()> {
        let claimed: BTreeSet<ParticipantId> = claimed.into_iter().collect();
        if claimed == self.expected_claim.iter().copied().collect() {
            debug!(id = %id, "Winner claim confirmed");
            self.confirmed.insert(id);
        } else {
            warn!(id = %id, claimed = ?claimed, expected = ?self.expected_claim, "Wrong winner claim");
            self.disqualify(id, "wrong winner claim", out)?;
        }
        self.check_winners(out)
    }

    /// Acknowledge the winners once every active player has confirmed
    fn check_winners(&mut self, out: &mut Vec<Envelope>) -> PokerResult<()> {
        if self.phase != CallerPhase::AwaitingWinners {
            return Ok(());
        }
        if !self.roster.active_ids().iter().all(|id| self.confirmed.contains(id)) {
            return Ok(());
        }
        info!(winners = ?self.winners, "Game settled");
        out.push(self.core.send(Payload::WinnerAck {
            winners: self.winners.clone(),
        })?);
        self.outcome = Some(SessionOutcome::Finished {
            winners: self.winners.clone(),
        });
        self.phase = CallerPhase::Done;
        Ok(())
    }

    /// Disqualify on the Caller's own authority and tell the Playing Area
    fn disqualify(&mut self, id: ParticipantId, reason: &str, out: &mut Vec<Envelope>) -> PokerResult<()> {
        if !self.roster.disqualify(id) {
            return Ok(());
        }
        warn!(id = %id, reason, "Disqualifying player");
        out.push(self.core.send(Payload::Disqualify { disqualified_id: id })?);
        self.forget(id)
    }

    fn forget(&mut self, id: ParticipantId) -> PokerResult<()> {
        self.winners.retain(|winner| *winner != id);
        self.confirmed.remove(&id);
        if self.roster.active_count() == 0 {
            error!("No players left");
            return Err(PokerError::QuorumLost);
        }
        Ok(())
    }
}

fn flagged(results: &BTreeMap<ParticipantId, bool>) -> impl Iterator<Item = ParticipantId> + '_ {
    results.iter().filter(|(_, clean)| !**clean).map(|(id, _)| *id)
}

impl Participant for Caller {
    fn role(&self) -> Role {
        Role::Caller
    }

    fn nick(&self) -> &str {
        self.core.nick()
    }

    fn registration(&mut self) -> PokerResult<Envelope> {
        self.core.registration(Role::Caller, Some(self.quota))
    }

    fn handle(&mut self, envelope: Envelope) -> PokerResult<Vec<Envelope>> {
        if self.outcome.is_some() {
            debug!(command = envelope.command(), "Game already settled");
            return Ok(Vec::new());
        }
        if self.phase == CallerPhase::Registering {
            let id = self.core.accept_registration(&envelope)?;
            if !id.is_caller() {
                return Err(PokerError::violation(format!("caller was assigned id {}", id)));
            }
            self.phase = CallerPhase::Gathering;
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        match self.core.receive(&envelope, false) {
            Ok(()) => {}
            Err(PokerError::SignatureForgedByPeer { id }) => {
                warn!(id = %id, command = envelope.command(), "Relayed message carries a forged signature");
                self.disqualify(id, "forged signature", &mut out)?;
                return Ok(out);
            }
            Err(err) => return Err(err),
        }
        self.dispatch(envelope, &mut out)?;
        Ok(out)
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
