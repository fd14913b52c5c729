//! The Playing Area as a pure state machine
//!
//! The server feeds it decoded envelopes tagged with the connection they
//! arrived on and executes the returned [`Action`]s in order. Everything the
//! relay knows lives in [`PlayingArea`]; there is no other shared state.
//!
//! Fan-out rounds (deck relay, card verdicts, key collection, deck verdicts)
//! talk to one Player at a time in id order. Each round trip carries an
//! optional deadline; when it expires the Player is disqualified and the round
//! moves on.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PokerConfig;
use crate::error::{NetworkError, PokerError, PokerResult};
use crate::game::Roster;
use crate::observability::{AuditLog, Direction};
use crate::protocol::{Blob, Envelope, Message, ParticipantId, Payload, Role, Stage};
use crate::security::{
    AuthorityValidator, CertificateValidator, InputValidator, PublicKey, SigningKey, SymmetricKey, TrustStore,
    ValidationRules,
};

/// Handle of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Side effect requested by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send { to: ConnectionId, envelope: Envelope },
    Close(ConnectionId),
}

/// Policy knobs of the Playing Area
#[derive(Clone)]
pub struct AreaSettings {
    pub max_players: u32,
    pub round_trip_timeout: Option<Duration>,
    pub require_certificate: bool,
    pub allow_list: Vec<u64>,
    pub certificate_validator: Option<Arc<dyn CertificateValidator>>,
}

impl Default for AreaSettings {
    fn default() -> Self {
        Self {
            max_players: 6,
            round_trip_timeout: Some(Duration::from_secs(30)),
            require_certificate: false,
            allow_list: Vec::new(),
            certificate_validator: None,
        }
    }
}

impl fmt::Debug for AreaSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AreaSettings")
            .field("max_players", &self.max_players)
            .field("round_trip_timeout", &self.round_trip_timeout)
            .field("require_certificate", &self.require_certificate)
            .field("allow_list", &self.allow_list)
            .field("certificate_validator", &self.certificate_validator.is_some())
            .finish()
    }
}

impl AreaSettings {
    pub fn from_config(config: &PokerConfig) -> PokerResult<Self> {
        let certificate_validator = match &config.identity.authority_public_key {
            Some(key) => {
                let validator: Arc<dyn CertificateValidator> =
                    Arc::new(AuthorityValidator::new(PublicKey::from_hex(key)?));
                Some(validator)
            }
            None => None,
        };
        Ok(Self {
            max_players: config.game.max_players,
            round_trip_timeout: config.network.round_trip_timeout(),
            require_certificate: config.identity.require_certificate,
            allow_list: config.identity.allow_list.clone(),
            certificate_validator,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Caller,
    Player(ParticipantId),
}

#[derive(Debug, Clone)]
struct CallerSlot {
    connection: ConnectionId,
    nick: String,
    public_key: PublicKey,
    quota: u32,
}

#[derive(Debug, Clone)]
enum Round {
    Shuffle { deck: Vec<Blob> },
    Cards { request: Envelope, results: BTreeMap<ParticipantId, bool> },
    Keys { keys: BTreeMap<ParticipantId, SymmetricKey> },
    Deck { request: Envelope, results: BTreeMap<ParticipantId, bool> },
}

impl Round {
    fn name(&self) -> &'static str {
        match self {
            Round::Shuffle { .. } => "shuffle",
            Round::Cards { .. } => "cards",
            Round::Keys { .. } => "keys",
            Round::Deck { .. } => "deck",
        }
    }
}

#[derive(Debug, Clone)]
struct FanOut {
    round: Round,
    queue: VecDeque<ParticipantId>,
    current: Option<ParticipantId>,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone)]
enum Phase {
    Registration,
    AwaitingDeck,
    InRound(FanOut),
    AwaitingCardsAck,
    AwaitingCardsValidated,
    AwaitingFinalDecks,
    AwaitingWinnerRequest,
    CollectingWinners {
        pending: BTreeSet<ParticipantId>,
        deadline: Option<Instant>,
    },
    Finished(Vec<ParticipantId>),
    Aborted(PokerError),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Registration => "registration",
            Phase::AwaitingDeck => "awaiting-deck",
            Phase::InRound(fan_out) => fan_out.round.name(),
            Phase::AwaitingCardsAck => "awaiting-cards-ack",
            Phase::AwaitingCardsValidated => "awaiting-cards-validated",
            Phase::AwaitingFinalDecks => "awaiting-final-decks",
            Phase::AwaitingWinnerRequest => "awaiting-winner-request",
            Phase::CollectingWinners { .. } => "collecting-winners",
            Phase::Finished(_) => "finished",
            Phase::Aborted(_) => "aborted",
        }
    }
}

/// Authoritative relay state: roster, bindings, phase and audit trail
pub struct PlayingArea {
    session: Uuid,
    key: SigningKey,
    settings: AreaSettings,
    phase: Phase,
    caller: Option<CallerSlot>,
    roster: Roster,
    trust: TrustStore,
    bindings: HashMap<ConnectionId, Binding>,
    player_connections: BTreeMap<ParticipantId, ConnectionId>,
    /// Players that left during registration, possibly after the Caller counted them
    departed: BTreeSet<ParticipantId>,
    nick_validator: InputValidator,
    audit: AuditLog,
}

impl PlayingArea {
    pub fn new(key: SigningKey, settings: AreaSettings) -> PokerResult<Self> {
        Ok(Self {
            session: Uuid::new_v4(),
            key,
            settings,
            phase: Phase::Registration,
            caller: None,
            roster: Roster::new(),
            trust: TrustStore::new(),
            bindings: HashMap::new(),
            player_connections: BTreeMap::new(),
            departed: BTreeSet::new(),
            nick_validator: InputValidator::new(ValidationRules::default())?,
            audit: AuditLog::new(),
        })
    }

    /// Replace the in-memory audit log, e.g. with a file-backed one
    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Identifier of this game, stamped into the audit log
    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn phase_name(&self) -> &'static str {
        self.phase.name()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Finished(_) | Phase::Aborted(_))
    }

    /// Final winners once the Caller acknowledged them
    pub fn winners(&self) -> Option<&[ParticipantId]> {
        match &self.phase {
            Phase::Finished(winners) => Some(winners),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&PokerError> {
        match &self.phase {
            Phase::Aborted(err) => Some(err),
            _ => None,
        }
    }

    /// Earliest pending round-trip deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.phase {
            Phase::InRound(fan_out) => fan_out.deadline,
            Phase::CollectingWinners { deadline, .. } => *deadline,
            _ => None,
        }
    }

    /// Process one envelope received on `connection`.
    ///
    /// Misbehaving Players are disqualified and play continues. An error is
    /// only returned when the whole game must stop; the area is then aborted.
    pub fn handle(&mut self, connection: ConnectionId, envelope: Envelope, now: Instant) -> PokerResult<Vec<Action>> {
        if self.is_terminal() {
            debug!(connection = %connection, command = envelope.command(), "Ignoring message after the game ended");
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        self.audit.record(Direction::Received, &envelope);
        let result = match self.bindings.get(&connection).copied() {
            None => self.on_unbound(connection, envelope, &mut out),
            Some(Binding::Caller) => self.on_caller(envelope, now, &mut out),
            Some(Binding::Player(id)) => self.on_player(id, envelope, now, &mut out),
        };
        self.conclude(result, out)
    }

    /// The transport lost `connection`
    pub fn connection_lost(&mut self, connection: ConnectionId, now: Instant) -> PokerResult<Vec<Action>> {
        let mut out = Vec::new();
        let result = match self.bindings.remove(&connection) {
            None => Ok(()),
            Some(_) if self.is_terminal() => Ok(()),
            Some(Binding::Caller) => {
                error!(connection = %connection, "Caller disconnected");
                Err(PokerError::Network {
                    source: NetworkError::ConnectionClosed,
                    context: "caller disconnected".to_string(),
                })
            }
            Some(Binding::Player(id)) => {
                self.player_connections.remove(&id);
                self.on_player_gone(id, now, &mut out)
            }
        };
        self.conclude(result, out)
    }

    /// Expire round trips whose deadline has passed
    pub fn on_tick(&mut self, now: Instant) -> PokerResult<Vec<Action>> {
        let mut out = Vec::new();
        let result = self.expire(now, &mut out);
        self.conclude(result, out)
    }

    fn conclude(&mut self, result: PokerResult<()>, out: Vec<Action>) -> PokerResult<Vec<Action>> {
        match result {
            Ok(()) => Ok(out),
            Err(err) => {
                error!(error = %err, phase = self.phase.name(), "Playing area aborting");
                self.audit.append(format!("aborted: {}", err));
                self.phase = Phase::Aborted(err.clone());
                Err(err)
            }
        }
    }

    // Registration

    fn on_unbound(&mut self, connection: ConnectionId, envelope: Envelope, out: &mut Vec<Action>) -> PokerResult<()> {
        let Payload::Register { role, nick, public_key, num_players, .. } = envelope.payload().clone() else {
            warn!(connection = %connection, command = envelope.command(), "Message before registration");
            out.push(Action::Close(connection));
            return Ok(());
        };

        if let Err(reason) = self.admit(&envelope, &nick, &public_key) {
            return self.reject(connection, reason, out);
        }

        match role {
            Role::Caller => self.register_caller(connection, nick, public_key, num_players, out),
            Role::Player => self.register_player(connection, envelope, nick, public_key, out),
        }
    }

    /// Identity checks common to both roles
    fn admit(&mut self, envelope: &Envelope, nick: &str, public_key: &PublicKey) -> Result<(), String> {
        if let Err(err) = self.nick_validator.validate_nick(nick) {
            return Err(err.to_string());
        }

        match (&envelope.signature, &envelope.certificate) {
            (Some(signature), Some(certificate)) => {
                let validator = self
                    .settings
                    .certificate_validator
                    .as_ref()
                    .ok_or_else(|| "certificates are not accepted here".to_string())?;
                let payload = envelope.message.canonical_bytes().map_err(|e| e.to_string())?;
                if !validator.validate(signature, &payload, certificate) {
                    return Err("certificate validation failed".to_string());
                }
                let identity = validator.extract_identity(certificate).map_err(|e| e.to_string())?;
                if !self.settings.allow_list.is_empty() && !self.settings.allow_list.contains(&identity.number) {
                    return Err(format!("{} is not on the allow list", identity.number));
                }
                info!(name = %identity.name, number = identity.number, "Certified registration");
                Ok(())
            }
            _ if self.settings.require_certificate => Err("a certificate is required".to_string()),
            (Some(_), None) => {
                if envelope.verify_with(public_key) {
                    Ok(())
                } else {
                    Err("registration signature does not match the announced key".to_string())
                }
            }
            (None, _) => Ok(()),
        }
    }

    fn register_caller(
        &mut self,
        connection: ConnectionId,
        nick: String,
        public_key: PublicKey,
        num_players: Option<u32>,
        out: &mut Vec<Action>,
    ) -> PokerResult<()> {
        if self.caller.is_some() || !matches!(self.phase, Phase::Registration) {
            return self.reject(connection, "a caller is already registered".to_string(), out);
        }
        let quota = match num_players {
            Some(quota) if quota >= 1 && quota <= self.settings.max_players => quota,
            _ => {
                return self.reject(
                    connection,
                    format!("player quota must lie within 1..={}", self.settings.max_players),
                    out,
                )
            }
        };

        info!(session = %self.session, nick = %nick, quota, "Caller registered");
        self.audit.append(format!("session {} opened by {}", self.session, nick));
        self.trust.insert(ParticipantId::CALLER, public_key);
        self.bindings.insert(connection, Binding::Caller);
        self.caller = Some(CallerSlot {
            connection,
            nick,
            public_key,
            quota,
        });

        let ack = self.sign(Payload::RegisterAck {
            id: ParticipantId::CALLER,
            server_public_key: self.key.public_key(),
        })?;
        self.send(connection, ack, out);
        Ok(())
    }

    fn register_player(
        &mut self,
        connection: ConnectionId,
        envelope: Envelope,
        nick: String,
        public_key: PublicKey,
        out: &mut Vec<Action>,
    ) -> PokerResult<()> {
        let Some(quota) = self.caller.as_ref().map(|caller| caller.quota) else {
            return self.reject(connection, "no caller has registered yet".to_string(), out);
        };
        if !matches!(self.phase, Phase::Registration) || self.roster.active_count() >= quota as usize {
            return self.reject(connection, "the table is full".to_string(), out);
        }

        let id = self.roster.register(&nick, public_key);
        self.trust.insert(id, public_key);
        self.bindings.insert(connection, Binding::Player(id));
        self.player_connections.insert(id, connection);
        info!(id = %id, nick = %nick, "Player registered");

        let ack = self.sign(Payload::RegisterAck {
            id,
            server_public_key: self.key.public_key(),
        })?;
        self.send(connection, ack, out);

        // The caller learns the player from a copy carrying the assigned id
        let Payload::Register { role, nick, public_key, num_players, .. } = envelope.message.payload else {
            return Ok(());
        };
        let forwarded = self.sign(Payload::Register {
            role,
            nick,
            public_key,
            num_players,
            assigned_id: Some(id),
        })?;
        self.send_to_caller(forwarded, out);
        Ok(())
    }

    fn reject(&mut self, connection: ConnectionId, reason: String, out: &mut Vec<Action>) -> PokerResult<()> {
        warn!(connection = %connection, reason = %reason, "Registration rejected");
        let nack = self.sign(Payload::RegisterNack { reason: Some(reason) })?;
        self.send(connection, nack, out);
        out.push(Action::Close(connection));
        Ok(())
    }

    // Caller traffic

    fn on_caller(&mut self, envelope: Envelope, now: Instant, out: &mut Vec<Action>) -> PokerResult<()> {
        if envelope.sender() != Some(ParticipantId::CALLER) {
            return Err(PokerError::violation("caller connection sent a message under another identity"));
        }
        self.trust.verify(&envelope, true)?;

        match (&self.phase, envelope.payload()) {
            (_, Payload::GetPlayersList) => self.answer_players_list(Binding::Caller, out),
            (Phase::Registration, Payload::BeginGame { public_keys }) => {
                let mut expected = self.roster.public_keys();
                if let Some(caller) = &self.caller {
                    expected.insert(ParticipantId::CALLER, caller.public_key);
                }
                // The Caller may have counted players that left since; it was told with a Disqualify
                let (stale, public_keys): (BTreeMap<_, _>, BTreeMap<_, _>) = public_keys
                    .iter()
                    .map(|(id, key)| (*id, *key))
                    .partition(|(id, _)| self.departed.contains(id));
                if public_keys != expected {
                    return Err(PokerError::violation("Begin_Game does not match the registered roster"));
                }
                if self.roster.active_count() == 0 {
                    if stale.is_empty() {
                        return Err(PokerError::violation("Begin_Game without any registered player"));
                    }
                    return Err(PokerError::QuorumLost);
                }
                if !stale.is_empty() {
                    info!(departed = ?stale.keys().collect::<Vec<_>>(), "Dropping players that left from Begin_Game");
                }
                info!(players = self.roster.active_count(), "Game begins");
                let begin = self.sign(Payload::BeginGame { public_keys })?;
                self.broadcast_players(begin, None, out);
                self.phase = Phase::AwaitingDeck;
                Ok(())
            }
            (Phase::AwaitingDeck, Payload::DeckMessage { deck }) => {
                info!(cards = deck.len(), "Initial deck received, starting the shuffle pass");
                let round = Round::Shuffle { deck: deck.clone() };
                self.start_round(round, now, out)
            }
            (Phase::AwaitingCardsAck, Payload::SignFinalDeckAck { playing_cards }) => {
                if *playing_cards != self.roster.active_cards() {
                    return Err(PokerError::violation("caller's cards differ from the committed cards"));
                }
                let request = self.sign(Payload::VerifyCards {
                    playing_cards: playing_cards.clone(),
                })?;
                let results = playing_cards.keys().map(|id| (*id, true)).collect();
                self.start_round(Round::Cards { request, results }, now, out)
            }
            (Phase::AwaitingCardsValidated, Payload::CardsValidated) => {
                info!("Cards validated, collecting symmetric keys");
                self.start_round(Round::Keys { keys: BTreeMap::new() }, now, out)
            }
            (Phase::AwaitingFinalDecks, Payload::PostFinalDecks { decks, .. }) => {
                let results = decks.keys().map(|id| (*id, true)).collect();
                self.start_round(Round::Deck { request: envelope.clone(), results }, now, out)
            }
            (Phase::AwaitingWinnerRequest, Payload::AskForWinner) => {
                let pending: BTreeSet<ParticipantId> = self.roster.active_ids().into_iter().collect();
                self.broadcast_players(envelope.clone(), None, out);
                self.phase = Phase::CollectingWinners {
                    pending,
                    deadline: self.deadline_from(now),
                };
                Ok(())
            }
            (Phase::CollectingWinners { .. } | Phase::AwaitingWinnerRequest, Payload::WinnerAck { winners }) => {
                info!(winners = ?winners, "Winners acknowledged");
                self.audit.append(format!("winners {:?}", winners));
                let winners = winners.clone();
                self.broadcast_players(envelope.clone(), None, out);
                self.phase = Phase::Finished(winners);
                Ok(())
            }
            (phase, Payload::Disqualify { disqualified_id }) if !matches!(phase, Phase::Registration) => {
                let id = *disqualified_id;
                self.disqualify(id, envelope.clone(), false, now, out)
            }
            (phase, payload) => Err(PokerError::violation(format!(
                "caller sent {} during {}",
                payload.command(),
                phase.name()
            ))),
        }
    }

    // Player traffic

    fn on_player(&mut self, id: ParticipantId, envelope: Envelope, now: Instant, out: &mut Vec<Action>) -> PokerResult<()> {
        let active = self.roster.is_active(id);
        let rejected = if envelope.sender() != Some(id) {
            Some("message claims another sender")
        } else if let Err(err) = self.trust.verify(&envelope, true) {
            warn!(id = %id, error = %err, "Player signature rejected");
            Some("bad signature")
        } else {
            None
        };
        if let Some(reason) = rejected {
            if !active {
                debug!(id = %id, reason = %reason, "Ignoring rejected message from disqualified player");
                return Ok(());
            }
            return self.player_violation(id, reason, now, out);
        }
        // Disqualified players may still look at the table
        if matches!(envelope.payload(), Payload::GetPlayersList) {
            return self.answer_players_list(Binding::Player(id), out);
        }
        if !active {
            debug!(id = %id, command = envelope.command(), "Ignoring message from disqualified player");
            return Ok(());
        }

        match envelope.payload() {
            Payload::Cheat { cheater_id } => {
                warn!(id = %id, cheater = %cheater_id, "Cheat announced");
                self.audit.append(format!("player {} announced cheating by {}", id, cheater_id));
                self.send_to_caller(envelope, out);
                Ok(())
            }
            Payload::Winner { winners } => {
                let expected = match &mut self.phase {
                    Phase::CollectingWinners { pending, .. } => pending.remove(&id),
                    _ => false,
                };
                if !expected {
                    return self.player_violation(id, "unexpected winner claim", now, out);
                }
                info!(id = %id, claimed = ?winners, "Winner claim");
                self.send_to_caller(envelope, out);
                Ok(())
            }
            _ => self.on_round_reply(id, envelope, now, out),
        }
    }

    fn on_round_reply(&mut self, id: ParticipantId, envelope: Envelope, now: Instant, out: &mut Vec<Action>) -> PokerResult<()> {
        let Phase::InRound(fan_out) = &mut self.phase else {
            return self.player_violation(id, "reply outside of a round", now, out);
        };
        if fan_out.current != Some(id) {
            return self.player_violation(id, "reply out of turn", now, out);
        }

        let mut relay = false;
        let accepted = match (&mut fan_out.round, envelope.payload()) {
            (Round::Shuffle { deck }, Payload::CommitCard { deck: shuffled, card }) => {
                *deck = shuffled.clone();
                if let Some(entry) = self.roster.get_mut(id) {
                    entry.committed_card = Some(card.clone());
                    entry.shuffled_deck = Some(shuffled.clone());
                }
                relay = true;
                true
            }
            (Round::Cards { .. }, Payload::VerifyCardOk) | (Round::Deck { .. }, Payload::VerifyDeckOk) => true,
            (Round::Cards { results, .. }, Payload::VerifyCardNok { invalid_ids })
            | (Round::Deck { results, .. }, Payload::VerifyDeckNok { cheater_ids: invalid_ids }) => {
                info!(accuser = %id, accused = ?invalid_ids, "Verdict against players");
                for accused in invalid_ids {
                    if let Some(clean) = results.get_mut(accused) {
                        *clean = false;
                    }
                }
                true
            }
            (Round::Keys { keys }, Payload::PostSymKeys { sym_keys }) => match sym_keys.get(&id) {
                Some(key) => {
                    keys.insert(id, key.clone());
                    if let Some(entry) = self.roster.get_mut(id) {
                        entry.sym_key = Some(key.clone());
                    }
                    true
                }
                None => false,
            },
            _ => false,
        };

        if !accepted {
            let reason = format!("unexpected {}", envelope.command());
            return self.player_violation(id, &reason, now, out);
        }
        if relay {
            self.send_to_caller(envelope, out);
        }
        self.advance(now, out)
    }

    fn on_player_gone(&mut self, id: ParticipantId, now: Instant, out: &mut Vec<Action>) -> PokerResult<()> {
        if matches!(self.phase, Phase::Registration) {
            info!(id = %id, "Player left before the game started");
            self.roster.remove(id);
            self.trust.remove(id);
            self.departed.insert(id);
            let notice = self.sign(Payload::Disqualify { disqualified_id: id })?;
            self.send_to_caller(notice, out);
            return Ok(());
        }
        if !self.roster.is_active(id) {
            return Ok(());
        }
        warn!(id = %id, "Player disconnected mid-game");
        let notice = self.sign(Payload::Disqualify { disqualified_id: id })?;
        self.disqualify(id, notice, true, now, out)
    }

    /// A Player broke the protocol: drop it and disqualify it
    fn player_violation(&mut self, id: ParticipantId, reason: &str, now: Instant, out: &mut Vec<Action>) -> PokerResult<()> {
        warn!(id = %id, reason = %reason, "Protocol violation by player");
        if let Some(connection) = self.player_connections.remove(&id) {
            self.bindings.remove(&connection);
            out.push(Action::Close(connection));
        }
        self.on_player_gone(id, now, out)
    }

    // Disqualification

    /// Apply a disqualification and tell everyone.
    ///
    /// `notice` is the Disqualify envelope to relay. When the area originated
    /// it, the Caller gets a copy as well.
    fn disqualify(
        &mut self,
        id: ParticipantId,
        notice: Envelope,
        from_area: bool,
        now: Instant,
        out: &mut Vec<Action>,
    ) -> PokerResult<()> {
        if !self.roster.disqualify(id) {
            debug!(id = %id, "Already disqualified");
            return Ok(());
        }
        warn!(id = %id, by_area = from_area, "Player disqualified");
        self.audit.append(format!("player {} disqualified", id));

        self.broadcast_players(notice.clone(), Some(id), out);
        if from_area {
            self.send_to_caller(notice, out);
        }

        if self.roster.active_count() == 0 {
            return Err(PokerError::QuorumLost);
        }

        let mut awaited = false;
        match &mut self.phase {
            Phase::InRound(fan_out) => {
                fan_out.queue.retain(|queued| *queued != id);
                awaited = fan_out.current == Some(id);
            }
            Phase::CollectingWinners { pending, .. } => {
                pending.remove(&id);
            }
            _ => {}
        }
        if awaited {
            self.advance(now, out)?;
        }
        Ok(())
    }

    fn expire(&mut self, now: Instant, out: &mut Vec<Action>) -> PokerResult<()> {
        match &self.phase {
            Phase::InRound(FanOut {
                current: Some(id),
                deadline: Some(deadline),
                round,
                ..
            }) if *deadline <= now => {
                let id = *id;
                warn!(id = %id, round = round.name(), "Round trip timed out");
                self.timed_out(id, now, out)
            }
            Phase::CollectingWinners {
                pending,
                deadline: Some(deadline),
            } if *deadline <= now => {
                let stalled: Vec<ParticipantId> = pending.iter().copied().collect();
                warn!(players = ?stalled, "Winner claims timed out");
                if let Phase::CollectingWinners { deadline, .. } = &mut self.phase {
                    *deadline = None;
                }
                for id in stalled {
                    self.timed_out(id, now, out)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// A missed deadline counts as a rejection by the stalled Player
    fn timed_out(&mut self, id: ParticipantId, now: Instant, out: &mut Vec<Action>) -> PokerResult<()> {
        if let Phase::InRound(FanOut {
            round: Round::Cards { results, .. } | Round::Deck { results, .. },
            ..
        }) = &mut self.phase
        {
            if let Some(clean) = results.get_mut(&id) {
                *clean = false;
            }
        }
        let notice = self.sign(Payload::Disqualify { disqualified_id: id })?;
        self.disqualify(id, notice, true, now, out)
    }

    // Fan-out rounds

    fn start_round(&mut self, round: Round, now: Instant, out: &mut Vec<Action>) -> PokerResult<()> {
        debug!(round = round.name(), "Starting round");
        self.phase = Phase::InRound(FanOut {
            round,
            queue: self.roster.active_ids().into_iter().collect(),
            current: None,
            deadline: None,
        });
        self.advance(now, out)
    }

    /// Hand the round to the next active Player, or close it
    fn advance(&mut self, now: Instant, out: &mut Vec<Action>) -> PokerResult<()> {
        loop {
            let next = match &mut self.phase {
                Phase::InRound(fan_out) => {
                    fan_out.current = None;
                    fan_out.deadline = None;
                    fan_out.queue.pop_front()
                }
                _ => return Ok(()),
            };

            let Some(id) = next else {
                return self.finish_round(out);
            };
            let Some(connection) = self.player_connections.get(&id).copied() else {
                continue;
            };
            if !self.roster.is_active(id) {
                continue;
            }

            let request = self.round_request()?;
            let deadline = self.deadline_from(now);
            if let Phase::InRound(fan_out) = &mut self.phase {
                fan_out.current = Some(id);
                fan_out.deadline = deadline;
            }
            self.send(connection, request, out);
            return Ok(());
        }
    }

    fn round_request(&self) -> PokerResult<Envelope> {
        match &self.phase {
            Phase::InRound(fan_out) => match &fan_out.round {
                Round::Shuffle { deck } => self.sign(Payload::DeckMessage { deck: deck.clone() }),
                Round::Cards { request, .. } | Round::Deck { request, .. } => Ok(request.clone()),
                Round::Keys { .. } => self.sign(Payload::AskSymKeys),
            },
            _ => Err(PokerError::violation("no round in progress")),
        }
    }

    fn finish_round(&mut self, out: &mut Vec<Action>) -> PokerResult<()> {
        let Phase::InRound(fan_out) = std::mem::replace(&mut self.phase, Phase::Registration) else {
            return Ok(());
        };

        match fan_out.round {
            Round::Shuffle { deck } => {
                info!("Shuffle pass complete, returning the deck to the caller");
                let final_deck = self.sign(Payload::DeckMessage { deck })?;
                self.send_to_caller(final_deck, out);
                self.phase = Phase::AwaitingCardsAck;
            }
            Round::Cards { results, .. } => {
                info!(results = ?results, "Card verdicts collected");
                let verdict = self.sign(Payload::CheatVerify {
                    results,
                    stage: Stage::Cards,
                })?;
                self.send_to_caller(verdict, out);
                self.phase = Phase::AwaitingCardsValidated;
            }
            Round::Keys { keys } => {
                info!(count = keys.len(), "Symmetric keys collected");
                let bundle = self.sign(Payload::PostSymKeys { sym_keys: keys })?;
                self.send_to_caller(bundle, out);
                self.phase = Phase::AwaitingFinalDecks;
            }
            Round::Deck { results, .. } => {
                info!(results = ?results, "Deck verdicts collected");
                let verdict = self.sign(Payload::CheatVerify {
                    results,
                    stage: Stage::Deck,
                })?;
                self.send_to_caller(verdict, out);
                self.phase = Phase::AwaitingWinnerRequest;
            }
        }
        Ok(())
    }

    // Output helpers

    fn answer_players_list(&mut self, requester: Binding, out: &mut Vec<Action>) -> PokerResult<()> {
        let connection = match requester {
            Binding::Caller => self.caller.as_ref().map(|caller| caller.connection),
            Binding::Player(id) => self.player_connections.get(&id).copied(),
        };
        let Some(connection) = connection else {
            return Ok(());
        };
        let list = self.sign(Payload::PlayersList {
            players: self.roster.players_info(),
        })?;
        self.send(connection, list, out);
        Ok(())
    }

    fn deadline_from(&self, now: Instant) -> Option<Instant> {
        self.settings.round_trip_timeout.map(|timeout| now + timeout)
    }

    fn sign(&self, payload: Payload) -> PokerResult<Envelope> {
        Envelope::signed(Message::from_area(payload), &self.key)
    }

    fn send(&mut self, to: ConnectionId, envelope: Envelope, out: &mut Vec<Action>) {
        debug!(connection = %to, command = envelope.command(), "Sending");
        self.audit.record(Direction::Sent, &envelope);
        out.push(Action::Send { to, envelope });
    }

    fn send_to_caller(&mut self, envelope: Envelope, out: &mut Vec<Action>) {
        if let Some(connection) = self.caller.as_ref().map(|caller| caller.connection) {
            if self.bindings.contains_key(&connection) {
                self.send(connection, envelope, out);
            }
        }
    }

    /// Send to every active Player, plus `also` even if it is no longer active
    fn broadcast_players(&mut self, envelope: Envelope, also: Option<ParticipantId>, out: &mut Vec<Action>) {
        let targets: Vec<ConnectionId> = self
            .player_connections
            .iter()
            .filter(|(id, _)| self.roster.is_active(**id) || Some(**id) == also)
            .map(|(_, connection)| *connection)
            .collect();
        for connection in targets {
            self.send(connection, envelope.clone(), out);
        }
    }

    /// Nickname of the registered Caller
    pub fn caller_nick(&self) -> Option<&str> {
        self.caller.as_ref().map(|caller| caller.nick.as_str())
    }
}
