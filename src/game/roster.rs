//! Player roster with monotonic id assignment

use std::collections::BTreeMap;

use crate::error::{PokerError, PokerResult};
use crate::protocol::{Blob, ParticipantId, PlayerInfo};
use crate::security::{PublicKey, SymmetricKey};

/// What a role knows about one registered player
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub id: ParticipantId,
    pub nick: String,
    pub public_key: PublicKey,
    pub disqualified: bool,
    pub committed_card: Option<Vec<u64>>,
    pub shuffled_deck: Option<Vec<Blob>>,
    pub sym_key: Option<SymmetricKey>,
}

impl RosterEntry {
    fn new(id: ParticipantId, nick: String, public_key: PublicKey) -> Self {
        Self {
            id,
            nick,
            public_key,
            disqualified: false,
            committed_card: None,
            shuffled_deck: None,
            sym_key: None,
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            nick: self.nick.clone(),
            public_key: self.public_key,
            disqualified: self.disqualified,
            committed_card: self.committed_card.clone(),
        }
    }
}

/// Registered players. Ids start at 1, grow strictly and are never handed out twice.
#[derive(Debug, Clone)]
pub struct Roster {
    entries: BTreeMap<ParticipantId, RosterEntry>,
    next_id: u32,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Assign the next id to a new player
    pub fn register(&mut self, nick: &str, public_key: PublicKey) -> ParticipantId {
        let id = ParticipantId::new(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, RosterEntry::new(id, nick.to_string(), public_key));
        id
    }

    /// Record a player under an id assigned elsewhere. The id must be fresh.
    pub fn insert_assigned(&mut self, id: ParticipantId, nick: &str, public_key: PublicKey) -> PokerResult<()> {
        if id.is_caller() || id.value() < self.next_id {
            return Err(PokerError::violation(format!("participant id {} is not fresh", id)));
        }
        self.next_id = id.value() + 1;
        self.entries.insert(id, RosterEntry::new(id, nick.to_string(), public_key));
        Ok(())
    }

    /// Forget a player that left before the game started. Its id stays burnt.
    pub fn remove(&mut self, id: ParticipantId) -> Option<RosterEntry> {
        self.entries.remove(&id)
    }

    /// Mark `id` disqualified. Returns true only on the first call for an active player.
    pub fn disqualify(&mut self, id: ParticipantId) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if !entry.disqualified => {
                entry.disqualified = true;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: ParticipantId) -> Option<&RosterEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut RosterEntry> {
        self.entries.get_mut(&id)
    }

    pub fn is_active(&self, id: ParticipantId) -> bool {
        self.entries.get(&id).is_some_and(|entry| !entry.disqualified)
    }

    /// Non-disqualified ids in registration order
    pub fn active_ids(&self) -> Vec<ParticipantId> {
        self.entries
            .values()
            .filter(|entry| !entry.disqualified)
            .map(|entry| entry.id)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.entries.values().filter(|entry| !entry.disqualified).count()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn public_keys(&self) -> BTreeMap<ParticipantId, PublicKey> {
        self.entries.values().map(|entry| (entry.id, entry.public_key)).collect()
    }

    pub fn players_info(&self) -> BTreeMap<ParticipantId, PlayerInfo> {
        self.entries.values().map(|entry| (entry.id, entry.info())).collect()
    }

    /// Committed cards of every active player
    pub fn active_cards(&self) -> BTreeMap<ParticipantId, Vec<u64>> {
        self.entries
            .values()
            .filter(|entry| !entry.disqualified)
            .filter_map(|entry| entry.committed_card.clone().map(|card| (entry.id, card)))
            .collect()
    }
}
