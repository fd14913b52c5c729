//! Sequential peeling of the onion-encrypted deck with per-layer consistency checks
//!
//! Layers are removed in descending id order, the Caller's (id 0) last. Before a
//! layer is peeled, the deck obtained by peeling the layer above it must hold
//! exactly the same elements as the deck its owner published; a mismatch
//! implicates the owner of the layer above. The same function runs on the
//! Caller and on every Player, so honest parties reach the same verdict.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::game::deck::{is_permutation_of_range, same_multiset};
use crate::protocol::{Blob, LayerEntry, ParticipantId};

/// Outcome of a full peel. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionReport {
    plaintext: Option<Vec<u64>>,
    cheaters: BTreeSet<ParticipantId>,
}

impl DecryptionReport {
    /// The authoritative plaintext deck, absent when the Caller layer is broken
    pub fn plaintext(&self) -> Option<&[u64]> {
        self.plaintext.as_deref()
    }

    pub fn cheaters(&self) -> &BTreeSet<ParticipantId> {
        &self.cheaters
    }

    pub fn is_clean(&self) -> bool {
        self.cheaters.is_empty()
    }

    pub fn caller_implicated(&self) -> bool {
        self.cheaters.contains(&ParticipantId::CALLER)
    }
}

/// Peel every layer of `decks` starting from `signed_deck`.
///
/// `decks` maps each layer owner to the deck as it left that owner and the key
/// it used. Layers whose key is missing are skipped together with the check
/// against the layer below them.
pub fn peel(decks: &BTreeMap<ParticipantId, LayerEntry>, signed_deck: &[Blob], deck_size: usize) -> DecryptionReport {
    let mut cheaters = BTreeSet::new();

    if !decks.contains_key(&ParticipantId::CALLER) {
        warn!("Deck bundle has no caller layer");
        cheaters.insert(ParticipantId::CALLER);
        return DecryptionReport { plaintext: None, cheaters };
    }

    let ids: Vec<ParticipantId> = decks.keys().rev().copied().collect();
    let top = ids[0];
    let top_deck = &decks[&top].deck;
    let mut current: Option<Vec<Blob>> = if top_deck.as_slice() == signed_deck {
        Some(signed_deck.to_vec())
    } else {
        warn!(id = %top, "Top layer differs from the signed final deck");
        cheaters.insert(top);
        Some(top_deck.clone())
    };
    let mut peeled_by: Option<ParticipantId> = None;
    let mut plaintext = None;

    for id in ids {
        let entry = &decks[&id];
        let layer = match (current.take(), peeled_by) {
            (Some(peeled), Some(upper)) => {
                if same_multiset(&peeled, &entry.deck) {
                    peeled
                } else {
                    warn!(cheater = %upper, layer = %id, "Deck changed across a shuffle layer");
                    cheaters.insert(upper);
                    entry.deck.clone()
                }
            }
            (Some(first), None) => first,
            (None, _) => entry.deck.clone(),
        };

        let Some(key) = &entry.sym_key else {
            debug!(id = %id, "Layer has no key, skipping");
            if id.is_caller() {
                cheaters.insert(id);
            }
            peeled_by = None;
            continue;
        };

        if id.is_caller() {
            let numbers: Result<Vec<u64>, _> = layer.iter().map(|blob| key.decrypt_number(blob.as_bytes())).collect();
            match numbers {
                Ok(numbers) if is_permutation_of_range(&numbers, deck_size) => plaintext = Some(numbers),
                Ok(_) => {
                    warn!("Plaintext deck is not a permutation of the card values");
                    cheaters.insert(id);
                }
                Err(_) => {
                    warn!("Caller layer does not decrypt under the caller key");
                    cheaters.insert(id);
                }
            }
            break;
        }

        let decrypted: Result<Vec<Blob>, _> = layer
            .iter()
            .map(|blob| key.decrypt(blob.as_bytes()).map(Blob::new))
            .collect();
        match decrypted {
            Ok(decrypted) => {
                current = Some(decrypted);
                peeled_by = Some(id);
            }
            Err(_) => {
                warn!(id = %id, "Layer does not decrypt under its owner's key");
                cheaters.insert(id);
                peeled_by = None;
            }
        }
    }

    DecryptionReport { plaintext, cheaters }
}
