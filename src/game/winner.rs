//! Winner search over the plaintext deck

use std::collections::{BTreeMap, BTreeSet};

use crate::protocol::ParticipantId;

/// Draw the deck in order, striking each value from every card holding it.
///
/// The first draw that empties at least one card ends the search; every card
/// emptied by that draw wins. Inputs are only read, so the Caller and each
/// Player can replay the search on the same data.
pub fn find_winners(deck: &[u64], cards: &BTreeMap<ParticipantId, Vec<u64>>) -> Vec<ParticipantId> {
    let mut remaining: BTreeMap<ParticipantId, BTreeSet<u64>> = cards
        .iter()
        .map(|(id, card)| (*id, card.iter().copied().collect()))
        .collect();

    for number in deck {
        let mut winners = Vec::new();
        for (id, card) in remaining.iter_mut() {
            if card.remove(number) && card.is_empty() {
                winners.push(*id);
            }
        }
        if !winners.is_empty() {
            return winners;
        }
    }
    Vec::new()
}
