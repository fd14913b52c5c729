//! Playing cards: drawing and validation

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rand::seq::index;
use rand::Rng;

use crate::protocol::ParticipantId;

/// A card holds a quarter of the deck
pub fn card_size(deck_size: usize) -> usize {
    deck_size / 4
}

/// Draw an honest card: `N/4` distinct values from `0..N`
pub fn draw_card<R: Rng + ?Sized>(deck_size: usize, rng: &mut R) -> Vec<u64> {
    draw_values(deck_size, card_size(deck_size), rng)
}

/// Draw a card that is too small to be valid
pub fn draw_short_card<R: Rng + ?Sized>(deck_size: usize, rng: &mut R) -> Vec<u64> {
    let size = (deck_size / 8).max(1).min(card_size(deck_size).saturating_sub(1));
    draw_values(deck_size, size, rng)
}

fn draw_values<R: Rng + ?Sized>(deck_size: usize, amount: usize, rng: &mut R) -> Vec<u64> {
    let mut card: Vec<u64> = index::sample(rng, deck_size, amount.min(deck_size))
        .into_iter()
        .map(|i| i as u64)
        .collect();
    card.sort_unstable();
    card
}

/// Reason a card is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardIssue {
    WrongSize { expected: usize, actual: usize },
    Duplicate(u64),
    OutOfRange(u64),
}

impl fmt::Display for CardIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardIssue::WrongSize { expected, actual } => {
                write!(f, "card holds {} values, expected {}", actual, expected)
            }
            CardIssue::Duplicate(value) => write!(f, "card repeats value {}", value),
            CardIssue::OutOfRange(value) => write!(f, "card value {} is outside the deck", value),
        }
    }
}

/// Check cardinality, distinctness and range
pub fn validate_card(card: &[u64], deck_size: usize) -> Result<(), CardIssue> {
    let expected = card_size(deck_size);
    if card.len() != expected {
        return Err(CardIssue::WrongSize {
            expected,
            actual: card.len(),
        });
    }

    let mut seen = BTreeSet::new();
    for value in card {
        if *value >= deck_size as u64 {
            return Err(CardIssue::OutOfRange(*value));
        }
        if !seen.insert(*value) {
            return Err(CardIssue::Duplicate(*value));
        }
    }
    Ok(())
}

/// Ids whose card is invalid, skipping `exclude` (a validator never judges itself)
pub fn invalid_cards(
    cards: &BTreeMap<ParticipantId, Vec<u64>>,
    deck_size: usize,
    exclude: Option<ParticipantId>,
) -> Vec<ParticipantId> {
    cards
        .iter()
        .filter(|(id, _)| Some(**id) != exclude)
        .filter(|(_, card)| validate_card(card, deck_size).is_err())
        .map(|(id, _)| *id)
        .collect()
}
