//! Card validation and the winner search

use std::collections::BTreeMap;

use mental_poker::game::card::invalid_cards;
use mental_poker::game::{card_size, draw_card, find_winners, validate_card, CardIssue};
use mental_poker::ParticipantId;

fn id(value: u32) -> ParticipantId {
    ParticipantId::new(value)
}

#[test]
fn test_card_holds_a_quarter_of_the_deck() {
    assert_eq!(card_size(4), 1);
    assert_eq!(card_size(60), 15);
    assert_eq!(card_size(100), 25);
}

#[test]
fn test_validation_edge_cases() {
    assert_eq!(validate_card(&[0, 7], 8), Ok(()));
    assert_eq!(
        validate_card(&[0], 8),
        Err(CardIssue::WrongSize { expected: 2, actual: 1 })
    );
    assert_eq!(validate_card(&[3, 3], 8), Err(CardIssue::Duplicate(3)));
    assert_eq!(validate_card(&[1, 8], 8), Err(CardIssue::OutOfRange(8)));
    assert!(validate_card(&[], 8).is_err());
}

#[test]
fn test_drawn_cards_are_sorted_and_valid() {
    let mut rng = rand::thread_rng();
    let card = draw_card(40, &mut rng);
    assert_eq!(validate_card(&card, 40), Ok(()));
    assert!(card.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_validator_never_judges_itself() {
    let mut cards = BTreeMap::new();
    cards.insert(id(1), vec![0]);
    cards.insert(id(2), vec![1, 2]);
    cards.insert(id(3), vec![4, 4]);

    assert_eq!(invalid_cards(&cards, 8, None), vec![id(1), id(3)]);
    assert_eq!(invalid_cards(&cards, 8, Some(id(1))), vec![id(3)]);
}

#[test]
fn test_first_emptied_card_wins() {
    let mut cards = BTreeMap::new();
    cards.insert(id(1), vec![0, 5]);
    cards.insert(id(2), vec![2, 3]);
    let deck = [3, 0, 2, 5, 1, 4, 6, 7];
    assert_eq!(find_winners(&deck, &cards), vec![id(2)]);
}

#[test]
fn test_simultaneous_winners_tie() {
    let mut cards = BTreeMap::new();
    cards.insert(id(1), vec![0, 1]);
    cards.insert(id(2), vec![1, 0]);
    cards.insert(id(3), vec![2, 3]);
    assert_eq!(find_winners(&[1, 0, 2, 3], &cards), vec![id(1), id(2)]);
}

#[test]
fn test_no_cards_no_winners() {
    assert!(find_winners(&[0, 1, 2, 3], &BTreeMap::new()).is_empty());
}
