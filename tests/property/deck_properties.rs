//! Property-based tests for the onion-encrypted deck and the winner search

use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::seq::SliceRandom;

use mental_poker::game::deck::{
    encrypt_layer, encrypt_plaintext, generate_plaintext, is_permutation_of_range, reencrypt_and_shuffle,
};
use mental_poker::game::{find_winners, peel};
use mental_poker::protocol::{Blob, LayerEntry};
use mental_poker::{ParticipantId, SymmetricKey};

/// Deck sizes the protocol accepts, kept small so encryption stays cheap
fn arb_deck_size() -> impl Strategy<Value = usize> {
    (1usize..=8).prop_map(|quarters| quarters * 4)
}

/// Build the layer bundle a Caller would publish. `tamper` names a player
/// whose layer duplicates one element instead of re-encrypting it.
fn build_bundle(
    deck_size: usize,
    players: u32,
    tamper: Option<u32>,
) -> (BTreeMap<ParticipantId, LayerEntry>, Vec<Blob>) {
    let mut rng = rand::thread_rng();
    let caller_key = SymmetricKey::generate();
    let plaintext = generate_plaintext(deck_size, &mut rng);
    let mut deck = encrypt_plaintext(&plaintext, &caller_key).unwrap();

    let mut decks = BTreeMap::new();
    decks.insert(
        ParticipantId::CALLER,
        LayerEntry {
            deck: deck.clone(),
            sym_key: Some(caller_key),
        },
    );

    for id in 1..=players {
        let key = SymmetricKey::generate();
        deck = if tamper == Some(id) {
            let mut layer = encrypt_layer(&deck, &key).unwrap();
            layer[0] = Blob::new(key.encrypt(deck[1].as_bytes()).unwrap());
            layer.shuffle(&mut rng);
            layer
        } else {
            reencrypt_and_shuffle(&deck, &key, &mut rng).unwrap()
        };
        decks.insert(
            ParticipantId::new(id),
            LayerEntry {
                deck: deck.clone(),
                sym_key: Some(key),
            },
        );
    }
    (decks, deck)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_honest_chain_recovers_a_permutation(deck_size in arb_deck_size(), players in 1u32..=4) {
        let (decks, signed) = build_bundle(deck_size, players, None);
        let report = peel(&decks, &signed, deck_size);

        prop_assert!(report.is_clean());
        let plaintext = report.plaintext().expect("plaintext recovered");
        prop_assert!(is_permutation_of_range(plaintext, deck_size));
    }

    #[test]
    fn prop_tampered_layer_flags_only_its_owner(
        deck_size in arb_deck_size(),
        (players, tamper) in (2u32..=4).prop_flat_map(|players| (Just(players), 1..=players)),
    ) {
        let (decks, signed) = build_bundle(deck_size, players, Some(tamper));
        let report = peel(&decks, &signed, deck_size);

        let cheaters: Vec<ParticipantId> = report.cheaters().iter().copied().collect();
        prop_assert_eq!(cheaters, vec![ParticipantId::new(tamper)]);
        prop_assert!(report.plaintext().is_some());
    }

    #[test]
    fn prop_missing_key_layer_is_skipped(deck_size in arb_deck_size(), players in 2u32..=4) {
        let (mut decks, signed) = build_bundle(deck_size, players, None);
        let silent = ParticipantId::new(players / 2 + 1);
        if let Some(entry) = decks.get_mut(&silent) {
            entry.sym_key = None;
        }

        let report = peel(&decks, &signed, deck_size);
        prop_assert!(!report.caller_implicated());
        prop_assert!(!report.cheaters().contains(&silent));
    }

    #[test]
    fn prop_winner_search_is_deterministic_and_read_only(
        deck in Just((0u64..16).collect::<Vec<_>>()).prop_shuffle(),
        cards in prop::collection::btree_map(1u32..6, prop::sample::subsequence((0u64..16).collect::<Vec<_>>(), 4), 1..5),
    ) {
        let cards: BTreeMap<ParticipantId, Vec<u64>> =
            cards.into_iter().map(|(id, card)| (ParticipantId::new(id), card)).collect();
        let snapshot = cards.clone();

        let first = find_winners(&deck, &cards);
        let second = find_winners(&deck, &cards);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&cards, &snapshot);

        // Every card is emptied by the full deck, so someone always wins
        prop_assert!(!first.is_empty());

        // Winners are emptied by the same draw, and nobody is emptied earlier
        let position = |value: &u64| deck.iter().position(|drawn| drawn == value).unwrap();
        let finish = |card: &Vec<u64>| card.iter().map(position).max().unwrap();
        let winning_draw = finish(&cards[&first[0]]);
        for (id, card) in &cards {
            let done = finish(card);
            prop_assert!(done >= winning_draw);
            prop_assert_eq!(first.contains(id), done == winning_draw);
        }
    }
}
