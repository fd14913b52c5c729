//! Registration policy: quota, nicknames and certificate-backed identities

use std::sync::Arc;

use mental_poker::client::{Caller, Participant, Player, SessionOutcome};
use mental_poker::playing_area::AreaSettings;
use mental_poker::security::{CertificateAuthority, CertificateValidator};
use mental_poker::{PokerError, SigningKey};

use crate::mocks::MockTable;

fn certified_settings(authority: &CertificateAuthority, allow_list: Vec<u64>) -> AreaSettings {
    let validator: Arc<dyn CertificateValidator> = Arc::new(authority.validator());
    AreaSettings {
        require_certificate: true,
        allow_list,
        certificate_validator: Some(validator),
        ..Default::default()
    }
}

#[test]
fn test_certified_participants_play() {
    let authority = CertificateAuthority::new();
    let caller_card = authority.issue("Dealer", 7, SigningKey::generate()).unwrap();
    let player_card = authority.issue("Alice", 8, SigningKey::generate()).unwrap();

    let caller = Caller::new("dealer", caller_card.signing_key().clone(), 8, 1)
        .unwrap()
        .with_identity_card(Arc::new(caller_card));
    let player = Player::new("alice", player_card.signing_key().clone()).with_identity_card(Arc::new(player_card));

    let mut table = MockTable::new(certified_settings(&authority, vec![7, 8]), caller, vec![player]);
    table.play();

    assert!(table.errors.is_empty(), "participants failed: {:?}", table.errors);
    assert_eq!(table.area.caller_nick(), Some("dealer"));
    assert!(matches!(table.caller.outcome(), Some(SessionOutcome::Finished { .. })));
}

#[test]
fn test_uncertified_or_unlisted_players_are_refused() {
    let authority = CertificateAuthority::new();
    let caller_card = authority.issue("Dealer", 7, SigningKey::generate()).unwrap();
    let stranger_card = authority.issue("Eve", 99, SigningKey::generate()).unwrap();

    let caller = Caller::new("dealer", caller_card.signing_key().clone(), 8, 1)
        .unwrap()
        .with_identity_card(Arc::new(caller_card));
    let plain = Player::new("bob", SigningKey::generate());
    let stranger = Player::new("eve", stranger_card.signing_key().clone()).with_identity_card(Arc::new(stranger_card));

    let mut table = MockTable::new(certified_settings(&authority, vec![7]), caller, vec![plain, stranger]);
    table.play();

    for index in 0..2 {
        let err = &table.errors[&MockTable::player_connection(index)];
        assert!(matches!(err, PokerError::RegistrationRejected { .. }), "unexpected {:?}", err);
    }
    assert!(table.area.roster().is_empty());
    assert_eq!(table.caller.outcome(), None);
}

#[test]
fn test_bad_nickname_is_refused() {
    let caller = Caller::new("dealer", SigningKey::generate(), 8, 1).unwrap();
    let player = Player::new(" <script>", SigningKey::generate());
    let mut table = MockTable::new(AreaSettings::default(), caller, vec![player]);
    table.play();

    assert!(matches!(
        table.errors.get(&MockTable::player_connection(0)),
        Some(PokerError::RegistrationRejected { .. })
    ));
}

#[test]
fn test_late_player_is_ignored_after_the_game() {
    let caller = Caller::new("dealer", SigningKey::generate(), 8, 1).unwrap();
    let players = vec![
        Player::new("alice", SigningKey::generate()),
        Player::new("late", SigningKey::generate()),
    ];
    let mut table = MockTable::new(AreaSettings::default(), caller, players);
    table.play();

    // The first player completes a whole game before the second one knocks
    assert!(matches!(table.players[0].outcome(), Some(SessionOutcome::Finished { .. })));
    assert!(table.players[1].id().is_none());
    assert_eq!(table.area.roster().len(), 1);
}
