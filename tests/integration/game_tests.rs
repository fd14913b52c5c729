//! Complete games over the in-memory network

use std::time::Duration;

use mental_poker::client::{Behavior, Caller, Participant, Player, SessionOutcome};
use mental_poker::game::find_winners;
use mental_poker::playing_area::AreaSettings;
use mental_poker::{ParticipantId, Payload, PokerError, SigningKey};

use crate::mocks::{MockTable, Traffic};

fn id(value: u32) -> ParticipantId {
    ParticipantId::new(value)
}

fn table_with(deck_size: usize, players: Vec<Player>) -> MockTable {
    let caller = Caller::new("dealer", SigningKey::generate(), deck_size, players.len() as u32).unwrap();
    MockTable::new(AreaSettings::default(), caller, players)
}

fn player(nick: &str, behavior: Behavior) -> Player {
    Player::new(nick, SigningKey::generate()).with_behavior(behavior)
}

fn finished_winners(outcome: Option<SessionOutcome>) -> Vec<ParticipantId> {
    match outcome {
        Some(SessionOutcome::Finished { winners }) => winners,
        other => panic!("game did not finish: {:?}", other),
    }
}

#[test]
fn test_honest_game_reaches_agreement() {
    let mut table = MockTable::honest(8, 3);
    table.play();

    assert!(table.area_error.is_none(), "area failed: {:?}", table.area_error);
    assert!(table.errors.is_empty(), "participants failed: {:?}", table.errors);

    let winners = table.area.winners().expect("winners acknowledged").to_vec();
    assert!(!winners.is_empty());
    assert_eq!(finished_winners(table.caller.outcome()), winners);
    for player in &table.players {
        assert_eq!(finished_winners(player.outcome()), winners);
        assert_eq!(player.claim(), winners.as_slice());
        assert!(player.report().unwrap().is_clean());
    }

    let report = table.caller.report().unwrap();
    assert!(report.is_clean());
    let expected = find_winners(report.plaintext().unwrap(), &table.caller.roster().active_cards());
    assert_eq!(expected, winners);
}

#[test]
fn test_every_audit_chain_verifies() {
    let mut table = MockTable::honest(8, 2);
    table.play();

    assert!(table.area.audit().verify_chain());
    assert!(table.caller.audit().verify_chain());
    for player in &table.players {
        assert!(player.audit().verify_chain());
        assert!(!player.audit().is_empty());
    }
}

#[test]
fn test_short_card_is_disqualified_before_the_deck_round() {
    let mut table = table_with(
        8,
        vec![
            player("alice", Behavior::Honest),
            player("mallory", Behavior::ShortCard),
            player("carol", Behavior::Honest),
        ],
    );
    table.play();

    assert!(table.area_error.is_none(), "area failed: {:?}", table.area_error);
    assert_eq!(table.players[1].outcome(), Some(SessionOutcome::Disqualified));
    assert!(!table.area.roster().is_active(id(2)));
    assert!(table.area.roster().get(id(2)).unwrap().sym_key.is_none());
    assert!(table.caller.confessions().contains(&id(2)));

    // The layer without key is skipped, nobody else is implicated
    assert!(table.caller.report().unwrap().is_clean());

    let winners = finished_winners(table.caller.outcome());
    assert!(!winners.contains(&id(2)));
    assert_eq!(finished_winners(table.players[0].outcome()), winners);
    assert_eq!(finished_winners(table.players[2].outcome()), winners);

    // Both honest players rejected the short card
    for index in [0, 2] {
        let connection = MockTable::player_connection(index);
        let rejected = table.traffic.iter().any(|traffic| match traffic {
            Traffic::ToArea(from, envelope) if *from == connection => matches!(
                envelope.payload(),
                Payload::VerifyCardNok { invalid_ids } if invalid_ids.contains(&id(2))
            ),
            _ => false,
        });
        assert!(rejected, "player {} did not report the short card", index);
    }

    // The Caller's verdict reaches the table before any key is asked for
    let position = |wanted: &dyn Fn(&Traffic) -> bool| table.traffic.iter().position(|traffic| wanted(traffic));
    let verdict = position(&|traffic| {
        matches!(traffic, Traffic::ToArea(from, _) if *from == MockTable::caller_connection())
            && matches!(
                traffic.envelope().payload(),
                Payload::Disqualify { disqualified_id } if *disqualified_id == id(2)
            )
    })
    .expect("the Caller never disqualified the short card");
    let first_key_request = position(&|traffic| matches!(traffic.envelope().payload(), Payload::AskSymKeys))
        .expect("keys were never asked for");
    assert!(verdict < first_key_request);
    for index in [0, 2] {
        let connection = MockTable::player_connection(index);
        let told = position(&|traffic| {
            matches!(traffic, Traffic::ToPeer(to, envelope)
                if *to == connection
                    && matches!(envelope.payload(), Payload::Disqualify { disqualified_id } if *disqualified_id == id(2)))
        })
        .expect("the disqualification was not relayed");
        assert!(told < first_key_request);
    }
}

#[test]
fn test_tampered_layer_flags_exactly_its_owner() {
    let mut table = table_with(
        8,
        vec![
            player("alice", Behavior::Honest),
            player("mallory", Behavior::TamperDeck),
            player("carol", Behavior::Honest),
        ],
    );
    table.play();

    assert!(table.area_error.is_none(), "area failed: {:?}", table.area_error);
    let report = table.caller.report().unwrap();
    assert_eq!(report.cheaters().iter().copied().collect::<Vec<_>>(), vec![id(2)]);
    for index in [0, 2] {
        let cheaters = table.players[index].report().unwrap().cheaters().clone();
        assert_eq!(cheaters.into_iter().collect::<Vec<_>>(), vec![id(2)]);
    }

    assert_eq!(table.players[1].outcome(), Some(SessionOutcome::Disqualified));
    let winners = finished_winners(table.caller.outcome());
    assert!(!winners.contains(&id(2)));
    assert_eq!(finished_winners(table.players[0].outcome()), winners);
}

#[test]
fn test_false_winner_is_disqualified() {
    // Identical cards always tie, so a lone claim is always wrong
    let mut table = table_with(
        8,
        vec![
            player("alice", Behavior::Honest).with_fixed_card(vec![0, 1]),
            player("mallory", Behavior::FalseWinner).with_fixed_card(vec![0, 1]),
        ],
    );
    table.play();

    assert!(table.area_error.is_none(), "area failed: {:?}", table.area_error);
    assert_eq!(table.players[0].claim(), &[id(1), id(2)]);
    assert_eq!(table.players[1].claim(), &[id(2)]);
    assert!(!table.area.roster().is_active(id(2)));

    assert_eq!(finished_winners(table.caller.outcome()), vec![id(1)]);
    assert_eq!(table.area.winners(), Some(&[id(1)][..]));
    assert_eq!(finished_winners(table.players[0].outcome()), vec![id(1)]);
}

#[test]
fn test_silent_player_times_out_and_the_game_continues() {
    let mut table = MockTable::honest(8, 3);
    table.mute(1);
    table.play();
    assert!(table.area.winners().is_none());
    assert_eq!(table.area.phase_name(), "shuffle");

    table.tick(Duration::from_secs(31));

    assert!(table.area_error.is_none(), "area failed: {:?}", table.area_error);
    assert!(!table.area.roster().is_active(id(2)));
    let winners = table.area.winners().expect("game finished").to_vec();
    assert!(!winners.contains(&id(2)));
    assert_eq!(finished_winners(table.caller.outcome()), winners);
    assert_eq!(finished_winners(table.players[2].outcome()), winners);
}

#[test]
fn test_losing_every_player_ends_with_quorum_loss() {
    let mut table = MockTable::honest(8, 1);
    table.mute(0);
    table.play();
    table.tick(Duration::from_secs(31));

    assert!(matches!(table.area_error, Some(PokerError::QuorumLost)));
    assert!(table.area.winners().is_none());
}

#[test]
fn test_players_list_reports_disqualification() {
    let mut table = table_with(
        8,
        vec![player("alice", Behavior::Honest), player("mallory", Behavior::ShortCard)],
    );
    table.play();

    let players = table.area.roster().players_info();
    assert_eq!(players.len(), 2);
    assert!(!players[&id(1)].disqualified);
    assert!(players[&id(2)].disqualified);
    assert_eq!(players[&id(2)].nick, "mallory");
    assert!(players[&id(2)].committed_card.is_some());
}
