//! End-to-end game over real sockets

use std::time::Duration;

use tokio::net::TcpListener;

use mental_poker::client::{run_session, Caller, Player, SessionOutcome};
use mental_poker::playing_area::{AreaSettings, PlayingArea, PlayingAreaServer};
use mental_poker::protocol::codec::DEFAULT_MAX_FRAME_BYTES;
use mental_poker::SigningKey;

#[tokio::test]
async fn test_game_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let area = PlayingArea::new(SigningKey::generate(), AreaSettings::default()).unwrap();
    let server = PlayingAreaServer::from_parts(listener, area, DEFAULT_MAX_FRAME_BYTES);
    let address = server.local_addr().unwrap().to_string();
    let server = tokio::spawn(server.run());

    let caller_address = address.clone();
    let caller = tokio::spawn(async move {
        let mut caller = Caller::new("dealer", SigningKey::generate(), 8, 2).unwrap();
        run_session(&mut caller, &caller_address, DEFAULT_MAX_FRAME_BYTES, None).await
    });

    // Players are refused until a caller has registered
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut players = Vec::new();
    for nick in ["alice", "bob"] {
        let address = address.clone();
        players.push(tokio::spawn(async move {
            let mut player = Player::new(nick, SigningKey::generate());
            run_session(&mut player, &address, DEFAULT_MAX_FRAME_BYTES, None).await
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let winners = tokio::time::timeout(Duration::from_secs(20), server)
        .await
        .expect("server finished in time")
        .unwrap()
        .unwrap();
    assert!(!winners.is_empty());

    let caller_outcome = tokio::time::timeout(Duration::from_secs(5), caller)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(caller_outcome, SessionOutcome::Finished { winners: winners.clone() });

    for player in players {
        let outcome = tokio::time::timeout(Duration::from_secs(5), player)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, SessionOutcome::Finished { winners: winners.clone() });
    }
}

#[tokio::test]
async fn test_connect_failure_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let mut player = Player::new("alice", SigningKey::generate());
    let err = run_session(&mut player, &address, DEFAULT_MAX_FRAME_BYTES, None)
        .await
        .unwrap_err();
    assert!(matches!(err, mental_poker::PokerError::Network { .. }));
}
