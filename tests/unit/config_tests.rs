//! Configuration loading and validation

use std::io::Write;

use tempfile::NamedTempFile;

use mental_poker::config::{validate_deck_size, MAX_DECK_SIZE};
use mental_poker::{PokerConfig, PokerError};

#[test]
fn test_minimal_toml_uses_defaults_for_optional_sections() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[network]
bind_address = "0.0.0.0"
port = 6000
max_frame_bytes = 65536
round_trip_timeout_secs = 10

[game]
deck_size = 12
players = 3
max_players = 4
"#
    )
    .unwrap();

    let config = PokerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.network.address(), "0.0.0.0:6000");
    assert_eq!(config.game.deck_size, 12);
    assert!(config.audit.log_path.is_none());
    assert!(!config.identity.require_certificate);
    assert!(config.identity.allow_list.is_empty());
}

#[test]
fn test_invalid_file_reports_the_field() {
    let mut file = NamedTempFile::new().unwrap();
    let mut config = PokerConfig::development();
    config.game.deck_size = 10;
    let content = toml::to_string_pretty(&config).unwrap();
    file.write_all(content.as_bytes()).unwrap();

    match PokerConfig::from_file(file.path()) {
        Err(PokerError::Configuration { field, .. }) => assert_eq!(field, "game.deck_size"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_missing_file_is_a_configuration_error() {
    let err = PokerConfig::from_file("/nonexistent/mental-poker.toml").unwrap_err();
    assert!(matches!(err, PokerError::Configuration { .. }));
}

#[test]
fn test_deck_size_bounds() {
    assert!(validate_deck_size(4).is_ok());
    assert!(validate_deck_size(MAX_DECK_SIZE).is_ok());
    assert!(validate_deck_size(MAX_DECK_SIZE + 4).is_err());
    assert!(validate_deck_size(14).is_err());
}
