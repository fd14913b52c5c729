//! Integration tests for complete games

pub mod game_tests;
pub mod registration_tests;
pub mod tcp_tests;
