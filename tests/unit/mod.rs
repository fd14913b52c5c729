//! Unit tests against the public API

pub mod audit_tests;
pub mod card_tests;
pub mod config_tests;
pub mod wire_format_tests;
