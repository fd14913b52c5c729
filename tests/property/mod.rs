//! Property-based tests

pub mod deck_properties;
pub mod protocol_properties;
pub mod roster_properties;
