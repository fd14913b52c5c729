//! Mental poker - a card game played without a trusted dealer
//!
//! A Caller, a set of Players and a relaying Playing Area jointly shuffle an
//! onion-encrypted deck:
//! - every party adds its own symmetric layer and permutes the deck
//! - cards are committed before any key is revealed
//! - every party peels the published layers itself and flags inconsistencies
//! - all traffic is signed by its originator and recorded in a hash-chained audit log

pub mod client;
pub mod config;
pub mod error;
pub mod game;
pub mod observability;
pub mod playing_area;
pub mod protocol;
pub mod security;

// Re-export commonly used types for convenience
pub use error::{PokerError, PokerResult};

// Wire format
pub use protocol::{Envelope, FrameCodec, Message, ParticipantId, Payload, Role, Stage};

// Roles
pub use client::{run_session, Behavior, Caller, Participant, Player, SessionOutcome};
pub use playing_area::{PlayingArea, PlayingAreaServer};

// Keys and identities
pub use security::{PublicKey, SigningKey, SymmetricKey};

// Configuration interfaces
pub use config::{GameConfig, NetworkConfig, PokerConfig};
