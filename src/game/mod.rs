//! Game logic shared by every role: deck layers, cards, peeling, winners and the roster

pub mod card;
pub mod deck;
pub mod decryption;
pub mod roster;
pub mod winner;

pub use card::{card_size, draw_card, validate_card, CardIssue};
pub use decryption::{peel, DecryptionReport};
pub use roster::{Roster, RosterEntry};
pub use winner::find_winners;
