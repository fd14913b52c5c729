//! The Playing Area: registration, relaying, verification rounds and audit

pub mod server;
pub mod state;

pub use server::PlayingAreaServer;
pub use state::{Action, AreaSettings, ConnectionId, PlayingArea};
