//! Operator console: `1` players list, `2` audit log, `3` exit

use std::collections::BTreeMap;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::protocol::{ParticipantId, PlayerInfo};

pub const MENU: &str = "1) players list  2) audit log  3) exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    PlayersList,
    AuditLog,
    Exit,
}

impl ConsoleCommand {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(ConsoleCommand::PlayersList),
            "2" => Some(ConsoleCommand::AuditLog),
            "3" => Some(ConsoleCommand::Exit),
            _ => None,
        }
    }
}

/// Read commands from stdin until it closes or the receiver is dropped
pub fn spawn_stdin_console() -> mpsc::UnboundedReceiver<ConsoleCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match ConsoleCommand::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("{}", MENU),
            }
        }
    });
    rx
}

/// One line per registered player
pub fn render_players_list(players: &BTreeMap<ParticipantId, PlayerInfo>) -> String {
    let mut out = String::new();
    for (id, info) in players {
        let status = if info.disqualified { "disqualified" } else { "active" };
        let card = info
            .committed_card
            .as_ref()
            .map(|card| format!("{:?}", card))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("{:>3}  {:<16} {:<12} card={} key={}\n", id, info.nick, status, card, info.public_key));
    }
    out
}
