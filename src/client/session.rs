//! Drive a [`Participant`] over a TCP connection to the Playing Area

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use crate::client::console::{render_players_list, ConsoleCommand};
use crate::client::{Participant, SessionOutcome};
use crate::error::{NetworkError, PokerError, PokerResult};
use crate::protocol::FrameCodec;

/// Connect to `address`, register and play until the participant is done.
///
/// Console commands, when a receiver is given, are served between messages.
/// Fatal protocol errors end the session with `Err`.
pub async fn run_session<P: Participant>(
    participant: &mut P,
    address: &str,
    max_frame_bytes: usize,
    mut console: Option<mpsc::UnboundedReceiver<ConsoleCommand>>,
) -> PokerResult<SessionOutcome> {
    let stream = TcpStream::connect(address).await.map_err(|e| PokerError::Network {
        source: NetworkError::ConnectionFailed { message: e.to_string() },
        context: format!("connecting to {}", address),
    })?;
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, FrameCodec::new(max_frame_bytes));
    info!(nick = participant.nick(), role = ?participant.role(), address, "Connected to the playing area");

    framed.send(participant.registration()?).await?;

    loop {
        tokio::select! {
            frame = framed.next() => {
                let envelope = match frame {
                    Some(Ok(envelope)) => envelope,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return match participant.outcome() {
                            Some(outcome) => Ok(outcome),
                            None => Err(PokerError::Network {
                                source: NetworkError::ConnectionClosed,
                                context: "playing area closed the connection".to_string(),
                            }),
                        };
                    }
                };

                for reply in participant.handle(envelope)? {
                    framed.send(reply).await?;
                }
                if let Some(players) = participant.take_players_list() {
                    println!("{}", render_players_list(&players));
                }
                if let Some(outcome) = participant.outcome() {
                    info!(outcome = ?outcome, "Session finished");
                    return Ok(outcome);
                }
            }
            Some(command) = next_command(&mut console) => match command {
                ConsoleCommand::PlayersList => match participant.players_list_request() {
                    Ok(request) => framed.send(request).await?,
                    Err(e) => warn!(error = %e, "Players list is not available yet"),
                },
                ConsoleCommand::AuditLog => println!("{}", participant.audit().render()),
                ConsoleCommand::Exit => {
                    info!("Leaving on operator request");
                    return Ok(SessionOutcome::Aborted {
                        reason: "operator exit".to_string(),
                    });
                }
            },
        }
    }
}

async fn next_command(console: &mut Option<mpsc::UnboundedReceiver<ConsoleCommand>>) -> Option<ConsoleCommand> {
    match console {
        Some(rx) => match rx.recv().await {
            Some(command) => Some(command),
            None => {
                *console = None;
                std::future::pending().await
            }
        },
        None => std::future::pending().await,
    }
}
