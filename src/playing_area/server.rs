//! TCP front end of the Playing Area
//!
//! One control loop owns the [`PlayingArea`]. Each connection gets a reader
//! task that decodes frames and forwards them over a channel; writes happen on
//! the control loop, in the order the state machine asked for them.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::config::PokerConfig;
use crate::error::PokerResult;
use crate::observability::AuditLog;
use crate::playing_area::state::{Action, AreaSettings, ConnectionId, PlayingArea};
use crate::protocol::{CodecError, Envelope, FrameCodec, ParticipantId};
use crate::security::{PublicKey, SigningKey};

type Writer = SplitSink<Framed<TcpStream, FrameCodec>, Envelope>;

#[derive(Debug)]
enum ConnectionEvent {
    Frame(ConnectionId, Envelope),
    Closed(ConnectionId),
    Failed(ConnectionId, CodecError),
}

struct Connection {
    writer: Writer,
    reader: JoinHandle<()>,
}

/// Playing Area bound to a TCP listener
pub struct PlayingAreaServer {
    listener: TcpListener,
    area: PlayingArea,
    max_frame_bytes: usize,
    connections: HashMap<ConnectionId, Connection>,
    next_connection: u64,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl PlayingAreaServer {
    /// Bind to the configured address with a fresh signing key
    pub async fn bind(config: &PokerConfig) -> PokerResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.network.address()).await?;
        let audit = match &config.audit.log_path {
            Some(path) => AuditLog::with_file(path),
            None => AuditLog::new(),
        };
        let area = PlayingArea::new(SigningKey::generate(), AreaSettings::from_config(config)?)?.with_audit_log(audit);
        Ok(Self::from_parts(listener, area, config.network.max_frame_bytes))
    }

    pub fn from_parts(listener: TcpListener, area: PlayingArea, max_frame_bytes: usize) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            listener,
            area,
            max_frame_bytes,
            connections: HashMap::new(),
            next_connection: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn local_addr(&self) -> PokerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn public_key(&self) -> PublicKey {
        self.area.public_key()
    }

    /// Serve until the winners are acknowledged or the game is aborted
    pub async fn run(mut self) -> PokerResult<Vec<ParticipantId>> {
        info!(
            address = %self.local_addr()?,
            key = %self.area.public_key(),
            session = %self.area.session_id(),
            "Playing area listening"
        );

        loop {
            let deadline = self
                .area
                .next_deadline()
                .map(tokio::time::Instant::from_std)
                .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));

            let outcome = tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.accept(stream, peer),
                        Err(e) => warn!(error = %e, "Accept failed"),
                    }
                    continue;
                }
                Some(event) = self.events_rx.recv() => self.on_event(event),
                _ = tokio::time::sleep_until(deadline) => self.area.on_tick(Instant::now()),
            };

            let result = match outcome {
                Ok(actions) => self.execute(actions).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                self.shutdown();
                return Err(err);
            }

            if let Some(winners) = self.area.winners() {
                let winners = winners.to_vec();
                info!(winners = ?winners, "Game finished");
                self.shutdown();
                return Ok(winners);
            }
        }
    }

    fn accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = ConnectionId::new(self.next_connection);
        self.next_connection += 1;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }
        info!(connection = %id, peer = %peer, "Connection accepted");

        let framed = Framed::new(stream, FrameCodec::new(self.max_frame_bytes));
        let (writer, mut reader) = framed.split();
        let events = self.events_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(envelope) => {
                        if events.send(ConnectionEvent::Frame(id, envelope)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = events.send(ConnectionEvent::Failed(id, e));
                        return;
                    }
                }
            }
            let _ = events.send(ConnectionEvent::Closed(id));
        });
        self.connections.insert(id, Connection { writer, reader });
    }

    fn on_event(&mut self, event: ConnectionEvent) -> PokerResult<Vec<Action>> {
        match event {
            ConnectionEvent::Frame(id, envelope) => {
                debug!(connection = %id, command = envelope.command(), "Frame received");
                self.area.handle(id, envelope, Instant::now())
            }
            ConnectionEvent::Closed(id) => {
                info!(connection = %id, "Connection closed");
                self.drop_connection(id);
                self.area.connection_lost(id, Instant::now())
            }
            ConnectionEvent::Failed(id, err) => {
                warn!(connection = %id, error = %err, "Dropping connection after a framing error");
                self.drop_connection(id);
                self.area.connection_lost(id, Instant::now())
            }
        }
    }

    /// Perform the requested sends and closes. A failed write counts as a lost connection.
    async fn execute(&mut self, actions: Vec<Action>) -> PokerResult<()> {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Send { to, envelope } => {
                    let Some(connection) = self.connections.get_mut(&to) else {
                        debug!(connection = %to, "Skipping send to a closed connection");
                        continue;
                    };
                    if let Err(e) = connection.writer.send(envelope).await {
                        warn!(connection = %to, error = %e, "Write failed");
                        self.drop_connection(to);
                        queue.extend(self.area.connection_lost(to, Instant::now())?);
                    }
                }
                Action::Close(id) => self.drop_connection(id),
            }
        }
        Ok(())
    }

    fn drop_connection(&mut self, id: ConnectionId) {
        if let Some(connection) = self.connections.remove(&id) {
            connection.reader.abort();
        }
    }

    fn shutdown(&mut self) {
        for (_, connection) in self.connections.drain() {
            connection.reader.abort();
        }
    }

    pub fn area(&self) -> &PlayingArea {
        &self.area
    }
}
