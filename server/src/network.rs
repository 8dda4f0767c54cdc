//! Server network layer handling TCP connections and line framing

use crate::config::ServerConfig;
use crate::engine::ReconciliationEngine;
use crate::error::{GameError, ServerError};
use crate::handle::GameHandle;
use crate::observer::Observer;
use crate::registry::{ClientRegistry, ConnectionId};
use log::{debug, error, info, warn};
use shared::ServerMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Longest line a unit may send, newline included
pub const MAX_LINE_LEN: usize = 1024;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    ConnectionClosed { connection: ConnectionId },
    Fatal(GameError),
    Shutdown,
}

/// Accepts unit connections and feeds their lines to the game engine
pub struct Server {
    listener: TcpListener,
    game: GameHandle,
    registry: Arc<ClientRegistry>,

    // Communication channels
    fatal_rx: mpsc::UnboundedReceiver<GameError>,
    server_tx: mpsc::UnboundedSender<ServerEvent>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn bind(
        config: &ServerConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let registry = Arc::new(ClientRegistry::new());
        let engine = ReconciliationEngine::new(config, registry.clone(), observer);
        let (game, fatal_rx) = GameHandle::new(engine);
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            game,
            registry,
            fatal_rx,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn game(&self) -> GameHandle {
        self.game.clone()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Sender for [`ServerEvent::Shutdown`] and other loop events.
    pub fn events(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.server_tx.clone()
    }

    /// Spawns the reader and writer tasks for one accepted connection
    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let connection = self.registry.register(addr, outbox.clone());
        info!("Connection {} accepted from {}", connection, addr);

        let game = self.game.clone();
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            tokio::spawn(write_lines(connection, writer, inbox));

            if let Err(e) = read_lines(connection, reader, &game, &outbox).await {
                error!("Connection {} hit a fatal error: {}", connection, e);
                if server_tx.send(ServerEvent::Fatal(e)).is_err() {
                    error!("Server loop is gone");
                }
            }

            if let Err(e) = server_tx.send(ServerEvent::ConnectionClosed { connection }) {
                debug!("Failed to report closed connection: {}", e);
            }
        });
    }

    /// Main server loop: accepts connections until shutdown or a fatal error
    pub async fn run(&mut self) -> Result<(), ServerError> {
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!("Accept error: {}", e),
                    }
                },

                Some(e) = self.fatal_rx.recv() => {
                    error!("Fatal game error: {}", e);
                    return Err(e.into());
                },

                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerEvent::ConnectionClosed { connection }) => {
                            self.registry.disconnect(connection);
                        },
                        Some(ServerEvent::Fatal(e)) => {
                            return Err(e.into());
                        },
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },
            }
        }

        if self.game.is_running().await {
            self.game.stop_match().await;
        }
        Ok(())
    }
}

/// One framed read from a connection
enum Frame {
    Line(String),
    Overlong,
    Closed,
}

/// Reads up to the next newline, never buffering more than [`MAX_LINE_LEN`] bytes.
///
/// Invalid UTF-8 is replaced rather than rejected so the line still reaches the
/// parser and gets acknowledged.
async fn read_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Frame> {
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(Frame::Closed);
    }

    if read == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
        // Skip the rest of the line
        loop {
            buf.clear();
            let skipped = (&mut *reader)
                .take(MAX_LINE_LEN as u64)
                .read_until(b'\n', buf)
                .await?;
            if skipped == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        return Ok(Frame::Overlong);
    }

    Ok(Frame::Line(String::from_utf8_lossy(buf).into_owned()))
}

/// Feeds every line from `reader` to the engine and queues the acknowledgements
async fn read_lines(
    connection: ConnectionId,
    reader: OwnedReadHalf,
    game: &GameHandle,
    outbox: &mpsc::UnboundedSender<String>,
) -> Result<(), GameError> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(MAX_LINE_LEN);

    loop {
        let ack = match read_frame(&mut reader, &mut buf).await {
            Ok(Frame::Line(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                game.ingest(connection, line).await?
            }
            Ok(Frame::Overlong) => {
                warn!(
                    "Dropped a line longer than {} bytes from connection {}",
                    MAX_LINE_LEN, connection
                );
                ServerMessage::Ack
            }
            Ok(Frame::Closed) => break,
            Err(e) => {
                warn!("Read error on connection {}: {}", connection, e);
                break;
            }
        };
        if outbox.send(ack.to_line()).is_err() {
            break;
        }
    }

    Ok(())
}

/// Writes queued lines in order until every sender of the queue is gone
async fn write_lines(
    connection: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut inbox: mpsc::UnboundedReceiver<String>,
) {
    while let Some(line) = inbox.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!("Write to connection {} failed: {}", connection, e);
            break;
        }
    }
}
