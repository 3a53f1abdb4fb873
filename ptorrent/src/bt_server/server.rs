use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use logger::logger_sender::LoggerSender;

use crate::pool::connection_pool::ConnectionPool;
use crate::session::handshake;
use crate::session::message::ChunkStatus;
use crate::session::session::{Incoming, Session, SessionError};
use crate::shutdown::signal::ShutdownSignal;

const ACCEPT_POLL_SECS: u64 = 1;

/// The request/response surface the session layer dispatches into,
/// implemented by the peer coordinator.
///
/// `chunk_requested` resolves a piece for an uploading reply; the `Err`
/// string becomes the `reason` of a `status:ERROR` header. `chunk_received`
/// accepts a pushed piece and decides the `ACK`/`ERR` receipt.
pub trait ChunkHandler: Send + Sync {
    fn chunk_requested(
        &self,
        peer: SocketAddr,
        file_name: &str,
        chunk_index: u32,
    ) -> Result<Vec<u8>, String>;

    fn chunk_received(
        &self,
        peer: SocketAddr,
        file_name: &str,
        chunk_index: u32,
        piece: Vec<u8>,
    ) -> bool;
}

/// Posible BtServer errors.
#[derive(Debug)]
pub enum BtServerError {
    SettingNonBlockingError(std::io::Error),
}

/// The server half of a peer: accepts incoming sessions, gates them behind
/// the handshake and the pool, and runs one dispatch loop per session.
pub struct BtServer {
    listener: TcpListener,
    pool: Arc<ConnectionPool>,
    handler: Arc<dyn ChunkHandler>,
    shutdown: ShutdownSignal,
    logger_sender: LoggerSender,
    payload_cap: u64,
}

impl BtServer {
    pub fn new(
        listener: TcpListener,
        pool: Arc<ConnectionPool>,
        handler: Arc<dyn ChunkHandler>,
        shutdown: ShutdownSignal,
        logger_sender: LoggerSender,
        payload_cap: u64,
    ) -> Self {
        Self {
            listener,
            pool,
            handler,
            shutdown,
            logger_sender,
            payload_cap,
        }
    }

    /// Runs the accept loop until the shutdown signal flips.
    ///
    /// The listener is polled with a short timeout so the loop observes
    /// shutdown promptly even when nobody connects.
    pub fn run(&self) -> Result<(), BtServerError> {
        self.listener
            .set_nonblocking(true)
            .map_err(BtServerError::SettingNonBlockingError)?;

        self.logger_sender
            .info("Peer server started, listening for connections");

        loop {
            if self.shutdown.is_shutdown() {
                break;
            }
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.shutdown.is_shutdown() {
                        break;
                    }
                    self.handle_connection(stream, addr);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if self.shutdown.wait_timeout(Duration::from_secs(ACCEPT_POLL_SECS)) {
                        break;
                    }
                }
                Err(e) => {
                    self.logger_sender
                        .warn(&format!("Could't handle incoming connection: {:?}", e));
                }
            }
        }

        self.logger_sender.info("Peer server stopped");
        Ok(())
    }

    /// Hands an accepted stream to its own worker: handshake, pool
    /// admission, then the dispatch loop.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let pool = self.pool.clone();
        let handler = self.handler.clone();
        let shutdown = self.shutdown.clone();
        let logger_sender = self.logger_sender.clone();
        let payload_cap = self.payload_cap;

        let builder = thread::Builder::new().name(format!("peer-session {}", addr));
        let spawned = builder.spawn(move || {
            let mut stream = stream;
            // Accepted streams inherit the listener's nonblocking flag.
            if stream.set_nonblocking(false).is_err() {
                return;
            }
            if let Err(e) = handshake::accept(&mut stream) {
                logger_sender.warn(&format!("{:?} for peer {}", e, addr));
                return;
            }

            let session = match Session::new(stream, addr) {
                Ok(session) => session,
                Err(e) => {
                    logger_sender.warn(&format!("{:?} for peer {}", e, addr));
                    return;
                }
            };
            let session = match pool.accept_incoming(session) {
                Ok(session) => {
                    logger_sender.info(&format!("Incoming session from {}", addr));
                    session
                }
                Err(e) => {
                    logger_sender.warn(&format!("Refusing connection from {}: {:?}", addr, e));
                    return;
                }
            };

            Self::session_loop(session, pool, handler, shutdown, logger_sender, payload_cap);
        });

        if let Err(e) = spawned {
            self.logger_sender.error(&format!("{:?}", e));
        }
    }

    /// Reads and dispatches messages until the session dies or shutdown.
    ///
    /// Per-piece failures answer `status:ERROR` and keep the session alive;
    /// transport and protocol errors end it. The pool slot is always
    /// released on the way out.
    fn session_loop(
        session: Arc<Session>,
        pool: Arc<ConnectionPool>,
        handler: Arc<dyn ChunkHandler>,
        shutdown: ShutdownSignal,
        logger_sender: LoggerSender,
        payload_cap: u64,
    ) {
        let peer = session.remote();
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match session.read_incoming(payload_cap) {
                Ok(Incoming::ChunkRequest {
                    file_name,
                    chunk_index,
                }) => {
                    let reply = match handler.chunk_requested(peer, &file_name, chunk_index) {
                        Ok(piece) => session.send_chunk_ok(file_name, chunk_index, &piece),
                        Err(reason) => session.send_chunk_error(file_name, reason),
                    };
                    if let Err(e) = reply {
                        logger_sender.warn(&format!("Reply to {} failed: {:?}", peer, e));
                        break;
                    }
                }
                Ok(Incoming::ChunkData {
                    file_name,
                    chunk_index,
                    status,
                    payload,
                }) => {
                    let accepted = match (status, chunk_index) {
                        (ChunkStatus::Ok, Some(chunk_index)) => {
                            handler.chunk_received(peer, &file_name, chunk_index, payload)
                        }
                        _ => false,
                    };
                    if let Err(e) = session.send_receipt(accepted) {
                        logger_sender.warn(&format!("Receipt to {} failed: {:?}", peer, e));
                        break;
                    }
                }
                Err(SessionError::MalformedHeader(reason)) => {
                    logger_sender.warn(&format!("Malformed header from {}: {}", peer, reason));
                    break;
                }
                Err(e) => {
                    logger_sender.debug(&format!("Session with {} ended: {:?}", peer, e));
                    break;
                }
            }
        }
        pool.release(peer);
    }
}
