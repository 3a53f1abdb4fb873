use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::framing::{self, FramingError};
use super::message::{ChunkStatus, PeerMessage, RECEIPT_ACK, RECEIPT_ERR};

/// Posible Session errors.
#[derive(Debug)]
pub enum SessionError {
    CloningStreamError(std::io::Error),
    FramingError(FramingError),
    MalformedHeader(String),
    SettingTimeoutError,
    SendingReceiptError(std::io::Error),
    ReadingReceiptError(std::io::Error),
    MissingDataLength,
    ChunkRefused(String),
    UnexpectedMessage,
}

/// One message read from the remote end of a session.
#[derive(Debug)]
pub enum Incoming {
    ChunkRequest {
        file_name: String,
        chunk_index: u32,
    },
    ChunkData {
        file_name: String,
        chunk_index: Option<u32>,
        status: ChunkStatus,
        payload: Vec<u8>,
    },
}

/// A live framed connection to one remote peer.
///
/// The stream sits behind a mutex so that a header and its trailing payload
/// always travel as one unit; there is no request pipelining within a
/// session. `close()` works through a second handle to the same socket, so
/// it can unblock a reader that currently holds the stream lock.
#[derive(Debug)]
pub struct Session {
    stream: Mutex<TcpStream>,
    close_handle: TcpStream,
    remote: SocketAddr,
}

impl Session {
    pub fn new(stream: TcpStream, remote: SocketAddr) -> Result<Self, SessionError> {
        let close_handle = stream.try_clone().map_err(SessionError::CloningStreamError)?;
        Ok(Self {
            stream: Mutex::new(stream),
            close_handle,
            remote,
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Shuts the underlying socket down in both directions, waking any
    /// blocked reader. Dropping the last `Arc<Session>` releases the fd.
    pub fn close(&self) {
        let _ = self.close_handle.shutdown(Shutdown::Both);
    }

    /// Reads one message from the remote end, payload included.
    ///
    /// Used by the dispatch loop of accepted sessions. Blocks until a
    /// message arrives, the remote closes, or `close()` is called.
    pub fn read_incoming(&self, payload_cap: u64) -> Result<Incoming, SessionError> {
        let mut stream = self.lock_stream();

        let header = framing::read_header(&mut *stream).map_err(SessionError::FramingError)?;
        let message: PeerMessage = serde_json::from_slice(&header)
            .map_err(|e| SessionError::MalformedHeader(e.to_string()))?;

        match message {
            PeerMessage::RequestChunk {
                file_name,
                chunk_index,
            } => Ok(Incoming::ChunkRequest {
                file_name,
                chunk_index,
            }),
            PeerMessage::ChunkData {
                status,
                file_name,
                chunk_index,
                data_length,
                ..
            } => {
                let payload = match data_length {
                    Some(len) if len > 0 => framing::read_payload(&mut *stream, len, payload_cap)
                        .map_err(SessionError::FramingError)?,
                    _ => Vec::new(),
                };
                Ok(Incoming::ChunkData {
                    file_name,
                    chunk_index,
                    status,
                    payload,
                })
            }
        }
    }

    /// Answers a chunk request with the piece bytes.
    pub fn send_chunk_ok(
        &self,
        file_name: String,
        chunk_index: u32,
        piece: &[u8],
    ) -> Result<(), SessionError> {
        let header = Self::serialize_header(&PeerMessage::chunk_ok(
            file_name,
            chunk_index,
            piece.len() as u64,
        ))?;
        let mut stream = self.lock_stream();
        framing::write_frame(&mut *stream, &header, Some(piece))
            .map_err(SessionError::FramingError)
    }

    /// Answers a chunk request with a `status:ERROR` header. The session
    /// stays open.
    pub fn send_chunk_error(&self, file_name: String, reason: String) -> Result<(), SessionError> {
        let header = Self::serialize_header(&PeerMessage::chunk_error(file_name, reason))?;
        let mut stream = self.lock_stream();
        framing::write_frame(&mut *stream, &header, None).map_err(SessionError::FramingError)
    }

    /// Sends the delivery receipt for a pushed `CHUNK_DATA`.
    pub fn send_receipt(&self, accepted: bool) -> Result<(), SessionError> {
        let receipt = if accepted { RECEIPT_ACK } else { RECEIPT_ERR };
        let mut stream = self.lock_stream();
        stream
            .write_all(receipt)
            .map_err(SessionError::SendingReceiptError)
    }

    /// Requests one piece from the remote peer and waits for the reply.
    ///
    /// The whole exchange runs under the stream lock and a read timeout, so
    /// replies are matched to requests in order.
    ///
    /// It returns a `SessionError` if:
    /// - The request could not be written or the reply not read in time.
    /// - The peer answered `status:ERROR` (`ChunkRefused`, retryable).
    /// - The reply declared a payload larger than `payload_cap`.
    pub fn request_chunk(
        &self,
        file_name: String,
        chunk_index: u32,
        payload_cap: u64,
        timeout: Duration,
    ) -> Result<Vec<u8>, SessionError> {
        let header = Self::serialize_header(&PeerMessage::RequestChunk {
            file_name,
            chunk_index,
        })?;

        let mut stream = self.lock_stream();
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|_| SessionError::SettingTimeoutError)?;

        framing::write_frame(&mut *stream, &header, None).map_err(SessionError::FramingError)?;

        let reply = framing::read_header(&mut *stream).map_err(SessionError::FramingError)?;
        let reply: PeerMessage = serde_json::from_slice(&reply)
            .map_err(|e| SessionError::MalformedHeader(e.to_string()))?;

        match reply {
            PeerMessage::ChunkData {
                status: ChunkStatus::Ok,
                chunk_index: reply_index,
                data_length,
                ..
            } => {
                if reply_index != Some(chunk_index) {
                    return Err(SessionError::UnexpectedMessage);
                }
                let data_length = data_length.ok_or(SessionError::MissingDataLength)?;
                let payload = framing::read_payload(&mut *stream, data_length, payload_cap)
                    .map_err(SessionError::FramingError)?;

                stream
                    .set_read_timeout(None)
                    .map_err(|_| SessionError::SettingTimeoutError)?;
                Ok(payload)
            }
            PeerMessage::ChunkData { reason, .. } => Err(SessionError::ChunkRefused(
                reason.unwrap_or_else(|| "chunk refused".to_string()),
            )),
            PeerMessage::RequestChunk { .. } => Err(SessionError::UnexpectedMessage),
        }
    }

    /// Pushes one piece to the remote peer and waits for its `ACK`/`ERR`
    /// receipt. Returns whether the piece was accepted.
    pub fn push_chunk(
        &self,
        file_name: String,
        chunk_index: u32,
        piece: &[u8],
        timeout: Duration,
    ) -> Result<bool, SessionError> {
        let header = Self::serialize_header(&PeerMessage::chunk_ok(
            file_name,
            chunk_index,
            piece.len() as u64,
        ))?;

        let mut stream = self.lock_stream();
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|_| SessionError::SettingTimeoutError)?;

        framing::write_frame(&mut *stream, &header, Some(piece))
            .map_err(SessionError::FramingError)?;

        let mut receipt = [0u8; 3];
        stream
            .read_exact(&mut receipt)
            .map_err(SessionError::ReadingReceiptError)?;

        stream
            .set_read_timeout(None)
            .map_err(|_| SessionError::SettingTimeoutError)?;
        Ok(&receipt == RECEIPT_ACK)
    }

    fn serialize_header(message: &PeerMessage) -> Result<Vec<u8>, SessionError> {
        serde_json::to_vec(message).map_err(|e| SessionError::MalformedHeader(e.to_string()))
    }

    fn lock_stream(&self) -> MutexGuard<TcpStream> {
        self.stream.lock().unwrap() // Unwrap is safe: no holder of the lock can panic.
    }
}
