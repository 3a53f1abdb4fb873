use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

pub const HANDSHAKE_REQUEST: &[u8; 4] = b"PING";
pub const HANDSHAKE_REPLY: &[u8; 4] = b"PONG";
pub const HANDSHAKE_SECS_TIMEOUT: u64 = 5;

/// Posible handshake errors.
#[derive(Debug)]
pub enum HandshakeError {
    SettingTimeoutError,
    SendingHandshakeError(std::io::Error),
    ReadingHandshakeError(std::io::Error),
    InvalidHandshake([u8; 4]),
}

/// Initiator side of the handshake: send `PING`, expect `PONG`.
///
/// Both read and write run under a bounded timeout; the timeouts are
/// cleared again before returning so the session can use its own.
pub fn initiate(stream: &mut TcpStream) -> Result<(), HandshakeError> {
    set_timeouts(stream, Some(Duration::from_secs(HANDSHAKE_SECS_TIMEOUT)))?;

    stream
        .write_all(HANDSHAKE_REQUEST)
        .map_err(HandshakeError::SendingHandshakeError)?;

    let mut reply = [0u8; 4];
    stream
        .read_exact(&mut reply)
        .map_err(HandshakeError::ReadingHandshakeError)?;
    if &reply != HANDSHAKE_REPLY {
        return Err(HandshakeError::InvalidHandshake(reply));
    }

    set_timeouts(stream, None)?;
    Ok(())
}

/// Responder side of the handshake: expect `PING`, reply `PONG`.
pub fn accept(stream: &mut TcpStream) -> Result<(), HandshakeError> {
    set_timeouts(stream, Some(Duration::from_secs(HANDSHAKE_SECS_TIMEOUT)))?;

    let mut request = [0u8; 4];
    stream
        .read_exact(&mut request)
        .map_err(HandshakeError::ReadingHandshakeError)?;
    if &request != HANDSHAKE_REQUEST {
        return Err(HandshakeError::InvalidHandshake(request));
    }

    stream
        .write_all(HANDSHAKE_REPLY)
        .map_err(HandshakeError::SendingHandshakeError)?;

    set_timeouts(stream, None)?;
    Ok(())
}

fn set_timeouts(stream: &mut TcpStream, timeout: Option<Duration>) -> Result<(), HandshakeError> {
    stream
        .set_read_timeout(timeout)
        .map_err(|_| HandshakeError::SettingTimeoutError)?;
    stream
        .set_write_timeout(timeout)
        .map_err(|_| HandshakeError::SettingTimeoutError)?;
    Ok(())
}
