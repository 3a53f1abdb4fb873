use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

pub const HANDSHAKE_REQUEST: &[u8; 4] = b"PING";
pub const HANDSHAKE_REPLY: &[u8; 4] = b"PONG";
pub const HANDSHAKE_SECS_TIMEOUT: u64 = 5;
pub const MAX_HEADER_LEN: usize = 1024;

/// Posible wire errors.
#[derive(Debug)]
pub enum WireError {
    SettingTimeoutError,
    ReadingError(std::io::Error),
    WritingError(std::io::Error),
    EmptyHeader,
    HeaderTooLong(usize),
    InvalidHandshake([u8; 4]),
}

/// Responder side of the session handshake: expect `PING`, reply `PONG`.
///
/// Runs under a bounded timeout which is cleared again on success.
pub fn accept_handshake(stream: &mut TcpStream) -> Result<(), WireError> {
    stream
        .set_read_timeout(Some(Duration::from_secs(HANDSHAKE_SECS_TIMEOUT)))
        .map_err(|_| WireError::SettingTimeoutError)?;

    let mut request = [0u8; 4];
    stream
        .read_exact(&mut request)
        .map_err(WireError::ReadingError)?;
    if &request != HANDSHAKE_REQUEST {
        return Err(WireError::InvalidHandshake(request));
    }

    stream
        .write_all(HANDSHAKE_REPLY)
        .map_err(WireError::WritingError)?;

    stream
        .set_read_timeout(None)
        .map_err(|_| WireError::SettingTimeoutError)?;
    Ok(())
}

/// Reads one length-prefixed header: 4-byte big-endian length, then that
/// many bytes. Lengths of zero or above `MAX_HEADER_LEN` are protocol
/// violations.
pub fn read_header<R: Read>(stream: &mut R) -> Result<Vec<u8>, WireError> {
    let mut length_bytes = [0u8; 4];
    stream
        .read_exact(&mut length_bytes)
        .map_err(WireError::ReadingError)?;

    let length = u32::from_be_bytes(length_bytes) as usize;
    if length == 0 {
        return Err(WireError::EmptyHeader);
    }
    if length > MAX_HEADER_LEN {
        return Err(WireError::HeaderTooLong(length));
    }

    let mut header = vec![0u8; length];
    stream
        .read_exact(&mut header)
        .map_err(WireError::ReadingError)?;
    Ok(header)
}

/// Writes one length-prefixed header.
pub fn write_frame<W: Write>(stream: &mut W, header: &[u8]) -> Result<(), WireError> {
    if header.is_empty() {
        return Err(WireError::EmptyHeader);
    }
    if header.len() > MAX_HEADER_LEN {
        return Err(WireError::HeaderTooLong(header.len()));
    }

    stream
        .write_all(&(header.len() as u32).to_be_bytes())
        .map_err(WireError::WritingError)?;
    stream.write_all(header).map_err(WireError::WritingError)?;
    stream.flush().map_err(WireError::WritingError)?;
    Ok(())
}
