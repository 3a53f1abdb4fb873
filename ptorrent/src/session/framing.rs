use std::io::{Read, Write};

/// Largest JSON header a frame may carry, in bytes.
pub const MAX_HEADER_LEN: usize = 1024;
/// Payload bytes are read in bounded slices of this size.
pub const PAYLOAD_READ_CHUNK: usize = 1024;

/// Posible framing errors.
#[derive(Debug)]
pub enum FramingError {
    WritingError(std::io::Error),
    ReadingError(std::io::Error),
    EmptyHeader,
    HeaderTooLong(usize),
    PayloadTooLarge(u64),
}

/// Writes one frame: 4-byte big-endian header length, the header bytes,
/// then the optional payload.
pub fn write_frame<W: Write>(
    stream: &mut W,
    header: &[u8],
    payload: Option<&[u8]>,
) -> Result<(), FramingError> {
    if header.is_empty() {
        return Err(FramingError::EmptyHeader);
    }
    if header.len() > MAX_HEADER_LEN {
        return Err(FramingError::HeaderTooLong(header.len()));
    }

    stream
        .write_all(&(header.len() as u32).to_be_bytes())
        .map_err(FramingError::WritingError)?;
    stream.write_all(header).map_err(FramingError::WritingError)?;
    if let Some(payload) = payload {
        stream.write_all(payload).map_err(FramingError::WritingError)?;
    }
    stream.flush().map_err(FramingError::WritingError)?;

    Ok(())
}

/// Reads one header: the 4-byte length prefix followed by that many bytes.
///
/// Lengths of zero or above `MAX_HEADER_LEN` are protocol violations. A
/// short read anywhere returns a `ReadingError` without partial results.
pub fn read_header<R: Read>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut length_bytes = [0u8; 4];
    stream
        .read_exact(&mut length_bytes)
        .map_err(FramingError::ReadingError)?;

    let length = u32::from_be_bytes(length_bytes) as usize;
    if length == 0 {
        return Err(FramingError::EmptyHeader);
    }
    if length > MAX_HEADER_LEN {
        return Err(FramingError::HeaderTooLong(length));
    }

    let mut header = vec![0u8; length];
    stream
        .read_exact(&mut header)
        .map_err(FramingError::ReadingError)?;

    Ok(header)
}

/// Reads exactly `data_length` payload bytes in bounded
/// `PAYLOAD_READ_CHUNK`-sized reads.
///
/// `cap` is the largest payload the caller is willing to accept; a declared
/// length above it is a protocol violation. A short read mid-payload is
/// fatal for the session.
pub fn read_payload<R: Read>(
    stream: &mut R,
    data_length: u64,
    cap: u64,
) -> Result<Vec<u8>, FramingError> {
    if data_length > cap {
        return Err(FramingError::PayloadTooLarge(data_length));
    }

    let mut payload = Vec::with_capacity(data_length as usize);
    let mut remaining = data_length as usize;
    let mut buffer = [0u8; PAYLOAD_READ_CHUNK];

    while remaining > 0 {
        let to_read = remaining.min(PAYLOAD_READ_CHUNK);
        stream
            .read_exact(&mut buffer[..to_read])
            .map_err(FramingError::ReadingError)?;
        payload.extend_from_slice(&buffer[..to_read]);
        remaining -= to_read;
    }

    Ok(payload)
}
