pub mod framing;
pub mod handshake;
pub mod message;
pub mod session;
