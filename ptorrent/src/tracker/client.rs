use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use logger::logger_sender::LoggerSender;

use crate::session::framing::{self, FramingError};
use crate::session::handshake::{self, HandshakeError};

use super::message::{TrackerRequest, TrackerResponse};

const TRACKER_SECS_TIMEOUT: u64 = 10;

/// Posible TrackerClient errors.
#[derive(Debug)]
pub enum TrackerClientError {
    ResolvingAddressError(String),
    ConnectingError(std::io::Error),
    HandshakeError(HandshakeError),
    SettingTimeoutError,
    FramingError(FramingError),
    SerializingRequestError(String),
    MalformedResponse(String),
    RejectedByTracker(String),
}

/// Client for the framed-socket tracker wire.
///
/// Every operation dials the configured tracker address, performs the
/// `PING`/`PONG` handshake and runs one request/response exchange.
#[derive(Debug)]
pub struct TrackerClient {
    host: String,
    port: u16,
    logger_sender: LoggerSender,
}

impl TrackerClient {
    pub fn new(host: String, port: u16, logger_sender: LoggerSender) -> Self {
        Self {
            host,
            port,
            logger_sender,
        }
    }

    /// Publishes this peer in the swarm for `torrent_id` and returns the
    /// tracker's current peer list.
    ///
    /// A `warning:"Already announced"` reply is treated as success; the
    /// list is then fetched with a follow-up `peer_list_update`.
    pub fn announce(
        &self,
        torrent_id: &str,
        peer_ip: &str,
        port: u16,
    ) -> Result<Vec<(String, u16)>, TrackerClientError> {
        let response = self.round_trip(&TrackerRequest::Announce {
            torrent_id: torrent_id.to_string(),
            peer_ip: peer_ip.to_string(),
            port,
        })?;

        match response {
            TrackerResponse::PeerList { peer_list, .. } => Ok(peer_list),
            TrackerResponse::Warning { warning } => {
                self.logger_sender
                    .info(&format!("Tracker warning on announce: {}", warning));
                self.peer_list(torrent_id)
            }
            TrackerResponse::Error { error } => Err(TrackerClientError::RejectedByTracker(error)),
        }
    }

    /// Fetches the current peer list for `torrent_id` without mutating the
    /// swarm.
    pub fn peer_list(&self, torrent_id: &str) -> Result<Vec<(String, u16)>, TrackerClientError> {
        let response = self.round_trip(&TrackerRequest::PeerListUpdate {
            torrent_id: torrent_id.to_string(),
        })?;

        match response {
            TrackerResponse::PeerList { peer_list, .. } => Ok(peer_list),
            TrackerResponse::Warning { warning } => {
                self.logger_sender
                    .warn(&format!("Tracker warning on peer list update: {}", warning));
                Ok(Vec::new())
            }
            TrackerResponse::Error { error } => Err(TrackerClientError::RejectedByTracker(error)),
        }
    }

    /// Withdraws this peer from the swarm for `torrent_id`.
    pub fn stop(
        &self,
        torrent_id: &str,
        peer_ip: &str,
        port: u16,
    ) -> Result<(), TrackerClientError> {
        self.round_trip(&TrackerRequest::Stop {
            torrent_id: torrent_id.to_string(),
            peer_ip: peer_ip.to_string(),
            port,
        })?;
        Ok(())
    }

    /// Refreshes this peer's last-seen stamp so the tracker's sweeper keeps
    /// it in the swarm.
    pub fn time_update(
        &self,
        torrent_id: &str,
        peer_ip: &str,
        port: u16,
    ) -> Result<(), TrackerClientError> {
        self.round_trip(&TrackerRequest::TimeUpdate {
            torrent_id: torrent_id.to_string(),
            peer_ip: peer_ip.to_string(),
            port,
        })?;
        Ok(())
    }

    fn round_trip(&self, request: &TrackerRequest) -> Result<TrackerResponse, TrackerClientError> {
        let mut stream = self.connect()?;

        let header = serde_json::to_vec(request)
            .map_err(|e| TrackerClientError::SerializingRequestError(e.to_string()))?;
        framing::write_frame(&mut stream, &header, None).map_err(TrackerClientError::FramingError)?;

        let reply = framing::read_header(&mut stream).map_err(TrackerClientError::FramingError)?;
        serde_json::from_slice(&reply)
            .map_err(|e| TrackerClientError::MalformedResponse(e.to_string()))
    }

    fn connect(&self) -> Result<TcpStream, TrackerClientError> {
        let address = format!("{}:{}", self.host, self.port);
        let resolved = address
            .to_socket_addrs()
            .map_err(|_| TrackerClientError::ResolvingAddressError(address.clone()))?
            .next()
            .ok_or(TrackerClientError::ResolvingAddressError(address))?;

        let mut stream =
            TcpStream::connect_timeout(&resolved, Duration::from_secs(TRACKER_SECS_TIMEOUT))
                .map_err(TrackerClientError::ConnectingError)?;
        handshake::initiate(&mut stream).map_err(TrackerClientError::HandshakeError)?;

        stream
            .set_read_timeout(Some(Duration::from_secs(TRACKER_SECS_TIMEOUT)))
            .map_err(|_| TrackerClientError::SettingTimeoutError)?;
        stream
            .set_write_timeout(Some(Duration::from_secs(TRACKER_SECS_TIMEOUT)))
            .map_err(|_| TrackerClientError::SettingTimeoutError)?;

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::mpsc::channel;
    use std::thread;

    use super::*;

    #[test]
    fn test_announce_returns_peer_list() {
        let port = spawn_stub_tracker(
            r#"{"command":"MESSAGE","peer_list":[["10.0.0.1",6000]]}"#.to_string(),
        );
        let client = TrackerClient::new("127.0.0.1".to_string(), port, test_logger_sender());

        let peers = client.announce("demo.torrent", "10.0.0.1", 6000).unwrap();

        assert_eq!(peers, vec![("10.0.0.1".to_string(), 6000)]);
    }

    #[test]
    fn test_error_reply_is_surfaced() {
        let port = spawn_stub_tracker(r#"{"error":"Unsupported action"}"#.to_string());
        let client = TrackerClient::new("127.0.0.1".to_string(), port, test_logger_sender());

        let result = client.peer_list("demo.torrent");

        match result {
            Err(TrackerClientError::RejectedByTracker(error)) => {
                assert_eq!(error, "Unsupported action")
            }
            other => panic!("expected RejectedByTracker, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_failure_is_reported() {
        // Nothing listens here.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = TrackerClient::new("127.0.0.1".to_string(), port, test_logger_sender());

        assert!(matches!(
            client.peer_list("demo.torrent"),
            Err(TrackerClientError::ConnectingError(_))
        ));
    }

    // Auxiliary functions

    /// A one-shot tracker stub: accepts one session, handshakes, reads one
    /// framed request and answers with the canned reply.
    fn spawn_stub_tracker(reply: String) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            handshake::accept(&mut stream).unwrap();
            framing::read_header(&mut stream).unwrap();
            framing::write_frame(&mut stream, reply.as_bytes(), None).unwrap();
        });
        port
    }

    fn test_logger_sender() -> LoggerSender {
        // A sender whose receiver lives for the whole test.
        let (sender, receiver) = channel();
        Box::leak(Box::new(receiver));
        LoggerSender::new(sender)
    }
}
