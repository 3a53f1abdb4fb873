use std::net::TcpStream;
use std::sync::Arc;

use logger::logger_sender::LoggerSender;
use serde_json::Value;

use crate::protocol::request::TrackerRequest;
use crate::protocol::response::TrackerResponse;
use crate::shutdown::signal::ShutdownSignal;
use crate::swarm::registry::{AnnounceOutcome, SwarmRegistry};
use crate::swarm::swarm::SwarmPeer;

use super::wire::{self, WireError};

/// Struct that represents one tracker session: handshake, then a framed
/// request/response loop until the peer goes away.
pub struct RequestHandler {
    stream: TcpStream,
}

/// Posible RequestHandler errors.
#[derive(Debug)]
pub enum RequestHandlerError {
    HandshakeError(WireError),
    ProtocolViolation(WireError),
    WritingResponseError(WireError),
}

impl RequestHandler {
    pub fn new(stream: TcpStream) -> RequestHandler {
        RequestHandler { stream }
    }

    /// Serves requests on this session until EOF, shutdown or a protocol
    /// violation.
    ///
    /// Semantic problems (missing fields, unknown action, duplicate
    /// announce) are answered in-band and keep the session alive; malformed
    /// JSON is answered and then closes it.
    pub fn handle(
        &mut self,
        registry: Arc<SwarmRegistry>,
        shutdown: ShutdownSignal,
        logger_sender: LoggerSender,
    ) -> Result<(), RequestHandlerError> {
        wire::accept_handshake(&mut self.stream).map_err(RequestHandlerError::HandshakeError)?;

        loop {
            if shutdown.is_shutdown() {
                return Ok(());
            }

            let header = match wire::read_header(&mut self.stream) {
                Ok(header) => header,
                // The peer hung up; not an error worth reporting.
                Err(WireError::ReadingError(_)) => return Ok(()),
                Err(e) => return Err(RequestHandlerError::ProtocolViolation(e)),
            };

            let value: Value = match serde_json::from_slice(&header) {
                Ok(value) => value,
                Err(_) => {
                    self.send(&TrackerResponse::error("Invalid JSON format"))?;
                    return Ok(());
                }
            };

            let response = Self::dispatch(value, &registry, &logger_sender);
            self.send(&response)?;
        }
    }

    fn dispatch(
        value: Value,
        registry: &Arc<SwarmRegistry>,
        logger_sender: &LoggerSender,
    ) -> TrackerResponse {
        let action = match value.get("action").and_then(Value::as_str) {
            Some(action) => action.to_string(),
            None => return TrackerResponse::error("Missing required field: action"),
        };
        match action.as_str() {
            "announce" | "peer_list_update" | "stop" | "time_update" => (),
            _ => return TrackerResponse::error("Unsupported action"),
        }

        let request: TrackerRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(_) => {
                return TrackerResponse::error(
                    "Missing required fields: torrent_id, peer_ip, or port",
                )
            }
        };

        match request {
            TrackerRequest::Announce {
                torrent_id,
                peer_ip,
                port,
            } => {
                let address = (peer_ip, port);
                match registry.announce(&torrent_id, SwarmPeer::new(address.clone())) {
                    AnnounceOutcome::Added(peers) => {
                        logger_sender.info(&format!(
                            "Announce processed for peer {}:{} on torrent {}",
                            address.0, address.1, torrent_id
                        ));
                        TrackerResponse::peer_list(peers)
                    }
                    AnnounceOutcome::AlreadyAnnounced => {
                        logger_sender.info(&format!(
                            "Duplicate announce for peer {}:{} on torrent {}",
                            address.0, address.1, torrent_id
                        ));
                        TrackerResponse::warning("Already announced")
                    }
                }
            }
            TrackerRequest::PeerListUpdate { torrent_id } => {
                TrackerResponse::peer_list(registry.peer_list(&torrent_id))
            }
            TrackerRequest::Stop {
                torrent_id,
                peer_ip,
                port,
            } => {
                registry.remove_peer(&torrent_id, &(peer_ip, port));
                TrackerResponse::peer_list(registry.peer_list(&torrent_id))
            }
            TrackerRequest::TimeUpdate {
                torrent_id,
                peer_ip,
                port,
            } => {
                let address = (peer_ip, port);
                if !registry.refresh_peer(&torrent_id, &address) {
                    logger_sender.warn(&format!(
                        "Attempted to update non-existent peer {}:{} for torrent {}",
                        address.0, address.1, torrent_id
                    ));
                }
                TrackerResponse::peer_list(registry.peer_list(&torrent_id))
            }
        }
    }

    fn send(&mut self, response: &TrackerResponse) -> Result<(), RequestHandlerError> {
        let body = serde_json::to_vec(response)
            .map_err(|_| RequestHandlerError::WritingResponseError(WireError::EmptyHeader))?;
        wire::write_frame(&mut self.stream, &body)
            .map_err(RequestHandlerError::WritingResponseError)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc::channel;
    use std::thread;

    use chrono::Duration;

    use super::*;

    #[test]
    fn test_announce_happy_path_over_the_wire() {
        let (mut client, _registry) = connected_handler();

        let first = round_trip(
            &mut client,
            r#"{"action":"announce","torrent_id":"demo.torrent","peer_ip":"10.0.0.1","port":6000}"#,
        );
        assert_eq!(
            first,
            r#"{"command":"MESSAGE","peer_list":[["10.0.0.1",6000]]}"#
        );

        let second = round_trip(
            &mut client,
            r#"{"action":"announce","torrent_id":"demo.torrent","peer_ip":"10.0.0.2","port":6001}"#,
        );
        assert_eq!(
            second,
            r#"{"command":"MESSAGE","peer_list":[["10.0.0.1",6000],["10.0.0.2",6001]]}"#
        );
    }

    #[test]
    fn test_duplicate_announce_warns_and_keeps_session() {
        let (mut client, _registry) = connected_handler();

        round_trip(
            &mut client,
            r#"{"action":"announce","torrent_id":"demo.torrent","peer_ip":"10.0.0.1","port":6000}"#,
        );
        let duplicate = round_trip(
            &mut client,
            r#"{"action":"announce","torrent_id":"demo.torrent","peer_ip":"10.0.0.1","port":6000}"#,
        );
        assert_eq!(duplicate, r#"{"warning":"Already announced"}"#);

        // The session is still usable.
        let list = round_trip(
            &mut client,
            r#"{"action":"peer_list_update","torrent_id":"demo.torrent"}"#,
        );
        assert_eq!(list, r#"{"command":"MESSAGE","peer_list":[["10.0.0.1",6000]]}"#);
    }

    #[test]
    fn test_stop_removes_the_peer() {
        let (mut client, _registry) = connected_handler();

        round_trip(
            &mut client,
            r#"{"action":"announce","torrent_id":"demo.torrent","peer_ip":"10.0.0.1","port":6000}"#,
        );
        let after_stop = round_trip(
            &mut client,
            r#"{"action":"stop","torrent_id":"demo.torrent","peer_ip":"10.0.0.1","port":6000}"#,
        );
        assert_eq!(after_stop, r#"{"command":"MESSAGE","peer_list":[]}"#);
    }

    #[test]
    fn test_missing_fields_get_an_error_reply() {
        let (mut client, _registry) = connected_handler();

        let reply = round_trip(
            &mut client,
            r#"{"action":"announce","torrent_id":"demo.torrent"}"#,
        );
        assert!(reply.contains("Missing required fields"));
    }

    #[test]
    fn test_unsupported_action_gets_an_error_reply() {
        let (mut client, _registry) = connected_handler();

        let reply = round_trip(&mut client, r#"{"action":"shout","torrent_id":"x"}"#);
        assert_eq!(reply, r#"{"error":"Unsupported action"}"#);
    }

    #[test]
    fn test_malformed_json_closes_the_session() {
        let (mut client, _registry) = connected_handler();

        let reply = round_trip(&mut client, "this is not json");
        assert_eq!(reply, r#"{"error":"Invalid JSON format"}"#);

        // The handler hung up after answering.
        let mut buf = [0u8; 1];
        let read = client.read(&mut buf);
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[test]
    fn test_bad_handshake_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(SwarmRegistry::new(Duration::seconds(180)));

        let handler_registry = registry.clone();
        let handler = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            RequestHandler::new(stream).handle(
                handler_registry,
                ShutdownSignal::new(),
                test_logger_sender(),
            )
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"HTTP").unwrap();

        assert!(matches!(
            handler.join().unwrap(),
            Err(RequestHandlerError::HandshakeError(_))
        ));
    }

    // Auxiliary functions

    /// Spawns a handler over a loopback session and returns the
    /// already-handshaken client end.
    fn connected_handler() -> (TcpStream, Arc<SwarmRegistry>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(SwarmRegistry::new(Duration::seconds(180)));

        let handler_registry = registry.clone();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let _ = RequestHandler::new(stream).handle(
                handler_registry,
                ShutdownSignal::new(),
                test_logger_sender(),
            );
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(wire::HANDSHAKE_REQUEST).unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, wire::HANDSHAKE_REPLY);

        (client, registry)
    }

    fn round_trip(client: &mut TcpStream, request: &str) -> String {
        wire::write_frame(client, request.as_bytes()).unwrap();
        let reply = wire::read_header(client).unwrap();
        String::from_utf8(reply).unwrap()
    }

    fn test_logger_sender() -> LoggerSender {
        let (sender, receiver) = channel();
        Box::leak(Box::new(receiver));
        LoggerSender::new(sender)
    }
}
