use std::io::ErrorKind;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use logger::logger_sender::LoggerSender;
use tracing::{error, info};

use crate::server::request_handler::RequestHandler;
use crate::server::thread_pool::pool::ThreadPool;
use crate::shutdown::signal::ShutdownSignal;
use crate::swarm::registry::SwarmRegistry;

const THREAD_POOL_SIZE: usize = 64;
const ACCEPT_POLL_SECS: u64 = 1;

/// Struct that represents the socket server listening for tracker
/// sessions.
///
/// Each accepted session is handed to the thread pool and served by a
/// `RequestHandler` until it ends.
pub struct Server {
    listener: TcpListener,
    pool: ThreadPool,
    registry: Arc<SwarmRegistry>,
    shutdown: ShutdownSignal,
    logger_sender: LoggerSender,
    port: u16,
}

impl Server {
    /// Creates a new `Server` bound to `0.0.0.0:port`. Port 0 picks a free
    /// port; `port()` reports the actual one.
    pub fn init(
        registry: Arc<SwarmRegistry>,
        shutdown: ShutdownSignal,
        logger_sender: LoggerSender,
        port: u16,
    ) -> std::io::Result<Server> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        Ok(Server {
            listener,
            pool: ThreadPool::new(THREAD_POOL_SIZE),
            registry,
            shutdown,
            logger_sender,
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accepts sessions until the shutdown signal flips.
    ///
    /// The listener is polled with a short timeout so the loop observes
    /// shutdown promptly even when nobody connects.
    pub fn serve(&self) -> std::io::Result<()> {
        info!("Tracker serving on 0.0.0.0:{}", self.port);
        self.logger_sender
            .info(&format!("Tracker serving on port {}", self.port));

        loop {
            if self.shutdown.is_shutdown() {
                break;
            }
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.shutdown.is_shutdown() {
                        break;
                    }
                    self.logger_sender
                        .debug(&format!("Connection from {}", addr));
                    // Accepted streams inherit the listener's nonblocking flag.
                    if stream.set_nonblocking(false).is_err() {
                        continue;
                    }

                    let mut request_handler = RequestHandler::new(stream);
                    let registry = self.registry.clone();
                    let shutdown = self.shutdown.clone();
                    let logger_sender = self.logger_sender.clone();
                    let _ = self.pool.execute(move || {
                        if let Err(e) = request_handler.handle(registry, shutdown, logger_sender) {
                            error!(
                                "An error occurred while attempting to handle a request: {:?}",
                                e
                            );
                        }
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if self
                        .shutdown
                        .wait_timeout(Duration::from_secs(ACCEPT_POLL_SECS))
                    {
                        break;
                    }
                }
                Err(e) => {
                    self.logger_sender
                        .error(&format!("Exception in tracker server loop: {}", e));
                }
            }
        }

        self.logger_sender.info("Tracker server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::sync::mpsc::channel;
    use std::thread;

    use chrono::Duration as ChronoDuration;

    use crate::server::wire;

    use super::*;

    #[test]
    fn test_two_peers_announce_through_the_server() {
        let (port, shutdown) = start_server();

        let mut first = connect_and_handshake(port);
        let reply = round_trip(
            &mut first,
            r#"{"action":"announce","torrent_id":"demo.torrent","peer_ip":"10.0.0.1","port":6000}"#,
        );
        assert_eq!(reply, r#"{"command":"MESSAGE","peer_list":[["10.0.0.1",6000]]}"#);

        let mut second = connect_and_handshake(port);
        let reply = round_trip(
            &mut second,
            r#"{"action":"announce","torrent_id":"demo.torrent","peer_ip":"10.0.0.2","port":6001}"#,
        );
        assert_eq!(
            reply,
            r#"{"command":"MESSAGE","peer_list":[["10.0.0.1",6000],["10.0.0.2",6001]]}"#
        );

        shutdown.shutdown();
    }

    #[test]
    fn test_sessions_are_served_concurrently() {
        let (port, shutdown) = start_server();

        // Both sessions stay open across each other's requests.
        let mut first = connect_and_handshake(port);
        let mut second = connect_and_handshake(port);

        round_trip(
            &mut first,
            r#"{"action":"announce","torrent_id":"demo.torrent","peer_ip":"10.0.0.1","port":6000}"#,
        );
        let reply = round_trip(
            &mut second,
            r#"{"action":"peer_list_update","torrent_id":"demo.torrent"}"#,
        );
        assert_eq!(reply, r#"{"command":"MESSAGE","peer_list":[["10.0.0.1",6000]]}"#);

        shutdown.shutdown();
    }

    #[test]
    fn test_shutdown_stops_the_server_within_bounds() {
        let (port, shutdown) = start_server_with_handle();

        shutdown.0.shutdown();

        let start = std::time::Instant::now();
        while !shutdown.1.is_finished() {
            assert!(start.elapsed() < std::time::Duration::from_secs(5));
            thread::sleep(std::time::Duration::from_millis(20));
        }
        let _ = port;
    }

    // Auxiliary functions

    fn start_server() -> (u16, ShutdownSignal) {
        let (port, (shutdown, _handle)) = start_server_inner();
        (port, shutdown)
    }

    fn start_server_with_handle() -> (u16, (ShutdownSignal, thread::JoinHandle<()>)) {
        start_server_inner()
    }

    fn start_server_inner() -> (u16, (ShutdownSignal, thread::JoinHandle<()>)) {
        let registry = Arc::new(SwarmRegistry::new(ChronoDuration::seconds(180)));
        let shutdown = ShutdownSignal::new();
        let server = Server::init(registry, shutdown.clone(), test_logger_sender(), 0).unwrap();
        let port = server.port();
        let handle = thread::spawn(move || {
            server.serve().unwrap();
        });
        (port, (shutdown, handle))
    }

    fn connect_and_handshake(port: u16) -> TcpStream {
        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.write_all(wire::HANDSHAKE_REQUEST).unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, wire::HANDSHAKE_REPLY);
        client
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
