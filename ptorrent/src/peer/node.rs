use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use logger::logger_sender::LoggerSender;

use crate::bt_server::server::{BtServer, ChunkHandler};
use crate::config::cfg::Cfg;
use crate::peer::downloader::{DownloadProgress, Downloader};
use crate::peer::uploader::{Uploader, UploaderError};
use crate::pool::connection_pool::{ConnectionPool, PoolObserver};
use crate::session::session::SessionError;
use crate::shutdown::signal::ShutdownSignal;
use crate::torrent::torrent::Torrent;
use crate::tracker::client::{TrackerClient, TrackerClientError};

const DIAL_SECS_TIMEOUT: u64 = 5;
const JOIN_SECS_TIMEOUT: u64 = 5;
const ANNOUNCE_SECS_INTERVAL: u64 = 60;

/// Posible PeerNode errors.
#[derive(Debug)]
pub enum PeerNodeError {
    OpeningListenerError(std::io::Error),
    SpawnThreadError(std::io::Error),
    TrackerError(TrackerClientError),
    IncompleteDownload { missing: u32 },
}

/// Snapshot of the node's network state, for status reporting.
#[derive(Debug)]
pub struct NetworkStatus {
    pub active_peers: Vec<SocketAddr>,
    pub max_connections: usize,
    pub running: bool,
    pub download: DownloadProgress,
    pub uploaded_pieces: HashMap<SocketAddr, u32>,
}

/// State shared between the coordinator, the accept loop and every session
/// worker.
///
/// Implements the pool-observer and chunk-handler interfaces so the pool
/// and the session layer talk back to the uploader and downloader without
/// owning them.
pub struct NodeContext {
    config: Cfg,
    torrent: Torrent,
    torrent_id: String,
    advertised: (String, u16),
    pool: Arc<ConnectionPool>,
    uploader: Uploader,
    downloader: Downloader,
    tracker: TrackerClient,
    shutdown: ShutdownSignal,
    logger_sender: LoggerSender,
}

impl PoolObserver for NodeContext {
    fn peer_joined(&self, peer: SocketAddr) {
        self.uploader.peer_connected(peer);
        self.downloader.peer_connected(peer);
    }

    fn peer_left(&self, peer: SocketAddr) {
        self.uploader.peer_disconnected(peer);
        self.downloader.peer_disconnected(peer);
    }
}

impl ChunkHandler for NodeContext {
    /// Resolves a piece for an uploading reply: the in-progress download
    /// cache first, the manifest-backed piece store second.
    fn chunk_requested(
        &self,
        peer: SocketAddr,
        file_name: &str,
        chunk_index: u32,
    ) -> Result<Vec<u8>, String> {
        if let Some(piece) = self.downloader.cached_piece(file_name, chunk_index) {
            return Ok(piece);
        }
        self.uploader
            .chunk_requested(peer, file_name, chunk_index)
            .map_err(|e| match e {
                UploaderError::UnknownFile(name) => format!("{} not in shared files", name),
                UploaderError::PieceStoreError(e) => format!("piece unavailable: {:?}", e),
            })
    }

    fn chunk_received(
        &self,
        peer: SocketAddr,
        file_name: &str,
        chunk_index: u32,
        piece: Vec<u8>,
    ) -> bool {
        match self
            .downloader
            .piece_received(peer, file_name, chunk_index, piece)
        {
            Ok(_) => true,
            Err(e) => {
                self.logger_sender
                    .warn(&format!("Rejected pushed piece {}: {:?}", chunk_index, e));
                false
            }
        }
    }
}

/// A participant in the swarm: server and client at once.
///
/// Composes the connection pool, the uploader, the downloader and the
/// tracker client. `start` brings up the server side; `stop` is idempotent
/// and bounded.
pub struct PeerNode {
    context: Arc<NodeContext>,
    server_thread: Mutex<Option<JoinHandle<()>>>,
    keepalive_thread: Mutex<Option<JoinHandle<()>>>,
}

impl PeerNode {
    /// Creates a new `PeerNode` for one torrent.
    ///
    /// `torrent_id` is the manifest file name the swarm is keyed by;
    /// `advertised` is the `(host, port)` other peers reach this node at.
    pub fn new(
        torrent: Torrent,
        torrent_id: String,
        advertised: (String, u16),
        config: Cfg,
        logger_sender: LoggerSender,
    ) -> Self {
        let pool = Arc::new(ConnectionPool::new(config.max_connections));
        let uploader = Uploader::new(torrent.clone(), logger_sender.clone());
        let downloader = Downloader::new(
            torrent.clone(),
            config.download_directory.clone(),
            logger_sender.clone(),
        );
        let tracker = TrackerClient::new(
            config.tracker_host.clone(),
            config.tracker_port,
            logger_sender.clone(),
        );

        let context = Arc::new(NodeContext {
            config,
            torrent,
            torrent_id,
            advertised,
            pool,
            uploader,
            downloader,
            tracker,
            shutdown: ShutdownSignal::new(),
            logger_sender,
        });

        let observer: Arc<dyn PoolObserver> = context.clone();
        context.pool.register_observer(Arc::downgrade(&observer));

        Self {
            context,
            server_thread: Mutex::new(None),
            keepalive_thread: Mutex::new(None),
        }
    }

    /// Binds the listening socket and spawns the accept loop.
    pub fn start(&self) -> Result<(), PeerNodeError> {
        let mut server_thread = self.lock_thread(&self.server_thread);
        if server_thread.is_some() {
            self.context.logger_sender.warn("Peer node is already running");
            return Ok(());
        }

        let listener = TcpListener::bind(("0.0.0.0", self.context.advertised.1))
            .map_err(PeerNodeError::OpeningListenerError)?;

        let context = self.context.clone();
        let handler: Arc<dyn ChunkHandler> = context.clone();
        let server = BtServer::new(
            listener,
            context.pool.clone(),
            handler,
            context.shutdown.clone(),
            context.logger_sender.clone(),
            context.torrent.piece_length(),
        );

        let builder = thread::Builder::new().name(format!(
            "peer-server {}:{}",
            self.context.advertised.0, self.context.advertised.1
        ));
        let logger_sender = self.context.logger_sender.clone();
        let handle = builder
            .spawn(move || {
                if let Err(e) = server.run() {
                    logger_sender.error(&format!("{:?}", e));
                }
            })
            .map_err(PeerNodeError::SpawnThreadError)?;

        *server_thread = Some(handle);
        self.context.logger_sender.info("Peer node started");
        Ok(())
    }

    /// Publishes this node in the swarm and returns the tracker's peer
    /// list.
    pub fn announce(&self) -> Result<Vec<(String, u16)>, PeerNodeError> {
        self.context
            .tracker
            .announce(
                &self.context.torrent_id,
                &self.context.advertised.0,
                self.context.advertised.1,
            )
            .map_err(PeerNodeError::TrackerError)
    }

    /// Fetches the current peer list from the tracker.
    pub fn refresh_peer_list(&self) -> Result<Vec<(String, u16)>, PeerNodeError> {
        self.context
            .tracker
            .peer_list(&self.context.torrent_id)
            .map_err(PeerNodeError::TrackerError)
    }

    /// Spawns the keep-alive loop: a `time_update` to the tracker every
    /// minute, so the sweeper never evicts a live node.
    pub fn spawn_keepalive(&self) -> Result<(), PeerNodeError> {
        let mut keepalive_thread = self.lock_thread(&self.keepalive_thread);
        if keepalive_thread.is_some() {
            return Ok(());
        }

        let context = self.context.clone();
        let builder = thread::Builder::new().name("tracker-keepalive".to_string());
        let handle = builder
            .spawn(move || loop {
                if context
                    .shutdown
                    .wait_timeout(Duration::from_secs(ANNOUNCE_SECS_INTERVAL))
                {
                    break;
                }
                if let Err(e) = context.tracker.time_update(
                    &context.torrent_id,
                    &context.advertised.0,
                    context.advertised.1,
                ) {
                    context
                        .logger_sender
                        .warn(&format!("Keep-alive failed: {:?}", e));
                }
            })
            .map_err(PeerNodeError::SpawnThreadError)?;

        *keepalive_thread = Some(handle);
        Ok(())
    }

    /// Acquires every missing piece, refreshing the peer list from the
    /// tracker first.
    pub fn download(&self) -> Result<(), PeerNodeError> {
        let peers = self.refresh_peer_list()?;
        self.download_from(&peers)
    }

    /// Acquires every missing piece from the given peers, round-robin.
    ///
    /// For each piece the peers are tried in order; `ERROR` replies, digest
    /// mismatches, short reads and timeouts all mean "try the next peer".
    /// The call keeps going across per-peer failures and reports only the
    /// aggregate outcome.
    pub fn download_from(&self, peers: &[(String, u16)]) -> Result<(), PeerNodeError> {
        let context = &self.context;
        let file_name = context.torrent.name();
        let download_start_time = Local::now();

        for piece_index in context.downloader.missing_pieces() {
            for (host, port) in peers {
                if *host == context.advertised.0 && *port == context.advertised.1 {
                    continue;
                }
                let addr: SocketAddr = match format!("{}:{}", host, port).parse() {
                    Ok(addr) => addr,
                    Err(_) => {
                        context
                            .logger_sender
                            .warn(&format!("Unparseable peer address {}:{}", host, port));
                        continue;
                    }
                };

                let session = match context.pool.lookup(addr) {
                    Some(session) => session,
                    None => match context
                        .pool
                        .dial(addr, Duration::from_secs(DIAL_SECS_TIMEOUT))
                    {
                        Ok(session) => session,
                        Err(e) => {
                            context
                                .logger_sender
                                .warn(&format!("Could not reach peer {}: {:?}", addr, e));
                            continue;
                        }
                    },
                };

                if !context.downloader.begin_request(addr, piece_index) {
                    continue;
                }
                let result = session.request_chunk(
                    file_name.clone(),
                    piece_index,
                    context.torrent.piece_length(),
                    Duration::from_secs(context.config.request_secs_timeout),
                );
                context.downloader.end_request(addr, piece_index);

                match result {
                    Ok(piece) => {
                        match context
                            .downloader
                            .piece_received(addr, &file_name, piece_index, piece)
                        {
                            Ok(_) => break,
                            Err(e) => {
                                context.logger_sender.warn(&format!(
                                    "Piece {} from {} rejected: {:?}",
                                    piece_index, addr, e
                                ));
                                continue;
                            }
                        }
                    }
                    Err(SessionError::ChunkRefused(reason)) => {
                        context.logger_sender.info(&format!(
                            "Peer {} refused piece {}: {}",
                            addr, piece_index, reason
                        ));
                        continue;
                    }
                    Err(e) => {
                        // Transport failure: the slot is released so a
                        // later piece can redial.
                        context.logger_sender.warn(&format!(
                            "Session with {} failed on piece {}: {:?}",
                            addr, piece_index, e
                        ));
                        context.pool.release(addr);
                        continue;
                    }
                }
            }
        }

        if context.downloader.is_complete() {
            let progress = context.downloader.progress();
            context.logger_sender.info(&format!(
                "Download of {} finished at {:.2} kb/s",
                file_name,
                Self::calculate_kilobits_per_second(download_start_time, progress.downloaded_bytes)
            ));
            Ok(())
        } else {
            Err(PeerNodeError::IncompleteDownload {
                missing: context.downloader.missing_pieces().len() as u32,
            })
        }
    }

    fn calculate_kilobits_per_second(start_time: DateTime<Local>, size: u64) -> f64 {
        let elapsed_time = Local::now().signed_duration_since(start_time);
        let elapsed_time_in_seconds = match elapsed_time.num_microseconds() {
            Some(x) => x as f64 / 1_000_000.0,
            None => return 0.0,
        };
        if elapsed_time_in_seconds == 0.0 {
            return 0.0;
        }
        (size as f64 / elapsed_time_in_seconds) * 8.0 / 1024.0
    }

    /// Shuts the node down: withdraw from the tracker, wake the accept
    /// loop, close every session, join the workers with a bounded timeout.
    ///
    /// Calling `stop` twice is a no-op.
    pub fn stop(&self) {
        if !self.context.shutdown.shutdown() {
            self.context.logger_sender.debug("Peer node already stopped");
            return;
        }
        self.context.logger_sender.info("Stopping peer node");

        if let Err(e) = self.context.tracker.stop(
            &self.context.torrent_id,
            &self.context.advertised.0,
            self.context.advertised.1,
        ) {
            self.context
                .logger_sender
                .warn(&format!("Tracker stop failed: {:?}", e));
        }

        // Wake the accept loop in case it sits in a blocking accept.
        let wake_addr: Result<SocketAddr, _> =
            format!("127.0.0.1:{}", self.context.advertised.1).parse();
        if let Ok(wake_addr) = wake_addr {
            let _ = TcpStream::connect_timeout(&wake_addr, Duration::from_secs(1));
        }

        self.context.pool.close_all();

        self.join_bounded(&self.server_thread, "server");
        self.join_bounded(&self.keepalive_thread, "keep-alive");

        self.context.logger_sender.info("Peer node stopped");
    }

    pub fn network_status(&self) -> NetworkStatus {
        NetworkStatus {
            active_peers: self.context.pool.active_peers(),
            max_connections: self.context.pool.max_connections(),
            running: !self.context.shutdown.is_shutdown(),
            download: self.context.downloader.progress(),
            uploaded_pieces: self.context.uploader.upload_status(),
        }
    }

    pub fn download_progress(&self) -> DownloadProgress {
        self.context.downloader.progress()
    }

    pub fn is_complete(&self) -> bool {
        self.context.downloader.is_complete()
    }

    /// Where the assembled file ends up.
    pub fn output_path(&self) -> std::path::PathBuf {
        self.context.downloader.output_path()
    }

    fn join_bounded(&self, slot: &Mutex<Option<JoinHandle<()>>>, name: &str) {
        let handle = match self.lock_thread(slot).take() {
            Some(handle) => handle,
            None => return,
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(JOIN_SECS_TIMEOUT);
        while !handle.is_finished() {
            if std::time::Instant::now() >= deadline {
                self.context
                    .logger_sender
                    .warn(&format!("The {} thread did not terminate cleanly", name));
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }
        if handle.join().is_err() {
            self.context
                .logger_sender
                .error(&format!("The {} thread panicked", name));
        }
    }

    fn lock_thread<'a>(
        &self,
        slot: &'a Mutex<Option<JoinHandle<()>>>,
    ) -> MutexGuard<'a, Option<JoinHandle<()>>> {
        slot.lock().unwrap() // Unwrap is safe: no holder of the lock can panic.
    }
}
