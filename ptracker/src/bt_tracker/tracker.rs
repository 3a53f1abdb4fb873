use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use logger::{logger_error::LoggerError, logger_receiver::Logger, logger_sender::LoggerSender};

use crate::server::server::Server;
use crate::shutdown::signal::ShutdownSignal;
use crate::swarm::registry::SwarmRegistry;
use crate::sweeper::sweeper::PeerSweeper;

/// A peer is evicted after this much silence.
const PEER_SECS_TIMEOUT: i64 = 180;
/// How often the sweeper checks for inactive peers.
const CLEANUP_SECS_INTERVAL: u64 = 60;
const JOIN_SECS_TIMEOUT: u64 = 5;
const LOGS_DIRECTORY: &str = "./logs";
const MAX_LOG_FILE_KB_SIZE: u32 = 1000;

/// Struct that represents the Tracker itself.
///
/// Serves as a starting point for the application: owns the swarm
/// registry, the request server and the eviction sweeper.
pub struct BtTracker {
    server: Server,
    shutdown: ShutdownSignal,
    sweeper_thread: Mutex<Option<JoinHandle<()>>>,
    logger_sender: LoggerSender,
}

#[derive(Debug)]
pub enum BtTrackerError {
    LoggerInitError(LoggerError),
    CreatingServerError(std::io::Error),
    StartingServerError(std::io::Error),
    SpawnThreadError(std::io::Error),
}

impl BtTracker {
    /// Creates a new BtTracker listening on `port` and spawns its sweeper.
    pub fn init(port: u16) -> Result<Self, BtTrackerError> {
        let logger = Logger::new(LOGS_DIRECTORY, MAX_LOG_FILE_KB_SIZE)
            .map_err(BtTrackerError::LoggerInitError)?;
        let logger_sender = logger.new_sender();

        let registry = Arc::new(SwarmRegistry::new(ChronoDuration::seconds(PEER_SECS_TIMEOUT)));
        let shutdown = ShutdownSignal::new();

        let sweeper_thread =
            Self::spawn_sweeper(registry.clone(), shutdown.clone(), logger_sender.clone())?;

        let server = Server::init(registry, shutdown.clone(), logger_sender.clone(), port)
            .map_err(BtTrackerError::CreatingServerError)?;

        logger_sender.info("Tracker started");

        Ok(Self {
            server,
            shutdown,
            sweeper_thread: Mutex::new(Some(sweeper_thread)),
            logger_sender,
        })
    }

    /// Starts the server loop for handling requests. Blocks until
    /// shutdown.
    pub fn run(&self) -> Result<(), BtTrackerError> {
        self.server
            .serve()
            .map_err(BtTrackerError::StartingServerError)
    }

    /// The port the server actually listens on.
    pub fn port(&self) -> u16 {
        self.server.port()
    }

    /// Shuts the tracker down: wakes the accept loop and the sweeper, then
    /// joins the sweeper with a bounded timeout. Calling `stop` twice is a
    /// no-op.
    pub fn stop(&self) {
        if !self.shutdown.shutdown() {
            self.logger_sender.debug("Tracker already stopped");
            return;
        }

        let handle = match self.lock_sweeper_thread().take() {
            Some(handle) => handle,
            None => return,
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(JOIN_SECS_TIMEOUT);
        while !handle.is_finished() {
            if std::time::Instant::now() >= deadline {
                self.logger_sender
                    .warn("The sweeper thread did not terminate cleanly");
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }
        if handle.join().is_err() {
            self.logger_sender.error("The sweeper thread panicked");
        }

        self.logger_sender.info("Tracker shut down successfully");
    }

    fn spawn_sweeper(
        registry: Arc<SwarmRegistry>,
        shutdown: ShutdownSignal,
        logger_sender: LoggerSender,
    ) -> Result<JoinHandle<()>, BtTrackerError> {
        let sweeper = PeerSweeper::new(
            registry,
            Duration::from_secs(CLEANUP_SECS_INTERVAL),
            shutdown,
            logger_sender,
        );
        thread::Builder::new()
            .name("peer-sweeper".to_string())
            .spawn(move || sweeper.run())
            .map_err(BtTrackerError::SpawnThreadError)
    }

    fn lock_sweeper_thread(&self) -> MutexGuard<Option<JoinHandle<()>>> {
        self.sweeper_thread.lock().unwrap() // Unwrap is safe: no holder of the lock can panic.
    }
}
