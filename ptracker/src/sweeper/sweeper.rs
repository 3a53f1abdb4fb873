use std::sync::Arc;
use std::time::Duration;

use logger::logger_sender::LoggerSender;

use crate::shutdown::signal::ShutdownSignal;
use crate::swarm::registry::SwarmRegistry;

/// The background eviction loop: wakes every `interval`, evicts peers past
/// their timeout and drops empty swarms.
///
/// Waits on the shared shutdown signal, so `shutdown()` ends the loop
/// immediately. The registry lock is only held inside
/// `remove_inactive_peers`, never across the wait.
#[derive(Debug)]
pub struct PeerSweeper {
    registry: Arc<SwarmRegistry>,
    interval: Duration,
    shutdown: ShutdownSignal,
    logger_sender: LoggerSender,
}

impl PeerSweeper {
    pub fn new(
        registry: Arc<SwarmRegistry>,
        interval: Duration,
        shutdown: ShutdownSignal,
        logger_sender: LoggerSender,
    ) -> Self {
        Self {
            registry,
            interval,
            shutdown,
            logger_sender,
        }
    }

    /// Runs until the shutdown signal flips. Sweeps once at startup, then
    /// once per interval.
    pub fn run(&self) {
        loop {
            self.registry.remove_inactive_peers();
            self.logger_sender.debug("Inactive peers removed");

            if self.shutdown.wait_timeout(self.interval) {
                break;
            }
        }
    }
}
