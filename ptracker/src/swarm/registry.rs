use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Duration;

use super::swarm::{PeerAddress, Swarm, SwarmPeer};

/// Result of an announce: the peer list as of the insertion, or the
/// non-fatal duplicate case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnounceOutcome {
    Added(Vec<PeerAddress>),
    AlreadyAnnounced,
}

/// The swarm membership registry: `torrent_id` to live peer set.
///
/// One exclusive lock covers the request handlers and the sweeper's
/// mutation phase; nothing does I/O while holding it.
#[derive(Debug)]
pub struct SwarmRegistry {
    swarms: Mutex<HashMap<String, Swarm>>,
    peer_timeout: Duration,
}

impl SwarmRegistry {
    pub fn new(peer_timeout: Duration) -> Self {
        Self {
            swarms: Mutex::new(HashMap::new()),
            peer_timeout,
        }
    }

    /// Inserts a peer into the swarm for `torrent_id`, creating the swarm
    /// on first announce.
    ///
    /// The returned peer list reflects the insertion (read-your-writes). A
    /// duplicate announce mutates nothing.
    pub fn announce(&self, torrent_id: &str, peer: SwarmPeer) -> AnnounceOutcome {
        let mut swarms = self.lock_swarms();
        let swarm = swarms
            .entry(torrent_id.to_string())
            .or_insert_with(|| Swarm::new(self.peer_timeout));

        if swarm.announce(peer) {
            AnnounceOutcome::Added(swarm.peer_addresses())
        } else {
            AnnounceOutcome::AlreadyAnnounced
        }
    }

    /// The current peer list for `torrent_id`; empty when the swarm does
    /// not exist. Does not mutate.
    pub fn peer_list(&self, torrent_id: &str) -> Vec<PeerAddress> {
        match self.lock_swarms().get(torrent_id) {
            Some(swarm) => swarm.peer_addresses(),
            None => Vec::new(),
        }
    }

    /// Removes a peer from a swarm. Returns whether it was present.
    pub fn remove_peer(&self, torrent_id: &str, address: &PeerAddress) -> bool {
        match self.lock_swarms().get_mut(torrent_id) {
            Some(swarm) => swarm.remove(address),
            None => false,
        }
    }

    /// Refreshes a peer's last-seen stamp. Returns `false` when the swarm
    /// or the peer does not exist; nothing is created.
    pub fn refresh_peer(&self, torrent_id: &str, address: &PeerAddress) -> bool {
        match self.lock_swarms().get_mut(torrent_id) {
            Some(swarm) => swarm.refresh(address),
            None => false,
        }
    }

    /// Evicts inactive peers from every swarm and drops swarms that end up
    /// empty.
    pub fn remove_inactive_peers(&self) {
        let mut swarms = self.lock_swarms();
        for swarm in swarms.values_mut() {
            swarm.remove_inactive_peers();
        }
        swarms.retain(|_, swarm| !swarm.is_empty());
    }

    pub fn swarm_count(&self) -> usize {
        self.lock_swarms().len()
    }

    fn lock_swarms(&self) -> MutexGuard<HashMap<String, Swarm>> {
        self.swarms.lock().unwrap() // Unwrap is safe: no holder of the lock can panic.
    }
}
