use chrono::{DateTime, Duration, Local};

/// Stable identity of a peer within a swarm.
pub type PeerAddress = (String, u16);

/// One registered peer and the last time it was heard from.
#[derive(Debug, Clone)]
pub struct SwarmPeer {
    pub address: PeerAddress,
    last_seen: DateTime<Local>,
}

impl SwarmPeer {
    /// Creates a peer stamped with the current time.
    pub fn new(address: PeerAddress) -> Self {
        Self {
            address,
            last_seen: Local::now(),
        }
    }

    /// Creates a peer with an explicit last-seen stamp.
    pub fn with_last_seen(address: PeerAddress, last_seen: DateTime<Local>) -> Self {
        Self { address, last_seen }
    }

    pub fn last_seen(&self) -> DateTime<Local> {
        self.last_seen
    }

    pub fn refresh(&mut self) {
        self.last_seen = Local::now();
    }
}

/// The set of peers registered for one torrent, in announce order.
#[derive(Debug, Clone)]
pub struct Swarm {
    peers: Vec<SwarmPeer>,
    peer_timeout: Duration,
}

impl Swarm {
    /// Creates a new swarm.
    ///
    /// `peer_timeout` is the silence after which a peer counts as inactive.
    pub fn new(peer_timeout: Duration) -> Self {
        Self {
            peers: Vec::new(),
            peer_timeout,
        }
    }

    /// Registers a peer. Returns `false` when the address is already in the
    /// swarm; the existing entry and the announce order stay untouched.
    pub fn announce(&mut self, peer: SwarmPeer) -> bool {
        if self.contains(&peer.address) {
            return false;
        }
        self.peers.push(peer);
        true
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.peers.iter().any(|peer| peer.address == *address)
    }

    /// Removes a peer. Returns whether it was present.
    pub fn remove(&mut self, address: &PeerAddress) -> bool {
        let before = self.peers.len();
        self.peers.retain(|peer| peer.address != *address);
        self.peers.len() != before
    }

    /// Refreshes the last-seen stamp of an existing peer. Returns `false`
    /// when the peer is not in the swarm; absent peers are not created.
    pub fn refresh(&mut self, address: &PeerAddress) -> bool {
        match self.peers.iter_mut().find(|peer| peer.address == *address) {
            Some(peer) => {
                peer.refresh();
                true
            }
            None => false,
        }
    }

    /// The current peer addresses, in announce order.
    pub fn peer_addresses(&self) -> Vec<PeerAddress> {
        self.peers.iter().map(|peer| peer.address.clone()).collect()
    }

    /// Evicts every peer silent for `peer_timeout` or longer.
    pub fn remove_inactive_peers(&mut self) {
        let now = Local::now();
        let peer_timeout = self.peer_timeout;
        self.peers
            .retain(|peer| now.signed_duration_since(peer.last_seen()) < peer_timeout);
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}
