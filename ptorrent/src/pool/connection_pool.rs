use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::session::handshake::{self, HandshakeError};
use crate::session::session::{Session, SessionError};

/// Observer of pool membership changes, implemented by the peer
/// coordinator.
///
/// Both hooks run while the pool lock is held so observers see a consistent
/// view; they must not block, perform I/O, or call back into the pool.
pub trait PoolObserver: Send + Sync {
    fn peer_joined(&self, peer: SocketAddr);
    fn peer_left(&self, peer: SocketAddr);
}

/// Posible ConnectionPool errors.
#[derive(Debug)]
pub enum ConnectionPoolError {
    PoolFull(SocketAddr),
    DuplicatePeer(SocketAddr),
    ConnectingError(std::io::Error),
    HandshakeError(HandshakeError),
    SessionError(SessionError),
}

/// The bounded map from remote address to live session, shared by uploader
/// and downloader.
///
/// All mutations run under one pool-wide lock; `release` is the single
/// point where a pooled stream is closed.
#[derive(Debug)]
pub struct ConnectionPool {
    sessions: Mutex<HashMap<SocketAddr, Arc<Session>>>,
    max_connections: usize,
    observer: Mutex<Option<Weak<dyn PoolObserver>>>,
}

impl ConnectionPool {
    pub fn new(max_connections: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_connections: max_connections as usize,
            observer: Mutex::new(None),
        }
    }

    /// Registers the membership observer. Held weakly so the coordinator
    /// can own the pool without a reference cycle.
    pub fn register_observer(&self, observer: Weak<dyn PoolObserver>) {
        *self.lock_observer() = Some(observer);
    }

    /// Admits an already-handshaken incoming session.
    ///
    /// Refuses when the pool is full or the remote address already holds a
    /// slot; a refused session is closed before returning.
    pub fn accept_incoming(&self, session: Session) -> Result<Arc<Session>, ConnectionPoolError> {
        let remote = session.remote();
        let mut sessions = self.lock_sessions();

        if sessions.len() >= self.max_connections {
            session.close();
            return Err(ConnectionPoolError::PoolFull(remote));
        }
        if sessions.contains_key(&remote) {
            session.close();
            return Err(ConnectionPoolError::DuplicatePeer(remote));
        }

        let session = Arc::new(session);
        sessions.insert(remote, session.clone());
        self.notify_joined(remote);
        Ok(session)
    }

    /// Opens a stream to `remote`, performs the initiator handshake, then
    /// commits the session under the pool lock.
    ///
    /// The capacity and duplicate checks run after the handshake, like the
    /// incoming path; a dial that loses the race is closed and refused.
    pub fn dial(
        &self,
        remote: SocketAddr,
        timeout: Duration,
    ) -> Result<Arc<Session>, ConnectionPoolError> {
        let mut stream = TcpStream::connect_timeout(&remote, timeout)
            .map_err(ConnectionPoolError::ConnectingError)?;
        handshake::initiate(&mut stream).map_err(ConnectionPoolError::HandshakeError)?;
        let session = Session::new(stream, remote).map_err(ConnectionPoolError::SessionError)?;

        let mut sessions = self.lock_sessions();
        if sessions.len() >= self.max_connections {
            session.close();
            return Err(ConnectionPoolError::PoolFull(remote));
        }
        if sessions.contains_key(&remote) {
            session.close();
            return Err(ConnectionPoolError::DuplicatePeer(remote));
        }

        let session = Arc::new(session);
        sessions.insert(remote, session.clone());
        self.notify_joined(remote);
        Ok(session)
    }

    /// Removes and closes the session for `peer`, if any.
    pub fn release(&self, peer: SocketAddr) {
        let mut sessions = self.lock_sessions();
        if let Some(session) = sessions.remove(&peer) {
            session.close();
            self.notify_left(peer);
        }
    }

    pub fn lookup(&self, peer: SocketAddr) -> Option<Arc<Session>> {
        self.lock_sessions().get(&peer).cloned()
    }

    pub fn active_peers(&self) -> Vec<SocketAddr> {
        self.lock_sessions().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_sessions().is_empty()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Closes every session under the pool lock. Used on shutdown.
    pub fn close_all(&self) {
        let mut sessions = self.lock_sessions();
        for (peer, session) in sessions.drain() {
            session.close();
            self.notify_left(peer);
        }
    }

    fn notify_joined(&self, peer: SocketAddr) {
        if let Some(observer) = self.current_observer() {
            observer.peer_joined(peer);
        }
    }

    fn notify_left(&self, peer: SocketAddr) {
        if let Some(observer) = self.current_observer() {
            observer.peer_left(peer);
        }
    }

    fn current_observer(&self) -> Option<Arc<dyn PoolObserver>> {
        self.lock_observer().as_ref().and_then(|weak| weak.upgrade())
    }

    fn lock_sessions(&self) -> MutexGuard<HashMap<SocketAddr, Arc<Session>>> {
        self.sessions.lock().unwrap() // Unwrap is safe: no holder of the lock can panic.
    }

    fn lock_observer(&self) -> MutexGuard<Option<Weak<dyn PoolObserver>>> {
        self.observer.lock().unwrap() // Unwrap is safe: no holder of the lock can panic.
    }
}
