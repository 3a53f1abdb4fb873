use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use logger::logger_sender::LoggerSender;

use crate::storage::piece_store::{PieceStore, PieceStoreError};
use crate::torrent::torrent::Torrent;

/// Posible Uploader errors. All of them are semantic: they become a
/// `status:ERROR` reply, never a closed session.
#[derive(Debug)]
pub enum UploaderError {
    UnknownFile(String),
    PieceStoreError(PieceStoreError),
}

/// Serves piece requests against the local manifest and its piece store,
/// keeping per-peer counters of served pieces for status reporting.
#[derive(Debug)]
pub struct Uploader {
    torrent: Torrent,
    piece_store: PieceStore,
    served: Mutex<HashMap<SocketAddr, u32>>,
    logger_sender: LoggerSender,
}

impl Uploader {
    pub fn new(torrent: Torrent, logger_sender: LoggerSender) -> Self {
        let piece_store = PieceStore::new(torrent.clone());
        Self {
            torrent,
            piece_store,
            served: Mutex::new(HashMap::new()),
            logger_sender,
        }
    }

    /// Looks up a requested piece in the local store.
    ///
    /// The lookup key is the file name, matched against the manifest's
    /// `info.name`.
    pub fn chunk_requested(
        &self,
        peer: SocketAddr,
        file_name: &str,
        chunk_index: u32,
    ) -> Result<Vec<u8>, UploaderError> {
        if file_name != self.torrent.name() {
            self.logger_sender
                .warn(&format!("{} not in shared files", file_name));
            return Err(UploaderError::UnknownFile(file_name.to_string()));
        }

        let piece = self
            .piece_store
            .read_piece(chunk_index)
            .map_err(UploaderError::PieceStoreError)?;

        *self.lock_served().entry(peer).or_insert(0) += 1;
        self.logger_sender.debug(&format!(
            "Served piece {} of {} to {}",
            chunk_index, file_name, peer
        ));

        Ok(piece)
    }

    pub fn peer_connected(&self, peer: SocketAddr) {
        self.lock_served().entry(peer).or_insert(0);
    }

    pub fn peer_disconnected(&self, peer: SocketAddr) {
        self.lock_served().remove(&peer);
    }

    /// Snapshot of pieces served per connected peer.
    pub fn upload_status(&self) -> HashMap<SocketAddr, u32> {
        self.lock_served().clone()
    }

    fn lock_served(&self) -> MutexGuard<HashMap<SocketAddr, u32>> {
        self.served.lock().unwrap() // Unwrap is safe: no holder of the lock can panic.
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::mpsc::channel;

    use crate::torrent::info::{FileMode, Info};

    use super::*;

    #[test]
    fn test_chunk_requested_serves_from_store() {
        let dir = "./test_uploader_serves";
        fs::create_dir_all(dir).unwrap();
        let path = format!("{}/demo.bin", dir);
        let contents: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &contents).unwrap();

        let uploader = Uploader::new(build_torrent(&path), test_logger_sender());
        let peer = test_peer();

        let piece = uploader.chunk_requested(peer, "demo.bin", 2).unwrap();
        assert_eq!(piece, &contents[1024..1500]);
        assert_eq!(uploader.upload_status().get(&peer), Some(&1));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_unknown_file_is_refused() {
        let uploader = Uploader::new(build_torrent("unused"), test_logger_sender());

        assert!(matches!(
            uploader.chunk_requested(test_peer(), "other.bin", 0),
            Err(UploaderError::UnknownFile(_))
        ));
    }

    #[test]
    fn test_out_of_range_piece_is_refused() {
        let uploader = Uploader::new(build_torrent("unused"), test_logger_sender());

        assert!(matches!(
            uploader.chunk_requested(test_peer(), "demo.bin", 3),
            Err(UploaderError::PieceStoreError(
                PieceStoreError::PieceOutOfRange(3)
            ))
        ));
    }

    #[test]
    fn test_peer_counters_follow_pool_membership() {
        let uploader = Uploader::new(build_torrent("unused"), test_logger_sender());
        let peer = test_peer();

        uploader.peer_connected(peer);
        assert_eq!(uploader.upload_status().get(&peer), Some(&0));

        uploader.peer_disconnected(peer);
        assert!(uploader.upload_status().get(&peer).is_none());
    }

    // Auxiliary functions

    fn build_torrent(path: &str) -> Torrent {
        Torrent {
            announce_url: "127.0.0.1:8000".to_string(),
            info: Info {
                name: "demo.bin".to_string(),
                piece_length: 512,
                pieces: vec![0u8; 60],
                private: 0,
                mode: FileMode::SingleFile {
                    length: 1500,
                    path: Some(path.to_string()),
                },
            },
        }
    }

    fn test_peer() -> SocketAddr {
        "10.0.0.1:6000".parse().unwrap()
    }

    fn test_logger_sender() -> LoggerSender {
        let (sender, receiver) = channel();
        Box::leak(Box::new(receiver));
        LoggerSender::new(sender)
    }
}
