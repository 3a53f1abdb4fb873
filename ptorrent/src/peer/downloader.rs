use std::collections::{HashMap, HashSet};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use logger::logger_sender::LoggerSender;
use sha1::{Digest, Sha1};

use crate::torrent::torrent::Torrent;

/// Posible Downloader errors.
#[derive(Debug)]
pub enum DownloaderError {
    UnknownFile(String),
    PieceOutOfRange(u32),
    HashMismatch(u32),
    SavingFileError(std::io::Error),
}

/// Per-file download progress, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub downloaded_pieces: u32,
    pub total_pieces: u32,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug)]
struct DownloadState {
    pieces: HashMap<u32, Vec<u8>>,
    in_flight: HashSet<(SocketAddr, u32)>,
    peer_progress: HashMap<SocketAddr, u32>,
    assembled: bool,
}

/// Collects digest-verified pieces of one torrent and assembles the final
/// file once the acquired set covers every index.
///
/// A piece is accepted at most once; re-deliveries are discarded silently.
/// Assembly happens exactly once and writes atomically (temp name, then
/// rename).
#[derive(Debug)]
pub struct Downloader {
    torrent: Torrent,
    save_path: String,
    state: Mutex<DownloadState>,
    logger_sender: LoggerSender,
}

impl Downloader {
    pub fn new(torrent: Torrent, save_path: String, logger_sender: LoggerSender) -> Self {
        Self {
            torrent,
            save_path,
            state: Mutex::new(DownloadState {
                pieces: HashMap::new(),
                in_flight: HashSet::new(),
                peer_progress: HashMap::new(),
                assembled: false,
            }),
            logger_sender,
        }
    }

    /// Hands a received piece to the download state.
    ///
    /// The piece is verified against the manifest digest before it is
    /// accepted. Returns `Ok(true)` when the piece was stored, `Ok(false)`
    /// when it was a duplicate.
    ///
    /// It returns a `DownloaderError` if:
    /// - `file_name` does not match the torrent.
    /// - `piece_index` is out of range.
    /// - The digest does not match (`HashMismatch`, retryable elsewhere).
    /// - The completed file could not be written.
    pub fn piece_received(
        &self,
        peer: SocketAddr,
        file_name: &str,
        piece_index: u32,
        piece: Vec<u8>,
    ) -> Result<bool, DownloaderError> {
        if file_name != self.torrent.name() {
            return Err(DownloaderError::UnknownFile(file_name.to_string()));
        }
        self.verify_piece(piece_index, &piece)?;

        let complete = {
            let mut state = self.lock_state();
            if state.pieces.contains_key(&piece_index) {
                self.logger_sender
                    .debug(&format!("Discarding duplicate piece {}", piece_index));
                return Ok(false);
            }
            state.pieces.insert(piece_index, piece);
            *state.peer_progress.entry(peer).or_insert(0) += 1;

            let complete = state.pieces.len() as u32 == self.torrent.total_pieces();
            if complete && !state.assembled {
                state.assembled = true;
                true
            } else {
                false
            }
        };

        self.logger_sender.info(&format!(
            "Piece {} of {} downloaded",
            piece_index,
            self.torrent.name()
        ));

        if complete {
            self.assemble()?;
        }
        Ok(true)
    }

    /// Returns a verified piece from the in-progress cache, so a partial
    /// download can already be re-served to other peers.
    pub fn cached_piece(&self, file_name: &str, piece_index: u32) -> Option<Vec<u8>> {
        if file_name != self.torrent.name() {
            return None;
        }
        let piece = self.lock_state().pieces.get(&piece_index).cloned()?;
        // Verify again before forwarding bytes to another peer.
        self.verify_piece(piece_index, &piece).ok()?;
        Some(piece)
    }

    /// Piece indices not yet acquired, in ascending order.
    pub fn missing_pieces(&self) -> Vec<u32> {
        let state = self.lock_state();
        (0..self.torrent.total_pieces())
            .filter(|index| !state.pieces.contains_key(index))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.lock_state().pieces.len() as u32 == self.torrent.total_pieces()
    }

    /// Marks `(peer, piece)` as in flight. Returns `false` when the same
    /// request is already outstanding.
    pub fn begin_request(&self, peer: SocketAddr, piece_index: u32) -> bool {
        self.lock_state().in_flight.insert((peer, piece_index))
    }

    pub fn end_request(&self, peer: SocketAddr, piece_index: u32) {
        self.lock_state().in_flight.remove(&(peer, piece_index));
    }

    pub fn peer_connected(&self, peer: SocketAddr) {
        self.lock_state().peer_progress.entry(peer).or_insert(0);
    }

    pub fn peer_disconnected(&self, peer: SocketAddr) {
        let mut state = self.lock_state();
        state.peer_progress.remove(&peer);
        state.in_flight.retain(|(p, _)| *p != peer);
    }

    pub fn progress(&self) -> DownloadProgress {
        let state = self.lock_state();
        let downloaded_bytes = state.pieces.values().map(|p| p.len() as u64).sum();
        DownloadProgress {
            downloaded_pieces: state.pieces.len() as u32,
            total_pieces: self.torrent.total_pieces(),
            downloaded_bytes,
            total_bytes: self.torrent.total_length(),
        }
    }

    /// Where the assembled file ends up.
    pub fn output_path(&self) -> PathBuf {
        Path::new(&self.save_path).join(self.torrent.name())
    }

    fn verify_piece(&self, piece_index: u32, piece: &[u8]) -> Result<(), DownloaderError> {
        let expected = self
            .torrent
            .piece_hash(piece_index)
            .ok_or(DownloaderError::PieceOutOfRange(piece_index))?;
        let digest = Sha1::digest(piece);
        if digest.as_slice() != expected {
            return Err(DownloaderError::HashMismatch(piece_index));
        }
        Ok(())
    }

    /// Writes the acquired pieces, sorted by index, to `save_path/name`
    /// through a temporary name.
    fn assemble(&self) -> Result<(), DownloaderError> {
        let mut entries: Vec<(u32, Vec<u8>)> = {
            let state = self.lock_state();
            state
                .pieces
                .iter()
                .map(|(index, piece)| (*index, piece.clone()))
                .collect()
        };
        entries.sort_by_key(|(index, _)| *index);

        fs::create_dir_all(&self.save_path).map_err(DownloaderError::SavingFileError)?;
        let temp_path = Path::new(&self.save_path).join(format!(
            ".{}.{:08x}.tmp",
            self.torrent.name(),
            rand::random::<u32>()
        ));

        let bytes: Vec<u8> = entries.into_iter().flat_map(|(_, piece)| piece).collect();
        fs::write(&temp_path, &bytes).map_err(DownloaderError::SavingFileError)?;
        fs::rename(&temp_path, self.output_path()).map_err(DownloaderError::SavingFileError)?;

        self.logger_sender.info(&format!(
            "Assembled {} ({} bytes)",
            self.torrent.name(),
            bytes.len()
        ));
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<DownloadState> {
        self.state.lock().unwrap() // Unwrap is safe: no holder of the lock can panic.
    }
}
