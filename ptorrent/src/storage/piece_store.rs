use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::torrent::info::FileMode;
use crate::torrent::torrent::Torrent;

trait ReadWithOffset {
    fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<(), std::io::Error>;
}

impl ReadWithOffset for File {
    fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<(), std::io::Error> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }
}

/// Read-only random access to the local file(s) backing a torrent,
/// addressed by piece index.
///
/// Files are opened per piece read and closed when the read ends.
#[derive(Debug)]
pub struct PieceStore {
    torrent: Torrent,
}

#[derive(Debug)]
pub enum PieceStoreError {
    PieceOutOfRange(u32),
    MissingBackingPath(String),
    OpeningFileError(std::io::Error),
    ReadingFileError(std::io::Error),
}

impl PieceStore {
    pub fn new(torrent: Torrent) -> Self {
        Self { torrent }
    }

    /// Reads the bytes of the piece at `piece_index` from the backing
    /// file(s).
    ///
    /// It returns a `PieceStoreError` if:
    /// - The index is outside `[0, total_pieces)`.
    /// - The manifest carries no local backing path.
    /// - A backing file could not be opened or read.
    pub fn read_piece(&self, piece_index: u32) -> Result<Vec<u8>, PieceStoreError> {
        if piece_index >= self.torrent.total_pieces() {
            return Err(PieceStoreError::PieceOutOfRange(piece_index));
        }

        match &self.torrent.info.mode {
            FileMode::SingleFile { length, path } => {
                let path = path
                    .as_ref()
                    .ok_or_else(|| PieceStoreError::MissingBackingPath(self.torrent.name()))?;
                self.read_single_file_piece(Path::new(path), *length, piece_index)
            }
            FileMode::MultiFile { files, full_path } => {
                let root = full_path
                    .as_ref()
                    .ok_or_else(|| PieceStoreError::MissingBackingPath(self.torrent.name()))?;
                self.read_multi_file_piece(Path::new(root), files, piece_index)
            }
        }
    }

    fn read_single_file_piece(
        &self,
        path: &Path,
        total_length: u64,
        piece_index: u32,
    ) -> Result<Vec<u8>, PieceStoreError> {
        let offset = piece_index as u64 * self.torrent.piece_length();
        let size = self.torrent.piece_length().min(total_length - offset);

        let mut file = File::open(path).map_err(PieceStoreError::OpeningFileError)?;
        let mut buffer = vec![0u8; size as usize];
        file.read_exact_at(&mut buffer, offset)
            .map_err(PieceStoreError::ReadingFileError)?;

        Ok(buffer)
    }

    /// Walks the manifest's file list in order, keeping a running cumulative
    /// offset, and concatenates every slice that intersects the piece's
    /// absolute byte range.
    fn read_multi_file_piece(
        &self,
        root: &Path,
        files: &[crate::torrent::info::FileEntry],
        piece_index: u32,
    ) -> Result<Vec<u8>, PieceStoreError> {
        let piece_start = piece_index as u64 * self.torrent.piece_length();
        let piece_end = piece_start + self.torrent.piece_size(piece_index);

        let mut piece = Vec::with_capacity(self.torrent.piece_size(piece_index) as usize);
        let mut current_pos = 0u64;

        for entry in files {
            let file_start = current_pos;
            let file_end = current_pos + entry.length;

            if file_end > piece_start && file_start < piece_end {
                let read_start = piece_start.saturating_sub(file_start);
                let read_end = (piece_end - file_start).min(entry.length);

                let file_path: PathBuf = root.join(&entry.path);
                let mut file = File::open(&file_path).map_err(PieceStoreError::OpeningFileError)?;
                let mut buffer = vec![0u8; (read_end - read_start) as usize];
                file.read_exact_at(&mut buffer, read_start)
                    .map_err(PieceStoreError::ReadingFileError)?;
                piece.extend_from_slice(&buffer);
            }

            current_pos = file_end;
            if current_pos >= piece_end {
                break;
            }
        }

        Ok(piece)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::torrent::info::{FileEntry, FileMode, Info};

    use super::*;

    #[test]
    fn test_read_single_file_pieces() {
        let dir = "./test_read_single_file_pieces";
        fs::create_dir_all(dir).unwrap();
        let path = format!("{}/demo.bin", dir);
        let contents: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &contents).unwrap();

        let store = PieceStore::new(build_single_file_torrent(&path, 1500, 512));

        assert_eq!(store.read_piece(0).unwrap(), &contents[0..512]);
        assert_eq!(store.read_piece(1).unwrap(), &contents[512..1024]);
        // Last piece is short: 1500 - 1024 = 476 bytes.
        assert_eq!(store.read_piece(2).unwrap(), &contents[1024..1500]);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_read_piece_out_of_range() {
        let store = PieceStore::new(build_single_file_torrent("unused", 1500, 512));

        assert!(matches!(
            store.read_piece(3),
            Err(PieceStoreError::PieceOutOfRange(3))
        ));
    }

    #[test]
    fn test_read_piece_without_backing_path() {
        let mut torrent = build_single_file_torrent("unused", 1500, 512);
        torrent.info.mode = FileMode::SingleFile {
            length: 1500,
            path: None,
        };
        let store = PieceStore::new(torrent);

        assert!(matches!(
            store.read_piece(0),
            Err(PieceStoreError::MissingBackingPath(_))
        ));
    }

    #[test]
    fn test_read_multi_file_piece_straddling_boundaries() {
        let dir = "./test_read_multi_file_piece";
        let root = format!("{}/shared", dir);
        fs::create_dir_all(&root).unwrap();
        let a: Vec<u8> = vec![1u8; 600];
        let b: Vec<u8> = vec![2u8; 700];
        let c: Vec<u8> = vec![3u8; 200];
        fs::write(format!("{}/a.bin", root), &a).unwrap();
        fs::write(format!("{}/b.bin", root), &b).unwrap();
        fs::write(format!("{}/c.bin", root), &c).unwrap();

        let files = vec![
            FileEntry {
                path: "a.bin".to_string(),
                length: 600,
            },
            FileEntry {
                path: "b.bin".to_string(),
                length: 700,
            },
            FileEntry {
                path: "c.bin".to_string(),
                length: 200,
            },
        ];
        let torrent = build_multi_file_torrent(&root, files, 512);
        let store = PieceStore::new(torrent);

        let mut stream = a.clone();
        stream.extend(&b);
        stream.extend(&c);

        // Piece 1 spans the a.bin/b.bin boundary, piece 2 spans b.bin/c.bin.
        assert_eq!(store.read_piece(0).unwrap(), &stream[0..512]);
        assert_eq!(store.read_piece(1).unwrap(), &stream[512..1024]);
        assert_eq!(store.read_piece(2).unwrap(), &stream[1024..1500]);

        fs::remove_dir_all(dir).unwrap();
    }

    // Auxiliary functions

    fn build_single_file_torrent(path: &str, length: u64, piece_length: u64) -> Torrent {
        let total_pieces = length.div_ceil(piece_length) as usize;
        Torrent {
            announce_url: "127.0.0.1:8000".to_string(),
            info: Info {
                name: "demo.bin".to_string(),
                piece_length,
                pieces: vec![0u8; total_pieces * 20],
                private: 0,
                mode: FileMode::SingleFile {
                    length,
                    path: Some(path.to_string()),
                },
            },
        }
    }

    fn build_multi_file_torrent(root: &str, files: Vec<FileEntry>, piece_length: u64) -> Torrent {
        let total: u64 = files.iter().map(|f| f.length).sum();
        let total_pieces = total.div_ceil(piece_length) as usize;
        Torrent {
            announce_url: "127.0.0.1:8000".to_string(),
            info: Info {
                name: "shared".to_string(),
                piece_length,
                pieces: vec![0u8; total_pieces * 20],
                private: 0,
                mode: FileMode::MultiFile {
                    files,
                    full_path: Some(root.to_string()),
                },
            },
        }
    }
}
