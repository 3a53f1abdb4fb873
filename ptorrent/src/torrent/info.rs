use std::collections::BTreeMap;

use bencoder::bencode::{Bencode, ToBencode};

pub const PIECE_HASH_LEN: usize = 20;

/// A single entry of a multi-file manifest: the path of the file relative
/// to the shared root, and its length in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub length: u64,
}

/// Storage layout described by a manifest.
///
/// `path`/`full_path` are local-only pointers to the backing bytes; they are
/// only meaningful on the machine that seeds the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMode {
    SingleFile {
        length: u64,
        path: Option<String>,
    },
    MultiFile {
        files: Vec<FileEntry>,
        full_path: Option<String>,
    },
}

/// The `info` dictionary of a manifest.
///
/// `pieces` is the concatenation of 20-byte SHA-1 digests, one per piece,
/// in piece-index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub name: String,
    pub piece_length: u64,
    pub pieces: Vec<u8>,
    pub private: u8,
    pub mode: FileMode,
}

#[derive(Debug, PartialEq)]
pub enum FromInfoError {
    NotADict,
    MissingName,
    MissingPieceLength,
    MissingPieces,
    MissingLength,
    InvalidPrivateFlag,
    InvalidFileEntry,
    InvalidPiecesLength,
    PieceCountMismatch,
}

impl Info {
    pub fn from(bencode: &Bencode) -> Result<Info, FromInfoError> {
        let d = match bencode {
            Bencode::BDict(d) => d,
            _ => return Err(FromInfoError::NotADict),
        };

        let name = Self::create_string(d.get(&b"name".to_vec()).ok_or(FromInfoError::MissingName)?)
            .ok_or(FromInfoError::MissingName)?;

        let piece_length = Self::create_number(
            d.get(&b"piece_length".to_vec())
                .ok_or(FromInfoError::MissingPieceLength)?,
        )
        .ok_or(FromInfoError::MissingPieceLength)?;
        if piece_length == 0 {
            return Err(FromInfoError::MissingPieceLength);
        }

        let pieces = match d.get(&b"pieces".to_vec()) {
            Some(Bencode::BString(s)) => s.clone(),
            _ => return Err(FromInfoError::MissingPieces),
        };
        if pieces.len() % PIECE_HASH_LEN != 0 {
            return Err(FromInfoError::InvalidPiecesLength);
        }

        let private = match d.get(&b"private".to_vec()) {
            Some(Bencode::BNumber(n)) if (0..=1).contains(n) => *n as u8,
            Some(_) => return Err(FromInfoError::InvalidPrivateFlag),
            None => 0,
        };

        let mode = match d.get(&b"files".to_vec()) {
            Some(files) => FileMode::MultiFile {
                files: Self::create_files(files)?,
                full_path: d.get(&b"full_path".to_vec()).and_then(Self::create_string),
            },
            None => FileMode::SingleFile {
                length: Self::create_number(
                    d.get(&b"length".to_vec()).ok_or(FromInfoError::MissingLength)?,
                )
                .ok_or(FromInfoError::MissingLength)?,
                path: d.get(&b"path".to_vec()).and_then(Self::create_string),
            },
        };

        let info = Info {
            name,
            piece_length,
            pieces,
            private,
            mode,
        };

        // Manifest invariant: one 20-byte digest per piece.
        let expected = info.total_length().div_ceil(info.piece_length);
        if expected != (info.pieces.len() / PIECE_HASH_LEN) as u64 {
            return Err(FromInfoError::PieceCountMismatch);
        }

        Ok(info)
    }

    /// Total byte count of the backing content, across both storage modes.
    pub fn total_length(&self) -> u64 {
        match &self.mode {
            FileMode::SingleFile { length, .. } => *length,
            FileMode::MultiFile { files, .. } => files.iter().map(|f| f.length).sum(),
        }
    }

    /// Number of pieces the content is split into.
    pub fn total_pieces(&self) -> u32 {
        self.total_length().div_ceil(self.piece_length) as u32
    }

    /// Size in bytes of the piece at `piece_index`. Every piece is
    /// `piece_length` long except possibly the last one.
    pub fn piece_size(&self, piece_index: u32) -> u64 {
        let start = piece_index as u64 * self.piece_length;
        self.piece_length.min(self.total_length() - start)
    }

    /// The 20-byte digest of the piece at `piece_index`, if in range.
    pub fn piece_hash(&self, piece_index: u32) -> Option<&[u8]> {
        let start = piece_index as usize * PIECE_HASH_LEN;
        let end = start + PIECE_HASH_LEN;
        if end > self.pieces.len() {
            return None;
        }
        Some(&self.pieces[start..end])
    }

    fn create_string(bencode: &Bencode) -> Option<String> {
        match bencode {
            Bencode::BString(s) => String::from_utf8(s.clone()).ok(),
            _ => None,
        }
    }

    fn create_number(bencode: &Bencode) -> Option<u64> {
        match bencode {
            Bencode::BNumber(n) if *n >= 0 => Some(*n as u64),
            _ => None,
        }
    }

    fn create_files(bencode: &Bencode) -> Result<Vec<FileEntry>, FromInfoError> {
        let list = match bencode {
            Bencode::BList(l) => l,
            _ => return Err(FromInfoError::InvalidFileEntry),
        };

        let mut files = Vec::with_capacity(list.len());
        for entry in list {
            let d = match entry {
                Bencode::BDict(d) => d,
                _ => return Err(FromInfoError::InvalidFileEntry),
            };
            let path = d
                .get(&b"path".to_vec())
                .and_then(Self::create_string)
                .ok_or(FromInfoError::InvalidFileEntry)?;
            let length = d
                .get(&b"length".to_vec())
                .and_then(Self::create_number)
                .ok_or(FromInfoError::InvalidFileEntry)?;
            files.push(FileEntry { path, length });
        }
        Ok(files)
    }
}

impl ToBencode for FileEntry {
    fn to_bencode(&self) -> Bencode {
        let mut entry = BTreeMap::new();
        entry.insert(b"length".to_vec(), self.length.to_bencode());
        entry.insert(b"path".to_vec(), self.path.to_bencode());
        Bencode::BDict(entry)
    }
}

impl ToBencode for Info {
    fn to_bencode(&self) -> Bencode {
        let mut info = BTreeMap::new();
        info.insert(b"name".to_vec(), self.name.to_bencode());
        info.insert(b"piece_length".to_vec(), self.piece_length.to_bencode());
        info.insert(b"pieces".to_vec(), self.pieces.to_bencode());
        info.insert(b"private".to_vec(), self.private.to_bencode());
        match &self.mode {
            FileMode::SingleFile { length, path } => {
                info.insert(b"length".to_vec(), length.to_bencode());
                if let Some(path) = path {
                    info.insert(b"path".to_vec(), path.to_bencode());
                }
            }
            FileMode::MultiFile { files, full_path } => {
                info.insert(b"files".to_vec(), files.to_bencode());
                if let Some(full_path) = full_path {
                    info.insert(b"full_path".to_vec(), full_path.to_bencode());
                }
            }
        }
        Bencode::BDict(info)
    }
}
