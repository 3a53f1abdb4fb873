use std::collections::BTreeMap;

use bencoder::bencode::{Bencode, ToBencode};

use super::info::{FromInfoError, Info};

/// A parsed manifest: the tracker announce URL plus the `info` dictionary.
///
/// Produced once by the content owner, immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub announce_url: String,
    pub info: Info,
}

#[derive(Debug, PartialEq)]
pub enum FromTorrentError {
    MissingAnnounce,
    MissingInfo,
    FromInfoError(FromInfoError),
    NotADict,
}

impl Torrent {
    pub fn from(bencode: Bencode) -> Result<Torrent, FromTorrentError> {
        let d = match bencode {
            Bencode::BDict(d) => d,
            _ => return Err(FromTorrentError::NotADict),
        };

        let announce_url = match d.get(&b"announce".to_vec()) {
            Some(Bencode::BString(s)) => String::from_utf8(s.clone())
                .map_err(|_| FromTorrentError::MissingAnnounce)?,
            _ => return Err(FromTorrentError::MissingAnnounce),
        };

        let info = match d.get(&b"info".to_vec()) {
            Some(info) => Info::from(info).map_err(FromTorrentError::FromInfoError)?,
            None => return Err(FromTorrentError::MissingInfo),
        };

        Ok(Torrent { announce_url, info })
    }

    /// Returns the name of the torrent.
    pub fn name(&self) -> String {
        self.info.name.clone()
    }

    /// Returns the size of pieces of the torrent.
    pub fn piece_length(&self) -> u64 {
        self.info.piece_length
    }

    /// Returns the length in bytes of the torrent content.
    pub fn total_length(&self) -> u64 {
        self.info.total_length()
    }

    /// Returns the number of pieces of the torrent.
    pub fn total_pieces(&self) -> u32 {
        self.info.total_pieces()
    }

    /// Returns the size of the piece at `piece_index`.
    pub fn piece_size(&self, piece_index: u32) -> u64 {
        self.info.piece_size(piece_index)
    }

    /// Returns the expected 20-byte digest of the piece at `piece_index`.
    pub fn piece_hash(&self, piece_index: u32) -> Option<&[u8]> {
        self.info.piece_hash(piece_index)
    }
}

impl ToBencode for Torrent {
    fn to_bencode(&self) -> Bencode {
        let mut m = BTreeMap::new();
        m.insert(b"announce".to_vec(), self.announce_url.to_bencode());
        m.insert(b"info".to_vec(), self.info.to_bencode());
        Bencode::BDict(m)
    }
}

#[cfg(test)]
mod tests {
    use crate::torrent::info::FileMode;

    use super::*;

    #[test]
    fn test_from_torrent_full() {
        let torrent = Torrent::from(build_torrent_bencode()).unwrap();

        assert_eq!(torrent.announce_url, "127.0.0.1:8000");
        assert_eq!(torrent.name(), "demo.bin");
        assert_eq!(torrent.piece_length(), 512);
        assert_eq!(torrent.total_length(), 1500);
        assert_eq!(torrent.total_pieces(), 3);
    }

    #[test]
    fn test_from_torrent_missing_announce() {
        let mut d = match build_torrent_bencode() {
            Bencode::BDict(d) => d,
            _ => unreachable!(),
        };
        d.remove(&b"announce".to_vec());

        assert_eq!(
            Torrent::from(Bencode::BDict(d)).unwrap_err(),
            FromTorrentError::MissingAnnounce
        );
    }

    #[test]
    fn test_from_torrent_missing_info() {
        let mut d = BTreeMap::new();
        d.insert(
            b"announce".to_vec(),
            Bencode::BString(b"127.0.0.1:8000".to_vec()),
        );

        assert_eq!(
            Torrent::from(Bencode::BDict(d)).unwrap_err(),
            FromTorrentError::MissingInfo
        );
    }

    #[test]
    fn test_from_torrent_not_a_dict() {
        assert_eq!(
            Torrent::from(Bencode::BString(b"test".to_vec())).unwrap_err(),
            FromTorrentError::NotADict
        );
    }

    #[test]
    fn test_bencode_round_trip() {
        let torrent = Torrent::from(build_torrent_bencode()).unwrap();

        let encoded = Bencode::encode(&torrent);
        let decoded = Torrent::from(Bencode::decode(&encoded).unwrap()).unwrap();

        assert_eq!(decoded, torrent);
    }

    // Auxiliary functions

    fn build_torrent_bencode() -> Bencode {
        let info = Info {
            name: "demo.bin".to_string(),
            piece_length: 512,
            pieces: vec![0u8; 60],
            private: 0,
            mode: FileMode::SingleFile {
                length: 1500,
                path: Some("/tmp/demo.bin".to_string()),
            },
        };
        let torrent = Torrent {
            announce_url: "127.0.0.1:8000".to_string(),
            info,
        };
        Bencode::decode(&Bencode::encode(&torrent)).unwrap()
    }
}
