use std::fs;
use std::path::Path;

use super::torrent::{FromTorrentError, Torrent};
use bencoder::bencode::{Bencode, BencodeError};

#[derive(Debug)]
pub enum ParseError {
    IoError(std::io::Error),
    BencodeError(BencodeError),
    FromTorrentError(FromTorrentError),
}

pub struct TorrentParser;

impl TorrentParser {
    /// Loads the manifest stored at `filepath`.
    ///
    /// The file is read whole, decoded from its bencoded form and lifted
    /// into a `Torrent`; each stage that can fail has its own `ParseError`
    /// variant so callers can tell a bad path from a corrupt manifest.
    pub fn parse(filepath: &Path) -> Result<Torrent, ParseError> {
        let buffer = fs::read(filepath).map_err(ParseError::IoError)?;
        let bencode = Bencode::decode(&buffer).map_err(ParseError::BencodeError)?;
        Torrent::from(bencode).map_err(ParseError::FromTorrentError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::info::{FileMode, Info};

    #[test]
    fn test_manifest_loads_from_disk() {
        let filepath = "./test_manifest_loads_from_disk.torrent";
        let torrent = sample_torrent();
        fs::write(filepath, Bencode::encode(&torrent)).unwrap();

        let parsed = TorrentParser::parse(Path::new(filepath));
        fs::remove_file(filepath).unwrap();

        assert_eq!(parsed.unwrap(), torrent);
    }

    #[test]
    fn test_nonexistent_path_is_an_io_error() {
        assert!(matches!(
            TorrentParser::parse(Path::new("./no_such_manifest.torrent")),
            Err(ParseError::IoError(_))
        ));
    }

    #[test]
    fn test_garbage_bytes_are_a_bencode_error() {
        let filepath = "./test_garbage_bytes_are_a_bencode_error.torrent";
        fs::write(filepath, b"this was never bencode").unwrap();

        let parsed = TorrentParser::parse(Path::new(filepath));
        fs::remove_file(filepath).unwrap();

        assert!(matches!(parsed, Err(ParseError::BencodeError(_))));
    }

    #[test]
    fn test_wrong_shape_is_a_torrent_error() {
        let filepath = "./test_wrong_shape_is_a_torrent_error.torrent";
        // Valid bencode, but a bare string instead of a manifest dict.
        fs::write(filepath, Bencode::encode(&String::from("hello"))).unwrap();

        let parsed = TorrentParser::parse(Path::new(filepath));
        fs::remove_file(filepath).unwrap();

        assert!(matches!(parsed, Err(ParseError::FromTorrentError(_))));
    }

    // Auxiliary functions

    fn sample_torrent() -> Torrent {
        Torrent {
            announce_url: "127.0.0.1:8000".to_string(),
            info: Info {
                name: "demo.bin".to_string(),
                piece_length: 512,
                pieces: vec![7u8; 60],
                private: 0,
                mode: FileMode::SingleFile {
                    length: 1500,
                    path: Some("/tmp/demo.bin".to_string()),
                },
            },
        }
    }
}
