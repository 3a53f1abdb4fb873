use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bencoder::bencode::Bencode;
use sha1::{Digest, Sha1};

use super::info::{FileEntry, FileMode, Info};
use super::torrent::Torrent;

/// Builds a manifest file from a local file or directory.
///
/// Single-file sources hash contiguous `piece_length` reads of the file.
/// Directory sources are walked in lexicographic order and hashed as one
/// concatenated stream, so the piece boundaries are deterministic for a
/// given tree.
#[derive(Debug)]
pub struct TorrentCreator {
    source_path: PathBuf,
    tracker_url: String,
    piece_length: u64,
    private: u8,
}

#[derive(Debug)]
pub enum TorrentCreatorError {
    SourceNotFound(String),
    InvalidSource(String),
    ReadingSourceError(std::io::Error),
    WritingTorrentError(std::io::Error),
}

impl TorrentCreator {
    /// Creates a new `TorrentCreator`. `piece_length_kb` is given in KiB.
    pub fn new(source_path: &Path, tracker_url: String, piece_length_kb: u64, private: u8) -> Self {
        Self {
            source_path: source_path.to_path_buf(),
            tracker_url,
            piece_length: piece_length_kb * 1024,
            private,
        }
    }

    /// Builds the manifest and writes it to `<output_dir>/<name>.torrent`.
    ///
    /// Returns the path of the written file.
    pub fn create(&self, output_dir: &str) -> Result<PathBuf, TorrentCreatorError> {
        if !self.source_path.exists() {
            return Err(TorrentCreatorError::SourceNotFound(
                self.source_path.display().to_string(),
            ));
        }
        fs::create_dir_all(output_dir).map_err(TorrentCreatorError::WritingTorrentError)?;

        let info = if self.source_path.is_file() {
            self.single_file_info()?
        } else if self.source_path.is_dir() {
            self.multi_file_info()?
        } else {
            return Err(TorrentCreatorError::InvalidSource(
                self.source_path.display().to_string(),
            ));
        };

        let torrent = Torrent {
            announce_url: self.tracker_url.clone(),
            info,
        };

        let torrent_path = Path::new(output_dir).join(format!("{}.torrent", torrent.name()));
        let mut file =
            File::create(&torrent_path).map_err(TorrentCreatorError::WritingTorrentError)?;
        file.write_all(&Bencode::encode(&torrent))
            .map_err(TorrentCreatorError::WritingTorrentError)?;

        Ok(torrent_path)
    }

    fn single_file_info(&self) -> Result<Info, TorrentCreatorError> {
        let name = self.source_name()?;
        let length = fs::metadata(&self.source_path)
            .map_err(TorrentCreatorError::ReadingSourceError)?
            .len();
        let pieces = self.hash_file_pieces(&self.source_path)?;

        Ok(Info {
            name,
            piece_length: self.piece_length,
            pieces,
            private: self.private,
            mode: FileMode::SingleFile {
                length,
                path: Some(self.source_path.display().to_string()),
            },
        })
    }

    fn multi_file_info(&self) -> Result<Info, TorrentCreatorError> {
        let name = self.source_name()?;
        let mut entries = Vec::new();
        Self::collect_files(&self.source_path, &self.source_path, &mut entries)
            .map_err(TorrentCreatorError::ReadingSourceError)?;

        let mut files = Vec::with_capacity(entries.len());
        let mut pieces = Vec::new();
        // Pieces are hashed over the concatenated stream, so a piece may
        // straddle a file boundary; the carry buffer holds the remainder.
        let mut carry: Vec<u8> = Vec::new();

        for (rel_path, abs_path) in entries {
            let length = fs::metadata(&abs_path)
                .map_err(TorrentCreatorError::ReadingSourceError)?
                .len();
            files.push(FileEntry {
                path: rel_path,
                length,
            });

            let mut file = File::open(&abs_path).map_err(TorrentCreatorError::ReadingSourceError)?;
            let mut buffer = vec![0u8; self.piece_length as usize];
            loop {
                let read = file
                    .read(&mut buffer)
                    .map_err(TorrentCreatorError::ReadingSourceError)?;
                if read == 0 {
                    break;
                }
                carry.extend_from_slice(&buffer[..read]);
                while carry.len() >= self.piece_length as usize {
                    let piece: Vec<u8> = carry.drain(..self.piece_length as usize).collect();
                    pieces.extend_from_slice(&Sha1::digest(&piece));
                }
            }
        }

        if !carry.is_empty() {
            pieces.extend_from_slice(&Sha1::digest(&carry));
        }

        Ok(Info {
            name,
            piece_length: self.piece_length,
            pieces,
            private: self.private,
            mode: FileMode::MultiFile {
                files,
                full_path: Some(self.source_path.display().to_string()),
            },
        })
    }

    fn hash_file_pieces(&self, path: &Path) -> Result<Vec<u8>, TorrentCreatorError> {
        let mut file = File::open(path).map_err(TorrentCreatorError::ReadingSourceError)?;
        let mut pieces = Vec::new();
        let mut buffer = vec![0u8; self.piece_length as usize];

        loop {
            let mut filled = 0;
            // A piece may need several reads to fill.
            while filled < buffer.len() {
                let read = file
                    .read(&mut buffer[filled..])
                    .map_err(TorrentCreatorError::ReadingSourceError)?;
                if read == 0 {
                    break;
                }
                filled += read;
            }
            if filled == 0 {
                break;
            }
            pieces.extend_from_slice(&Sha1::digest(&buffer[..filled]));
            if filled < buffer.len() {
                break;
            }
        }

        Ok(pieces)
    }

    /// Collects every file under `dir` as `(relative path, absolute path)`,
    /// in lexicographic order.
    fn collect_files(
        root: &Path,
        dir: &Path,
        out: &mut Vec<(String, PathBuf)>,
    ) -> Result<(), std::io::Error> {
        let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                Self::collect_files(root, &path, out)?;
            } else {
                let rel = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .display()
                    .to_string();
                out.push((rel, path));
            }
        }
        Ok(())
    }

    fn source_name(&self) -> Result<String, TorrentCreatorError> {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                TorrentCreatorError::InvalidSource(self.source_path.display().to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::parser::TorrentParser;

    #[test]
    fn test_create_single_file_torrent() {
        let dir = "./test_create_single_file_torrent";
        fs::create_dir_all(dir).unwrap();
        let source = format!("{}/demo.bin", dir);
        let contents: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        fs::write(&source, &contents).unwrap();

        // 1 KiB pieces over 1500 bytes: sizes 1024 and 476.
        let creator = TorrentCreator::new(Path::new(&source), "127.0.0.1:8000".to_string(), 1, 0);
        let torrent_path = creator.create(dir).unwrap();
        let torrent = TorrentParser::parse(&torrent_path).unwrap();

        assert_eq!(torrent.name(), "demo.bin");
        assert_eq!(torrent.total_length(), 1500);
        assert_eq!(torrent.total_pieces(), 2);
        assert_eq!(
            torrent.piece_hash(0).unwrap(),
            Sha1::digest(&contents[..1024]).as_slice()
        );
        assert_eq!(
            torrent.piece_hash(1).unwrap(),
            Sha1::digest(&contents[1024..]).as_slice()
        );

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_create_multi_file_torrent_is_deterministic() {
        let dir = "./test_create_multi_file_torrent";
        let source = format!("{}/shared", dir);
        fs::create_dir_all(format!("{}/sub", source)).unwrap();
        fs::write(format!("{}/b.txt", source), vec![1u8; 700]).unwrap();
        fs::write(format!("{}/a.txt", source), vec![2u8; 600]).unwrap();
        fs::write(format!("{}/sub/c.txt", source), vec![3u8; 200]).unwrap();

        let creator = TorrentCreator::new(Path::new(&source), "127.0.0.1:8000".to_string(), 1, 0);
        let torrent_path = creator.create(dir).unwrap();
        let torrent = TorrentParser::parse(&torrent_path).unwrap();

        assert_eq!(torrent.total_length(), 1500);
        assert_eq!(torrent.total_pieces(), 2);
        match &torrent.info.mode {
            FileMode::MultiFile { files, .. } => {
                // Lexicographic walk: a.txt, b.txt, then sub/c.txt.
                let names: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
                assert_eq!(names, vec!["a.txt", "b.txt", "sub/c.txt"]);
            }
            _ => panic!("expected multi-file mode"),
        }

        // The concatenated stream is a.txt + b.txt + sub/c.txt.
        let mut stream = vec![2u8; 600];
        stream.extend(vec![1u8; 700]);
        stream.extend(vec![3u8; 200]);
        assert_eq!(
            torrent.piece_hash(0).unwrap(),
            Sha1::digest(&stream[..1024]).as_slice()
        );
        assert_eq!(
            torrent.piece_hash(1).unwrap(),
            Sha1::digest(&stream[1024..]).as_slice()
        );

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_create_missing_source() {
        let creator = TorrentCreator::new(
            Path::new("./no_such_source"),
            "127.0.0.1:8000".to_string(),
            1,
            0,
        );
        assert!(matches!(
            creator.create("./unused"),
            Err(TorrentCreatorError::SourceNotFound(_))
        ));
    }
}
