//! Private torrent generation.
//!
//! Metainfo is produced deterministically from the album folder: files are
//! hashed in name order, no creation date is written, and the `source` field
//! pins the torrent to a single tracker. The same folder and tracker always
//! yield the same infohash.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::store::TrackerCode;

/// Smallest piece length written (16 KiB).
pub const MIN_PIECE_LENGTH: u64 = 16 * 1024;
/// Largest piece length written (16 MiB).
pub const MAX_PIECE_LENGTH: u64 = 16 * 1024 * 1024;
/// Piece count the piece length is chosen to approach.
pub const TARGET_PIECE_COUNT: u64 = 1500;

/// Errors from torrent generation.
#[derive(Debug, Error)]
pub enum TorrentError {
    /// Reading the content failed.
    #[error("cannot read torrent content {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Nothing to hash.
    #[error("torrent content at {path} is empty")]
    EmptyContent {
        /// Content root.
        path: PathBuf,
    },

    /// A file name is not valid UTF-8.
    #[error("file name is not valid UTF-8: {path}")]
    NonUtf8Path {
        /// Offending path.
        path: PathBuf,
    },

    /// The blocking generation task did not complete.
    #[error("torrent generation task failed: {0}")]
    Task(String),
}

impl TorrentError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The tracker a torrent is generated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerIdentity {
    pub code: TrackerCode,
    pub announce_url: String,
}

/// A generated torrent file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTorrent {
    /// Lowercase hex SHA-1 of the bencoded info dictionary.
    pub infohash: String,
    pub bytes: Vec<u8>,
}

/// Builds a torrent for a file or folder.
///
/// Synchronous and CPU/IO heavy; callers run it on the blocking pool.
pub trait TorrentGenerator: Send + Sync {
    /// Generates a private torrent for `path` announcing to `tracker`.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError`] if the content cannot be read or is empty.
    fn generate(
        &self,
        path: &Path,
        tracker: &TrackerIdentity,
    ) -> Result<GeneratedTorrent, TorrentError>;
}

/// Bencoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bencode {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Bencode>),
    /// Keys are kept sorted as the encoding requires.
    Dict(BTreeMap<Vec<u8>, Bencode>),
}

impl Bencode {
    fn text(value: &str) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }

    fn int(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }

    /// Appends the encoding of `self` to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Int(i) => {
                out.push(b'i');
                out.extend_from_slice(i.to_string().as_bytes());
                out.push(b'e');
            }
            Self::Bytes(bytes) => {
                out.extend_from_slice(bytes.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(bytes);
            }
            Self::List(items) => {
                out.push(b'l');
                for item in items {
                    item.encode_into(out);
                }
                out.push(b'e');
            }
            Self::Dict(entries) => {
                out.push(b'd');
                for (key, value) in entries {
                    Self::Bytes(key.clone()).encode_into(out);
                    value.encode_into(out);
                }
                out.push(b'e');
            }
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }
}

fn entries<const N: usize>(pairs: [(&str, Bencode); N]) -> BTreeMap<Vec<u8>, Bencode> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v))
        .collect()
}

/// Power-of-two piece length aiming at [`TARGET_PIECE_COUNT`] pieces.
#[must_use]
pub fn piece_length_for(total_size: u64) -> u64 {
    (total_size / TARGET_PIECE_COUNT)
        .next_power_of_two()
        .clamp(MIN_PIECE_LENGTH, MAX_PIECE_LENGTH)
}

struct ContentFile {
    absolute: PathBuf,
    /// Path components relative to the content root.
    components: Vec<String>,
    length: u64,
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<ContentFile>,
) -> Result<(), TorrentError> {
    let entries = std::fs::read_dir(dir).map_err(|e| TorrentError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TorrentError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| TorrentError::io(&path, e))?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(&path);
        let components = relative
            .components()
            .map(|c| {
                c.as_os_str()
                    .to_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| TorrentError::NonUtf8Path { path: path.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let length = entry
            .metadata()
            .map_err(|e| TorrentError::io(&path, e))?
            .len();
        out.push(ContentFile {
            absolute: path,
            components,
            length,
        });
    }
    Ok(())
}

fn hash_pieces(files: &[ContentFile], piece_length: u64) -> Result<Vec<u8>, TorrentError> {
    let capacity = usize::try_from(piece_length).unwrap_or(usize::MAX);
    let mut pieces = Vec::new();
    let mut piece = Vec::with_capacity(capacity);

    for file in files {
        let mut reader = File::open(&file.absolute).map_err(|e| TorrentError::io(&file.absolute, e))?;
        loop {
            let remaining = piece_length - piece.len() as u64;
            let read = (&mut reader)
                .take(remaining)
                .read_to_end(&mut piece)
                .map_err(|e| TorrentError::io(&file.absolute, e))?;
            if piece.len() as u64 == piece_length {
                pieces.extend_from_slice(Sha1::digest(&piece).as_slice());
                piece.clear();
            }
            if read == 0 {
                break;
            }
        }
    }
    if !piece.is_empty() {
        pieces.extend_from_slice(Sha1::digest(&piece).as_slice());
    }
    Ok(pieces)
}

/// Generates BitTorrent v1 metainfo by hashing the content on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetainfoGenerator;

impl MetainfoGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TorrentGenerator for MetainfoGenerator {
    fn generate(
        &self,
        path: &Path,
        tracker: &TrackerIdentity,
    ) -> Result<GeneratedTorrent, TorrentError> {
        let metadata = std::fs::metadata(path).map_err(|e| TorrentError::io(path, e))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TorrentError::NonUtf8Path {
                path: path.to_path_buf(),
            })?
            .to_string();

        let single_file = metadata.is_file();
        let mut files = Vec::new();
        if single_file {
            files.push(ContentFile {
                absolute: path.to_path_buf(),
                components: vec![name.clone()],
                length: metadata.len(),
            });
        } else {
            collect_files(path, path, &mut files)?;
            files.sort_by(|a, b| a.components.cmp(&b.components));
        }

        let total_size: u64 = files.iter().map(|f| f.length).sum();
        if total_size == 0 {
            return Err(TorrentError::EmptyContent {
                path: path.to_path_buf(),
            });
        }

        let piece_length = piece_length_for(total_size);
        let pieces = hash_pieces(&files, piece_length)?;

        let mut info = entries([
            ("name", Bencode::text(&name)),
            ("piece length", Bencode::int(piece_length)),
            ("pieces", Bencode::Bytes(pieces)),
            ("private", Bencode::Int(1)),
            ("source", Bencode::text(tracker.code.as_str())),
        ]);
        if single_file {
            info.insert(b"length".to_vec(), Bencode::int(total_size));
        } else {
            let list = files
                .iter()
                .map(|f| {
                    Bencode::Dict(entries([
                        ("length", Bencode::int(f.length)),
                        (
                            "path",
                            Bencode::List(f.components.iter().map(|c| Bencode::text(c)).collect()),
                        ),
                    ]))
                })
                .collect();
            info.insert(b"files".to_vec(), Bencode::List(list));
        }
        let info = Bencode::Dict(info);

        let infohash = hex::encode(Sha1::digest(info.encode()));
        let torrent = Bencode::Dict(entries([
            ("announce", Bencode::text(&tracker.announce_url)),
            ("info", info),
        ]));

        Ok(GeneratedTorrent {
            infohash,
            bytes: torrent.encode(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn red() -> TrackerIdentity {
        TrackerIdentity {
            code: TrackerCode::Red,
            announce_url: "https://flacsfor.me/abc/announce".to_string(),
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_bencode_encoding() {
        assert_eq!(Bencode::Int(-3).encode(), b"i-3e");
        assert_eq!(Bencode::text("spam").encode(), b"4:spam");
        assert_eq!(
            Bencode::List(vec![Bencode::Int(1), Bencode::text("a")]).encode(),
            b"li1e1:ae"
        );
        assert_eq!(
            Bencode::Dict(entries([("zeta", Bencode::Int(1)), ("alpha", Bencode::Int(2))])).encode(),
            b"d5:alphai2e4:zetai1ee"
        );
    }

    #[test]
    fn test_piece_length_bounds_and_power_of_two() {
        assert_eq!(piece_length_for(1), MIN_PIECE_LENGTH);
        assert_eq!(piece_length_for(u64::MAX / 2), MAX_PIECE_LENGTH);

        let size = 300 * 1024 * 1024;
        let length = piece_length_for(size);
        assert!(length.is_power_of_two());
        assert_eq!(length, 256 * 1024);
    }

    #[test]
    fn test_generate_folder_is_private_and_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("Artist - Album (2001) [WEB FLAC]");
        std::fs::create_dir(&album).unwrap();
        std::fs::write(album.join("02.flac"), vec![2u8; 40_000]).unwrap();
        std::fs::write(album.join("01.flac"), vec![1u8; 10_000]).unwrap();
        std::fs::write(album.join("cover.jpg"), b"jpeg").unwrap();

        let first = MetainfoGenerator::new().generate(&album, &red()).unwrap();
        let second = MetainfoGenerator::new().generate(&album, &red()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.infohash.len(), 40);
        assert!(first.infohash.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(contains(&first.bytes, b"7:privatei1e"));
        assert!(contains(&first.bytes, b"6:source3:RED"));
        assert!(contains(&first.bytes, b"8:announce32:https://flacsfor.me/abc/announce"));
        assert!(!contains(&first.bytes, b"creation date"));

        let one = first.bytes.windows(7).position(|w| w == b"01.flac").unwrap();
        let two = first.bytes.windows(7).position(|w| w == b"02.flac").unwrap();
        let cover = first.bytes.windows(9).position(|w| w == b"cover.jpg").unwrap();
        assert!(one < two && two < cover);
    }

    #[test]
    fn test_source_changes_infohash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01.flac"), vec![7u8; 1000]).unwrap();

        let ops = TrackerIdentity {
            code: TrackerCode::Ops,
            announce_url: "https://home.opsfet.ch/abc/announce".to_string(),
        };
        let red = MetainfoGenerator::new().generate(dir.path(), &red()).unwrap();
        let ops = MetainfoGenerator::new().generate(dir.path(), &ops).unwrap();
        assert_ne!(red.infohash, ops.infohash);
    }

    #[test]
    fn test_pieces_span_file_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let first = vec![1u8; 10_000];
        let second = vec![2u8; 10_000];
        std::fs::write(dir.path().join("a.flac"), &first).unwrap();
        std::fs::write(dir.path().join("b.flac"), &second).unwrap();

        let mut files = Vec::new();
        collect_files(dir.path(), dir.path(), &mut files).unwrap();
        files.sort_by(|a, b| a.components.cmp(&b.components));
        let pieces = hash_pieces(&files, MIN_PIECE_LENGTH).unwrap();

        let mut joined = first.clone();
        joined.extend_from_slice(&second);
        let split = usize::try_from(MIN_PIECE_LENGTH).unwrap();
        let mut expected = Sha1::digest(&joined[..split]).to_vec();
        expected.extend_from_slice(Sha1::digest(&joined[split..]).as_slice());
        assert_eq!(pieces, expected);
    }

    #[test]
    fn test_single_file_uses_length_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.flac");
        std::fs::write(&path, vec![0u8; 500]).unwrap();

        let torrent = MetainfoGenerator::new().generate(&path, &red()).unwrap();
        assert!(contains(&torrent.bytes, b"6:lengthi500e"));
        assert!(!contains(&torrent.bytes, b"5:files"));
    }

    #[test]
    fn test_empty_folder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = MetainfoGenerator::new().generate(dir.path(), &red()).unwrap_err();
        assert!(matches!(err, TorrentError::EmptyContent { .. }));
    }
}
