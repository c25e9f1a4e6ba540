//! Embedded metadata extraction for acquired audio files.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use lofty::config::ParseOptions;
use lofty::file::AudioFile;
use lofty::flac::FlacFile;
use lofty::ogg::VorbisComments;

use super::VerifyError;

/// Metadata and stream properties read from one audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAudioFile {
    pub path: PathBuf,
    pub title: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    /// Track number from the `TRACKNUMBER` tag (`3` or `3/12`).
    pub position: Option<u32>,
    pub duration_seconds: f64,
    pub bit_depth: Option<u8>,
    pub sample_rate: Option<u32>,
    /// Average audio bitrate in bits per second.
    pub bitrate: Option<u32>,
    /// STREAMINFO MD5 of the decoded audio; zero when the encoder never set it.
    pub md5_signature: u128,
    pub upc: Option<String>,
    pub file_size: u64,
}

/// Reads embedded metadata from an audio file.
///
/// Implementations are synchronous; callers run them on the blocking pool.
pub trait AudioTagReader: Send + Sync {
    /// Parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Parse`] when the file cannot be read as audio.
    fn read(&self, path: &Path) -> Result<ParsedAudioFile, VerifyError>;
}

/// FLAC reader backed by `lofty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlacTagReader;

impl FlacTagReader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn comment(tags: Option<&VorbisComments>, key: &str) -> Option<String> {
    tags.and_then(|t| t.get(key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn parse_position(value: &str) -> Option<u32> {
    value.split('/').next()?.trim().parse().ok()
}

/// Where the audio frames start and how many samples they hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamLayout {
    audio_offset: u64,
    sample_rate: u32,
    total_samples: u64,
}

impl StreamLayout {
    /// Exact stream duration in seconds, or `None` when STREAMINFO leaves it unknown.
    fn duration_seconds(&self) -> Option<f64> {
        if self.sample_rate == 0 || self.total_samples == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.total_samples as f64 / f64::from(self.sample_rate))
    }

    /// Average audio bitrate in bits per second, rounded down.
    ///
    /// Metadata blocks (and any leading ID3v2 tag) are excluded from the stream size.
    fn bitrate(&self, file_size: u64) -> Option<u32> {
        if self.sample_rate == 0 || self.total_samples == 0 {
            return None;
        }
        let stream_bits = u128::from(file_size.saturating_sub(self.audio_offset)) * 8;
        let bps = stream_bits * u128::from(self.sample_rate) / u128::from(self.total_samples);
        u32::try_from(bps).ok().filter(|b| *b > 0)
    }
}

/// Walks the FLAC metadata block headers up to the first audio frame.
fn read_stream_layout<R: Read + Seek>(reader: &mut R) -> io::Result<StreamLayout> {
    let invalid = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, msg.to_string());

    let mut offset = 0u64;
    let mut marker = [0u8; 4];
    reader.read_exact(&mut marker)?;
    if marker.starts_with(b"ID3") {
        let mut rest = [0u8; 6];
        reader.read_exact(&mut rest)?;
        let size = rest[2..6]
            .iter()
            .fold(0u64, |acc, b| (acc << 7) | u64::from(b & 0x7F));
        let footer = if rest[1] & 0x10 == 0 { 0 } else { 10 };
        offset = 10 + size + footer;
        reader.seek(SeekFrom::Start(offset))?;
        reader.read_exact(&mut marker)?;
    }
    if marker != *b"fLaC" {
        return Err(invalid("missing fLaC marker"));
    }
    offset += 4;

    let mut streaminfo = None;
    loop {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header)?;
        let is_last = header[0] & 0x80 != 0;
        let block_type = header[0] & 0x7F;
        let len = u64::from(u32::from_be_bytes([0, header[1], header[2], header[3]]));

        if block_type == 0 && len >= 18 {
            let mut info = [0u8; 18];
            reader.read_exact(&mut info)?;
            // Bytes 10..18: 20-bit sample rate, 3-bit channels, 5-bit depth, 36-bit total samples.
            let packed = u64::from_be_bytes([
                info[10], info[11], info[12], info[13], info[14], info[15], info[16], info[17],
            ]);
            let sample_rate = u32::try_from(packed >> 44).map_err(|_| invalid("sample rate"))?;
            streaminfo = Some((sample_rate, packed & 0x000F_FFFF_FFFF));
            let skip = i64::try_from(len - 18).map_err(|_| invalid("block length"))?;
            reader.seek(SeekFrom::Current(skip))?;
        } else {
            let skip = i64::try_from(len).map_err(|_| invalid("block length"))?;
            reader.seek(SeekFrom::Current(skip))?;
        }
        offset += 4 + len;
        if is_last {
            break;
        }
    }

    let (sample_rate, total_samples) = streaminfo.ok_or_else(|| invalid("missing STREAMINFO"))?;
    Ok(StreamLayout {
        audio_offset: offset,
        sample_rate,
        total_samples,
    })
}

impl AudioTagReader for FlacTagReader {
    fn read(&self, path: &Path) -> Result<ParsedAudioFile, VerifyError> {
        let parse_error = |reason: String| VerifyError::Parse {
            path: path.to_path_buf(),
            reason,
        };

        let file_size = std::fs::metadata(path)
            .map_err(|e| VerifyError::io(path, e))?
            .len();
        let mut file = File::open(path).map_err(|e| VerifyError::io(path, e))?;
        let layout = read_stream_layout(&mut file).map_err(|e| parse_error(e.to_string()))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| VerifyError::io(path, e))?;
        let flac = FlacFile::read_from(&mut file, ParseOptions::new())
            .map_err(|e| parse_error(e.to_string()))?;

        let properties = flac.properties();
        let tags = flac.vorbis_comments();

        Ok(ParsedAudioFile {
            path: path.to_path_buf(),
            title: comment(tags, "TITLE"),
            album: comment(tags, "ALBUM"),
            album_artist: comment(tags, "ALBUMARTIST"),
            position: comment(tags, "TRACKNUMBER").as_deref().and_then(parse_position),
            duration_seconds: layout
                .duration_seconds()
                .unwrap_or_else(|| properties.duration().as_secs_f64()),
            bit_depth: Some(properties.bit_depth()),
            sample_rate: Some(properties.sample_rate()),
            bitrate: layout.bitrate(file_size),
            md5_signature: properties.signature(),
            upc: comment(tags, "BARCODE").or_else(|| comment(tags, "UPC")),
            file_size,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Builds a metadata-only FLAC file: STREAMINFO plus a Vorbis comment block.
    fn minimal_flac(md5: u128, comments: &[(&str, &str)]) -> Vec<u8> {
        let mut bytes = b"fLaC".to_vec();

        // STREAMINFO, not last, 34 bytes.
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 34]);
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.extend_from_slice(&[0, 0, 0]);
        let packed: u64 = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36) | 441_000u64;
        bytes.extend_from_slice(&packed.to_be_bytes());
        bytes.extend_from_slice(&md5.to_be_bytes());

        // VORBIS_COMMENT, last block.
        let vendor = b"catalog-relay test";
        let mut block = Vec::new();
        block.extend_from_slice(&u32::try_from(vendor.len()).unwrap().to_le_bytes());
        block.extend_from_slice(vendor);
        block.extend_from_slice(&u32::try_from(comments.len()).unwrap().to_le_bytes());
        for (key, value) in comments {
            let entry = format!("{key}={value}");
            block.extend_from_slice(&u32::try_from(entry.len()).unwrap().to_le_bytes());
            block.extend_from_slice(entry.as_bytes());
        }
        let len = u32::try_from(block.len()).unwrap().to_be_bytes();
        bytes.extend_from_slice(&[0x84, len[1], len[2], len[3]]);
        bytes.extend_from_slice(&block);

        bytes
    }

    #[test]
    fn test_parse_position_accepts_total_suffix() {
        assert_eq!(parse_position("3"), Some(3));
        assert_eq!(parse_position("03/12"), Some(3));
        assert_eq!(parse_position("x"), None);
    }

    #[test]
    fn test_flac_reader_reads_streaminfo_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01.flac");
        std::fs::write(
            &path,
            minimal_flac(
                0xDEAD_BEEF,
                &[
                    ("TITLE", "One More Time"),
                    ("ALBUM", "Discovery"),
                    ("ALBUMARTIST", "Daft Punk"),
                    ("TRACKNUMBER", "1/14"),
                    ("BARCODE", "724384960650"),
                ],
            ),
        )
        .unwrap();

        let parsed = FlacTagReader::new().read(&path).unwrap();

        assert_eq!(parsed.title.as_deref(), Some("One More Time"));
        assert_eq!(parsed.album.as_deref(), Some("Discovery"));
        assert_eq!(parsed.album_artist.as_deref(), Some("Daft Punk"));
        assert_eq!(parsed.position, Some(1));
        assert_eq!(parsed.upc.as_deref(), Some("724384960650"));
        assert_eq!(parsed.sample_rate, Some(44_100));
        assert_eq!(parsed.bit_depth, Some(16));
        assert_eq!(parsed.md5_signature, 0xDEAD_BEEF);
        assert!((parsed.duration_seconds - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_flac_reader_measures_bitrate_in_bits_per_second() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01.flac");
        // 500,625 stream bytes over 441,000 samples at 44.1 kHz is 400,500 bit/s.
        let mut bytes = minimal_flac(7, &[("TRACKNUMBER", "1")]);
        bytes.extend(std::iter::repeat_n(0u8, 500_625));
        std::fs::write(&path, bytes).unwrap();

        let parsed = FlacTagReader::new().read(&path).unwrap();

        assert_eq!(parsed.bitrate, Some(400_500));
        assert!((parsed.duration_seconds - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metadata_only_file_has_no_bitrate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01.flac");
        std::fs::write(&path, minimal_flac(7, &[])).unwrap();

        let parsed = FlacTagReader::new().read(&path).unwrap();
        assert_eq!(parsed.bitrate, None);
    }

    #[test]
    fn test_stream_layout_skips_leading_id3_tag() {
        let flac = minimal_flac(7, &[]);
        let mut bytes = b"ID3\x04\x00\x00".to_vec();
        bytes.extend_from_slice(&[0, 0, 0x01, 0x00]);
        bytes.extend(std::iter::repeat_n(0u8, 128));
        bytes.extend_from_slice(&flac);
        bytes.extend_from_slice(&[0xFF, 0xF8, 0x00, 0x00]);

        let layout = read_stream_layout(&mut std::io::Cursor::new(&bytes)).unwrap();

        assert_eq!(layout.audio_offset, 10 + 128 + flac.len() as u64);
        assert_eq!(layout.sample_rate, 44_100);
        assert_eq!(layout.total_samples, 441_000);
        assert_eq!(layout.bitrate(layout.audio_offset + 4), Some(3));
    }

    #[test]
    fn test_flac_reader_falls_back_to_upc_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01.flac");
        std::fs::write(&path, minimal_flac(1, &[("UPC", "0001")])).unwrap();

        let parsed = FlacTagReader::new().read(&path).unwrap();
        assert_eq!(parsed.upc.as_deref(), Some("0001"));
    }

    #[test]
    fn test_flac_reader_rejects_non_flac_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01.flac");
        std::fs::write(&path, b"ID3 definitely not flac").unwrap();

        let err = FlacTagReader::new().read(&path).unwrap_err();
        assert!(matches!(err, VerifyError::Parse { .. }));
    }
}
