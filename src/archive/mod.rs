// src/archive/mod.rs

//! Archive extraction and creation
//!
//! Supports tar and zip containers, optionally wrapped in one compression
//! layer. Formats are identified from content (magic bytes); the file name
//! is only consulted for formats that carry no magic, such as brotli
//! streams and pre-POSIX tar files.
//!
//! Extraction resolves every entry through [`secure_path::resolve`] before
//! writing it, and aborts on the first entry that fails.

mod codec;
mod pack;
pub mod secure_path;
mod unpack;

pub use pack::create;
pub use unpack::{entry_names, extract};

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

/// Bytes inspected to identify a format: one tar header
const PEEK_LEN: usize = 512;

/// Container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    Tar,
    Zip,
}

impl ArchiveKind {
    pub const ALL: [ArchiveKind; 2] = [ArchiveKind::Tar, ArchiveKind::Zip];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveKind::Tar => "tar",
            ArchiveKind::Zip => "zip",
        }
    }

    /// Identify a container from its first bytes
    pub fn detect(head: &[u8]) -> Option<Self> {
        if head.len() >= 262 && &head[257..262] == b"ustar" {
            return Some(ArchiveKind::Tar);
        }
        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            return Some(ArchiveKind::Zip);
        }
        None
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tar" => Ok(ArchiveKind::Tar),
            "zip" => Ok(ArchiveKind::Zip),
            _ => Err(Error::UnsupportedFormat(format!("archival {}", s))),
        }
    }
}

/// Compression layer around a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum CompressionKind {
    #[serde(rename = "gz")]
    Gzip,
    #[serde(rename = "bz2")]
    Bzip2,
    #[serde(rename = "xz")]
    Xz,
    #[serde(rename = "zst")]
    Zstd,
    #[serde(rename = "lz4")]
    Lz4,
    #[serde(rename = "br")]
    Brotli,
    #[serde(rename = "lzip")]
    Lzip,
    #[serde(rename = "sz")]
    Snappy,
    #[serde(rename = "zlib")]
    Zlib,
}

/// Magic numbers of compression formats that have one
const COMPRESSION_MAGIC: &[(&[u8], CompressionKind)] = &[
    (&[0x1f, 0x8b], CompressionKind::Gzip),
    (b"BZh", CompressionKind::Bzip2),
    (&[0xfd, b'7', b'z', b'X', b'Z', 0x00], CompressionKind::Xz),
    (&[0x28, 0xb5, 0x2f, 0xfd], CompressionKind::Zstd),
    (&[0x04, 0x22, 0x4d, 0x18], CompressionKind::Lz4),
    (b"LZIP", CompressionKind::Lzip),
    (b"\xff\x06\x00\x00sNaPpY", CompressionKind::Snappy),
];

impl CompressionKind {
    pub const ALL: [CompressionKind; 9] = [
        CompressionKind::Gzip,
        CompressionKind::Bzip2,
        CompressionKind::Xz,
        CompressionKind::Zstd,
        CompressionKind::Lz4,
        CompressionKind::Brotli,
        CompressionKind::Lzip,
        CompressionKind::Snappy,
        CompressionKind::Zlib,
    ];

    /// File extension, also the name used in configuration
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionKind::Gzip => "gz",
            CompressionKind::Bzip2 => "bz2",
            CompressionKind::Xz => "xz",
            CompressionKind::Zstd => "zst",
            CompressionKind::Lz4 => "lz4",
            CompressionKind::Brotli => "br",
            CompressionKind::Lzip => "lzip",
            CompressionKind::Snappy => "sz",
            CompressionKind::Zlib => "zlib",
        }
    }

    /// Whether new archives can be written with this compression
    ///
    /// lzip is read-only: no available codec writes it.
    pub fn can_encode(&self) -> bool {
        !matches!(self, CompressionKind::Lzip)
    }

    /// Identify a compression layer from its first bytes
    pub fn detect(head: &[u8]) -> Option<Self> {
        if let Some((_, kind)) = COMPRESSION_MAGIC
            .iter()
            .find(|(magic, _)| head.starts_with(magic))
        {
            return Some(*kind);
        }

        // zlib: CMF 0x78 (deflate, 32K window) with a valid FCHECK
        if head.len() >= 2 && head[0] == 0x78 && (u16::from(head[0]) << 8 | u16::from(head[1])) % 31 == 0 {
            return Some(CompressionKind::Zlib);
        }

        None
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for CompressionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gz" | "gzip" => Ok(CompressionKind::Gzip),
            "bz2" | "bzip2" => Ok(CompressionKind::Bzip2),
            "xz" => Ok(CompressionKind::Xz),
            "zst" | "zstd" => Ok(CompressionKind::Zstd),
            "lz4" => Ok(CompressionKind::Lz4),
            "br" | "brotli" => Ok(CompressionKind::Brotli),
            "lzip" | "lz" => Ok(CompressionKind::Lzip),
            "sz" | "snappy" => Ok(CompressionKind::Snappy),
            "zlib" => Ok(CompressionKind::Zlib),
            _ => Err(Error::UnsupportedFormat(format!("compression {}", s))),
        }
    }
}

/// File name of a distributable archive: `<stem>.<archival>.<compression>`
pub fn archive_file_name(stem: &str, archival: ArchiveKind, compression: CompressionKind) -> String {
    format!("{}.{}.{}", stem, archival.as_str(), compression.extension())
}

/// Split an archive file name into its stem and the kinds its suffix names
///
/// Recognizes `.tar`, `.zip`, `.<archival>.<compression>` and the short
/// tar forms `.tgz`, `.tbz2`, `.txz`, `.tzst`.
pub fn split_archive_name(name: &str) -> Option<(&str, ArchiveKind, Option<CompressionKind>)> {
    let (rest, ext) = name.rsplit_once('.')?;

    if let Ok(archival) = ext.parse::<ArchiveKind>() {
        return Some((rest, archival, None));
    }

    if let Ok(compression) = ext.parse::<CompressionKind>() {
        let (stem, archival) = rest.rsplit_once('.')?;
        let archival = archival.parse::<ArchiveKind>().ok()?;
        return Some((stem, archival, Some(compression)));
    }

    let compression = match ext {
        "tgz" => CompressionKind::Gzip,
        "tbz" | "tbz2" => CompressionKind::Bzip2,
        "txz" => CompressionKind::Xz,
        "tzst" => CompressionKind::Zstd,
        _ => return None,
    };
    Some((rest, ArchiveKind::Tar, Some(compression)))
}

/// Read the first bytes of a stream and hand back a reader that replays them
fn peek(mut reader: Box<dyn Read>) -> io::Result<(Vec<u8>, Box<dyn Read>)> {
    let mut head = Vec::with_capacity(PEEK_LEN);
    reader.by_ref().take(PEEK_LEN as u64).read_to_end(&mut head)?;
    let replay = io::Cursor::new(head.clone()).chain(reader);
    Ok((head, Box::new(replay)))
}
