// src/archive/codec.rs

//! Compression codecs keyed by [`CompressionKind`]

use super::CompressionKind;
use crate::error::{Error, Result};
use std::io::{self, Read, Write};

/// Brotli window size (log2) and quality used for new archives
const BROTLI_LGWIN: u32 = 22;
const BROTLI_QUALITY: u32 = 9;
const BUFFER_SIZE: usize = 64 * 1024;
const XZ_PRESET: u32 = 6;

fn no_codec(kind: CompressionKind) -> Error {
    Error::UnsupportedFormat(format!("no codec available for {} compression", kind))
}

/// Wrap a compressed stream in the matching decoder
pub(crate) fn decoder(kind: CompressionKind, reader: Box<dyn Read>) -> Result<Box<dyn Read>> {
    let decoded: Box<dyn Read> = match kind {
        CompressionKind::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
        CompressionKind::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
        CompressionKind::Xz => Box::new(liblzma::read::XzDecoder::new_multi_decoder(reader)),
        CompressionKind::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(|e| Error::IoError(format!("Failed to create zstd decoder: {}", e)))?;
            Box::new(decoder)
        }
        CompressionKind::Lz4 => Box::new(lz4_flex::frame::FrameDecoder::new(reader)),
        CompressionKind::Brotli => Box::new(brotli::Decompressor::new(reader, BUFFER_SIZE)),
        CompressionKind::Snappy => Box::new(snap::read::FrameDecoder::new(reader)),
        CompressionKind::Zlib => Box::new(flate2::read::ZlibDecoder::new(reader)),
        CompressionKind::Lzip => {
            let stream =
                liblzma::stream::Stream::new_lzip_decoder(u64::MAX, liblzma::stream::CONCATENATED)
                    .map_err(|e| Error::IoError(format!("Failed to create lzip decoder: {}", e)))?;
            Box::new(liblzma::read::XzDecoder::new_stream(reader, stream))
        }
    };
    Ok(decoded)
}

/// Compressing writer that must be finished to flush its trailer
pub(crate) enum Encoder<W: Write> {
    Gzip(flate2::write::GzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Xz(liblzma::write::XzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
    Lz4(lz4_flex::frame::FrameEncoder<W>),
    Brotli(Box<brotli::CompressorWriter<W>>),
    Snappy(snap::write::FrameEncoder<W>),
    Zlib(flate2::write::ZlibEncoder<W>),
}

impl<W: Write> Encoder<W> {
    pub(crate) fn new(kind: CompressionKind, writer: W) -> Result<Self> {
        let encoder = match kind {
            CompressionKind::Gzip => {
                Encoder::Gzip(flate2::write::GzEncoder::new(writer, flate2::Compression::default()))
            }
            CompressionKind::Bzip2 => {
                Encoder::Bzip2(bzip2::write::BzEncoder::new(writer, bzip2::Compression::default()))
            }
            CompressionKind::Xz => Encoder::Xz(liblzma::write::XzEncoder::new(writer, XZ_PRESET)),
            CompressionKind::Zstd => {
                let encoder = zstd::stream::write::Encoder::new(writer, 0)
                    .map_err(|e| Error::IoError(format!("Failed to create zstd encoder: {}", e)))?;
                Encoder::Zstd(encoder)
            }
            CompressionKind::Lz4 => Encoder::Lz4(lz4_flex::frame::FrameEncoder::new(writer)),
            CompressionKind::Brotli => Encoder::Brotli(Box::new(brotli::CompressorWriter::new(
                writer,
                BUFFER_SIZE,
                BROTLI_QUALITY,
                BROTLI_LGWIN,
            ))),
            CompressionKind::Snappy => Encoder::Snappy(snap::write::FrameEncoder::new(writer)),
            CompressionKind::Zlib => {
                Encoder::Zlib(flate2::write::ZlibEncoder::new(writer, flate2::Compression::default()))
            }
            CompressionKind::Lzip => return Err(no_codec(kind)),
        };
        Ok(encoder)
    }

    /// Write the stream trailer and return the inner writer
    pub(crate) fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Gzip(e) => e.finish(),
            Encoder::Bzip2(e) => e.finish(),
            Encoder::Xz(e) => e.finish(),
            Encoder::Zstd(e) => e.finish(),
            Encoder::Lz4(e) => e.finish().map_err(io::Error::other),
            Encoder::Brotli(e) => Ok(e.into_inner()),
            Encoder::Snappy(e) => e
                .into_inner()
                .map_err(|e| io::Error::new(e.error().kind(), e.error().to_string())),
            Encoder::Zlib(e) => e.finish(),
        }
    }

    fn inner(&mut self) -> &mut dyn Write {
        match self {
            Encoder::Gzip(e) => e,
            Encoder::Bzip2(e) => e,
            Encoder::Xz(e) => e,
            Encoder::Zstd(e) => e,
            Encoder::Lz4(e) => e,
            Encoder::Brotli(e) => e.as_mut(),
            Encoder::Snappy(e) => e,
            Encoder::Zlib(e) => e,
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }
}
