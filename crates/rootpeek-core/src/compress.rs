//! Decompression of record payloads.
//!
//! A compressed payload is a sequence of blocks. Each block starts with a
//! 9-byte header: a 3-byte magic identifying the codec, the compressed size
//! and the uncompressed size, both 3-byte little-endian. Payloads whose first
//! bytes match no registered magic are stored uncompressed.

use crate::error::{Error, Result};
use flate2::read::ZlibDecoder;
use std::borrow::Cow;
use std::io::Read;
use tracing::trace;

/// Length of a compressed block header
pub const BLOCK_HEADER_LEN: usize = 9;

/// A decompression algorithm identified by a 3-byte magic
pub trait Codec: Send + Sync {
    /// Short name used in reports
    fn name(&self) -> &'static str;

    /// Magic bytes opening every block of this codec
    fn magic(&self) -> [u8; 3];

    /// Decode one block body, appending exactly `expected` bytes to `out`
    fn decompress_block(&self, body: &[u8], expected: usize, out: &mut Vec<u8>) -> Result<()>;
}

/// zlib streams, tagged `ZL` followed by the deflate method byte
#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibCodec;

impl Codec for ZlibCodec {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn magic(&self) -> [u8; 3] {
        [b'Z', b'L', 8]
    }

    fn decompress_block(&self, body: &[u8], expected: usize, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        out.resize(start + expected, 0);
        ZlibDecoder::new(body)
            .read_exact(&mut out[start..])
            .map_err(|e| Error::decompression(self.name(), e.to_string()))
    }
}

/// xz streams, tagged `XZ\0`
#[derive(Debug, Default, Clone, Copy)]
pub struct XzCodec;

impl Codec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn magic(&self) -> [u8; 3] {
        [b'X', b'Z', 0]
    }

    fn decompress_block(&self, body: &[u8], expected: usize, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        let mut input = body;
        lzma_rs::xz_decompress(&mut input, out)
            .map_err(|e| Error::decompression(self.name(), e.to_string()))?;

        let produced = out.len() - start;
        if produced != expected {
            return Err(Error::decompression(
                self.name(),
                format!("block produced {produced} bytes, header announced {expected}"),
            ));
        }
        Ok(())
    }
}

/// Ordered set of codecs, matched by magic
pub struct CodecRegistry {
    codecs: Vec<Box<dyn Codec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::empty().register(ZlibCodec).register(XzCodec)
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.name()))
            .finish()
    }
}

fn read_u24_le(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take(3)
        .rev()
        .fold(0, |acc, &b| (acc << 8) | usize::from(b))
}

impl CodecRegistry {
    /// A registry matching nothing
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Add a codec; earlier registrations win on equal magic
    pub fn register(mut self, codec: impl Codec + 'static) -> Self {
        self.codecs.push(Box::new(codec));
        self
    }

    /// The codec whose magic opens `buf`, if any
    pub fn match_buffer(&self, buf: &[u8]) -> Option<&dyn Codec> {
        let head = buf.get(..3)?;
        self.codecs
            .iter()
            .find(|codec| codec.magic() == head)
            .map(|codec| &**codec)
    }

    /// Decompress a payload made of one or more blocks.
    ///
    /// Returns `Ok(None)` when the payload is not compressed.
    pub fn decompress(&self, buf: &[u8], expected_len: usize) -> Result<Option<Vec<u8>>> {
        if self.match_buffer(buf).is_none() {
            return Ok(None);
        }

        let mut out = Vec::with_capacity(expected_len);
        let mut rest = buf;
        while out.len() < expected_len {
            let at = buf.len() - rest.len();
            let codec = self.match_buffer(rest).ok_or_else(|| {
                Error::decompression("block", format!("no codec matches the block at offset {at}"))
            })?;
            let header = rest.get(..BLOCK_HEADER_LEN).ok_or_else(|| {
                Error::decompression(codec.name(), format!("short block header at offset {at}"))
            })?;
            let compressed = read_u24_le(&header[3..6]);
            let uncompressed = read_u24_le(&header[6..9]);
            let end = BLOCK_HEADER_LEN + compressed;
            let body = rest.get(BLOCK_HEADER_LEN..end).ok_or_else(|| {
                Error::decompression(
                    codec.name(),
                    format!(
                        "block at offset {at} needs {compressed} bytes, payload has {}",
                        rest.len() - BLOCK_HEADER_LEN
                    ),
                )
            })?;

            trace!(
                codec = codec.name(),
                at,
                compressed,
                uncompressed,
                "Decompressing block"
            );
            codec.decompress_block(body, uncompressed, &mut out)?;
            rest = &rest[end..];
        }

        if out.len() != expected_len {
            return Err(Error::decompression(
                "block",
                format!("payload decoded to {} bytes, expected {expected_len}", out.len()),
            ));
        }
        Ok(Some(out))
    }

    /// The uncompressed payload, borrowed when it was stored as is
    pub fn payload<'a>(&self, buf: &'a [u8], expected_len: usize) -> Result<Cow<'a, [u8]>> {
        Ok(match self.decompress(buf, expected_len)? {
            Some(out) => Cow::Owned(out),
            None => Cow::Borrowed(buf),
        })
    }
}
