//! Content digests of record payloads.

use std::fmt::Write;

/// Computes fixed-length digests
pub trait DigestProvider {
    /// Name of the algorithm, shown next to digests
    fn algorithm(&self) -> &'static str;

    /// Digest of `data`
    fn digest(&self, data: &[u8]) -> Vec<u8>;

    /// Digest of `data` as lowercase hex without separators
    fn hex_digest(&self, data: &[u8]) -> String {
        self.digest(data)
            .iter()
            .fold(String::new(), |mut out, b| {
                let _ = write!(out, "{b:02x}");
                out
            })
    }
}

/// BLAKE3 with its default 32-byte output
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Digest;

impl DigestProvider for Blake3Digest {
    fn algorithm(&self) -> &'static str {
        "blake3"
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        blake3::hash(data).as_bytes().to_vec()
    }

    fn hex_digest(&self, data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }
}
