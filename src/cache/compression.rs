//! Transparent zlib compression for cached blobs.
//!
//! Serialized entries at or above the configured threshold are written as
//! `<magic><zlib bytes>`; smaller entries pass through untouched. The magic
//! byte cannot begin valid JSON, so reads distinguish the two forms without
//! any out-of-band state.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Prefix marking a compressed blob. 0x01 is not printable and can never
/// start serialized JSON.
pub const COMPRESSION_MAGIC: u8 = 0x01;

/// Compress `bytes` when they meet the threshold; otherwise return them
/// unchanged. Level is clamped to zlib's 1..=9.
pub fn maybe_compress(bytes: Vec<u8>, threshold: usize, level: u32) -> Vec<u8> {
    if bytes.len() < threshold {
        return bytes;
    }
    let level = level.clamp(1, 9);
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(bytes.len() / 2 + 1),
        Compression::new(level),
    );
    let compressed = encoder
        .write_all(&bytes)
        .and_then(|()| encoder.finish())
        .map(|mut out| {
            out.insert(0, COMPRESSION_MAGIC);
            out
        });
    match compressed {
        Ok(out) => out,
        // Compression failing is not worth losing the write over.
        Err(_) => bytes,
    }
}

/// Undo [`maybe_compress`]. Raw blobs pass through, so applying this to
/// already-decompressed data is a no-op.
pub fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    match bytes.first() {
        Some(&COMPRESSION_MAGIC) => {
            let mut decoder = ZlibDecoder::new(&bytes[1..]);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        _ => Ok(bytes.to_vec()),
    }
}
