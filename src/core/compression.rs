//! Compression support for branch blocks.
//!
//! Blocks are zlib-compressed when compression is enabled and it pays off.
//! The store records per block whether it is compressed and its raw size,
//! so decompression never has to guess.

use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Compress data using zlib.
///
/// # Arguments
/// * `data` - Data to compress
/// * `level` - Compression level (0-9, where 0 is no compression, 9 is max)
///
/// Returns `None` when compression is disabled or would not save space.
pub fn compress(data: &[u8], level: u32) -> Result<Option<Vec<u8>>> {
    if level == 0 || data.is_empty() {
        return Ok(None);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    if compressed.len() >= data.len() {
        return Ok(None);
    }
    Ok(Some(compressed))
}

/// Decompress a zlib block of known uncompressed size.
pub fn decompress(data: &[u8], raw_len: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::with_capacity(raw_len);
    decoder.read_to_end(&mut decompressed)?;

    if decompressed.len() != raw_len {
        return Err(Error::invalid(format!(
            "block inflated to {} bytes, expected {}",
            decompressed.len(),
            raw_len
        )));
    }
    Ok(decompressed)
}

/// Check if data appears to be a zlib stream.
pub fn is_compressed(data: &[u8]) -> bool {
    // zlib header: 0x78 followed by 0x01, 0x5E, 0x9C, or 0xDA
    data.len() >= 2 && data[0] == 0x78 && matches!(data[1], 0x01 | 0x5E | 0x9C | 0xDA)
}
