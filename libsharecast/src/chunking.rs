//! Fixed-size chunk splitting for chunked transfer uploads
//!
//! Chunks are zero-copy slices of the original buffer. For a buffer of
//! `size` bytes and a chunk size `c` the plan holds `ceil(size / c)` chunks;
//! every chunk but the last is exactly `c` bytes, and concatenating them in
//! order reproduces the buffer.

use bytes::Bytes;

use crate::error::{ConfigError, Result};

/// Default chunk size for chunked transfers (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// One piece of a chunked transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position in the sequence
    pub index: usize,
    /// Byte offset of the first byte of this chunk
    pub offset: u64,
    pub data: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset of the last byte (inclusive), as used by `Content-Range`
    pub fn end_offset(&self) -> u64 {
        self.offset + self.data.len() as u64 - 1
    }

    /// `Content-Range` header value for this chunk within `total` bytes
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.offset, self.end_offset(), total)
    }
}

/// Number of chunks needed for `size` bytes
pub fn chunk_count(size: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}

/// Split a buffer into fixed-size chunks
///
/// # Errors
///
/// Returns a configuration error if `chunk_size` is zero.
pub fn split_chunks(data: &Bytes, chunk_size: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(ConfigError::InvalidValue {
            field: "upload.chunk_size".to_string(),
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }

    let chunks = (0..chunk_count(data.len(), chunk_size))
        .map(|index| {
            let start = index * chunk_size;
            let end = usize::min(start + chunk_size, data.len());
            Chunk {
                index,
                offset: start as u64,
                data: data.slice(start..end),
            }
        })
        .collect();

    Ok(chunks)
}
