//! Chunker: splits a write payload into channel-sized pieces.
//!
//! Chunks are zero-copy slices of the original `Bytes`. Concatenating
//! them in order reproduces the payload exactly.

use bytes::Bytes;

use crate::error::ChunkError;

/// Split `payload` into chunks of at most `max_chunk_size` bytes.
///
/// An empty payload still yields one empty chunk, so a zero-length write
/// performs exactly one channel round trip.
pub fn split(payload: &Bytes, max_chunk_size: usize) -> Result<Vec<Bytes>, ChunkError> {
    if max_chunk_size == 0 {
        return Err(ChunkError::ZeroChunkSize);
    }
    if payload.is_empty() {
        return Ok(vec![Bytes::new()]);
    }

    let mut out = Vec::with_capacity(chunk_count(payload.len(), max_chunk_size));
    let mut start = 0usize;
    while start < payload.len() {
        let end = (start + max_chunk_size).min(payload.len());
        out.push(payload.slice(start..end));
        start = end;
    }
    Ok(out)
}

/// Number of chunks `split` produces for a payload of `len` bytes.
pub fn chunk_count(len: usize, max_chunk_size: usize) -> usize {
    if max_chunk_size == 0 {
        return 0;
    }
    len.div_ceil(max_chunk_size).max(1)
}
