//! Splitting a canvas into bounded-size transfer chunks.

use crate::pixel::Pixel;

/// Default maximum pixels per outbound frame; canvases at or below this
/// count travel as a single untagged `canvas_data` response.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// One bounded slice of a pixel sequence, tagged for reassembly.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPart {
    pub pixels: Vec<Pixel>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub is_last_chunk: bool,
}

/// How a canvas read travels back to the client. Callers must handle both
/// shapes: small canvases are never wrapped in a one-chunk chunked reply.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasTransfer {
    Whole(Vec<Pixel>),
    Chunked(Vec<ChunkPart>),
}

/// Plans the outbound transfer of `pixels` under a per-frame pixel budget.
///
/// Chunking triggers only when the pixel count strictly exceeds
/// `chunk_size`. Chunks come back in increasing `chunk_index` order with
/// `total_chunks == ceil(n / chunk_size)` and exactly one final chunk.
pub fn plan_transfer(pixels: Vec<Pixel>, chunk_size: usize) -> CanvasTransfer {
    let chunk_size = chunk_size.max(1);
    if pixels.len() <= chunk_size {
        return CanvasTransfer::Whole(pixels);
    }

    let total_chunks = pixels.len().div_ceil(chunk_size);
    let parts = pixels
        .chunks(chunk_size)
        .enumerate()
        .map(|(chunk_index, window)| ChunkPart {
            pixels: window.to_vec(),
            chunk_index,
            total_chunks,
            is_last_chunk: chunk_index + 1 == total_chunks,
        })
        .collect();
    CanvasTransfer::Chunked(parts)
}
