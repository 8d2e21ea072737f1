//! Chunk timing metadata for the output timeline

use crate::domain::model::{Chunk, ChunkTiming, ChunkTimingMetadata};

/// Cumulative start offsets of the chunks in output order.
///
/// `start[0] = 0`, `start[k] = start[k-1] + duration[k-1] / 1000`.
pub fn build_timing_metadata(chunks: &[Chunk]) -> ChunkTimingMetadata {
    let mut cumulative_ms = 0.0;
    let entries = chunks
        .iter()
        .map(|chunk| {
            let entry = ChunkTiming {
                source_index: chunk.source_index(),
                duration_ms: chunk.duration_ms(),
                start_offset_seconds: cumulative_ms / 1000.0,
            };
            cumulative_ms += chunk.duration_ms();
            entry
        })
        .collect();

    ChunkTimingMetadata { entries }
}
