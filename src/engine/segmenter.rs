//! Chunk segmentation with randomized chunk sizes

use rand::Rng;
use tracing::debug;

use crate::domain::errors::DomainError;
use crate::domain::model::{Chunk, Frame};

/// Groups a frame sequence into contiguous chunks around a nominal size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSegmenter {
    nominal_frames: usize,
    variance_frames: u32,
    fps: u32,
}

impl ChunkSegmenter {
    /// `nominal_frames` is clamped to at least one frame
    pub fn new(nominal_frames: usize, variance_frames: u32, fps: u32) -> Self {
        Self {
            nominal_frames: nominal_frames.max(1),
            variance_frames,
            fps,
        }
    }

    pub fn nominal_frames(&self) -> usize {
        self.nominal_frames
    }

    /// Next target size: `max(1, N + uniform(-V, V))`
    pub fn draw_target<R>(&self, rng: &mut R) -> usize
    where
        R: Rng,
    {
        let variance = self.variance_frames as i64;
        let offset = rng.random_range(-variance..=variance);
        (self.nominal_frames as i64 + offset).max(1) as usize
    }

    /// Partition `frames` into chunks in their original order.
    ///
    /// The first chunk targets the nominal size; each closed chunk draws the
    /// next target. Whatever remains at the end forms the last chunk, however
    /// small.
    pub fn segment<R>(&self, frames: Vec<Frame>, rng: &mut R) -> Result<Vec<Chunk>, DomainError>
    where
        R: Rng,
    {
        let total = frames.len();
        let mut chunks = Vec::with_capacity(total / self.nominal_frames + 1);
        let mut current = Vec::with_capacity(self.nominal_frames);
        let mut target = self.nominal_frames;

        for frame in frames {
            current.push(frame);
            if current.len() >= target {
                let full = std::mem::take(&mut current);
                chunks.push(Chunk::new(chunks.len(), full, self.fps)?);
                target = self.draw_target(rng);
                current.reserve(target);
            }
        }

        if !current.is_empty() {
            chunks.push(Chunk::new(chunks.len(), current, self.fps)?);
        }

        debug!(
            "Grouped {} frames into {} chunks (nominal {}, variance {})",
            total,
            chunks.len(),
            self.nominal_frames,
            self.variance_frames
        );
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::FrameGeometry;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn frames(count: u64) -> Vec<Frame> {
        let geometry = FrameGeometry::new(1, 1);
        (0..count)
            .map(|i| Frame::new(i, i as f64 / 24.0, geometry, vec![0; 4]).unwrap())
            .collect()
    }

    fn sizes(chunks: &[Chunk]) -> Vec<usize> {
        chunks.iter().map(Chunk::frame_count).collect()
    }

    #[test]
    fn test_exact_multiple_has_no_remainder() {
        let mut rng = StdRng::seed_from_u64(1);
        let chunks = ChunkSegmenter::new(24, 0, 24)
            .segment(frames(120), &mut rng)
            .unwrap();
        assert_eq!(sizes(&chunks), vec![24; 5]);
        assert!(chunks.iter().all(|c| (c.duration_ms() - 1000.0).abs() < 1e-9));
    }

    #[test]
    fn test_remainder_forms_final_chunk() {
        let mut rng = StdRng::seed_from_u64(1);
        let chunks = ChunkSegmenter::new(24, 0, 24)
            .segment(frames(127), &mut rng)
            .unwrap();
        assert_eq!(sizes(&chunks), vec![24, 24, 24, 24, 24, 7]);
    }

    #[test]
    fn test_large_variance_never_yields_empty_chunks() {
        let segmenter = ChunkSegmenter::new(4, 10, 24);
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let chunks = segmenter.segment(frames(200), &mut rng).unwrap();
            assert!(chunks.iter().all(|c| c.frame_count() >= 1));
            assert!(chunks.iter().all(|c| c.frame_count() <= 14));
            assert_eq!(chunks.iter().map(Chunk::frame_count).sum::<usize>(), 200);
        }
    }

    #[test]
    fn test_chunks_cover_frames_once_in_order() {
        let mut rng = StdRng::seed_from_u64(99);
        let chunks = ChunkSegmenter::new(10, 3, 24)
            .segment(frames(101), &mut rng)
            .unwrap();

        let indices: Vec<u64> = chunks
            .iter()
            .flat_map(|c| c.frames().iter().map(Frame::index))
            .collect();
        assert_eq!(indices, (0..101).collect::<Vec<_>>());

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source_index(), i);
        }
        // every chunk but the last lies in [N - V, N + V]
        for chunk in &chunks[..chunks.len() - 1] {
            assert!((7..=13).contains(&chunk.frame_count()));
        }
    }

    #[test]
    fn test_first_chunk_uses_nominal_size() {
        let mut rng = StdRng::seed_from_u64(5);
        let chunks = ChunkSegmenter::new(6, 5, 24)
            .segment(frames(30), &mut rng)
            .unwrap();
        assert_eq!(chunks[0].frame_count(), 6);
    }

    #[test]
    fn test_empty_input_produces_no_chunks() {
        let mut rng = StdRng::seed_from_u64(0);
        let chunks = ChunkSegmenter::new(24, 0, 24)
            .segment(Vec::new(), &mut rng)
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_same_seed_same_segmentation() {
        let segmenter = ChunkSegmenter::new(8, 4, 24);
        let a = segmenter
            .segment(frames(90), &mut StdRng::seed_from_u64(7))
            .unwrap();
        let b = segmenter
            .segment(frames(90), &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert_eq!(sizes(&a), sizes(&b));
    }
}
