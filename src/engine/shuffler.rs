//! Uniform chunk permutation (Fisher-Yates)

use rand::Rng;
use tracing::debug;

use crate::domain::model::{Chunk, Permutation};

/// Shuffles chunks in place and records the permutation applied
pub struct Shuffler;

impl Shuffler {
    /// Permute `chunks` uniformly at random.
    ///
    /// For `k` from the last index down to 1, draw `j` from `[0, k]` and swap
    /// positions `k` and `j`. Durations live on each chunk, so they move with
    /// it. The returned permutation maps each output position to the chunk's
    /// pre-shuffle index.
    pub fn shuffle<R>(chunks: &mut [Chunk], rng: &mut R) -> Permutation
    where
        R: Rng,
    {
        let mut permutation = Permutation::identity(chunks.len());

        for k in (1..chunks.len()).rev() {
            let j = rng.random_range(0..=k);
            chunks.swap(k, j);
            permutation.swap(k, j);
        }

        debug!("Shuffled {} chunks: {:?}", chunks.len(), permutation.as_slice());
        permutation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Frame, FrameGeometry};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn chunks(sizes: &[usize]) -> Vec<Chunk> {
        let geometry = FrameGeometry::new(1, 1);
        let mut next = 0u64;
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let frames = (0..size)
                    .map(|_| {
                        let frame = Frame::new(next, next as f64 / 24.0, geometry, vec![0; 4]).unwrap();
                        next += 1;
                        frame
                    })
                    .collect();
                Chunk::new(i, frames, 24).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_shuffle_preserves_multiset() {
        let mut list = chunks(&[3, 1, 4, 1, 5, 9, 2, 6]);
        let before = list.clone();
        let permutation = Shuffler::shuffle(&mut list, &mut StdRng::seed_from_u64(42));

        assert_eq!(list.len(), before.len());
        assert!(permutation.is_bijection());

        let mut sorted: Vec<usize> = list.iter().map(Chunk::source_index).collect();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());

        for (position, chunk) in list.iter().enumerate() {
            let source = permutation.source_at(position).unwrap();
            assert_eq!(chunk, &before[source]);
        }
    }

    #[test]
    fn test_durations_follow_their_chunks() {
        let mut list = chunks(&[24, 12, 6, 48]);
        let before: Vec<(usize, f64)> = list
            .iter()
            .map(|c| (c.source_index(), c.duration_ms()))
            .collect();
        Shuffler::shuffle(&mut list, &mut StdRng::seed_from_u64(3));

        for chunk in &list {
            let (_, expected) = before[chunk.source_index()];
            assert_eq!(chunk.duration_ms(), expected);
            assert_eq!(chunk.frame_count() as f64 / 24.0 * 1000.0, expected);
        }
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let mut a = chunks(&[1; 10]);
        let mut b = chunks(&[1; 10]);
        let pa = Shuffler::shuffle(&mut a, &mut StdRng::seed_from_u64(2024));
        let pb = Shuffler::shuffle(&mut b, &mut StdRng::seed_from_u64(2024));
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_trivial_lists() {
        let mut empty: Vec<Chunk> = Vec::new();
        assert!(Shuffler::shuffle(&mut empty, &mut StdRng::seed_from_u64(0)).is_empty());

        let mut single = chunks(&[5]);
        let permutation = Shuffler::shuffle(&mut single, &mut StdRng::seed_from_u64(0));
        assert!(permutation.is_identity());
    }

    #[test]
    fn test_all_orderings_reachable_with_roughly_equal_frequency() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<Vec<usize>, u32> = HashMap::new();
        let trials = 6000;

        for _ in 0..trials {
            let mut list = chunks(&[1, 1, 1]);
            let permutation = Shuffler::shuffle(&mut list, &mut rng);
            *counts.entry(permutation.as_slice().to_vec()).or_default() += 1;
        }

        assert_eq!(counts.len(), 6);
        for count in counts.values() {
            // expected 1000 per ordering
            assert!((800..=1200).contains(count), "skewed count {}", count);
        }
    }
}
