// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Permutes the indices of the training set with a seeded RNG
// and cuts the permutation in two:
//   - first  `total - val_split` indices → training subset
//   - last   `val_split` indices         → validation subset
//
// The same seed always gives the same partition, and the two
// subsets together cover every index exactly once.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom on a
// StdRng seeded from the configured seed.
//
// Why split indices instead of copying examples?
//   - The 60k training images are loaded once and shared by
//     both subsets through an Arc
//   - The partition can be compared across runs without
//     touching pixel data
//
// Reference: Rust Book §8 (Vectors)

use std::sync::Arc;

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::data::error::DataError;

/// Indices into the full training set for each subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Deterministically partition `0..total` into (train, valid).
///
/// Fails with `DataError::InvalidSplit` if `val_split` would leave
/// the training subset empty.
pub fn split_indices(total: usize, val_split: usize, seed: u64) -> Result<SplitIndices, DataError> {
    if val_split >= total {
        return Err(DataError::InvalidSplit { val_split, total });
    }

    let mut indices: Vec<usize> = (0..total).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    // split_off(n) leaves [0..n) in `indices` and returns [n..total)
    let valid = indices.split_off(total - val_split);

    tracing::debug!(
        "Dataset split: {} training, {} validation (seed {})",
        indices.len(),
        valid.len(),
        seed,
    );

    Ok(SplitIndices { train: indices, valid })
}

// ─── SubsetDataset ────────────────────────────────────────────────────────────
/// A view of `inner` restricted to `indices`, in that order.
/// Both subsets of a split share one loaded dataset.
#[derive(Debug, Clone)]
pub struct SubsetDataset<D> {
    inner:   Arc<D>,
    indices: Vec<usize>,
}

impl<D> SubsetDataset<D> {
    pub fn new(inner: Arc<D>, indices: Vec<usize>) -> Self {
        Self { inner, indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl<I, D> Dataset<I> for SubsetDataset<D>
where
    D: Dataset<I>,
{
    fn get(&self, index: usize) -> Option<I> {
        self.inner.get(*self.indices.get(index)?)
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;
    use std::collections::HashSet;

    #[test]
    fn test_same_seed_same_partition() {
        for seed in [0, 42, 1234] {
            let a = split_indices(500, 50, seed).unwrap();
            let b = split_indices(500, 50, seed).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_different_seed_different_partition() {
        let a = split_indices(500, 50, 1).unwrap();
        let b = split_indices(500, 50, 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sizes_sum_to_total() {
        for val_split in [0, 1, 7, 99] {
            let split = split_indices(100, val_split, 42).unwrap();
            assert_eq!(split.valid.len(), val_split);
            assert_eq!(split.train.len() + split.valid.len(), 100);
        }
    }

    #[test]
    fn test_partition_has_no_overlap_or_omission() {
        let split = split_indices(200, 30, 7).unwrap();
        let train: HashSet<_> = split.train.iter().copied().collect();
        let valid: HashSet<_> = split.valid.iter().copied().collect();
        assert!(train.is_disjoint(&valid));
        let all: HashSet<_> = train.union(&valid).copied().collect();
        assert_eq!(all, (0..200).collect());
    }

    #[test]
    fn test_oversized_split_is_a_config_error() {
        let err = split_indices(10, 11, 42).unwrap_err();
        assert!(matches!(err, DataError::InvalidSplit { val_split: 11, total: 10 }));

        // Holding out everything leaves nothing to train on
        assert!(split_indices(10, 10, 42).is_err());
    }

    #[test]
    fn test_subset_maps_indices() {
        let inner  = Arc::new(InMemDataset::new(vec!['a', 'b', 'c', 'd']));
        let subset = SubsetDataset::new(inner, vec![3, 1]);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.get(0), Some('d'));
        assert_eq!(subset.get(1), Some('b'));
        assert_eq!(subset.get(2), None);
    }
}
