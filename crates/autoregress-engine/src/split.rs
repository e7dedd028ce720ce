//! Deterministic train/validation row split.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Row indices for the two sides of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Shuffle `0..n_rows` with a seeded RNG and carve off the validation slice.
///
/// The validation size is `ceil(n_rows * test_size)` clamped so both sides
/// keep at least one row. The same `(n_rows, test_size, seed)` triple always
/// produces the same split.
pub fn train_val_split(n_rows: usize, test_size: f64, seed: u64) -> Split {
    assert!(n_rows >= 2, "need at least two rows to split");
    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let raw = (n_rows as f64 * test_size).ceil() as usize;
    let n_val = raw.clamp(1, n_rows - 1);
    let validation = indices[..n_val].to_vec();
    let train = indices[n_val..].to_vec();
    Split { train, validation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_is_deterministic() {
        let a = train_val_split(100, 0.2, 42);
        let b = train_val_split(100, 0.2, 42);
        assert_eq!(a, b);
        let c = train_val_split(100, 0.2, 43);
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_sizes() {
        let s = train_val_split(100, 0.2, 7);
        assert_eq!(s.validation.len(), 20);
        assert_eq!(s.train.len(), 80);

        // ceil rounds a fractional validation count up
        let s = train_val_split(10, 0.25, 7);
        assert_eq!(s.validation.len(), 3);
    }

    #[test]
    fn test_split_partitions_all_rows() {
        let s = train_val_split(17, 0.3, 1);
        let mut all: Vec<usize> = s.train.iter().chain(s.validation.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..17).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_clamps_to_leave_both_sides_nonempty() {
        let s = train_val_split(2, 0.9, 0);
        assert_eq!(s.validation.len(), 1);
        assert_eq!(s.train.len(), 1);

        let s = train_val_split(5, 0.0, 0);
        assert_eq!(s.validation.len(), 1);
        assert_eq!(s.train.len(), 4);
    }
}
