//! Bootstrap index generation.
//!
//! Every bootstrap procedure in this crate resamples whole markets (rows of
//! the moment matrix) with replacement. The draws are represented once as a
//! `B × n` index matrix so the same resampling can be shared across critical
//! values, across theta values and across the Andrews–Kwon auxiliaries.

use crate::{
    errors::{validate_len, InferenceError, InferenceResult},
    secure_rng::SecureRng,
};
use std::borrow::Cow;

// Golden ratio constant for seed mixing to ensure good distribution
const GOLDEN_RATIO_SEED_MIX: u64 = 0x9E3779B97F4A7C15;

/// Mix seed with replication index for deterministic, decorrelated streams.
///
/// Uses golden ratio multiplication and bit rotation so that adjacent
/// replications do not receive correlated seeds.
pub fn mix_seed(base_seed: u64, index: usize) -> u64 {
    base_seed
        .wrapping_mul(GOLDEN_RATIO_SEED_MIX)
        .wrapping_add(index as u64)
        .rotate_left(17)
}

/// Row indices of `B` bootstrap draws over `n` markets.
///
/// Stored row-major: draw `b` occupies `indices[b * n..(b + 1) * n]`. Every
/// entry is a 0-based row index in `[0, n)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapIndices {
    replications: usize,
    num_rows: usize,
    indices: Vec<usize>,
}

impl BootstrapIndices {
    /// Draw `replications` resamples of `num_rows` rows with replacement.
    ///
    /// With a seed, replication `b` uses its own ChaCha20 stream seeded with
    /// `mix_seed(seed, b)`, so the matrix is identical across calls and does
    /// not depend on how many replications are drawn after it. Without a
    /// seed, a single entropy-seeded generator is used.
    pub fn generate(
        num_rows: usize,
        replications: usize,
        seed: Option<u64>,
    ) -> InferenceResult<Self> {
        if num_rows == 0 {
            return Err(InferenceError::BootstrapError {
                reason: "cannot resample from zero markets".to_string(),
            });
        }
        if replications == 0 {
            return Err(InferenceError::BootstrapError {
                reason: "number of bootstrap replications must be positive".to_string(),
            });
        }

        let mut indices = vec![0usize; replications * num_rows];
        match seed {
            Some(base) => {
                for (b, row) in indices.chunks_mut(num_rows).enumerate() {
                    let mut rng = SecureRng::with_seed(mix_seed(base, b));
                    rng.fill_usize(row, num_rows);
                }
            }
            None => {
                let mut rng = SecureRng::new();
                rng.fill_usize(&mut indices, num_rows);
            }
        }

        log::debug!(
            "generated {} bootstrap draws over {} markets (seed: {:?})",
            replications,
            num_rows,
            seed
        );

        Ok(Self {
            replications,
            num_rows,
            indices,
        })
    }

    /// Build from explicit 0-based draws, one `Vec` per replication.
    ///
    /// Every draw must have the same length `n`, and every entry must be
    /// below `n`.
    pub fn from_rows(rows: Vec<Vec<usize>>) -> InferenceResult<Self> {
        let replications = rows.len();
        let num_rows = rows.first().map(Vec::len).unwrap_or(0);
        if replications == 0 || num_rows == 0 {
            return Err(InferenceError::BootstrapError {
                reason: "bootstrap index matrix is empty".to_string(),
            });
        }

        let mut indices = Vec::with_capacity(replications * num_rows);
        for (b, row) in rows.into_iter().enumerate() {
            validate_len(num_rows, row.len(), &format!("bootstrap draw {}", b))?;
            indices.extend(row);
        }

        let matrix = Self {
            replications,
            num_rows,
            indices,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Build from the stored file layout: one line per market, one column
    /// per replication, 1-based row numbers.
    pub fn from_one_based_columns(lines: &[Vec<usize>]) -> InferenceResult<Self> {
        let num_rows = lines.len();
        let replications = lines.first().map(Vec::len).unwrap_or(0);
        if replications == 0 || num_rows == 0 {
            return Err(InferenceError::BootstrapError {
                reason: "bootstrap index file is empty".to_string(),
            });
        }

        let mut indices = vec![0usize; replications * num_rows];
        for (i, line) in lines.iter().enumerate() {
            validate_len(replications, line.len(), &format!("bootstrap index line {}", i + 1))?;
            for (b, &value) in line.iter().enumerate() {
                if value == 0 || value > num_rows {
                    return Err(InferenceError::BootstrapError {
                        reason: format!(
                            "1-based index {} at line {}, replication {} is outside 1..={}",
                            value,
                            i + 1,
                            b + 1,
                            num_rows
                        ),
                    });
                }
                indices[b * num_rows + i] = value - 1;
            }
        }

        Ok(Self {
            replications,
            num_rows,
            indices,
        })
    }

    fn validate(&self) -> InferenceResult<()> {
        if let Some(position) = self.indices.iter().position(|&i| i >= self.num_rows) {
            return Err(InferenceError::BootstrapError {
                reason: format!(
                    "index {} in draw {} is outside 0..{}",
                    self.indices[position],
                    position / self.num_rows,
                    self.num_rows
                ),
            });
        }
        Ok(())
    }

    /// Number of bootstrap draws `B`.
    pub fn replications(&self) -> usize {
        self.replications
    }

    /// Number of markets `n` each draw resamples.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Row indices of draw `b`.
    ///
    /// # Panics
    /// Panics if `b >= self.replications()`.
    pub fn row(&self, b: usize) -> &[usize] {
        &self.indices[b * self.num_rows..(b + 1) * self.num_rows]
    }

    /// Iterate over the draws in order.
    pub fn rows(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.indices.chunks(self.num_rows)
    }

    /// Check that these draws resample a data set with `num_rows` markets.
    pub fn check_rows(&self, num_rows: usize) -> InferenceResult<()> {
        validate_len(num_rows, self.num_rows, "bootstrap draw length vs number of markets")
    }
}

/// Where a bootstrap procedure gets its draws from.
#[derive(Debug, Clone, Copy)]
pub enum BootstrapSource<'a> {
    /// Caller-held draws reused across calls
    Fixed(&'a BootstrapIndices),
    /// Fresh draws generated for this call
    Draw {
        /// Number of replications
        replications: usize,
        /// Seed for reproducible draws
        seed: Option<u64>,
    },
}

impl<'a> From<&'a BootstrapIndices> for BootstrapSource<'a> {
    fn from(indices: &'a BootstrapIndices) -> Self {
        BootstrapSource::Fixed(indices)
    }
}

impl<'a> BootstrapSource<'a> {
    /// Draw `replications` fresh resamples, optionally seeded.
    pub fn draw(replications: usize, seed: Option<u64>) -> Self {
        BootstrapSource::Draw { replications, seed }
    }

    /// Number of replications this source yields.
    pub fn replications(&self) -> usize {
        match self {
            BootstrapSource::Fixed(indices) => indices.replications(),
            BootstrapSource::Draw { replications, .. } => *replications,
        }
    }

    /// Whether resolving this source twice yields the same draws.
    ///
    /// Only an unseeded `Draw` is not reproducible.
    pub fn is_reproducible(&self) -> bool {
        !matches!(self, BootstrapSource::Draw { seed: None, .. })
    }

    /// Materialize the draws for a data set with `num_rows` markets.
    ///
    /// Fixed draws are borrowed after checking their length; `Draw` sources
    /// generate a new matrix on every call.
    pub fn resolve(&self, num_rows: usize) -> InferenceResult<Cow<'a, BootstrapIndices>> {
        match *self {
            BootstrapSource::Fixed(indices) => {
                indices.check_rows(num_rows)?;
                Ok(Cow::Borrowed(indices))
            }
            BootstrapSource::Draw { replications, seed } => Ok(Cow::Owned(
                BootstrapIndices::generate(num_rows, replications, seed)?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generation_is_reproducible() {
        // Test Case: same seed, 1000 replications
        let a = BootstrapIndices::generate(50, 1000, Some(20220826)).unwrap();
        let b = BootstrapIndices::generate(50, 1000, Some(20220826)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.replications(), 1000);
        assert_eq!(a.num_rows(), 50);
        assert!(a.rows().all(|row| row.iter().all(|&i| i < 50)));

        // Test Case: different seed gives different draws
        let c = BootstrapIndices::generate(50, 1000, Some(1)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_draws_do_not_depend_on_replication_count() {
        let short = BootstrapIndices::generate(20, 5, Some(9)).unwrap();
        let long = BootstrapIndices::generate(20, 50, Some(9)).unwrap();
        for b in 0..5 {
            assert_eq!(short.row(b), long.row(b));
        }
    }

    #[test]
    fn test_generate_rejects_empty_shapes() {
        assert!(matches!(
            BootstrapIndices::generate(0, 10, Some(1)),
            Err(InferenceError::BootstrapError { .. })
        ));
        assert!(matches!(
            BootstrapIndices::generate(10, 0, Some(1)),
            Err(InferenceError::BootstrapError { .. })
        ));
    }

    #[test]
    fn test_from_rows_validation() {
        let ok = BootstrapIndices::from_rows(vec![vec![0, 1, 2], vec![2, 2, 0]]).unwrap();
        assert_eq!(ok.row(1), &[2, 2, 0]);

        // Test Case: entry outside [0, n)
        match BootstrapIndices::from_rows(vec![vec![0, 1, 3]]) {
            Err(InferenceError::BootstrapError { reason }) => assert!(reason.contains('3')),
            other => panic!("Expected BootstrapError, got {:?}", other),
        }

        // Test Case: ragged rows
        assert!(matches!(
            BootstrapIndices::from_rows(vec![vec![0, 1], vec![0]]),
            Err(InferenceError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_one_based_columns_transposes() {
        // 3 markets, 2 replications, file layout n x B
        let lines = vec![vec![1, 3], vec![2, 3], vec![3, 1]];
        let indices = BootstrapIndices::from_one_based_columns(&lines).unwrap();
        assert_eq!(indices.replications(), 2);
        assert_eq!(indices.row(0), &[0, 1, 2]);
        assert_eq!(indices.row(1), &[2, 2, 0]);

        let bad = vec![vec![0, 1], vec![1, 1]];
        assert!(BootstrapIndices::from_one_based_columns(&bad).is_err());
        let bad = vec![vec![3, 1], vec![1, 1]];
        assert!(BootstrapIndices::from_one_based_columns(&bad).is_err());
    }

    #[test]
    fn test_source_resolution() {
        let fixed = BootstrapIndices::generate(10, 4, Some(3)).unwrap();
        let source = BootstrapSource::from(&fixed);
        assert_eq!(source.replications(), 4);
        assert!(matches!(source.resolve(10).unwrap(), Cow::Borrowed(_)));
        assert!(matches!(
            source.resolve(11),
            Err(InferenceError::ShapeMismatch { .. })
        ));

        let draw = BootstrapSource::draw(4, Some(3));
        assert_eq!(*draw.resolve(10).unwrap(), fixed);

        assert!(source.is_reproducible());
        assert!(draw.is_reproducible());
        assert!(!BootstrapSource::draw(4, None).is_reproducible());
    }

    #[test]
    fn test_mix_seed_decorrelates() {
        assert_ne!(mix_seed(42, 0), mix_seed(42, 1));
        assert_eq!(mix_seed(42, 7), mix_seed(42, 7));
    }
}
