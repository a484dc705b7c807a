//! Studentized moment means.
//!
//! `m_hat` turns a moment matrix into one `mean / std` ratio per column.
//! The same map is applied to every bootstrap draw by `m_hat_resampled`.

use crate::bootstrap_sampling::BootstrapIndices;
use crate::errors::InferenceResult;
use crate::math_utils::{column_mean_std, resampled_column_mean_std};
use nalgebra::DMatrix;

/// Ratio of a column mean to its standard deviation.
///
/// A column with mean 0 and standard deviation 0 maps to 0. A non-zero mean
/// over a zero standard deviation yields a signed infinity.
#[inline]
pub fn studentize(mean: f64, std: f64) -> f64 {
    if mean == 0.0 && std == 0.0 {
        0.0
    } else {
        mean / std
    }
}

/// Studentized sample means of the columns of `x` (length k).
pub fn m_hat(x: &DMatrix<f64>) -> Vec<f64> {
    let (means, stds) = column_mean_std(x);
    means
        .into_iter()
        .zip(stds)
        .map(|(mean, std)| studentize(mean, std))
        .collect()
}

/// Studentized means of every bootstrap draw (B × k).
///
/// Row `b` is `m_hat` of the rows of `x` selected by draw `b`.
pub fn m_hat_resampled(x: &DMatrix<f64>, indices: &BootstrapIndices) -> InferenceResult<DMatrix<f64>> {
    indices.check_rows(x.nrows())?;
    let k = x.ncols();
    let mut out = DMatrix::zeros(indices.replications(), k);
    for (b, rows) in indices.rows().enumerate() {
        let (means, stds) = resampled_column_mean_std(x, rows);
        for j in 0..k {
            out[(b, j)] = studentize(means[j], stds[j]);
        }
    }
    Ok(out)
}
