//! Numerical helpers shared by the moment engine and the critical values.
//!
//! Quantiles follow the conventions used by the published results: linear
//! interpolation (Hyndman–Fan type 7) for first-stage cutoffs and midpoint
//! interpolation for final critical values. Standard deviations are
//! population standard deviations (divisor `n`).

use crate::errors::{InferenceError, InferenceResult};
use nalgebra::DMatrix;

/// Safe comparison for floating point values (handles NaN)
pub fn float_total_cmp(a: &f64, b: &f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater, // push NaN to end
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal),
    }
}

/// Calculate median of already-sorted data (handles even-length correctly)
pub fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Calculate median (handles even-length correctly)
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut v = values.to_vec();
    v.sort_by(float_total_cmp);
    median_of_sorted(&v)
}

fn sorted_for_quantile(values: &[f64], p: f64, operation: &str) -> InferenceResult<Vec<f64>> {
    if values.is_empty() {
        return Err(InferenceError::EmptySelection {
            context: format!("{} of an empty sample", operation),
        });
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(InferenceError::InvalidParameter {
            parameter: "quantile level".to_string(),
            value: p,
            constraint: "[0, 1]".to_string(),
        });
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(float_total_cmp);
    Ok(sorted)
}

/// Blend two order statistics, returning the common value when they agree
/// so that infinite order statistics do not produce NaN.
fn blend(lower: f64, upper: f64, weight: f64) -> f64 {
    if lower == upper {
        lower
    } else {
        lower + (upper - lower) * weight
    }
}

/// Quantile with linear interpolation between order statistics.
///
/// For sorted values `x` and virtual index `h = (n - 1) p`, returns
/// `x[⌊h⌋] + (h - ⌊h⌋)(x[⌊h⌋ + 1] - x[⌊h⌋])`.
pub fn quantile_linear(values: &[f64], p: f64) -> InferenceResult<f64> {
    let sorted = sorted_for_quantile(values, p, "linear quantile")?;
    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let frac = h - lo as f64;

    if lo + 1 < sorted.len() && frac > 0.0 {
        Ok(blend(sorted[lo], sorted[lo + 1], frac))
    } else {
        Ok(sorted[lo.min(sorted.len() - 1)])
    }
}

/// Quantile with midpoint interpolation.
///
/// Returns the order statistic itself when the virtual index `(n - 1) p` is
/// an integer, and the average of the two bracketing order statistics
/// otherwise.
pub fn quantile_midpoint(values: &[f64], p: f64) -> InferenceResult<f64> {
    let sorted = sorted_for_quantile(values, p, "midpoint quantile")?;
    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;

    if h.fract() == 0.0 || lo + 1 >= sorted.len() {
        Ok(sorted[lo.min(sorted.len() - 1)])
    } else {
        Ok(blend(sorted[lo], sorted[lo + 1], 0.5))
    }
}

/// Population mean and standard deviation of a sample.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (mean, (ss / n).sqrt())
}

/// Column `j` of a column-major matrix as a slice.
pub fn column_slice(x: &DMatrix<f64>, j: usize) -> &[f64] {
    let n = x.nrows();
    &x.as_slice()[j * n..(j + 1) * n]
}

/// Column means and population standard deviations of `x`.
pub fn column_mean_std(x: &DMatrix<f64>) -> (Vec<f64>, Vec<f64>) {
    (0..x.ncols())
        .map(|j| mean_std(column_slice(x, j)))
        .unzip()
}

/// Column means and population standard deviations of the rows of `x`
/// selected by `rows` (with repetition).
pub fn resampled_column_mean_std(x: &DMatrix<f64>, rows: &[usize]) -> (Vec<f64>, Vec<f64>) {
    let mut buffer = Vec::with_capacity(rows.len());
    (0..x.ncols())
        .map(|j| {
            let column = column_slice(x, j);
            buffer.clear();
            buffer.extend(rows.iter().map(|&i| column[i]));
            mean_std(&buffer)
        })
        .unzip()
}

/// Largest element, `-inf` for an empty iterator.
pub fn max_of<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().fold(f64::NEG_INFINITY, f64::max)
}

/// Smallest element, `+inf` for an empty iterator.
pub fn min_of<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().fold(f64::INFINITY, f64::min)
}
