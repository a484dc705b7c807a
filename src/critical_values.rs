//! # Critical Values
//!
//! Self-normalized and empirical-bootstrap critical values for the CCK
//! statistic `√n · max_j m̂_j` (Chernozhukov, Chetverikov and Kato).
//!
//! - **SN**: one-step self-normalized value using all `k` moments
//! - **SN2S**: two-step self-normalized value; a first stage at level `β`
//!   selects the almost-binding moments, the second stage uses only those
//! - **EB2S**: two-step empirical bootstrap over resampled markets
//!
//! The Andrews–Kwon SPUR1 procedure lives in [`crate::andrews_kwon`].

use crate::{
    bootstrap_sampling::{BootstrapIndices, BootstrapSource},
    config::DEFAULT_BETA_DIVISOR,
    errors::{validate_probability, InferenceError, InferenceResult},
    math_utils::{column_mean_std, column_slice, max_of, quantile_linear, quantile_midpoint},
    standardization::m_hat,
};
use nalgebra::DMatrix;
use once_cell::sync::Lazy;
use statrs::distribution::{ContinuousCDF, Normal};

// Cached standard normal distribution
static STANDARD_NORMAL: Lazy<Normal> = Lazy::new(|| {
    Normal::new(0.0, 1.0).expect("Failed to create standard normal distribution")
});

/// Self-normalized critical value for `k` moments and `n` markets.
///
/// `z / sqrt(1 − z²/n)` with `z = Φ⁻¹(1 − α/k)`.
///
/// # Example
/// ```rust
/// use moment_inequalities::critical_values::base_sn;
///
/// let one = base_sn(100, 1, 0.05).unwrap();
/// let many = base_sn(100, 20, 0.05).unwrap();
/// assert!(many > one);
/// ```
pub fn base_sn(n: usize, k: usize, alpha: f64) -> InferenceResult<f64> {
    if k == 0 {
        return Err(InferenceError::NoMoments {
            operation: "self-normalized critical value".to_string(),
        });
    }
    validate_probability(alpha, "alpha")?;

    let z = STANDARD_NORMAL.inverse_cdf(1.0 - alpha / k as f64);
    let denominator = 1.0 - z * z / n as f64;
    if denominator <= 0.0 {
        return Err(InferenceError::NumericalError {
            reason: format!(
                "sample size {} too small for {} moments at level {} (z = {:.4})",
                n, k, alpha, z
            ),
            operation: Some("base_sn".to_string()),
        });
    }
    Ok(z / denominator.sqrt())
}

/// One-step self-normalized critical value for the moment matrix `x`.
pub fn cvalue_sn(x: &DMatrix<f64>, alpha: f64) -> InferenceResult<f64> {
    base_sn(x.nrows(), x.ncols(), alpha)
}

fn resolve_beta(alpha: f64, beta: Option<f64>) -> InferenceResult<f64> {
    validate_probability(alpha, "alpha")?;
    let beta = beta.unwrap_or(alpha / DEFAULT_BETA_DIVISOR);
    validate_probability(beta, "beta")?;
    if alpha - 2.0 * beta <= 0.0 {
        return Err(InferenceError::InvalidParameter {
            parameter: "beta".to_string(),
            value: beta,
            constraint: format!("< alpha / 2 = {}", alpha / 2.0),
        });
    }
    Ok(beta)
}

/// Moments whose studentized statistic exceeds `−2 c0`.
fn almost_binding(x: &DMatrix<f64>, first_stage: f64) -> Vec<usize> {
    let sqrt_n = (x.nrows() as f64).sqrt();
    m_hat(x)
        .into_iter()
        .enumerate()
        .filter(|&(_, m)| sqrt_n * m > -2.0 * first_stage)
        .map(|(j, _)| j)
        .collect()
}

/// Two-step self-normalized critical value.
///
/// `beta` defaults to `alpha / 50`. Returns 0 when no moment is almost
/// binding.
pub fn cvalue_sn2s(x: &DMatrix<f64>, alpha: f64, beta: Option<f64>) -> InferenceResult<f64> {
    let beta = resolve_beta(alpha, beta)?;
    let (n, k) = x.shape();
    let first_stage = base_sn(n, k, beta)?;

    let k_hat = almost_binding(x, first_stage).len();
    log::debug!("SN2S: {} of {} moments almost binding (c0 = {})", k_hat, k, first_stage);

    if k_hat > 0 {
        base_sn(n, k_hat, alpha - 2.0 * beta)
    } else {
        log::warn!("SN2S: no almost-binding moments, critical value set to 0");
        Ok(0.0)
    }
}

/// Bootstrap matrix `W[b, j] = √n (mean*_bj − mean_j) / std_j` (B × k).
///
/// Columns with zero standard deviation are 0 in every draw.
pub fn bootstrap_deviations(
    x: &DMatrix<f64>,
    indices: &BootstrapIndices,
) -> InferenceResult<DMatrix<f64>> {
    indices.check_rows(x.nrows())?;
    let (n, k) = x.shape();
    let sqrt_n = (n as f64).sqrt();
    let (means, stds) = column_mean_std(x);

    let mut w = DMatrix::zeros(indices.replications(), k);
    for (b, rows) in indices.rows().enumerate() {
        for j in 0..k {
            if stds[j] == 0.0 {
                continue;
            }
            let column = column_slice(x, j);
            let resampled_mean = rows.iter().map(|&i| column[i]).sum::<f64>() / n as f64;
            w[(b, j)] = sqrt_n * (resampled_mean - means[j]) / stds[j];
        }
    }
    Ok(w)
}

/// Two-step empirical bootstrap critical value.
///
/// The first-stage cutoff is the linear `(1 − β)` quantile of the per-draw
/// maxima of [`bootstrap_deviations`]. The critical value is the midpoint
/// `(1 − α + 2β)` quantile of the per-draw maxima over the almost-binding
/// moments, or 0 when none is almost binding.
pub fn cvalue_eb2s(
    x: &DMatrix<f64>,
    alpha: f64,
    beta: Option<f64>,
    bootstrap: BootstrapSource<'_>,
) -> InferenceResult<f64> {
    let beta = resolve_beta(alpha, beta)?;
    if x.ncols() == 0 {
        return Err(InferenceError::NoMoments {
            operation: "EB2S critical value".to_string(),
        });
    }
    let indices = bootstrap.resolve(x.nrows())?;
    let w = bootstrap_deviations(x, &indices)?;

    let row_max: Vec<f64> = w.row_iter().map(|row| max_of(row.iter().copied())).collect();
    let first_stage = quantile_linear(&row_max, 1.0 - beta)?;

    let selected = almost_binding(x, first_stage);
    log::debug!(
        "EB2S: {} draws, {} of {} moments almost binding (c0 = {})",
        indices.replications(),
        selected.len(),
        x.ncols(),
        first_stage
    );
    if selected.is_empty() {
        log::warn!("EB2S: no almost-binding moments, critical value set to 0");
        return Ok(0.0);
    }

    let selected_max: Vec<f64> = w
        .row_iter()
        .map(|row| max_of(selected.iter().map(|&j| row[j])))
        .collect();
    quantile_midpoint(&selected_max, 1.0 - alpha + 2.0 * beta)
}
