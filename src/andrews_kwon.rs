//! # Andrews–Kwon Generalized Moment Selection
//!
//! The SPUR1 critical value and its auxiliary routines (Andrews and Kwon,
//! "Misspecified moment inequality models", Section 4). All routines take
//! the *negated* moment matrix `−X`, so that a moment inequality holds when
//! its studentized mean is non-negative.
//!
//! The bootstrap draws are supplied as a [`BootstrapIndices`] matrix so the
//! scaling factors, `tn*` and `An*` of one evaluation see the same draws.

use crate::{
    bootstrap_sampling::{BootstrapIndices, BootstrapSource},
    config::{MomentSpec, SCALING_FLOOR},
    errors::{validate_len, validate_probability, InferenceError, InferenceResult},
    market_data::{MarketData, ProductRegistry},
    math_utils::{max_of, min_of, quantile_midpoint},
    moments::moment_matrix,
    profile::profile_theta,
    standardization::{m_hat, m_hat_resampled},
};
use nalgebra::DMatrix;

/// Tuning parameter `κ_n = sqrt(ln n)` (also used as `τ_n`).
pub fn kappa_n(n: usize) -> f64 {
    (n as f64).ln().sqrt()
}

/// Per-moment bootstrap scaling factors, each floored at [`SCALING_FLOOR`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingFactors {
    /// Scale of `√n (m* − min_l min(m*_l, 0))`, used by `tn*`
    pub b1: Vec<f64>,
    /// Scale of `√n m*`, used by `An*`
    pub b2: Vec<f64>,
    /// Scale of `√n (min_l min(m*_l, 0) − min(m*, 0))`, used by `An*`
    pub b3: Vec<f64>,
}

fn floored_std(values: impl Iterator<Item = f64> + Clone, count: usize) -> f64 {
    let n = count as f64;
    let mean = values.clone().sum::<f64>() / n;
    let std = (values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt();
    // NaN passes through unfloored
    if std < SCALING_FLOOR {
        SCALING_FLOOR
    } else {
        std
    }
}

/// Scaling factors from the bootstrap distribution of the studentized means.
///
/// With `m*` the B × k resampled studentized means, `clip = min(m*, 0)` and
/// `mn_b = min_j clip_bj`, the factors are the standard deviations across
/// draws of `√n (m* − mn_b)`, `√n m*` and `√n (mn_b − clip)`.
pub fn std_b_vec(x: &DMatrix<f64>, indices: &BootstrapIndices) -> InferenceResult<ScalingFactors> {
    let n = x.nrows();
    let sqrt_n = (n as f64).sqrt();
    let m_star = m_hat_resampled(x, indices)?;
    let (draws, k) = m_star.shape();

    let mn_star: Vec<f64> = m_star
        .row_iter()
        .map(|row| min_of(row.iter().map(|&m| m.min(0.0))))
        .collect();

    let mut factors = ScalingFactors {
        b1: Vec::with_capacity(k),
        b2: Vec::with_capacity(k),
        b3: Vec::with_capacity(k),
    };
    for j in 0..k {
        let column = m_star.column(j);
        let v1 = (0..draws).map(|b| sqrt_n * (column[b] - mn_star[b]));
        let v2 = (0..draws).map(|b| sqrt_n * column[b]);
        let v3 = (0..draws).map(|b| sqrt_n * (mn_star[b] - column[b].min(0.0)));
        factors.b1.push(floored_std(v1, draws));
        factors.b2.push(floored_std(v2, draws));
        factors.b3.push(floored_std(v3, draws));
    }
    Ok(factors)
}

/// Bootstrap GMS statistic `tn*` (B × k).
///
/// `tn*_bj = √n (m*_bj − m̂_j) + φ_j` where `φ_j = +∞` if
/// `√n (m̂_j + r) / (b1_j κ) > 1` and 0 otherwise, with
/// `r = max_l −min(m̂_l, 0)`.
pub fn tn_star(
    x: &DMatrix<f64>,
    b1: &[f64],
    kappa_n: f64,
    indices: &BootstrapIndices,
) -> InferenceResult<DMatrix<f64>> {
    validate_len(x.ncols(), b1.len(), "tn* scaling factors vs moments")?;
    let sqrt_n = (x.nrows() as f64).sqrt();
    let m0 = m_hat(x);
    let r = max_of(m0.iter().map(|&m| -m.min(0.0)));

    let penalty: Vec<f64> = m0
        .iter()
        .zip(b1)
        .map(|(&m, &b)| {
            let xi = sqrt_n * (m + r) / (b * kappa_n);
            if xi > 1.0 {
                f64::INFINITY
            } else {
                0.0
            }
        })
        .collect();

    let mut tn = m_hat_resampled(x, indices)?;
    for (j, mut column) in tn.column_iter_mut().enumerate() {
        for value in column.iter_mut() {
            *value = sqrt_n * (*value - m0[j]) + penalty[j];
        }
    }
    Ok(tn)
}

/// SPUR1 critical value.
///
/// `x_neg` is the negated moment matrix and `an_vec` holds one `An` value
/// per bootstrap draw. Each draw contributes `−min_j min(0, tn*_bj + An_b)`;
/// the critical value is the midpoint `(1 − α)` quantile of these values.
pub fn cvalue_spur1(
    x_neg: &DMatrix<f64>,
    alpha: f64,
    an_vec: &[f64],
    bootstrap: BootstrapSource<'_>,
) -> InferenceResult<f64> {
    validate_probability(alpha, "alpha")?;
    if x_neg.ncols() == 0 {
        return Err(InferenceError::NoMoments {
            operation: "SPUR1 critical value".to_string(),
        });
    }
    let n = x_neg.nrows();
    let indices = bootstrap.resolve(n)?;
    validate_len(
        indices.replications(),
        an_vec.len(),
        "An vector length vs bootstrap replications",
    )?;

    let kappa = kappa_n(n);
    let factors = std_b_vec(x_neg, &indices)?;
    let tn = tn_star(x_neg, &factors.b1, kappa, &indices)?;

    let sn_star: Vec<f64> = tn
        .row_iter()
        .zip(an_vec)
        .map(|(row, &an)| -min_of(row.iter().map(|&t| (t + an).min(0.0))))
        .collect();

    let cv = quantile_midpoint(&sn_star, 1.0 - alpha)?;
    log::debug!(
        "SPUR1: {} draws, {} moments, kappa_n = {}, critical value {}",
        indices.replications(),
        x_neg.ncols(),
        kappa,
        cv
    );
    Ok(cv)
}

/// Largest violation of the negated moments at `theta`:
/// `−min_j min(0, m̂(−X)_j + adjust)`.
pub fn rhat(
    theta: &[f64],
    data: &MarketData,
    registry: &ProductRegistry,
    spec: &MomentSpec,
    adjust: f64,
) -> InferenceResult<f64> {
    let x_neg = -moment_matrix(data, theta, registry, spec)?;
    if x_neg.ncols() == 0 {
        return Err(InferenceError::NoMoments {
            operation: "rhat".to_string(),
        });
    }
    Ok(-min_of(m_hat(&x_neg).into_iter().map(|m| (m + adjust).min(0.0))))
}

/// Objective of the infimum defining `An` (one value per bootstrap draw).
///
/// Candidates are the moments whose violation `r_j = −min(m̂_j, 0)` is within
/// `b3_j κ / √n` of the largest violation. For each candidate `j`, the
/// shifted violations `√n (r_l − r̂_inf) − b3_l κ` have entry `j` replaced by
/// its penalty (`+∞` if `√n (r_j − r̂_inf) / (b3_j κ) > 1`, else 0), the
/// bootstrap term is added and the maximum over moments is taken. The
/// result is the minimum over candidates.
pub fn an_star(
    x_neg: &DMatrix<f64>,
    b2: &[f64],
    b3: &[f64],
    kappa_n: f64,
    hat_r_inf: f64,
    indices: &BootstrapIndices,
) -> InferenceResult<Vec<f64>> {
    let k = x_neg.ncols();
    validate_len(k, b2.len(), "An* scaling factors b2 vs moments")?;
    validate_len(k, b3.len(), "An* scaling factors b3 vs moments")?;
    let sqrt_n = (x_neg.nrows() as f64).sqrt();

    let m0 = m_hat(x_neg);
    let r_vec: Vec<f64> = m0.iter().map(|&m| -m.min(0.0)).collect();
    let r0 = max_of(r_vec.iter().copied());

    let candidates: Vec<usize> = (0..k)
        .filter(|&j| r_vec[j] >= r0 - b3[j] * kappa_n / sqrt_n)
        .collect();
    if candidates.is_empty() {
        return Err(InferenceError::EmptySelection {
            context: "An* candidate moments".to_string(),
        });
    }

    let hat_b: Vec<f64> = (0..k)
        .map(|j| sqrt_n * (r_vec[j] - hat_r_inf) - b3[j] * kappa_n)
        .collect();
    let penalty: Vec<f64> = (0..k)
        .map(|j| {
            let xi = sqrt_n * (r_vec[j] - hat_r_inf) / (b3[j] * kappa_n);
            if xi > 1.0 {
                f64::INFINITY
            } else {
                0.0
            }
        })
        .collect();

    let m_star = m_hat_resampled(x_neg, indices)?;
    let mut hi_star = vec![0.0; k];
    let mut out = Vec::with_capacity(m_star.nrows());
    for row in m_star.row_iter() {
        for j in 0..k {
            let v_star = sqrt_n * (row[j] - m0[j]);
            let pm = if v_star >= 0.0 { -1.0 } else { 1.0 };
            let shifted = sqrt_n * m0[j] + pm * b2[j] * kappa_n;
            hi_star[j] = -(shifted + v_star).min(0.0) + shifted.min(0.0);
        }

        let best = min_of(candidates.iter().map(|&c| {
            max_of((0..k).map(|l| {
                let base = if l == c { penalty[c] } else { hat_b[l] };
                base + hi_star[l]
            }))
        }));
        out.push(best);
    }

    log::trace!("An*: {} candidate moments of {}", candidates.len(), k);
    Ok(out)
}

/// `An` vector for SPUR1: per-draw minimum of [`an_star`] over the grid
/// values whose adjusted `rhat` is small.
///
/// `aux_rhat[g]` is [`rhat`] at `theta_grid[g]` with `adjust = hat_r_inf`.
/// A grid value is kept when `aux ≤ τ_n / √n` or `aux == 1`, with
/// `τ_n = κ_n = sqrt(ln n)`. `spec.grid` must select the profiled firm; all
/// other parameters are 0.
pub fn compute_an_vec(
    aux_rhat: &[f64],
    hat_r_inf: f64,
    data: &MarketData,
    theta_grid: &[f64],
    registry: &ProductRegistry,
    spec: &MomentSpec,
    bootstrap: BootstrapSource<'_>,
) -> InferenceResult<Vec<f64>> {
    validate_len(theta_grid.len(), aux_rhat.len(), "rhat profile vs theta grid")?;
    let firm = spec.grid.firm().ok_or_else(|| InferenceError::InvalidGridSelector {
        reason: "An vector needs the grid to select one firm".to_string(),
    })?;

    let n = data.num_markets();
    let kappa = kappa_n(n);
    let tau = kappa;
    let cutoff = tau / (n as f64).sqrt();

    let of_interest: Vec<f64> = theta_grid
        .iter()
        .zip(aux_rhat)
        .filter(|&(_, &aux)| aux <= cutoff || aux == 1.0)
        .map(|(&t, _)| t)
        .collect();
    if of_interest.is_empty() {
        return Err(InferenceError::EmptySelection {
            context: format!("no grid value has adjusted rhat <= {}", cutoff),
        });
    }
    log::debug!(
        "An: {} of {} grid values of interest for firm {}",
        of_interest.len(),
        theta_grid.len(),
        firm + 1
    );

    let indices = bootstrap.resolve(n)?;
    let mut an_vec = vec![f64::INFINITY; indices.replications()];
    for &t in &of_interest {
        let theta = profile_theta(spec.moment_type, registry.num_firms(), firm, t);
        let x_neg = -moment_matrix(data, &theta, registry, spec)?;
        let factors = std_b_vec(&x_neg, &indices)?;
        let an = an_star(&x_neg, &factors.b2, &factors.b3, kappa, hat_r_inf, &indices)?;
        for (current, value) in an_vec.iter_mut().zip(an) {
            *current = current.min(value);
        }
    }
    Ok(an_vec)
}
