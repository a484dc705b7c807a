//! # Moment Engine
//!
//! Builds the `n × k` matrix of moment inequalities for the portfolio entry
//! model. For every product `p` owned by firm `f` and every market `i`:
//!
//! - the lower moment bounds the revenue differential of products that are
//!   *not* offered: `((A_ip − c_ip)(1 − D_ip) − v̄ D_ip) w_i`
//! - the upper moment bounds the revenue differential of products that
//!   *are* offered: `((A_ip + c_ip) D_ip − v̄ (1 − D_ip)) w_i`
//!
//! where `c_ip` is the fixed cost implied by `theta` and `w_i` is one of the
//! weighting vectors. A moment that is constant across markets (the product
//! is offered everywhere or nowhere) has zero variance and is dropped.

use crate::{
    config::{MomentSpec, MomentType},
    errors::{validate_finite, InferenceError, InferenceResult},
    market_data::{MarketData, ProductRegistry},
    math_utils::{column_slice, median},
};
use nalgebra::DMatrix;

/// Instrument columns thresholded at their median to build weights.
pub const INSTRUMENT_COLUMNS: [usize; 3] = [1, 2, 3];

/// Lower moments of one market, one entry per product.
///
/// `revenue`, `offered` and `coef` are aligned by registry position.
pub fn lower_moments(
    revenue: &[f64],
    offered: &[f64],
    coef: &[f64],
    v_bar: f64,
    weight: f64,
) -> Vec<f64> {
    revenue
        .iter()
        .zip(offered)
        .zip(coef)
        .map(|((&a, &d), &c)| ((a - c) * (1.0 - d) - v_bar * d) * weight)
        .collect()
}

/// Upper moments of one market, one entry per product.
///
/// Satisfies `upper_moments(a, d, c, ..) == lower_moments(a, 1 - d, -c, ..)`.
pub fn upper_moments(
    revenue: &[f64],
    offered: &[f64],
    coef: &[f64],
    v_bar: f64,
    weight: f64,
) -> Vec<f64> {
    revenue
        .iter()
        .zip(offered)
        .zip(coef)
        .map(|((&a, &d), &c)| ((a + c) * d - v_bar * (1.0 - d)) * weight)
        .collect()
}

/// Weighting vectors: the constant vector, then one 0/1 indicator per
/// instrument column (`value > median`).
fn weighting_vectors(data: &MarketData) -> Vec<Vec<f64>> {
    let n = data.num_markets();
    let mut weights = vec![vec![1.0; n]];
    if let Some(instruments) = data.instruments() {
        for &c in INSTRUMENT_COLUMNS.iter() {
            let column = column_slice(instruments, c);
            let threshold = median(column);
            weights.push(
                column
                    .iter()
                    .map(|&z| if z > threshold { 1.0 } else { 0.0 })
                    .collect(),
            );
        }
    }
    weights
}

/// Fixed cost of each registry product in market `i`.
fn fixed_costs(
    data: &MarketData,
    registry: &ProductRegistry,
    theta: &[f64],
    moment_type: MomentType,
    i: usize,
) -> Vec<f64> {
    match (moment_type, data.distances()) {
        (MomentType::Standard, _) | (_, None) => {
            registry.products().iter().map(|p| theta[p.firm]).collect()
        }
        (MomentType::Distance | MomentType::DistanceUncertainty, Some(distances)) => registry
            .products()
            .iter()
            .enumerate()
            .map(|(pos, p)| {
                let d = distances[(i, pos + 1)];
                let base = 3 * p.firm;
                theta[base] + theta[base + 1] * d + theta[base + 2] * d * d
            })
            .collect(),
    }
}

/// Registry positions whose lower and upper moments have non-zero variance
/// and belong to the selected grid.
fn kept_moments(
    data: &MarketData,
    registry: &ProductRegistry,
    spec: &MomentSpec,
) -> (Vec<usize>, Vec<usize>) {
    let n = data.num_markets() as f64;
    let portfolio = data.portfolio();
    let mut lower = Vec::new();
    let mut upper = Vec::new();
    for (pos, product) in registry.products().iter().enumerate() {
        if !spec.grid.includes(product.firm) {
            continue;
        }
        let count: f64 = column_slice(portfolio, product.column).iter().sum();
        if count < n {
            lower.push(pos);
        }
        if count > 0.0 {
            upper.push(pos);
        }
    }
    (lower, upper)
}

fn validate_inputs(
    data: &MarketData,
    theta: &[f64],
    registry: &ProductRegistry,
    spec: &MomentSpec,
) -> InferenceResult<()> {
    data.check_registry(registry)?;
    spec.moment_type.validate_theta(theta, registry.num_firms())?;
    validate_finite(spec.v_bar, "v_bar")?;
    if let Some(firm) = spec.grid.firm() {
        if firm >= registry.num_firms() {
            return Err(InferenceError::InvalidGridSelector {
                reason: format!(
                    "firm {} selected but the registry has {} firms",
                    firm + 1,
                    registry.num_firms()
                ),
            });
        }
    }
    if spec.moment_type.uses_distances() && data.distances().is_none() {
        return Err(InferenceError::MissingParameter {
            parameter: "distances".to_string(),
            required_by: "distance-dependent fixed costs".to_string(),
        });
    }
    Ok(())
}

/// Build the moment-inequality matrix `X` (n × k).
///
/// Column order: for each weighting vector (constant first, then the three
/// instrument indicators when instruments are present), the kept lower
/// moments in registry order followed by the kept upper moments. With
/// `MomentType::DistanceUncertainty`, the columns `u_f, −u_f` are appended
/// for each firm `f`, where `u_f` is the firm's largest product distance in
/// the market minus its offset `mu_f`.
///
/// # Example
/// ```rust
/// use moment_inequalities::{moment_matrix, MarketData, MomentSpec, ProductRegistry};
/// use nalgebra::DMatrix;
///
/// let portfolio = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
/// let revenue = DMatrix::from_row_slice(3, 3, &[0.0, 2.0, 1.0, 0.0, 1.5, 3.0, 0.0, 2.5, 2.0]);
/// let data = MarketData::new(portfolio, revenue).unwrap();
/// let registry = ProductRegistry::from_one_based(&[(1, 1), (2, 2)]).unwrap();
///
/// let x = moment_matrix(&data, &[1.0, 1.0], &registry, &MomentSpec::new(0.5)).unwrap();
/// assert_eq!(x.shape(), (3, 4));
/// ```
pub fn moment_matrix(
    data: &MarketData,
    theta: &[f64],
    registry: &ProductRegistry,
    spec: &MomentSpec,
) -> InferenceResult<DMatrix<f64>> {
    validate_inputs(data, theta, registry, spec)?;

    let n = data.num_markets();
    let (lower_keep, upper_keep) = kept_moments(data, registry, spec);
    let weights = weighting_vectors(data);
    let per_weight = lower_keep.len() + upper_keep.len();
    let num_firms = registry.num_firms();
    let uncertainty_columns = match spec.moment_type {
        MomentType::DistanceUncertainty => 2 * num_firms,
        _ => 0,
    };
    let k = weights.len() * per_weight + uncertainty_columns;

    log::debug!(
        "moment matrix: {} markets, {} lower + {} upper moments x {} weights, {} extra columns",
        n,
        lower_keep.len(),
        upper_keep.len(),
        weights.len(),
        uncertainty_columns
    );
    if per_weight == 0 {
        log::warn!("no product moment has non-zero variance for grid {}", spec.grid);
    }

    let mut x = DMatrix::zeros(n, k);
    let portfolio = data.portfolio();
    let revenue = data.revenue();

    for i in 0..n {
        let market_revenue: Vec<f64> = (0..registry.len())
            .map(|pos| revenue[(i, pos + 1)])
            .collect();
        let offered: Vec<f64> = registry
            .products()
            .iter()
            .map(|p| portfolio[(i, p.column)])
            .collect();
        let coef = fixed_costs(data, registry, theta, spec.moment_type, i);

        let lower = lower_moments(&market_revenue, &offered, &coef, spec.v_bar, 1.0);
        let upper = upper_moments(&market_revenue, &offered, &coef, spec.v_bar, 1.0);

        let mut col = 0;
        for weight in &weights {
            let w = weight[i];
            for &pos in &lower_keep {
                x[(i, col)] = lower[pos] * w;
                col += 1;
            }
            for &pos in &upper_keep {
                x[(i, col)] = upper[pos] * w;
                col += 1;
            }
        }

        if let (MomentType::DistanceUncertainty, Some(distances)) =
            (spec.moment_type, data.distances())
        {
            let offsets = &theta[3 * num_firms..];
            for (firm, mu) in offsets.iter().enumerate() {
                let farthest = registry
                    .firm_products(firm)
                    .map(|(pos, _)| distances[(i, pos + 1)])
                    .fold(f64::NEG_INFINITY, f64::max);
                let u = farthest - mu;
                x[(i, col)] = u;
                x[(i, col + 1)] = -u;
                col += 2;
            }
        }
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridSelector;
    use assert_approx_eq::assert_approx_eq;

    /// Four markets, three products (two owned by firm 0, one by firm 1).
    fn sample_data() -> (MarketData, ProductRegistry) {
        let portfolio = DMatrix::from_row_slice(
            4,
            3,
            &[
                1.0, 0.0, 1.0, //
                0.0, 1.0, 1.0, //
                1.0, 1.0, 0.0, //
                0.0, 0.0, 1.0, //
            ],
        );
        let revenue = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, 2.0, 1.0, 3.0, //
                0.0, 1.5, 2.5, 0.5, //
                0.0, 3.0, 2.0, 1.0, //
                0.0, 0.5, 1.0, 2.0, //
            ],
        );
        let data = MarketData::new(portfolio, revenue).unwrap();
        let registry = ProductRegistry::from_one_based(&[(1, 1), (2, 1), (3, 2)]).unwrap();
        (data, registry)
    }

    #[test]
    fn test_upper_is_lower_with_negated_cost_and_flipped_portfolio() {
        let revenue = [2.0, -1.0, 0.5, 3.25];
        let offered = [1.0, 0.0, 0.0, 1.0];
        let coef = [0.7, 1.1, -0.4, 2.0];
        let flipped: Vec<f64> = offered.iter().map(|d| 1.0 - d).collect();
        let negated: Vec<f64> = coef.iter().map(|c| -c).collect();

        for &weight in &[1.0, 0.0] {
            let upper = upper_moments(&revenue, &offered, &coef, 0.3, weight);
            let lower = lower_moments(&revenue, &flipped, &negated, 0.3, weight);
            for (u, l) in upper.iter().zip(&lower) {
                assert_approx_eq!(u, l);
            }
        }
    }

    #[test]
    fn test_zero_cost_zero_bound_reduces_to_revenue() {
        let (data, registry) = sample_data();
        let x = moment_matrix(&data, &[0.0, 0.0], &registry, &MomentSpec::new(0.0)).unwrap();
        // All products vary across markets: 3 lower + 3 upper
        assert_eq!(x.shape(), (4, 6));

        for i in 0..4 {
            for p in 0..3 {
                let a = data.revenue()[(i, p + 1)];
                let d = data.portfolio()[(i, p)];
                assert_eq!(x[(i, p)], a * (1.0 - d));
                assert_eq!(x[(i, 3 + p)], a * d);
            }
        }
    }

    #[test]
    fn test_zero_variance_filter_drops_two_columns() {
        let (data, registry) = sample_data();
        let full = moment_matrix(&data, &[0.5, 0.5], &registry, &MomentSpec::new(0.1)).unwrap();

        // product 1 offered everywhere, product 2 nowhere
        let mut portfolio = data.portfolio().clone();
        for i in 0..4 {
            portfolio[(i, 0)] = 1.0;
            portfolio[(i, 1)] = 0.0;
        }
        let degenerate = MarketData::new(portfolio, data.revenue().clone()).unwrap();
        let x = moment_matrix(&degenerate, &[0.5, 0.5], &registry, &MomentSpec::new(0.1)).unwrap();

        assert_eq!(full.ncols(), 6);
        assert_eq!(x.ncols(), full.ncols() - 2);
        // remaining lower: products 2 and 3; remaining upper: products 1 and 3
        assert_approx_eq!(x[(0, 0)], data.revenue()[(0, 2)] - 0.5);
    }

    #[test]
    fn test_grid_selector_restricts_to_one_firm() {
        let (data, registry) = sample_data();
        let spec = MomentSpec::new(0.0).with_grid(GridSelector::Firm(1));
        let x = moment_matrix(&data, &[1.0, 2.0], &registry, &spec).unwrap();
        assert_eq!(x.ncols(), 2);
        // firm 1 owns product 3 (revenue column 3, cost 2.0)
        assert_approx_eq!(x[(1, 0)], 0.0);
        assert_approx_eq!(x[(1, 1)], 0.5 + 2.0);

        let spec = MomentSpec::new(0.0).with_grid(GridSelector::Firm(2));
        assert!(matches!(
            moment_matrix(&data, &[1.0, 2.0], &registry, &spec),
            Err(InferenceError::InvalidGridSelector { .. })
        ));
    }

    #[test]
    fn test_instruments_quadruple_columns() {
        let (data, registry) = sample_data();
        let instruments = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, 1.0, 5.0, 0.0, //
                0.0, 2.0, 5.0, 1.0, //
                0.0, 3.0, 5.0, 2.0, //
                0.0, 4.0, 5.0, 3.0, //
            ],
        );
        let data = data.with_instruments(instruments).unwrap();
        let x = moment_matrix(&data, &[0.0, 0.0], &registry, &MomentSpec::new(0.0)).unwrap();
        assert_eq!(x.ncols(), 24);

        // column 1 median is 2.5: markets 2 and 3 get weight 1
        for p in 0..6 {
            assert_eq!(x[(0, 6 + p)], 0.0);
            assert_eq!(x[(1, 6 + p)], 0.0);
            assert_eq!(x[(2, 6 + p)], x[(2, p)]);
            // constant instrument column: nothing strictly above the median
            assert_eq!(x[(2, 12 + p)], 0.0);
        }
    }

    #[test]
    fn test_theta_shape_and_missing_distances() {
        let (data, registry) = sample_data();
        assert!(matches!(
            moment_matrix(&data, &[0.0, 0.0, 0.0], &registry, &MomentSpec::new(0.0)),
            Err(InferenceError::ParameterShape { .. })
        ));

        let spec = MomentSpec::new(0.0).with_moment_type(MomentType::Distance);
        assert!(matches!(
            moment_matrix(&data, &[0.0; 6], &registry, &spec),
            Err(InferenceError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_distance_costs_and_uncertainty_columns() {
        let (data, registry) = sample_data();
        let distances = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, 1.0, 2.0, 3.0, //
                0.0, 2.0, 1.0, 1.0, //
                0.0, 0.5, 0.5, 2.0, //
                0.0, 1.0, 3.0, 0.0, //
            ],
        );
        let data = data.with_distances(distances).unwrap();

        // firm 0: 1 + 0.5 d, firm 1: d^2
        let theta = [1.0, 0.5, 0.0, 0.0, 0.0, 1.0];
        let spec = MomentSpec::new(0.0).with_moment_type(MomentType::Distance);
        let x = moment_matrix(&data, &theta, &registry, &spec).unwrap();
        assert_eq!(x.ncols(), 6);
        // market 1, product 1 not offered: lower = revenue - (1 + 0.5 * 2)
        assert_approx_eq!(x[(1, 0)], 1.5 - 2.0);
        // market 0, product 3 offered: upper = revenue + 3^2
        assert_approx_eq!(x[(0, 5)], 3.0 + 9.0);

        let mut theta = theta.to_vec();
        theta.extend([1.0, 0.5]);
        let spec = MomentSpec::new(0.0).with_moment_type(MomentType::DistanceUncertainty);
        let x = moment_matrix(&data, &theta, &registry, &spec).unwrap();
        assert_eq!(x.ncols(), 10);
        // market 0: firm 0 max distance 2, firm 1 max distance 3
        assert_approx_eq!(x[(0, 6)], 2.0 - 1.0);
        assert_approx_eq!(x[(0, 7)], -(2.0 - 1.0));
        assert_approx_eq!(x[(0, 8)], 3.0 - 0.5);
        assert_approx_eq!(x[(0, 9)], -(3.0 - 0.5));
    }

    #[test]
    fn test_moment_matrix_is_deterministic() {
        let (data, registry) = sample_data();
        let spec = MomentSpec::new(0.25);
        let a = moment_matrix(&data, &[0.3, -0.2], &registry, &spec).unwrap();
        let b = moment_matrix(&data, &[0.3, -0.2], &registry, &spec).unwrap();
        assert_eq!(a, b);
    }
}
