//! # One-Dimensional Profiling
//!
//! Confidence intervals for one firm's fixed cost are built by scanning a
//! grid of values for that component while every other component of
//! `theta` is held at zero. This module provides the pieces of that scan:
//! the profiled parameter vector, the `rhat` profile that calibrates the
//! re-centered statistic and SPUR1, and the interval of accepted grid
//! values.

use crate::{
    andrews_kwon::{compute_an_vec, rhat},
    bootstrap_sampling::BootstrapSource,
    config::{CriticalValueMethod, InferenceConfig, MomentSpec, MomentType, TestStatistic},
    errors::{validate_len, InferenceError, InferenceResult},
    market_data::{MarketData, ProductRegistry},
    math_utils::min_of,
    restriction::{AuxiliaryInputs, RestrictionOutcome},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameter vector that is zero except for `firm`'s leading coefficient.
///
/// For the standard model this is the firm's fixed cost; for the distance
/// models it is the firm's intercept.
pub fn profile_theta(moment_type: MomentType, num_firms: usize, firm: usize, value: f64) -> Vec<f64> {
    let mut theta = vec![0.0; moment_type.theta_len(num_firms)];
    let position = match moment_type {
        MomentType::Standard => firm,
        MomentType::Distance | MomentType::DistanceUncertainty => 3 * firm,
    };
    if let Some(slot) = theta.get_mut(position) {
        *slot = value;
    }
    theta
}

fn profiled_firm(spec: &MomentSpec, registry: &ProductRegistry) -> InferenceResult<usize> {
    match spec.grid.firm() {
        Some(firm) if firm < registry.num_firms() => Ok(firm),
        Some(firm) => Err(InferenceError::InvalidGridSelector {
            reason: format!(
                "firm {} selected but the registry has {} firms",
                firm + 1,
                registry.num_firms()
            ),
        }),
        None => Err(InferenceError::InvalidGridSelector {
            reason: "profiling needs the grid to select one firm".to_string(),
        }),
    }
}

/// [`rhat`] at every grid value of the profiled firm.
pub fn rhat_profile(
    theta_grid: &[f64],
    data: &MarketData,
    registry: &ProductRegistry,
    spec: &MomentSpec,
    adjust: f64,
) -> InferenceResult<Vec<f64>> {
    let firm = profiled_firm(spec, registry)?;
    theta_grid
        .iter()
        .map(|&t| {
            let theta = profile_theta(spec.moment_type, registry.num_firms(), firm, t);
            rhat(&theta, data, registry, spec, adjust)
        })
        .collect()
}

/// Calibrated inputs for the re-centered statistic and SPUR1.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecenteringInputs {
    /// Minimal relaxation: the smallest `rhat` over the grid
    pub hat_r_inf: f64,
    /// `An` vector (only computed for SPUR1)
    pub an_vec: Option<Vec<f64>>,
}

impl RecenteringInputs {
    /// Scan the grid for `hat_r_inf` and, when the configuration uses SPUR1,
    /// compute the `An` vector from the adjusted `rhat` profile.
    ///
    /// SPUR1 needs `bootstrap`, either fixed indices or a seeded draw; the
    /// draws must be the same ones later passed to [`crate::g_restriction`].
    pub fn calibrate(
        theta_grid: &[f64],
        data: &MarketData,
        registry: &ProductRegistry,
        spec: &MomentSpec,
        config: &InferenceConfig,
        bootstrap: Option<BootstrapSource<'_>>,
    ) -> InferenceResult<Self> {
        let spur1 = config.critical_value == CriticalValueMethod::Spur1;
        if spur1 {
            match bootstrap {
                None => {
                    return Err(InferenceError::MissingParameter {
                        parameter: "bootstrap".to_string(),
                        required_by: CriticalValueMethod::Spur1.to_string(),
                    })
                }
                Some(source) if !source.is_reproducible() => {
                    return Err(InferenceError::BootstrapError {
                        reason: "SPUR1 needs fixed or seeded draws so that An is paired with \
                                 the draws used later"
                            .to_string(),
                    })
                }
                Some(_) => {}
            }
        }
        if theta_grid.is_empty() {
            return Err(InferenceError::EmptySelection {
                context: "theta grid".to_string(),
            });
        }

        let profile = rhat_profile(theta_grid, data, registry, spec, 0.0)?;
        let hat_r_inf = min_of(profile.iter().copied());
        log::debug!(
            "hat_r_inf = {} over {} grid values for firm {}",
            hat_r_inf,
            theta_grid.len(),
            spec.grid
        );

        let an_vec = match bootstrap {
            Some(bootstrap) if spur1 => {
                let aux = rhat_profile(theta_grid, data, registry, spec, hat_r_inf)?;
                Some(compute_an_vec(
                    &aux, hat_r_inf, data, theta_grid, registry, spec, bootstrap,
                )?)
            }
            _ => None,
        };

        Ok(Self { hat_r_inf, an_vec })
    }

    /// Auxiliary inputs for [`crate::g_restriction`] built from these values.
    pub fn inputs<'a>(&'a self, bootstrap: Option<BootstrapSource<'a>>) -> AuxiliaryInputs<'a> {
        AuxiliaryInputs {
            an_vec: self.an_vec.as_deref(),
            hat_r_inf: Some(self.hat_r_inf),
            bootstrap,
        }
    }
}

/// Interval of accepted grid values for one profiled parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConfidenceInterval {
    /// Confidence level (`1 − alpha`)
    pub confidence_level: f64,
    /// Smallest accepted grid value (NaN when nothing is accepted)
    pub lower_bound: f64,
    /// Largest accepted grid value, or the grid value with the smallest
    /// statistic when nothing is accepted
    pub upper_bound: f64,
    /// Test statistic used
    pub test_statistic: TestStatistic,
    /// Critical value used
    pub critical_value: CriticalValueMethod,
    /// Number of accepted grid values
    pub accepted: usize,
}

impl ConfidenceInterval {
    /// Whether no grid value was accepted.
    pub fn is_empty(&self) -> bool {
        self.accepted == 0
    }
}

/// Confidence interval from the outcomes of a grid scan.
///
/// Accepted values are those where the statistic does not exceed the
/// critical value. An empty set is reported with a NaN lower bound and the
/// minimizer of the statistic as the upper bound.
pub fn grid_confidence_interval(
    theta_grid: &[f64],
    outcomes: &[RestrictionOutcome],
    config: &InferenceConfig,
) -> InferenceResult<ConfidenceInterval> {
    validate_len(theta_grid.len(), outcomes.len(), "outcomes vs theta grid")?;
    if theta_grid.is_empty() {
        return Err(InferenceError::EmptySelection {
            context: "theta grid".to_string(),
        });
    }

    let accepted: Vec<f64> = theta_grid
        .iter()
        .zip(outcomes)
        .filter(|(_, o)| !o.is_rejected())
        .map(|(&t, _)| t)
        .collect();

    let (lower_bound, upper_bound) = if accepted.is_empty() {
        // first minimizer, as argmin does
        let mut best = 0;
        for (g, outcome) in outcomes.iter().enumerate() {
            if outcome.statistic < outcomes[best].statistic {
                best = g;
            }
        }
        log::warn!(
            "empty confidence set; reporting argmin of the statistic ({})",
            theta_grid[best]
        );
        (f64::NAN, theta_grid[best])
    } else {
        (
            min_of(accepted.iter().copied()),
            accepted.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        )
    };

    Ok(ConfidenceInterval {
        confidence_level: 1.0 - config.alpha,
        lower_bound,
        upper_bound,
        test_statistic: config.test_statistic,
        critical_value: config.critical_value,
        accepted: accepted.len(),
    })
}
