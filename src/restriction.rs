//! # Test Statistic and Dispatch
//!
//! `g_restriction` evaluates one parameter value: it builds the moment
//! matrix, computes the configured test statistic and pairs it with the
//! configured critical value. `theta` belongs to the confidence set when
//! the statistic does not exceed the critical value.
//!
//! Arguments that only some procedures need (the `An` vector for SPUR1,
//! `hat_r_inf` for the re-centered statistic and the bootstrap draws for
//! EB2S and SPUR1) are checked before any moment is computed.

use crate::{
    andrews_kwon::cvalue_spur1,
    bootstrap_sampling::BootstrapSource,
    config::{CriticalValueMethod, InferenceConfig, MomentSpec, TestStatistic},
    critical_values::{cvalue_eb2s, cvalue_sn, cvalue_sn2s},
    errors::{InferenceError, InferenceResult},
    market_data::{MarketData, ProductRegistry},
    math_utils::max_of,
    moments::moment_matrix,
    standardization::m_hat,
};
use nalgebra::DMatrix;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Test statistic and critical value at one parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RestrictionOutcome {
    /// Value of the test statistic
    pub statistic: f64,
    /// Critical value it is compared against
    pub critical_value: f64,
}

impl RestrictionOutcome {
    /// `statistic − critical_value`.
    pub fn difference(&self) -> f64 {
        self.statistic - self.critical_value
    }

    /// `critical_value − statistic`: non-negative when `theta` is accepted,
    /// the sign convention of an inequality constraint `g(θ) ≥ 0`.
    pub fn slack(&self) -> f64 {
        self.critical_value - self.statistic
    }

    /// Whether the null is rejected at this parameter value.
    pub fn is_rejected(&self) -> bool {
        self.statistic > self.critical_value
    }
}

/// Procedure-specific inputs to [`g_restriction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AuxiliaryInputs<'a> {
    /// One `An` value per bootstrap draw (SPUR1)
    pub an_vec: Option<&'a [f64]>,
    /// Minimal relaxation `hat_r_inf` (re-centered statistic)
    pub hat_r_inf: Option<f64>,
    /// Bootstrap draws (EB2S and SPUR1)
    pub bootstrap: Option<BootstrapSource<'a>>,
}

impl<'a> AuxiliaryInputs<'a> {
    /// No auxiliary inputs (enough for CCK with SN or SN2S).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `An` vector.
    pub fn with_an_vec(mut self, an_vec: &'a [f64]) -> Self {
        self.an_vec = Some(an_vec);
        self
    }

    /// Set the minimal relaxation.
    pub fn with_hat_r_inf(mut self, hat_r_inf: f64) -> Self {
        self.hat_r_inf = Some(hat_r_inf);
        self
    }

    /// Set the bootstrap draws.
    pub fn with_bootstrap(mut self, bootstrap: impl Into<BootstrapSource<'a>>) -> Self {
        self.bootstrap = Some(bootstrap.into());
        self
    }
}

fn missing(parameter: &str, required_by: impl ToString) -> InferenceError {
    InferenceError::MissingParameter {
        parameter: parameter.to_string(),
        required_by: required_by.to_string(),
    }
}

/// Check that every argument the configured procedures need is present.
fn check_preconditions(
    config: &InferenceConfig,
    inputs: &AuxiliaryInputs<'_>,
) -> InferenceResult<()> {
    config.validate()?;
    if config.critical_value == CriticalValueMethod::Spur1 && inputs.an_vec.is_none() {
        return Err(missing("an_vec", CriticalValueMethod::Spur1));
    }
    if config.test_statistic == TestStatistic::RecenteredCck && inputs.hat_r_inf.is_none() {
        return Err(missing("hat_r_inf", TestStatistic::RecenteredCck));
    }
    if config.critical_value.needs_bootstrap() && inputs.bootstrap.is_none() {
        return Err(missing("bootstrap", config.critical_value));
    }
    if config.critical_value == CriticalValueMethod::Spur1
        && matches!(inputs.bootstrap, Some(source) if !source.is_reproducible())
    {
        return Err(InferenceError::BootstrapError {
            reason: "SPUR1 pairs An with its draws; use fixed or seeded draws".to_string(),
        });
    }
    Ok(())
}

/// CCK statistic `√n · max_j m̂(X)_j`.
pub fn cck_statistic(x: &DMatrix<f64>) -> f64 {
    (x.nrows() as f64).sqrt() * max_of(m_hat(x))
}

/// Re-centered statistic `√n · max_j −min(0, m̂(−X)_j + hat_r_inf)`.
pub fn recentered_statistic(x: &DMatrix<f64>, hat_r_inf: f64) -> f64 {
    let m = m_hat(&(-x));
    (x.nrows() as f64).sqrt() * max_of(m.into_iter().map(|v| -(v + hat_r_inf).min(0.0)))
}

/// Test statistic and critical value at `theta`.
///
/// Fails with `MissingParameter` before touching the data when SPUR1 has
/// no `An` vector, the re-centered statistic has no `hat_r_inf`, or a
/// bootstrap procedure has no bootstrap draws.
///
/// # Example
/// ```rust
/// use moment_inequalities::{
///     g_restriction, AuxiliaryInputs, InferenceConfig, MarketData, MomentSpec, ProductRegistry,
/// };
/// use nalgebra::DMatrix;
///
/// let portfolio = DMatrix::from_fn(30, 2, |i, j| ((i + j) % 3 == 0) as u8 as f64);
/// let revenue = DMatrix::from_fn(30, 3, |i, j| (i % 5 + j) as f64);
/// let data = MarketData::new(portfolio, revenue).unwrap();
/// let registry = ProductRegistry::from_one_based(&[(1, 1), (2, 2)]).unwrap();
///
/// let outcome = g_restriction(
///     &[2.0, 2.0],
///     &data,
///     &registry,
///     &MomentSpec::new(0.0),
///     &InferenceConfig::cck_sn2s(),
///     &AuxiliaryInputs::new(),
/// )
/// .unwrap();
/// assert!(outcome.statistic.is_finite());
/// ```
pub fn g_restriction(
    theta: &[f64],
    data: &MarketData,
    registry: &ProductRegistry,
    spec: &MomentSpec,
    config: &InferenceConfig,
    inputs: &AuxiliaryInputs<'_>,
) -> InferenceResult<RestrictionOutcome> {
    check_preconditions(config, inputs)?;

    let x = moment_matrix(data, theta, registry, spec)?;
    if x.ncols() == 0 {
        return Err(InferenceError::NoMoments {
            operation: format!("{} statistic", config.test_statistic),
        });
    }

    let statistic = match (config.test_statistic, inputs.hat_r_inf) {
        (TestStatistic::Cck, _) => cck_statistic(&x),
        (TestStatistic::RecenteredCck, Some(r)) => recentered_statistic(&x, r),
        (TestStatistic::RecenteredCck, None) => {
            return Err(missing("hat_r_inf", TestStatistic::RecenteredCck))
        }
    };

    let alpha = config.alpha;
    let beta = Some(config.beta());
    let critical_value = match (config.critical_value, inputs.bootstrap, inputs.an_vec) {
        (CriticalValueMethod::Sn, _, _) => cvalue_sn(&x, alpha)?,
        (CriticalValueMethod::Sn2s, _, _) => cvalue_sn2s(&x, alpha, beta)?,
        (CriticalValueMethod::Eb2s, Some(bootstrap), _) => {
            cvalue_eb2s(&x, alpha, beta, bootstrap)?
        }
        (CriticalValueMethod::Spur1, Some(bootstrap), Some(an_vec)) => {
            cvalue_spur1(&(-&x), alpha, an_vec, bootstrap)?
        }
        (CriticalValueMethod::Spur1, _, None) => {
            return Err(missing("an_vec", CriticalValueMethod::Spur1))
        }
        (method, None, _) => return Err(missing("bootstrap", method)),
    };

    log::debug!(
        "{}/{} at theta = {:?}: statistic {} vs critical value {} ({} moments)",
        config.test_statistic,
        config.critical_value,
        theta,
        statistic,
        critical_value,
        x.ncols()
    );

    Ok(RestrictionOutcome {
        statistic,
        critical_value,
    })
}

/// `statistic − critical_value` at `theta` (see [`g_restriction`]).
pub fn g_restriction_diff(
    theta: &[f64],
    data: &MarketData,
    registry: &ProductRegistry,
    spec: &MomentSpec,
    config: &InferenceConfig,
    inputs: &AuxiliaryInputs<'_>,
) -> InferenceResult<f64> {
    g_restriction(theta, data, registry, spec, config, inputs).map(|o| o.difference())
}

/// Fixed inputs of [`g_restriction`], so that an optimizer can evaluate
/// the restriction as a function of `theta` alone.
#[derive(Debug, Clone)]
pub struct RestrictionProblem<'a> {
    data: &'a MarketData,
    registry: &'a ProductRegistry,
    spec: MomentSpec,
    config: InferenceConfig,
    inputs: AuxiliaryInputs<'a>,
}

impl<'a> RestrictionProblem<'a> {
    /// Bundle the data, moment specification, test configuration and
    /// auxiliary inputs.
    pub fn new(
        data: &'a MarketData,
        registry: &'a ProductRegistry,
        spec: MomentSpec,
        config: InferenceConfig,
        inputs: AuxiliaryInputs<'a>,
    ) -> Self {
        Self {
            data,
            registry,
            spec,
            config,
            inputs,
        }
    }

    /// Statistic and critical value at `theta`.
    pub fn evaluate(&self, theta: &[f64]) -> InferenceResult<RestrictionOutcome> {
        g_restriction(
            theta,
            self.data,
            self.registry,
            &self.spec,
            &self.config,
            &self.inputs,
        )
    }

    /// `statistic − critical_value` at `theta`.
    pub fn difference(&self, theta: &[f64]) -> InferenceResult<f64> {
        self.evaluate(theta).map(|o| o.difference())
    }

    /// `critical_value − statistic` at `theta`.
    pub fn slack(&self, theta: &[f64]) -> InferenceResult<f64> {
        self.evaluate(theta).map(|o| o.slack())
    }

    /// The moment specification used by this problem.
    pub fn spec(&self) -> &MomentSpec {
        &self.spec
    }

    /// The test configuration used by this problem.
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}
