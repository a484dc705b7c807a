//! # Inference Configuration
//!
//! This module contains the selectors and configuration structures that
//! control which moments are built, which test statistic is computed and
//! which critical-value procedure is applied.

use crate::errors::{validate_finite, validate_probability, InferenceError, InferenceResult};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ratio between the first-stage level `beta` and `alpha` used when no
/// explicit `beta` is configured (Chernozhukov et al., Section 4.2.2).
pub const DEFAULT_BETA_DIVISOR: f64 = 50.0;

/// Lower bound applied to the Andrews–Kwon bootstrap scaling factors.
pub const SCALING_FLOOR: f64 = 1e-6;

/// Test statistic applied to the standardized moments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TestStatistic {
    /// Maximum of the studentized moment means
    Cck,
    /// Re-centered statistic using the minimal relaxation `hat_r_inf`
    RecenteredCck,
}

/// Critical-value procedure paired with the test statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CriticalValueMethod {
    /// Self-normalized (asymptotic normal) critical value
    Sn,
    /// Two-step self-normalized critical value with moment selection
    Sn2s,
    /// Two-step empirical bootstrap critical value
    Eb2s,
    /// Andrews–Kwon generalized moment selection bootstrap
    Spur1,
}

impl CriticalValueMethod {
    /// Whether this procedure consumes bootstrap draws.
    pub fn needs_bootstrap(&self) -> bool {
        matches!(self, CriticalValueMethod::Eb2s | CriticalValueMethod::Spur1)
    }
}

/// Restriction of the moment set to the products of one firm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GridSelector {
    /// Use every product in the registry
    #[default]
    All,
    /// Use only the products of this firm (0-based)
    Firm(usize),
}

impl GridSelector {
    /// Firm index selected by this grid, if any.
    pub fn firm(&self) -> Option<usize> {
        match self {
            GridSelector::All => None,
            GridSelector::Firm(f) => Some(*f),
        }
    }

    /// Whether a product owned by `firm` belongs to the grid.
    pub fn includes(&self, firm: usize) -> bool {
        match self {
            GridSelector::All => true,
            GridSelector::Firm(f) => *f == firm,
        }
    }
}

/// Functional form of the moment functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MomentType {
    /// One fixed cost per firm
    #[default]
    Standard,
    /// Fixed cost quadratic in product-to-market distance (three values per firm)
    Distance,
    /// Distance model plus one expected-maximum-distance offset per firm
    DistanceUncertainty,
}

impl MomentType {
    /// Number of elements `theta` must have for `num_firms` firms.
    pub fn theta_len(&self, num_firms: usize) -> usize {
        match self {
            MomentType::Standard => num_firms,
            MomentType::Distance => 3 * num_firms,
            MomentType::DistanceUncertainty => 4 * num_firms,
        }
    }

    /// Whether the distance matrix is required.
    pub fn uses_distances(&self) -> bool {
        !matches!(self, MomentType::Standard)
    }

    fn layout(&self) -> &'static str {
        match self {
            MomentType::Standard => "one per firm",
            MomentType::Distance => "intercept, linear and quadratic term per firm",
            MomentType::DistanceUncertainty => {
                "three distance terms per firm followed by one offset per firm"
            }
        }
    }

    /// Checks `theta` against the layout for `num_firms` firms.
    pub fn validate_theta(&self, theta: &[f64], num_firms: usize) -> InferenceResult<()> {
        let expected = self.theta_len(num_firms);
        if theta.len() != expected {
            return Err(InferenceError::ParameterShape {
                expected,
                actual: theta.len(),
                layout: self.layout().to_string(),
            });
        }
        for (i, value) in theta.iter().enumerate() {
            validate_finite(*value, &format!("theta[{}]", i))?;
        }
        Ok(())
    }
}

impl TryFrom<u8> for MomentType {
    type Error = InferenceError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MomentType::Standard),
            1 => Ok(MomentType::Distance),
            2 => Ok(MomentType::DistanceUncertainty),
            other => Err(InferenceError::InvalidEnumValue {
                field: "moment type".to_string(),
                value: other.to_string(),
                expected: "0, 1, 2".to_string(),
            }),
        }
    }
}

/// Parses the numeric codes `"0"`, `"1"`, `"2"` or the names `"standard"`,
/// `"distance"`, `"distance-uncertainty"`.
impl FromStr for MomentType {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u8>() {
            return MomentType::try_from(code);
        }
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(MomentType::Standard),
            "distance" => Ok(MomentType::Distance),
            "distance-uncertainty" => Ok(MomentType::DistanceUncertainty),
            _ => Err(InferenceError::InvalidEnumValue {
                field: "moment type".to_string(),
                value: s.to_string(),
                expected: "standard, distance, distance-uncertainty (or 0, 1, 2)".to_string(),
            }),
        }
    }
}

impl FromStr for TestStatistic {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CCK" => Ok(TestStatistic::Cck),
            "RC-CCK" => Ok(TestStatistic::RecenteredCck),
            other => Err(InferenceError::InvalidEnumValue {
                field: "test statistic".to_string(),
                value: other.to_string(),
                expected: "CCK, RC-CCK".to_string(),
            }),
        }
    }
}

impl fmt::Display for TestStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatistic::Cck => write!(f, "CCK"),
            TestStatistic::RecenteredCck => write!(f, "RC-CCK"),
        }
    }
}

impl FromStr for CriticalValueMethod {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SN" => Ok(CriticalValueMethod::Sn),
            "SN2S" => Ok(CriticalValueMethod::Sn2s),
            "EB2S" => Ok(CriticalValueMethod::Eb2s),
            "SPUR1" => Ok(CriticalValueMethod::Spur1),
            other => Err(InferenceError::InvalidEnumValue {
                field: "critical value".to_string(),
                value: other.to_string(),
                expected: "SN, SN2S, EB2S, SPUR1".to_string(),
            }),
        }
    }
}

impl fmt::Display for CriticalValueMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CriticalValueMethod::Sn => "SN",
            CriticalValueMethod::Sn2s => "SN2S",
            CriticalValueMethod::Eb2s => "EB2S",
            CriticalValueMethod::Spur1 => "SPUR1",
        };
        write!(f, "{}", name)
    }
}

/// Parses `"all"` or a 1-based firm number (`"1"`, `"2"`, ...).
impl FromStr for GridSelector {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(GridSelector::All);
        }
        match s.parse::<usize>() {
            Ok(firm) if firm >= 1 => Ok(GridSelector::Firm(firm - 1)),
            _ => Err(InferenceError::InvalidGridSelector {
                reason: format!("'{}' is neither \"all\" nor a 1-based firm number", s),
            }),
        }
    }
}

impl fmt::Display for GridSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridSelector::All => write!(f, "all"),
            GridSelector::Firm(firm) => write!(f, "{}", firm + 1),
        }
    }
}

/// Specification of the moment functions for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MomentSpec {
    /// Bound on the unobserved fixed-cost shock (Assumption 4.2)
    pub v_bar: f64,
    /// Which firm's moments to evaluate
    pub grid: GridSelector,
    /// Functional form of the moments
    pub moment_type: MomentType,
}

impl Default for MomentSpec {
    fn default() -> Self {
        Self {
            v_bar: 0.0,
            grid: GridSelector::All,
            moment_type: MomentType::Standard,
        }
    }
}

impl MomentSpec {
    /// Standard moments over all products with the given `v_bar`.
    pub fn new(v_bar: f64) -> Self {
        Self {
            v_bar,
            ..Self::default()
        }
    }

    /// Restricts the moments to one firm.
    pub fn with_grid(mut self, grid: GridSelector) -> Self {
        self.grid = grid;
        self
    }

    /// Switches the functional form.
    pub fn with_moment_type(mut self, moment_type: MomentType) -> Self {
        self.moment_type = moment_type;
        self
    }
}

/// Test configuration: significance level, statistic and critical value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InferenceConfig {
    /// Significance level of the test
    pub alpha: f64,
    /// First-stage level for two-step procedures (defaults to `alpha / 50`)
    pub beta: Option<f64>,
    /// Test statistic
    pub test_statistic: TestStatistic,
    /// Critical-value procedure
    pub critical_value: CriticalValueMethod,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self::cck_sn()
    }
}

impl InferenceConfig {
    fn preset(test_statistic: TestStatistic, critical_value: CriticalValueMethod) -> Self {
        Self {
            alpha: 0.05,
            beta: None,
            test_statistic,
            critical_value,
        }
    }

    /// CCK statistic with the one-step self-normalized critical value.
    pub fn cck_sn() -> Self {
        Self::preset(TestStatistic::Cck, CriticalValueMethod::Sn)
    }

    /// CCK statistic with the two-step self-normalized critical value.
    pub fn cck_sn2s() -> Self {
        Self::preset(TestStatistic::Cck, CriticalValueMethod::Sn2s)
    }

    /// CCK statistic with the two-step empirical bootstrap critical value.
    pub fn cck_eb2s() -> Self {
        Self::preset(TestStatistic::Cck, CriticalValueMethod::Eb2s)
    }

    /// Re-centered statistic with the two-step self-normalized critical value.
    pub fn rc_cck_sn2s() -> Self {
        Self::preset(TestStatistic::RecenteredCck, CriticalValueMethod::Sn2s)
    }

    /// Re-centered statistic with the two-step empirical bootstrap critical value.
    pub fn rc_cck_eb2s() -> Self {
        Self::preset(TestStatistic::RecenteredCck, CriticalValueMethod::Eb2s)
    }

    /// Re-centered statistic with the Andrews–Kwon SPUR1 critical value.
    pub fn rc_cck_spur1() -> Self {
        Self::preset(TestStatistic::RecenteredCck, CriticalValueMethod::Spur1)
    }

    /// Sets the significance level.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets an explicit first-stage level.
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = Some(beta);
        self
    }

    /// First-stage level actually used.
    pub fn beta(&self) -> f64 {
        self.beta.unwrap_or(self.alpha / DEFAULT_BETA_DIVISOR)
    }

    /// Validates the levels. Two-step procedures need `alpha - 2 beta > 0`.
    pub fn validate(&self) -> InferenceResult<()> {
        validate_probability(self.alpha, "alpha")?;
        let beta = self.beta();
        validate_probability(beta, "beta")?;
        if matches!(
            self.critical_value,
            CriticalValueMethod::Sn2s | CriticalValueMethod::Eb2s
        ) && self.alpha - 2.0 * beta <= 0.0
        {
            return Err(InferenceError::InvalidParameter {
                parameter: "beta".to_string(),
                value: beta,
                constraint: format!("< alpha / 2 = {}", self.alpha / 2.0),
            });
        }
        Ok(())
    }
}
