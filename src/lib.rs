//! # Moment-Inequality Inference
//!
//! Inference on fixed-cost parameters of a portfolio entry model through
//! moment inequalities. Each market contributes revealed-preference
//! inequalities `E[m(θ)] ≤ 0` built from the firms' observed product
//! portfolios; a parameter value is rejected when the largest studentized
//! moment is too large to be explained by sampling noise.
//!
//! ## Key Features
//!
//! - **Moment Engine**: lower and upper revealed-preference moments with
//!   instrument weighting, zero-variance filtering and firm selection
//! - **Cost Models**: constant fixed costs, quadratic-in-distance costs and
//!   distance costs with an uncertainty offset
//! - **Test Statistics**: CCK `√n · max m̂` and its re-centered variant
//! - **Critical Values**: SN, two-step SN2S, two-step empirical bootstrap
//!   EB2S and the Andrews–Kwon SPUR1 bootstrap
//! - **Reproducible Bootstrap**: seeded ChaCha20 draws per replication or
//!   externally supplied resampling indices
//! - **Profiling**: grid scans of one firm's cost with calibrated
//!   re-centering inputs and the resulting confidence interval
//!
//! ## Quick Start
//!
//! ```rust
//! use moment_inequalities::{
//!     g_restriction, AuxiliaryInputs, InferenceConfig, MarketData, MomentSpec, ProductRegistry,
//! };
//! use nalgebra::DMatrix;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let n = 40;
//!     // two firms, three products; column 0 of revenue is unused
//!     let portfolio = DMatrix::from_fn(n, 3, |i, j| ((i + j) % 2) as f64);
//!     let revenue = DMatrix::from_fn(n, 4, |i, j| 1.0 + ((i + 3 * j) % 5) as f64);
//!     let data = MarketData::new(portfolio, revenue)?;
//!     let registry = ProductRegistry::from_one_based(&[(1, 1), (2, 1), (3, 2)])?;
//!
//!     let outcome = g_restriction(
//!         &[0.5, 0.5],
//!         &data,
//!         &registry,
//!         &MomentSpec::new(0.0),
//!         &InferenceConfig::cck_sn2s(),
//!         &AuxiliaryInputs::new(),
//!     )?;
//!     println!(
//!         "T = {:.3}, c = {:.3}, rejected: {}",
//!         outcome.statistic,
//!         outcome.critical_value,
//!         outcome.is_rejected()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: sizes and first-stage cutoffs
//! at `debug`, empty selections at `warn`, per-draw detail at `trace`.
//! Install any `log` backend to see them.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod market_data;
pub mod math_utils;
pub mod secure_rng;

// Inference
pub mod andrews_kwon;
pub mod bootstrap_sampling;
pub mod critical_values;
pub mod moments;
pub mod profile;
pub mod restriction;
pub mod standardization;

// Re-exports for convenience - main public API
pub use config::{
    CriticalValueMethod, GridSelector, InferenceConfig, MomentSpec, MomentType, TestStatistic,
    DEFAULT_BETA_DIVISOR, SCALING_FLOOR,
};
pub use errors::{InferenceError, InferenceResult};
pub use market_data::{MarketData, Product, ProductRegistry};

// Moment engine and standardization
pub use moments::{lower_moments, moment_matrix, upper_moments};
pub use standardization::{m_hat, m_hat_resampled};

// Bootstrap exports
pub use bootstrap_sampling::{mix_seed, BootstrapIndices, BootstrapSource};
pub use secure_rng::SecureRng;

// Critical value exports
pub use andrews_kwon::{
    an_star, compute_an_vec, cvalue_spur1, kappa_n, rhat, std_b_vec, tn_star, ScalingFactors,
};
pub use critical_values::{base_sn, bootstrap_deviations, cvalue_eb2s, cvalue_sn, cvalue_sn2s};

// Restriction and profiling exports
pub use profile::{
    grid_confidence_interval, profile_theta, rhat_profile, ConfidenceInterval, RecenteringInputs,
};
pub use restriction::{
    cck_statistic, g_restriction, g_restriction_diff, recentered_statistic, AuxiliaryInputs,
    RestrictionOutcome, RestrictionProblem,
};
