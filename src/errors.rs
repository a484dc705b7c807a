//! Error types and validation functions for moment-inequality inference.
//!
//! This module provides the single error type shared by the moment engine,
//! the critical-value procedures and the dispatch layer, together with the
//! input guards those modules run before doing any numerical work.

use thiserror::Error;

/// Error types for moment-inequality inference operations.
///
/// Every failure is reported synchronously to the caller. None of these
/// conditions is recovered internally: the inference routines are pure
/// functions of their inputs, so retrying without changing the inputs
/// reproduces the same error.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum InferenceError {
    /// Input matrices or vectors have incompatible dimensions.
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which inputs disagree
        context: String,
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },

    /// The parameter vector does not match the product registry.
    #[error("Parameter vector has {actual} elements, expected {expected} ({layout})")]
    ParameterShape {
        /// Expected number of elements
        expected: usize,
        /// Actual number of elements
        actual: usize,
        /// Layout description (e.g. "one per firm")
        layout: String,
    },

    /// A procedure needs an argument that was not supplied.
    #[error("Missing parameter: {parameter} is required by {required_by}")]
    MissingParameter {
        /// Name of the absent argument
        parameter: String,
        /// Procedure that needs it
        required_by: String,
    },

    /// A string selector could not be parsed.
    #[error("Invalid value '{value}' for {field}, expected one of: {expected}")]
    InvalidEnumValue {
        /// Selector name
        field: String,
        /// Value supplied by the caller
        value: String,
        /// Accepted values
        expected: String,
    },

    /// A grid selector names a firm that does not exist or is not allowed here.
    #[error("Invalid grid selector: {reason}")]
    InvalidGridSelector {
        /// Why the selector is rejected
        reason: String,
    },

    /// Invalid parameter value.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// The moment matrix has no columns left after zero-variance filtering.
    #[error("No moment inequalities available for {operation}")]
    NoMoments {
        /// Operation that needed at least one moment
        operation: String,
    },

    /// A selection step produced an empty set where one element is required.
    #[error("Empty selection in {context}")]
    EmptySelection {
        /// Which selection came out empty
        context: String,
    },

    /// Numerical computation error (non-finite inputs or results).
    #[error("Numerical computation failed: {reason}")]
    NumericalError {
        /// Detailed reason for numerical failure
        reason: String,
        /// Operation that failed
        operation: Option<String>,
    },

    /// Bootstrap index construction or validation failed.
    #[error("Bootstrap resampling failed: {reason}")]
    BootstrapError {
        /// Reason for bootstrap failure
        reason: String,
    },
}

/// Result type for inference operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Validates that a significance level lies strictly inside (0, 1).
///
/// # Example
/// ```rust
/// use moment_inequalities::errors::validate_probability;
///
/// assert!(validate_probability(0.05, "alpha").is_ok());
/// assert!(validate_probability(1.0, "alpha").is_err());
/// ```
pub fn validate_probability(value: f64, name: &str) -> InferenceResult<()> {
    if value.is_nan() || value <= 0.0 || value >= 1.0 {
        return Err(InferenceError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "(0, 1)".to_string(),
        });
    }
    Ok(())
}

/// Validates that a value is finite and not NaN.
pub fn validate_finite(value: f64, name: &str) -> InferenceResult<()> {
    if !value.is_finite() {
        Err(InferenceError::NumericalError {
            reason: format!("{} is not finite: {}", name, value),
            operation: None,
        })
    } else {
        Ok(())
    }
}

/// Validates that all values in a slice are finite.
///
/// Returns on the first non-finite value and reports its position.
pub fn validate_all_finite<'a, I>(data: I, name: &str) -> InferenceResult<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    if let Some((i, &value)) = data.into_iter().enumerate().find(|(_, v)| !v.is_finite()) {
        let value_desc = if value.is_nan() {
            "NaN".to_string()
        } else if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };

        return Err(InferenceError::NumericalError {
            reason: format!(
                "{} contains non-finite value at index {}: {}",
                name, i, value_desc
            ),
            operation: None,
        });
    }

    Ok(())
}

/// Validates that two sizes agree.
pub fn validate_len(expected: usize, actual: usize, context: &str) -> InferenceResult<()> {
    if expected != actual {
        return Err(InferenceError::ShapeMismatch {
            context: context.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
