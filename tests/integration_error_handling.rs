//! Integration tests for invalid configurations and malformed inputs
//!
//! Every failure is reported as a typed `InferenceError`; none of these
//! scenarios may panic.

use moment_inequalities::{
    errors::InferenceError, g_restriction, moment_matrix, AuxiliaryInputs, BootstrapIndices,
    BootstrapSource, CriticalValueMethod, GridSelector, InferenceConfig, MarketData, MomentSpec,
    MomentType, ProductRegistry, RecenteringInputs, TestStatistic,
};
use nalgebra::DMatrix;

fn small_market(n: usize) -> (MarketData, ProductRegistry) {
    let portfolio = DMatrix::from_fn(n, 2, |i, j| ((i + j) % 3 != 0) as u8 as f64);
    let revenue = DMatrix::from_fn(n, 3, |i, j| (1 + (i * 2 + j) % 7) as f64);
    (
        MarketData::new(portfolio, revenue).unwrap(),
        ProductRegistry::from_one_based(&[(1, 1), (2, 2)]).unwrap(),
    )
}

/// Test scenario: a procedure is requested without the inputs it needs
#[test]
fn test_missing_parameters_are_reported_by_name() {
    let (data, registry) = small_market(25);
    let spec = MomentSpec::new(0.0);
    let indices = BootstrapIndices::generate(25, 20, Some(5)).unwrap();

    let cases = [
        (
            InferenceConfig::rc_cck_spur1(),
            AuxiliaryInputs::new().with_hat_r_inf(0.0).with_bootstrap(&indices),
            "an_vec",
            "SPUR1",
        ),
        (
            InferenceConfig::rc_cck_eb2s(),
            AuxiliaryInputs::new().with_bootstrap(&indices),
            "hat_r_inf",
            "RC-CCK",
        ),
        (
            InferenceConfig::cck_eb2s(),
            AuxiliaryInputs::new(),
            "bootstrap",
            "EB2S",
        ),
    ];

    for (config, inputs, expected_parameter, expected_method) in cases {
        match g_restriction(&[1.0, 1.0], &data, &registry, &spec, &config, &inputs) {
            Err(InferenceError::MissingParameter {
                parameter,
                required_by,
            }) => {
                assert_eq!(parameter, expected_parameter);
                assert_eq!(required_by, expected_method);
            }
            other => panic!("Expected MissingParameter, got {:?}", other),
        }
    }
}

/// Test scenario: unknown selector strings and numeric codes
#[test]
fn test_invalid_enum_values() {
    assert!(matches!(
        "CCK2".parse::<TestStatistic>(),
        Err(InferenceError::InvalidEnumValue { .. })
    ));
    assert!(matches!(
        "SN3S".parse::<CriticalValueMethod>(),
        Err(InferenceError::InvalidEnumValue { .. })
    ));
    assert!(matches!(
        MomentType::try_from(3u8),
        Err(InferenceError::InvalidEnumValue { .. })
    ));
    assert_eq!("RC-CCK".parse::<TestStatistic>().unwrap(), TestStatistic::RecenteredCck);
    assert_eq!("SPUR1".parse::<CriticalValueMethod>().unwrap(), CriticalValueMethod::Spur1);
}

/// Test scenario: grid selectors that do not name an existing firm
#[test]
fn test_invalid_grid_selectors() {
    assert!(matches!(
        "0".parse::<GridSelector>(),
        Err(InferenceError::InvalidGridSelector { .. })
    ));
    assert!(matches!(
        "firm".parse::<GridSelector>(),
        Err(InferenceError::InvalidGridSelector { .. })
    ));

    let (data, registry) = small_market(25);
    let spec = MomentSpec::new(0.0).with_grid(GridSelector::Firm(4));
    assert!(matches!(
        moment_matrix(&data, &[1.0, 1.0], &registry, &spec),
        Err(InferenceError::InvalidGridSelector { .. })
    ));

    // profiling needs one firm
    assert!(matches!(
        RecenteringInputs::calibrate(
            &[0.0, 1.0],
            &data,
            &registry,
            &MomentSpec::new(0.0),
            &InferenceConfig::rc_cck_sn2s(),
            None,
        ),
        Err(InferenceError::InvalidGridSelector { .. })
    ));
}

/// Test scenario: matrices and parameter vectors with inconsistent shapes
#[test]
fn test_shape_mismatches() {
    let portfolio = DMatrix::from_element(10, 2, 1.0);
    let revenue = DMatrix::from_element(9, 3, 1.0);
    assert!(matches!(
        MarketData::new(portfolio, revenue),
        Err(InferenceError::ShapeMismatch { .. })
    ));

    let (data, registry) = small_market(25);
    let bad_draws = BootstrapIndices::generate(24, 10, Some(1)).unwrap();
    assert!(matches!(
        g_restriction(
            &[1.0, 1.0],
            &data,
            &registry,
            &MomentSpec::new(0.0),
            &InferenceConfig::cck_eb2s(),
            &AuxiliaryInputs::new().with_bootstrap(BootstrapSource::Fixed(&bad_draws)),
        ),
        Err(InferenceError::ShapeMismatch { .. })
    ));

    assert!(matches!(
        moment_matrix(&data, &[1.0, 1.0, 1.0], &registry, &MomentSpec::new(0.0)),
        Err(InferenceError::ParameterShape { .. })
    ));
}

/// Test scenario: distance models without distances, invalid levels
#[test]
fn test_missing_distances_and_invalid_levels() {
    let (data, registry) = small_market(25);
    let spec = MomentSpec::new(0.0).with_moment_type(MomentType::Distance);
    assert!(matches!(
        moment_matrix(&data, &[0.0; 6], &registry, &spec),
        Err(InferenceError::MissingParameter { .. })
    ));

    let config = InferenceConfig::cck_sn2s().with_beta(0.03);
    assert!(config.validate().is_err());
    assert!(g_restriction(
        &[1.0, 1.0],
        &data,
        &registry,
        &MomentSpec::new(0.0),
        &config,
        &AuxiliaryInputs::new(),
    )
    .is_err());

    assert!(matches!(
        BootstrapIndices::generate(0, 10, None),
        Err(InferenceError::BootstrapError { .. })
    ));
}
