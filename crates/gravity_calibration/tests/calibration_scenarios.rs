//! End-to-end calibration scenarios: convergence, fallback, cancellation.

use approx::assert_relative_eq;
use gravity_calibration::seed::build_seed;
use gravity_calibration::{
    CalibrationInputs, CalibrationState, CalibrationStatus, CalibratorConfig, CancellationToken, GravityCalibrator,
};
use gravity_core::math::{
    estimate_jacobian, BandIndex, DeterrenceFunction, DeterrenceParameters, FurnessBalancer, FurnessConfig,
};
use gravity_core::types::{CostMatrix, TargetDistribution};
use proptest::prelude::*;

const PRODUCTIONS: [f64; 6] = [120.0, 80.0, 150.0, 60.0, 90.0, 100.0];
const ATTRACTIONS: [f64; 6] = [100.0, 100.0, 100.0, 100.0, 100.0, 100.0];

fn cost() -> CostMatrix {
    let n = 6;
    let data = (0..n * n)
        .map(|k| {
            let (i, j) = (k / n, k % n);
            1.0 + 2.0 * (i as f64 - j as f64).abs() + 0.5 * ((i + j) % 3) as f64
        })
        .collect();
    CostMatrix::new(n, data).unwrap()
}

fn bands() -> TargetDistribution {
    TargetDistribution::from_triples(&[
        (0.0, 2.0, 0.2),
        (2.0, 4.0, 0.2),
        (4.0, 6.0, 0.2),
        (6.0, 8.0, 0.2),
        (8.0, 12.0, 0.1),
        (12.0, f64::INFINITY, 0.1),
    ])
    .unwrap()
}

fn exponential(beta: f64) -> DeterrenceParameters {
    DeterrenceParameters::new(DeterrenceFunction::Exponential, vec![beta]).unwrap()
}

/// The distribution a gravity model with `params` produces, as a target.
fn synthetic_target(params: &DeterrenceParameters) -> TargetDistribution {
    let cost = cost();
    let bands = bands();
    let seed = build_seed(&PRODUCTIONS, &ATTRACTIONS, &cost, params);
    let balanced = FurnessBalancer::new(FurnessConfig::default())
        .balance(seed, &PRODUCTIONS, &ATTRACTIONS)
        .unwrap();
    let shares = BandIndex::build(&cost, &bands).unwrap().evaluate(&balanced.matrix).unwrap().shares;
    bands.with_shares(&shares).unwrap()
}

fn inputs<'a>(
    cost: &'a CostMatrix,
    target: &'a TargetDistribution,
    initial: &'a DeterrenceParameters,
) -> CalibrationInputs<'a> {
    CalibrationInputs {
        label: "test",
        productions: &PRODUCTIONS,
        attractions: &ATTRACTIONS,
        cost,
        target,
        initial,
        band_index: None,
    }
}

/// Band shares of the full seed-balance-evaluate pipeline at `params`.
fn pipeline_shares(params: &DeterrenceParameters) -> Result<Vec<f64>, gravity_core::types::ValidationError> {
    let cost = cost();
    let seed = build_seed(&PRODUCTIONS, &ATTRACTIONS, &cost, params);
    let balanced = FurnessBalancer::new(FurnessConfig::new(3000, 1e-10)).balance(seed, &PRODUCTIONS, &ATTRACTIONS)?;
    Ok(BandIndex::build(&cost, &bands())?.evaluate(&balanced.matrix)?.shares)
}

// ========================================
// Jacobian Direction
// ========================================

#[test]
fn test_steeper_deterrence_moves_trips_to_shortest_band() {
    let last = bands().len() - 1;
    for params in [
        exponential(0.3),
        DeterrenceParameters::new(DeterrenceFunction::Power, vec![1.0]).unwrap(),
    ] {
        let jacobian = estimate_jacobian(&params, pipeline_shares, 1e-4).unwrap();
        let column = jacobian.column(0);

        assert!(column[0] > 0.0, "{}: d(short share) = {}", params, column[0]);
        assert!(column[last] < 0.0, "{}: d(long share) = {}", params, column[last]);
        assert!(column.iter().sum::<f64>().abs() < 1e-6);
    }
}

// ========================================
// Convergence
// ========================================

#[test]
fn test_target_equal_to_initial_run_converges_immediately() {
    let initial = exponential(0.2);
    let (cost, target) = (cost(), synthetic_target(&initial));
    let result = GravityCalibrator::default().calibrate(&inputs(&cost, &target, &initial)).unwrap();

    assert_eq!(result.status(), CalibrationStatus::Converged);
    assert_eq!(result.iterations(), 0);
    assert_eq!(result.evaluations(), 1);
    assert!(!result.used_fallback());
    assert_eq!(
        result.state_trace(),
        &[
            CalibrationState::Initialized,
            CalibrationState::Seeding,
            CalibrationState::Balancing,
            CalibrationState::Evaluating,
            CalibrationState::Converged,
        ]
    );
    assert_eq!(result.parameters(), &initial);
}

#[test]
fn test_recovers_known_exponential_parameter() {
    let truth = exponential(0.3);
    let start = exponential(0.1);
    let (cost, target) = (cost(), synthetic_target(&truth));
    let result = GravityCalibrator::default().calibrate(&inputs(&cost, &target, &start)).unwrap();

    assert!(result.is_converged());
    assert!(result.iterations() > 0);
    assert!(result.residual_error() <= 1e-6);
    assert!((result.parameters().values()[0] - 0.3).abs() < 0.05);
    for (row, p) in result.matrix().row_sums().iter().zip(&PRODUCTIONS) {
        assert_relative_eq!(row, p, epsilon = 1e-3);
    }
}

#[test]
fn test_r_squared_criterion_accepts_first_evaluation() {
    let (cost, target, initial) = (cost(), bands(), exponential(0.1));
    let config = CalibratorConfig {
        tolerance: 1e-12,
        target_r_squared: Some(0.0),
        ..Default::default()
    };
    let result = GravityCalibrator::new(config).calibrate(&inputs(&cost, &target, &initial)).unwrap();
    assert!(result.is_converged());
    assert_eq!(result.iterations(), 0);
    assert!(result.r_squared() >= 0.0);
}

#[test]
fn test_shared_band_index_matches_owned() {
    let (cost, target, initial) = (cost(), synthetic_target(&exponential(0.25)), exponential(0.15));
    let index = BandIndex::build(&cost, &target).unwrap();
    let calibrator = GravityCalibrator::default();

    let owned = calibrator.calibrate(&inputs(&cost, &target, &initial)).unwrap();
    let shared = calibrator
        .calibrate(&inputs(&cost, &target, &initial).with_band_index(&index))
        .unwrap();
    assert_eq!(owned, shared);
}

// ========================================
// Fallback and Failure
// ========================================

#[test]
fn test_zero_budget_retries_once_then_fails() {
    let (cost, initial) = (cost(), exponential(0.1));
    let target = TargetDistribution::from_triples(&[(0.0, 2.0, 0.0), (2.0, 100.0, 1.0)]).unwrap();
    let config = CalibratorConfig {
        max_iterations: 0,
        ..Default::default()
    };
    let result = GravityCalibrator::new(config).calibrate(&inputs(&cost, &target, &initial)).unwrap();

    assert_eq!(result.status(), CalibrationStatus::Failed);
    assert_eq!(result.visits(CalibrationState::FallbackRetry), 1);
    assert_eq!(result.visits(CalibrationState::Failed), 1);
    assert_eq!(result.visits(CalibrationState::Converged), 0);
    assert_eq!(result.iterations(), 0);
    assert_eq!(result.evaluations(), 2);
    assert!(result.used_fallback());
    assert!(!result.cancelled());

    // Best effort: the matrix is still balanced to the trip ends.
    for (row, p) in result.matrix().row_sums().iter().zip(&PRODUCTIONS) {
        assert_relative_eq!(row, p, epsilon = 1e-3);
    }
}

#[test]
fn test_fallback_parameters_can_rescue() {
    let truth = exponential(0.3);
    let (cost, target) = (cost(), synthetic_target(&truth));
    let config = CalibratorConfig {
        max_iterations: 0,
        fallback_parameters: Some(truth.clone()),
        ..Default::default()
    };
    let result = GravityCalibrator::new(config)
        .calibrate(&inputs(&cost, &target, &exponential(0.05)))
        .unwrap();

    assert!(result.is_converged());
    assert!(result.used_fallback());
    assert_eq!(result.visits(CalibrationState::FallbackRetry), 1);
    assert_eq!(result.parameters(), &truth);
}

#[test]
fn test_failed_result_is_best_seen() {
    let (cost, initial) = (cost(), exponential(0.3));
    let target = synthetic_target(&exponential(0.4));
    // The fallback restarts from the family default (0.1), which is further off.
    let config = CalibratorConfig {
        max_iterations: 0,
        ..Default::default()
    };
    let result = GravityCalibrator::new(config).calibrate(&inputs(&cost, &target, &initial)).unwrap();

    assert_eq!(result.status(), CalibrationStatus::Failed);
    assert!(result.used_fallback());
    assert_eq!(result.parameters(), &initial);
}

// ========================================
// Cancellation
// ========================================

#[test]
fn test_cancelled_before_start_stops_after_first_evaluation() {
    let (cost, target, initial) = (cost(), synthetic_target(&exponential(0.3)), exponential(0.1));
    let token = CancellationToken::new();
    token.cancel();

    let result = GravityCalibrator::default()
        .calibrate_with_cancel(&inputs(&cost, &target, &initial), &token)
        .unwrap();

    assert!(result.cancelled());
    assert_eq!(result.status(), CalibrationStatus::Failed);
    assert_eq!(result.visits(CalibrationState::Evaluating), 1);
    assert_eq!(result.state_trace().last(), Some(&CalibrationState::Failed));
}

// ========================================
// Properties
// ========================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_result_matrix_honours_trip_ends(
        productions in prop::collection::vec(1.0f64..500.0, 6),
        beta in 0.05f64..1.0,
    ) {
        let cost = cost();
        let target = bands();
        let initial = exponential(beta);
        let attractions: Vec<f64> = productions.iter().rev().copied().collect();
        let config = CalibratorConfig { max_iterations: 3, ..Default::default() };
        let result = GravityCalibrator::new(config)
            .calibrate(&CalibrationInputs {
                label: "prop",
                productions: &productions,
                attractions: &attractions,
                cost: &cost,
                target: &target,
                initial: &initial,
                band_index: None,
            })
            .unwrap();

        prop_assert!(result.state_trace().last().unwrap().is_terminal());
        prop_assert!(result.visits(CalibrationState::FallbackRetry) <= 1);
        prop_assert!(result.matrix().as_slice().iter().all(|v| v.is_finite() && *v >= 0.0));
        if result.furness_converged() {
            let total: f64 = productions.iter().sum();
            prop_assert!((result.matrix().total() - total).abs() <= 1e-3 * total);
        }
    }
}
