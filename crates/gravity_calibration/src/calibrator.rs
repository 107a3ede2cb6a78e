//! Single-area gravity calibrator.
//!
//! [`GravityCalibrator`] adjusts deterrence parameters until the trip-length
//! distribution of the balanced gravity matrix matches an observed target.
//! The run is an explicit state machine (see [`CalibrationState`]):
//!
//! 1. SEEDING builds `P_i * A_j * f(c_ij)`
//! 2. BALANCING Furness-balances the seed to the trip ends
//! 3. EVALUATING bands the matrix and scores it against the target
//! 4. ITERATING proposes a damped Gauss-Newton update and loops back
//!
//! An exhausted iteration budget triggers exactly one FALLBACK_RETRY from
//! the fallback parameters; a second exhaustion ends in FAILED with the best
//! result seen in either attempt. Non-convergence is reported on the result,
//! never returned as an error.

use crate::cancel::CancellationToken;
use crate::result::{CalibrationResult, CalibrationStatus};
use crate::seed::build_seed;
use crate::state::CalibrationState;
use gravity_core::config::DistributionConfig;
use gravity_core::math::jacobian::estimate_jacobian_with_base;
use gravity_core::math::{
    damped_gauss_newton_step, r_squared, squared_share_error, AchievedDistribution, BandIndex, DeterrenceParameters,
    FurnessBalancer, FurnessConfig, Jacobian, PerturbationPattern,
};
use gravity_core::types::{AreaPartition, CostMatrix, OdMatrix, TargetDistribution, ValidationError};
use std::borrow::Cow;
use tracing::{debug, info, warn};

/// Damping bounds for the accept/reject schedule.
const MIN_DAMPING: f64 = 1e-10;
const MAX_DAMPING: f64 = 1e10;

/// Configuration for [`GravityCalibrator`].
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratorConfig {
    /// Settings for every Furness balance.
    pub furness: FurnessConfig,
    /// Parameter updates allowed per attempt.
    pub max_iterations: usize,
    /// Sum of squared share differences accepted as converged.
    pub tolerance: f64,
    /// Relative forward-difference step.
    pub jacobian_step_size: f64,
    /// Restart point for the fallback attempt.
    pub fallback_parameters: Option<DeterrenceParameters>,
    /// Alternative convergence criterion on R².
    pub target_r_squared: Option<f64>,
    /// Replace the first guess with moment estimates from the target.
    pub estimate_initial_parameters: bool,
    /// Scale attractions to the production total before balancing.
    pub rebalance_trip_ends: bool,
    /// Starting damping.
    pub initial_damping: f64,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self::from(&DistributionConfig::default())
    }
}

impl From<&DistributionConfig> for CalibratorConfig {
    fn from(config: &DistributionConfig) -> Self {
        Self {
            furness: config.furness_config(),
            max_iterations: config.max_calibration_iterations,
            tolerance: config.calibration_tolerance,
            jacobian_step_size: config.jacobian_step_size,
            fallback_parameters: config.fallback_parameters.clone(),
            target_r_squared: config.target_r_squared,
            estimate_initial_parameters: config.estimate_initial_parameters,
            rebalance_trip_ends: config.rebalance_trip_ends,
            initial_damping: config.initial_damping,
        }
    }
}

impl CalibratorConfig {
    /// Restart parameters for an area calibrated with `initial`'s family.
    ///
    /// Configured fallback parameters apply only to the same family; other
    /// families restart from their documented defaults.
    pub fn fallback_for(&self, initial: &DeterrenceParameters) -> DeterrenceParameters {
        match &self.fallback_parameters {
            Some(p) if p.function() == initial.function() => p.clone(),
            _ => DeterrenceParameters::defaults(initial.function()),
        }
    }
}

/// Borrowed inputs for one calibration.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationInputs<'a> {
    /// Name used in log events.
    pub label: &'a str,
    /// Row marginals.
    pub productions: &'a [f64],
    /// Column marginals.
    pub attractions: &'a [f64],
    /// Zone-to-zone costs, possibly a shared view.
    pub cost: &'a CostMatrix,
    /// Observed trip-length distribution.
    pub target: &'a TargetDistribution,
    /// First-guess parameters; also selects the function family.
    pub initial: &'a DeterrenceParameters,
    /// Precomputed band membership of `cost`; built on demand if absent.
    pub band_index: Option<&'a BandIndex>,
}

impl<'a> CalibrationInputs<'a> {
    /// Inputs taken from an area partition.
    pub fn from_area(area: &'a AreaPartition) -> Self {
        Self {
            label: area.id().as_str(),
            productions: area.productions().values(),
            attractions: area.attractions().values(),
            cost: area.cost(),
            target: area.target(),
            initial: area.initial_parameters(),
            band_index: None,
        }
    }

    /// Uses a shared, precomputed band index.
    pub fn with_band_index(mut self, index: &'a BandIndex) -> Self {
        self.band_index = Some(index);
        self
    }
}

/// One full seed → balance → evaluate run.
#[derive(Debug, Clone)]
struct Evaluation {
    parameters: DeterrenceParameters,
    matrix: OdMatrix,
    achieved: AchievedDistribution,
    error: f64,
    r_squared: f64,
    furness_converged: bool,
}

/// The read-only pipeline shared by the state machine and the Jacobian.
struct Pipeline<'a> {
    balancer: FurnessBalancer,
    productions: &'a [f64],
    attractions: Cow<'a, [f64]>,
    cost: &'a CostMatrix,
    index: Cow<'a, BandIndex>,
    target_shares: Vec<f64>,
}

impl Pipeline<'_> {
    fn seed(&self, params: &DeterrenceParameters) -> OdMatrix {
        build_seed(self.productions, &self.attractions, self.cost, params)
    }

    fn shares(&self, params: &DeterrenceParameters) -> Result<Vec<f64>, ValidationError> {
        let balanced = self.balancer.balance(self.seed(params), self.productions, &self.attractions)?;
        Ok(self.index.evaluate(&balanced.matrix)?.shares)
    }
}

/// Calibrates one area's deterrence parameters.
///
/// # Examples
///
/// ```
/// use gravity_calibration::{CalibrationInputs, CalibratorConfig, GravityCalibrator};
/// use gravity_core::math::{DeterrenceFunction, DeterrenceParameters};
/// use gravity_core::types::{CostMatrix, TargetDistribution};
///
/// let cost = CostMatrix::from_rows(&[
///     vec![1.0, 4.0, 8.0],
///     vec![4.0, 1.0, 6.0],
///     vec![8.0, 6.0, 1.0],
/// ]).unwrap();
/// let target = TargetDistribution::from_triples(&[(0.0, 3.0, 0.6), (3.0, 7.0, 0.3), (7.0, 10.0, 0.1)]).unwrap();
/// let initial = DeterrenceParameters::new(DeterrenceFunction::Exponential, vec![0.1]).unwrap();
///
/// let inputs = CalibrationInputs {
///     label: "demo",
///     productions: &[100.0, 80.0, 60.0],
///     attractions: &[90.0, 90.0, 60.0],
///     cost: &cost,
///     target: &target,
///     initial: &initial,
///     band_index: None,
/// };
///
/// let result = GravityCalibrator::new(CalibratorConfig::default()).calibrate(&inputs).unwrap();
/// assert!(result.residual_error() < 0.05);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GravityCalibrator {
    config: CalibratorConfig,
}

impl GravityCalibrator {
    /// Create a calibrator with the given configuration.
    pub fn new(config: CalibratorConfig) -> Self {
        Self { config }
    }

    /// Get the calibrator configuration.
    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    /// Calibrates without cancellation.
    pub fn calibrate(&self, inputs: &CalibrationInputs<'_>) -> Result<CalibrationResult, ValidationError> {
        self.calibrate_with_cancel(inputs, &CancellationToken::new())
    }

    /// Calibrates, stopping early with a FAILED result once `cancel` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for malformed inputs, before any
    /// iteration. Convergence failure is reported on the result.
    pub fn calibrate_with_cancel(
        &self,
        inputs: &CalibrationInputs<'_>,
        cancel: &CancellationToken,
    ) -> Result<CalibrationResult, ValidationError> {
        let label = inputs.label;
        let mut trace = vec![CalibrationState::Initialized];
        debug!(area = label, state = %CalibrationState::Initialized, "calibration state");
        let pipeline = self.prepare(inputs)?;

        let initial = if self.config.estimate_initial_parameters {
            let estimated = inputs.initial.function().estimate_parameters(inputs.target);
            debug!(area = label, parameters = %estimated, "estimated initial parameters");
            estimated
        } else {
            inputs.initial.clone()
        };

        let mut state = CalibrationState::Seeding;
        let mut candidate = initial;
        let mut used_fallback = false;
        let mut cancelled = false;
        let mut attempt_iterations = 0;
        let mut iterations = 0;
        let mut evaluations = 0;
        let mut overflow_clips = 0;
        let mut damping = self.config.initial_damping;
        let mut current: Option<Evaluation> = None;
        let mut best: Option<Evaluation> = None;
        let mut jacobian: Option<(Vec<f64>, Jacobian)> = None;
        let mut seed = None;
        let mut balanced = None;

        loop {
            trace.push(state);
            debug!(area = label, state = %state, "calibration state");
            state = match state {
                CalibrationState::Seeding => {
                    if best.is_some() && cancel.is_cancelled() {
                        cancelled = true;
                        CalibrationState::Failed
                    } else {
                        seed = Some(pipeline.seed(&candidate));
                        CalibrationState::Balancing
                    }
                }
                CalibrationState::Balancing => {
                    let matrix = seed.take().unwrap_or_else(|| pipeline.seed(&candidate));
                    let result = pipeline.balancer.balance(matrix, pipeline.productions, &pipeline.attractions)?;
                    overflow_clips += result.diagnostics.overflow_clips;
                    balanced = Some(result);
                    CalibrationState::Evaluating
                }
                CalibrationState::Evaluating => {
                    let Some(result) = balanced.take() else {
                        // Only reachable through Balancing
                        return Err(ValidationError::empty_input("balanced matrix"));
                    };
                    let achieved = pipeline.index.evaluate(&result.matrix)?;
                    evaluations += 1;
                    let error = squared_share_error(&achieved.shares, &pipeline.target_shares);
                    let evaluation = Evaluation {
                        parameters: candidate.clone(),
                        r_squared: r_squared(&achieved.shares, &pipeline.target_shares),
                        matrix: result.matrix,
                        achieved,
                        error,
                        furness_converged: result.converged,
                    };
                    debug!(area = label, parameters = %evaluation.parameters, error, "evaluated");

                    if best.as_ref().map_or(true, |b| evaluation.error < b.error) {
                        best = Some(evaluation.clone());
                    }
                    match current.as_ref().map(|c| evaluation.error < c.error) {
                        Some(false) => damping = (damping * 10.0).min(MAX_DAMPING),
                        Some(true) => {
                            damping = (damping * 0.1).max(MIN_DAMPING);
                            current = Some(evaluation);
                        }
                        None => current = Some(evaluation),
                    }

                    let accepted = current.as_ref().map_or(false, |c| self.is_converged(c));
                    if accepted {
                        CalibrationState::Converged
                    } else if attempt_iterations >= self.config.max_iterations {
                        self.exhausted(label, used_fallback)
                    } else {
                        CalibrationState::Iterating
                    }
                }
                CalibrationState::Iterating => {
                    iterations += 1;
                    attempt_iterations += 1;
                    let Some(at) = current.as_ref() else {
                        return Err(ValidationError::empty_input("current evaluation"));
                    };
                    let cached = matches!(&jacobian, Some((values, _)) if values.as_slice() == at.parameters.values());
                    if !cached {
                        let pattern = PerturbationPattern::new(&at.parameters, self.config.jacobian_step_size);
                        let estimated = estimate_jacobian_with_base(&pattern, &at.parameters, &at.achieved.shares, |p| {
                            evaluations += 1;
                            pipeline.shares(p)
                        })?;
                        jacobian = Some((at.parameters.values().to_vec(), estimated));
                    }
                    let residuals: Vec<f64> =
                        at.achieved.shares.iter().zip(&pipeline.target_shares).map(|(a, t)| a - t).collect();

                    let proposal = jacobian
                        .as_ref()
                        .map(|(_, j)| damped_gauss_newton_step(j, &residuals, damping));
                    match proposal {
                        Some(Ok(step)) => {
                            let values = at.parameters.values().iter().zip(&step).map(|(p, d)| p + d).collect();
                            let next = DeterrenceParameters::clamped(at.parameters.function(), values);
                            if next.values() == at.parameters.values() {
                                debug!(area = label, "parameter update stalled");
                                self.exhausted(label, used_fallback)
                            } else {
                                candidate = next;
                                CalibrationState::Seeding
                            }
                        }
                        _ => {
                            damping = (damping * 10.0).min(MAX_DAMPING);
                            if damping >= MAX_DAMPING || attempt_iterations >= self.config.max_iterations {
                                self.exhausted(label, used_fallback)
                            } else {
                                CalibrationState::Iterating
                            }
                        }
                    }
                }
                CalibrationState::FallbackRetry => {
                    used_fallback = true;
                    attempt_iterations = 0;
                    damping = self.config.initial_damping;
                    current = None;
                    jacobian = None;
                    candidate = self.config.fallback_for(inputs.initial);
                    CalibrationState::Seeding
                }
                CalibrationState::Converged | CalibrationState::Failed | CalibrationState::Initialized => break,
            };
        }

        let status = if state == CalibrationState::Converged {
            CalibrationStatus::Converged
        } else {
            CalibrationStatus::Failed
        };
        let chosen = match status {
            CalibrationStatus::Converged => current,
            CalibrationStatus::Failed => best,
        };
        let Some(chosen) = chosen else {
            return Err(ValidationError::empty_input("no evaluation completed"));
        };

        match status {
            CalibrationStatus::Converged => info!(
                area = label,
                parameters = %chosen.parameters,
                error = chosen.error,
                iterations,
                used_fallback,
                "calibration converged"
            ),
            CalibrationStatus::Failed => warn!(
                area = label,
                parameters = %chosen.parameters,
                error = chosen.error,
                iterations,
                cancelled,
                "calibration failed; returning best result"
            ),
        }

        Ok(CalibrationResult {
            parameters: chosen.parameters,
            matrix: chosen.matrix,
            achieved: chosen.achieved,
            target_shares: pipeline.target_shares,
            target_mean_cost: inputs.target.mean_cost(),
            status,
            iterations,
            evaluations,
            residual_error: chosen.error,
            r_squared: chosen.r_squared,
            used_fallback,
            cancelled,
            furness_converged: chosen.furness_converged,
            overflow_clips,
            state_trace: trace,
        })
    }

    fn is_converged(&self, evaluation: &Evaluation) -> bool {
        evaluation.error <= self.config.tolerance
            || self.config.target_r_squared.is_some_and(|r2| evaluation.r_squared >= r2)
    }

    fn exhausted(&self, label: &str, used_fallback: bool) -> CalibrationState {
        if used_fallback {
            CalibrationState::Failed
        } else {
            warn!(area = label, "calibration budget exhausted; retrying from fallback parameters");
            CalibrationState::FallbackRetry
        }
    }

    /// INITIALIZED: validates inputs and assembles the evaluation pipeline.
    fn prepare<'a>(&self, inputs: &CalibrationInputs<'a>) -> Result<Pipeline<'a>, ValidationError> {
        let n = inputs.cost.n_zones();
        if inputs.productions.len() != n {
            return Err(ValidationError::shape_mismatch("productions", n, inputs.productions.len()));
        }
        if inputs.attractions.len() != n {
            return Err(ValidationError::shape_mismatch("attractions", n, inputs.attractions.len()));
        }
        for (what, values) in [("production", inputs.productions), ("attraction", inputs.attractions)] {
            for (index, &value) in values.iter().enumerate() {
                if !value.is_finite() {
                    return Err(ValidationError::NonFiniteValue { what, index });
                }
                if value < 0.0 {
                    return Err(ValidationError::NegativeValue { what, index, value });
                }
            }
        }
        inputs.initial.with_values(inputs.initial.values().to_vec())?;

        let p_total: f64 = inputs.productions.iter().sum();
        let a_total: f64 = inputs.attractions.iter().sum();
        if p_total <= 0.0 || a_total <= 0.0 {
            return Err(ValidationError::empty_input(format!(
                "area {}: no trips to distribute (productions {}, attractions {})",
                inputs.label, p_total, a_total
            )));
        }
        let allowed = self.config.furness.tolerance.max(1e-9 * p_total.max(a_total));
        if !self.config.rebalance_trip_ends && (p_total - a_total).abs() > allowed {
            return Err(ValidationError::MarginalMismatch {
                row_total: p_total,
                col_total: a_total,
            });
        }
        let attractions = if self.config.rebalance_trip_ends && p_total != a_total {
            debug!(
                area = inputs.label,
                productions = p_total,
                attractions = a_total,
                "rebalancing attractions to production total"
            );
            let factor = p_total / a_total;
            Cow::Owned(inputs.attractions.iter().map(|a| a * factor).collect())
        } else {
            Cow::Borrowed(inputs.attractions)
        };

        let index = match inputs.band_index {
            Some(index) => {
                if index.n_zones() != n || index.n_bands() != inputs.target.len() {
                    return Err(ValidationError::inconsistent(
                        "band index",
                        format!("{} zones x {} bands", n, inputs.target.len()),
                        format!("{} zones x {} bands", index.n_zones(), index.n_bands()),
                    ));
                }
                Cow::Borrowed(index)
            }
            None => Cow::Owned(BandIndex::build(inputs.cost, inputs.target)?),
        };

        Ok(Pipeline {
            balancer: FurnessBalancer::new(self.config.furness),
            productions: inputs.productions,
            attractions,
            cost: inputs.cost,
            index,
            target_shares: inputs.target.shares(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gravity_core::math::DeterrenceFunction;

    fn cost() -> CostMatrix {
        CostMatrix::from_rows(&[vec![1.0, 4.0, 8.0], vec![4.0, 1.0, 6.0], vec![8.0, 6.0, 1.0]]).unwrap()
    }

    fn target() -> TargetDistribution {
        TargetDistribution::from_triples(&[(0.0, 3.0, 0.5), (3.0, 7.0, 0.35), (7.0, 10.0, 0.15)]).unwrap()
    }

    // ========================================
    // Configuration Tests
    // ========================================

    #[test]
    fn test_config_from_distribution_config() {
        let config = CalibratorConfig::from(&DistributionConfig {
            max_calibration_iterations: 7,
            target_r_squared: Some(0.9),
            ..Default::default()
        });
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.target_r_squared, Some(0.9));
        assert_eq!(config.furness.max_iterations, 3000);
    }

    #[test]
    fn test_fallback_for_matching_family() {
        let config = CalibratorConfig {
            fallback_parameters: Some(DeterrenceParameters::new(DeterrenceFunction::Power, vec![2.0]).unwrap()),
            ..Default::default()
        };
        let power = DeterrenceParameters::defaults(DeterrenceFunction::Power);
        let exponential = DeterrenceParameters::defaults(DeterrenceFunction::Exponential);
        assert_eq!(config.fallback_for(&power).values(), &[2.0]);
        assert_eq!(config.fallback_for(&exponential).values(), &[0.1]);
    }

    // ========================================
    // Validation Tests
    // ========================================

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let (cost, target, initial) = (cost(), target(), DeterrenceParameters::default());
        let inputs = CalibrationInputs {
            label: "a",
            productions: &[1.0, 2.0],
            attractions: &[1.0, 1.0, 1.0],
            cost: &cost,
            target: &target,
            initial: &initial,
            band_index: None,
        };
        let err = GravityCalibrator::default().calibrate(&inputs).unwrap_err();
        assert_eq!(err, ValidationError::shape_mismatch("productions", 3, 2));
    }

    #[test]
    fn test_zero_trips_is_fatal() {
        let (cost, target, initial) = (cost(), target(), DeterrenceParameters::default());
        let inputs = CalibrationInputs {
            label: "a",
            productions: &[0.0; 3],
            attractions: &[0.0; 3],
            cost: &cost,
            target: &target,
            initial: &initial,
            band_index: None,
        };
        assert!(matches!(
            GravityCalibrator::default().calibrate(&inputs),
            Err(ValidationError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_unbalanced_trip_ends_without_rebalancing_fail_validation() {
        let (cost, target, initial) = (cost(), target(), DeterrenceParameters::default());
        let inputs = CalibrationInputs {
            label: "a",
            productions: &[10.0, 10.0, 10.0],
            attractions: &[5.0, 5.0, 5.0],
            cost: &cost,
            target: &target,
            initial: &initial,
            band_index: None,
        };
        let calibrator = GravityCalibrator::new(CalibratorConfig {
            rebalance_trip_ends: false,
            ..Default::default()
        });
        assert!(matches!(calibrator.prepare(&inputs), Err(ref e) if e.is_marginal_mismatch()));
        let err = calibrator.calibrate(&inputs).unwrap_err();
        assert!(err.is_marginal_mismatch());

        let rebalanced = GravityCalibrator::default().calibrate(&inputs).unwrap();
        assert!((rebalanced.matrix().total() - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_band_index_rejected() {
        let (cost, target, initial) = (cost(), target(), DeterrenceParameters::default());
        let other = TargetDistribution::from_triples(&[(0.0, 5.0, 1.0)]).unwrap();
        let index = BandIndex::build(&cost, &other).unwrap();
        let inputs = CalibrationInputs {
            label: "a",
            productions: &[1.0, 1.0, 1.0],
            attractions: &[1.0, 1.0, 1.0],
            cost: &cost,
            target: &target,
            initial: &initial,
            band_index: Some(&index),
        };
        assert!(matches!(
            GravityCalibrator::default().calibrate(&inputs),
            Err(ValidationError::Inconsistent { what: "band index", .. })
        ));
    }
}
