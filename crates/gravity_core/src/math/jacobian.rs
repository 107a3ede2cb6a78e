//! Finite-difference Jacobian of band shares with respect to deterrence
//! parameters.
//!
//! Each column costs one full seed → balance → evaluate run, so the
//! estimator takes the evaluation as a closure and never looks inside it.
//! The [`PerturbationPattern`] depends only on the parameter vector and the
//! step size, so the same pattern applies to every area.

use crate::math::deterrence::DeterrenceParameters;
use crate::types::ValidationError;

/// Per-parameter step sizes for a forward-difference Jacobian.
///
/// Step `j` is `step_size * max(|p_j|, 1)`. When the forward step would
/// leave the parameter domain the step is taken backwards instead.
#[derive(Debug, Clone, PartialEq)]
pub struct PerturbationPattern {
    steps: Vec<f64>,
}

impl PerturbationPattern {
    /// Builds the pattern for `params`.
    pub fn new(params: &DeterrenceParameters, step_size: f64) -> Self {
        let bounds = params.function().bounds();
        let steps = params
            .values()
            .iter()
            .zip(bounds)
            .map(|(&p, b)| {
                let h = step_size * p.abs().max(1.0);
                if p + h > b.max {
                    -h
                } else {
                    h
                }
            })
            .collect();
        Self { steps }
    }

    /// Signed step per parameter.
    #[inline]
    pub fn steps(&self) -> &[f64] {
        &self.steps
    }

    /// Number of parameters perturbed.
    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if there is nothing to perturb.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// `params` with parameter `j` moved by its step, kept in the domain.
    pub fn perturbed(&self, params: &DeterrenceParameters, j: usize) -> DeterrenceParameters {
        let mut values = params.values().to_vec();
        values[j] += self.steps[j];
        DeterrenceParameters::clamped(params.function(), values)
    }
}

/// Dense `bands × parameters` derivative matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Jacobian {
    /// Creates a zero Jacobian.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Number of residuals (bands).
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of parameters.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `∂share_i / ∂param_j`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    /// Column `j`: the effect of parameter `j` on every band share.
    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.rows).map(|i| self.get(i, j)).collect()
    }
}

/// Estimates `∂shares/∂params` by forward finite differences.
///
/// `evaluate_fn` maps a parameter set to achieved band shares. It is called
/// once at `params` and once per parameter.
///
/// # Examples
///
/// ```
/// use gravity_core::math::deterrence::{DeterrenceFunction, DeterrenceParameters};
/// use gravity_core::math::jacobian::estimate_jacobian;
/// use gravity_core::types::ValidationError;
///
/// let params = DeterrenceParameters::new(DeterrenceFunction::Exponential, vec![0.5]).unwrap();
/// let jac = estimate_jacobian(
///     &params,
///     |p| Ok::<_, ValidationError>(vec![2.0 * p.values()[0], 1.0 - 2.0 * p.values()[0]]),
///     1e-6,
/// )
/// .unwrap();
/// assert!((jac.get(0, 0) - 2.0).abs() < 1e-6);
/// assert!((jac.get(1, 0) + 2.0).abs() < 1e-6);
/// ```
pub fn estimate_jacobian<E, F>(params: &DeterrenceParameters, mut evaluate_fn: F, step_size: f64) -> Result<Jacobian, E>
where
    E: From<ValidationError>,
    F: FnMut(&DeterrenceParameters) -> Result<Vec<f64>, E>,
{
    let base = evaluate_fn(params)?;
    let pattern = PerturbationPattern::new(params, step_size);
    estimate_jacobian_with_base(&pattern, params, &base, evaluate_fn)
}

/// Estimates the Jacobian reusing shares already evaluated at `params`.
pub fn estimate_jacobian_with_base<E, F>(
    pattern: &PerturbationPattern,
    params: &DeterrenceParameters,
    base: &[f64],
    mut evaluate_fn: F,
) -> Result<Jacobian, E>
where
    E: From<ValidationError>,
    F: FnMut(&DeterrenceParameters) -> Result<Vec<f64>, E>,
{
    if pattern.len() != params.values().len() {
        return Err(ValidationError::shape_mismatch("perturbation pattern", params.values().len(), pattern.len()).into());
    }
    let mut jacobian = Jacobian::zeros(base.len(), pattern.len());
    for j in 0..pattern.len() {
        let moved = pattern.perturbed(params, j);
        let h = moved.values()[j] - params.values()[j];
        if h == 0.0 {
            continue;
        }
        let shares = evaluate_fn(&moved)?;
        if shares.len() != base.len() {
            return Err(ValidationError::shape_mismatch("perturbed shares", base.len(), shares.len()).into());
        }
        for (i, (s, b)) in shares.iter().zip(base).enumerate() {
            jacobian.set(i, j, (s - b) / h);
        }
    }
    Ok(jacobian)
}
