//! Cost deterrence functions.
//!
//! A deterrence function turns a travel cost into a non-negative weight;
//! the gravity seed is `P_i * A_j * f(c_ij)`. The function family is a
//! closed enum, and each family has a fixed, named parameter vector:
//!
//! | Family | Parameters | `f(c)` |
//! |---|---|---|
//! | `LogNormal` | `sigma`, `mu` | `exp(-(ln c - mu)^2 / (2 sigma^2)) / (c sigma sqrt(2 pi))` |
//! | `Tanner` | `alpha`, `beta` | `c^alpha * exp(beta c)` |
//! | `Power` | `alpha` | `c^-alpha` |
//! | `Exponential` | `beta` | `exp(-beta c)` |
//!
//! Costs are floored at [`COST_FLOOR`] before evaluation so zero intrazonal
//! costs give finite weights.

use crate::types::{TargetDistribution, ValidationError};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Smallest cost passed to a deterrence function.
pub const COST_FLOOR: f64 = 1e-6;

/// Valid range of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterBounds {
    /// Minimum allowed value.
    pub min: f64,
    /// Maximum allowed value.
    pub max: f64,
}

impl ParameterBounds {
    /// Create new bounds.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Check if a value is within bounds.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clamp a value to bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Deterrence function family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeterrenceFunction {
    /// Log-normal density in cost.
    #[default]
    LogNormal,
    /// Combined power and exponential decay.
    Tanner,
    /// Power-law decay.
    Power,
    /// Exponential decay.
    Exponential,
}

const LOG_NORMAL_BOUNDS: [ParameterBounds; 2] = [ParameterBounds::new(0.05, 10.0), ParameterBounds::new(-5.0, 10.0)];
const TANNER_BOUNDS: [ParameterBounds; 2] = [ParameterBounds::new(-5.0, 5.0), ParameterBounds::new(-5.0, 0.0)];
const POWER_BOUNDS: [ParameterBounds; 1] = [ParameterBounds::new(0.0, 10.0)];
const EXPONENTIAL_BOUNDS: [ParameterBounds; 1] = [ParameterBounds::new(0.0, 10.0)];

impl DeterrenceFunction {
    /// All families.
    pub const ALL: [DeterrenceFunction; 4] = [
        DeterrenceFunction::LogNormal,
        DeterrenceFunction::Tanner,
        DeterrenceFunction::Power,
        DeterrenceFunction::Exponential,
    ];

    /// Parameter names, in vector order.
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            DeterrenceFunction::LogNormal => &["sigma", "mu"],
            DeterrenceFunction::Tanner => &["alpha", "beta"],
            DeterrenceFunction::Power => &["alpha"],
            DeterrenceFunction::Exponential => &["beta"],
        }
    }

    /// Number of parameters.
    #[inline]
    pub fn n_parameters(self) -> usize {
        self.parameter_names().len()
    }

    /// Valid domain of each parameter.
    pub fn bounds(self) -> &'static [ParameterBounds] {
        match self {
            DeterrenceFunction::LogNormal => &LOG_NORMAL_BOUNDS,
            DeterrenceFunction::Tanner => &TANNER_BOUNDS,
            DeterrenceFunction::Power => &POWER_BOUNDS,
            DeterrenceFunction::Exponential => &EXPONENTIAL_BOUNDS,
        }
    }

    /// Documented default parameters, used as the fallback restart point.
    pub fn default_values(self) -> Vec<f64> {
        match self {
            DeterrenceFunction::LogNormal => vec![1.0, 2.0],
            DeterrenceFunction::Tanner => vec![1.0, -0.1],
            DeterrenceFunction::Power => vec![1.0],
            DeterrenceFunction::Exponential => vec![0.1],
        }
    }

    /// Deterrence weight of `cost`. `values` must have [`Self::n_parameters`]
    /// entries.
    #[inline]
    pub fn weight(self, cost: f64, values: &[f64]) -> f64 {
        let c = cost.max(COST_FLOOR);
        match self {
            DeterrenceFunction::LogNormal => {
                let (sigma, mu) = (values[0], values[1]);
                let z = (c.ln() - mu) / sigma;
                (-0.5 * z * z).exp() / (c * sigma * (2.0 * PI).sqrt())
            }
            DeterrenceFunction::Tanner => c.powf(values[0]) * (values[1] * c).exp(),
            DeterrenceFunction::Power => c.powf(-values[0]),
            DeterrenceFunction::Exponential => (-values[0] * c).exp(),
        }
    }

    /// Moment-based first guess from an observed distribution, clamped to
    /// the parameter domain.
    ///
    /// Uses band midpoints as representative costs. Falls back to the family
    /// defaults where the distribution carries too little information.
    pub fn estimate_parameters(self, target: &TargetDistribution) -> DeterrenceParameters {
        let points: Vec<(f64, f64)> = target
            .bands()
            .iter()
            .filter(|b| b.share > 0.0)
            .map(|b| (b.midpoint().max(COST_FLOOR), b.share))
            .collect();
        let weight: f64 = points.iter().map(|(_, s)| s).sum();
        if points.is_empty() || weight <= 0.0 {
            return DeterrenceParameters::defaults(self);
        }
        let mean = points.iter().map(|(m, s)| m * s).sum::<f64>() / weight;
        let var = points.iter().map(|(m, s)| s * (m - mean) * (m - mean)).sum::<f64>() / weight;

        let values = match self {
            DeterrenceFunction::LogNormal => {
                let mu = points.iter().map(|(m, s)| s * m.ln()).sum::<f64>() / weight;
                let log_var = points.iter().map(|(m, s)| s * (m.ln() - mu).powi(2)).sum::<f64>() / weight;
                vec![log_var.sqrt(), mu]
            }
            DeterrenceFunction::Exponential => vec![1.0 / mean],
            DeterrenceFunction::Tanner if var > 0.0 => vec![mean * mean / var - 1.0, -mean / var],
            DeterrenceFunction::Power => match log_log_slope(target) {
                Some(slope) => vec![-slope],
                None => self.default_values(),
            },
            DeterrenceFunction::Tanner => self.default_values(),
        };
        DeterrenceParameters::clamped(self, values)
    }
}

/// Least-squares slope of log band density against log band midpoint.
fn log_log_slope(target: &TargetDistribution) -> Option<f64> {
    let points: Vec<(f64, f64)> = target
        .bands()
        .iter()
        .filter(|b| b.share > 0.0 && b.upper.is_finite())
        .map(|b| {
            let density = b.share / (b.upper - b.lower);
            (b.midpoint().max(COST_FLOOR).ln(), density.ln())
        })
        .collect();
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mx).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    if sxx <= 0.0 {
        return None;
    }
    Some(sxy / sxx)
}

impl fmt::Display for DeterrenceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeterrenceFunction::LogNormal => "log_normal",
            DeterrenceFunction::Tanner => "tanner",
            DeterrenceFunction::Power => "power",
            DeterrenceFunction::Exponential => "exponential",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DeterrenceFunction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeterrenceFunction::ALL
            .into_iter()
            .find(|f| f.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| ValidationError::invalid_setting("deterrence function", format!("unknown family {:?}", s)))
    }
}

/// A deterrence family with a validated parameter vector.
///
/// # Examples
///
/// ```
/// use gravity_core::math::deterrence::{DeterrenceFunction, DeterrenceParameters};
///
/// let params = DeterrenceParameters::new(DeterrenceFunction::Exponential, vec![0.2]).unwrap();
/// assert_eq!(params.get("beta"), Some(0.2));
/// assert!((params.weight(5.0) - (-1.0f64).exp()).abs() < 1e-12);
///
/// assert!(DeterrenceParameters::new(DeterrenceFunction::Exponential, vec![-1.0]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParameters")]
pub struct DeterrenceParameters {
    function: DeterrenceFunction,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawParameters {
    function: DeterrenceFunction,
    values: Vec<f64>,
}

impl TryFrom<RawParameters> for DeterrenceParameters {
    type Error = ValidationError;

    fn try_from(raw: RawParameters) -> Result<Self, Self::Error> {
        Self::new(raw.function, raw.values)
    }
}

impl DeterrenceParameters {
    /// Creates parameters, checking count, finiteness, and domain.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ParameterCount`] or
    /// [`ValidationError::InvalidParameter`].
    pub fn new(function: DeterrenceFunction, values: Vec<f64>) -> Result<Self, ValidationError> {
        if values.len() != function.n_parameters() {
            return Err(ValidationError::ParameterCount {
                expected: function.n_parameters(),
                got: values.len(),
            });
        }
        for ((&value, bounds), &name) in values.iter().zip(function.bounds()).zip(function.parameter_names()) {
            if !value.is_finite() || !bounds.contains(value) {
                return Err(ValidationError::InvalidParameter {
                    name,
                    value,
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }
        Ok(Self { function, values })
    }

    /// The family's documented defaults.
    pub fn defaults(function: DeterrenceFunction) -> Self {
        Self {
            function,
            values: function.default_values(),
        }
    }

    /// Parameters clamped into the domain. Missing or non-finite entries take
    /// the family default.
    pub fn clamped(function: DeterrenceFunction, values: Vec<f64>) -> Self {
        let defaults = function.default_values();
        let values = function
            .bounds()
            .iter()
            .enumerate()
            .map(|(k, bounds)| match values.get(k) {
                Some(&v) if v.is_finite() => bounds.clamp(v),
                _ => defaults[k],
            })
            .collect();
        Self { function, values }
    }

    /// Same family with new values, validated.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self, ValidationError> {
        Self::new(self.function, values)
    }

    /// The function family.
    #[inline]
    pub fn function(&self) -> DeterrenceFunction {
        self.function
    }

    /// Parameter values, in [`DeterrenceFunction::parameter_names`] order.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of the named parameter.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.function
            .parameter_names()
            .iter()
            .position(|&n| n == name)
            .map(|k| self.values[k])
    }

    /// Deterrence weight of `cost`.
    #[inline]
    pub fn weight(&self, cost: f64) -> f64 {
        self.function.weight(cost, &self.values)
    }
}

impl Default for DeterrenceParameters {
    fn default() -> Self {
        Self::defaults(DeterrenceFunction::default())
    }
}

impl fmt::Display for DeterrenceParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        for (k, (name, value)) in self.function.parameter_names().iter().zip(&self.values).enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:.6}", name, value)?;
        }
        write!(f, ")")
    }
}
