//! Cost bands and observed trip-length distributions.

use super::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Tolerance on the sum of band shares.
pub const SHARE_SUM_TOLERANCE: f64 = 1e-6;

/// One band of a trip-length distribution: costs in `[lower, upper)` carry
/// `share` of all trips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBand {
    /// Inclusive lower cost bound.
    pub lower: f64,
    /// Exclusive upper cost bound. May be infinite on the last band.
    pub upper: f64,
    /// Share of trips in this band.
    pub share: f64,
}

impl CostBand {
    /// Creates a band.
    pub fn new(lower: f64, upper: f64, share: f64) -> Self {
        Self {
            lower,
            upper,
            share,
        }
    }

    /// Representative cost of the band. Open-ended bands use their lower bound.
    #[inline]
    pub fn midpoint(&self) -> f64 {
        if self.upper.is_finite() {
            0.5 * (self.lower + self.upper)
        } else {
            self.lower
        }
    }

    /// Returns `true` if `cost` lies in `[lower, upper)`.
    #[inline]
    pub fn contains(&self, cost: f64) -> bool {
        cost >= self.lower && cost < self.upper
    }
}

/// Ordered, contiguous cost bands whose shares sum to one.
///
/// # Examples
///
/// ```
/// use gravity_core::types::TargetDistribution;
///
/// let target = TargetDistribution::from_triples(&[(0.0, 5.0, 0.5), (5.0, 10.0, 0.5)]).unwrap();
/// assert_eq!(target.len(), 2);
/// assert_eq!(target.band_for(7.5), 1);
/// assert!((target.mean_cost() - 5.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CostBand>", into = "Vec<CostBand>")]
pub struct TargetDistribution {
    bands: Vec<CostBand>,
}

impl TargetDistribution {
    /// Creates a validated distribution.
    pub fn new(bands: Vec<CostBand>) -> Result<Self, ValidationError> {
        validate_bands(&bands)?;
        let total: f64 = bands.iter().map(|b| b.share).sum();
        if (total - 1.0).abs() > SHARE_SUM_TOLERANCE {
            return Err(ValidationError::invalid_bands(format!(
                "shares sum to {}, expected 1",
                total
            )));
        }
        Ok(Self { bands })
    }

    /// Creates a distribution from `(lower, upper, share)` triples.
    pub fn from_triples(triples: &[(f64, f64, f64)]) -> Result<Self, ValidationError> {
        Self::new(
            triples
                .iter()
                .map(|&(lower, upper, share)| CostBand::new(lower, upper, share))
                .collect(),
        )
    }

    /// Creates a distribution from observed trip counts per band, rescaling
    /// them to shares.
    pub fn from_counts(mut bands: Vec<CostBand>) -> Result<Self, ValidationError> {
        validate_bands(&bands)?;
        let total: f64 = bands.iter().map(|b| b.share).sum();
        if total <= 0.0 {
            return Err(ValidationError::invalid_bands("observed counts sum to zero"));
        }
        for band in &mut bands {
            band.share /= total;
        }
        Ok(Self { bands })
    }

    /// The bands, in cost order.
    #[inline]
    pub fn bands(&self) -> &[CostBand] {
        &self.bands
    }

    /// Number of bands.
    #[inline]
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// Always `false`; an empty distribution cannot be constructed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Band shares, in cost order.
    pub fn shares(&self) -> Vec<f64> {
        self.bands.iter().map(|b| b.share).collect()
    }

    /// Share-weighted mean of band midpoints.
    pub fn mean_cost(&self) -> f64 {
        self.bands.iter().map(|b| b.share * b.midpoint()).sum()
    }

    /// Index of the band that `cost` falls into.
    ///
    /// Costs below the first band are counted in the first band and costs at
    /// or above the last upper bound in the last band, so every trip lands
    /// somewhere.
    pub fn band_for(&self, cost: f64) -> usize {
        let idx = self.bands.partition_point(|b| b.upper <= cost);
        idx.min(self.bands.len() - 1)
    }

    /// A copy with the given shares, e.g. to express an achieved distribution
    /// on the same bands.
    pub fn with_shares(&self, shares: &[f64]) -> Result<Self, ValidationError> {
        if shares.len() != self.bands.len() {
            return Err(ValidationError::shape_mismatch(
                "band shares",
                self.bands.len(),
                shares.len(),
            ));
        }
        let bands = self
            .bands
            .iter()
            .zip(shares)
            .map(|(b, &s)| CostBand::new(b.lower, b.upper, s))
            .collect();
        Self::new(bands)
    }
}

impl TryFrom<Vec<CostBand>> for TargetDistribution {
    type Error = ValidationError;

    fn try_from(bands: Vec<CostBand>) -> Result<Self, Self::Error> {
        Self::new(bands)
    }
}

impl From<TargetDistribution> for Vec<CostBand> {
    fn from(target: TargetDistribution) -> Self {
        target.bands
    }
}

fn validate_bands(bands: &[CostBand]) -> Result<(), ValidationError> {
    if bands.is_empty() {
        return Err(ValidationError::invalid_bands("no bands"));
    }
    let last = bands.len() - 1;
    for (k, band) in bands.iter().enumerate() {
        if !band.lower.is_finite() || band.lower < 0.0 {
            return Err(ValidationError::invalid_bands(format!(
                "band {} has invalid lower bound {}",
                k, band.lower
            )));
        }
        if band.upper.is_nan() || band.upper <= band.lower || (k != last && band.upper.is_infinite()) {
            return Err(ValidationError::invalid_bands(format!(
                "band {} has invalid upper bound {}",
                k, band.upper
            )));
        }
        if !band.share.is_finite() || band.share < 0.0 {
            return Err(ValidationError::invalid_bands(format!(
                "band {} has invalid share {}",
                k, band.share
            )));
        }
        if k > 0 {
            let prev = bands[k - 1].upper;
            let gap = (band.lower - prev).abs();
            if gap > 1e-9 * prev.abs().max(1.0) {
                return Err(ValidationError::invalid_bands(format!(
                    "band {} starts at {} but band {} ends at {}",
                    k,
                    band.lower,
                    k - 1,
                    prev
                )));
            }
        }
    }
    Ok(())
}
