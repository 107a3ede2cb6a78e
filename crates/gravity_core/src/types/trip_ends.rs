//! Trip-end vectors: productions and attractions per zone.

use super::error::{check_non_negative, ValidationError};
use super::ids::{AreaId, SegmentId, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Which end of a trip a vector describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripEndKind {
    /// Trips leaving a zone (row marginals).
    Productions,
    /// Trips arriving at a zone (column marginals).
    Attractions,
}

impl fmt::Display for TripEndKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripEndKind::Productions => write!(f, "productions"),
            TripEndKind::Attractions => write!(f, "attractions"),
        }
    }
}

/// Non-negative trip ends for one area and segment, keyed by zone.
///
/// Zones are held in the order given; the vector's position `k` always
/// refers to `zones[k]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripEndVector {
    kind: TripEndKind,
    area: AreaId,
    segment: SegmentId,
    zones: Vec<ZoneId>,
    values: Vec<f64>,
}

impl TripEndVector {
    /// Creates a validated trip-end vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the lengths differ, a zone repeats, or a value is
    /// negative or non-finite.
    pub fn new(
        kind: TripEndKind,
        area: AreaId,
        segment: SegmentId,
        zones: Vec<ZoneId>,
        values: Vec<f64>,
    ) -> Result<Self, ValidationError> {
        if zones.len() != values.len() {
            return Err(ValidationError::shape_mismatch(
                "trip-end values",
                zones.len(),
                values.len(),
            ));
        }
        let mut seen = HashSet::with_capacity(zones.len());
        for zone in &zones {
            if !seen.insert(*zone) {
                return Err(ValidationError::DuplicateZone(zone.to_string()));
            }
        }
        let what = match kind {
            TripEndKind::Productions => "production",
            TripEndKind::Attractions => "attraction",
        };
        check_non_negative(what, &values)?;
        Ok(Self {
            kind,
            area,
            segment,
            zones,
            values,
        })
    }

    /// Productions for consecutive zones `1..=n`.
    pub fn productions(area: impl Into<AreaId>, values: Vec<f64>) -> Result<Self, ValidationError> {
        Self::numbered(TripEndKind::Productions, area.into(), values)
    }

    /// Attractions for consecutive zones `1..=n`.
    pub fn attractions(area: impl Into<AreaId>, values: Vec<f64>) -> Result<Self, ValidationError> {
        Self::numbered(TripEndKind::Attractions, area.into(), values)
    }

    fn numbered(kind: TripEndKind, area: AreaId, values: Vec<f64>) -> Result<Self, ValidationError> {
        let zones = (1..=values.len() as u32).map(ZoneId::new).collect();
        Self::new(kind, area, SegmentId::default(), zones, values)
    }

    /// Returns this vector re-tagged with `segment`.
    pub fn with_segment(mut self, segment: impl Into<SegmentId>) -> Self {
        self.segment = segment.into();
        self
    }

    /// Productions or attractions.
    #[inline]
    pub fn kind(&self) -> TripEndKind {
        self.kind
    }

    /// Owning area.
    #[inline]
    pub fn area(&self) -> &AreaId {
        &self.area
    }

    /// Travel segment.
    #[inline]
    pub fn segment(&self) -> &SegmentId {
        &self.segment
    }

    /// Zones, in vector order.
    #[inline]
    pub fn zones(&self) -> &[ZoneId] {
        &self.zones
    }

    /// Values, in vector order.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of zones.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the vector covers no zones.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all values.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Values rescaled so they sum to `target_total`.
    ///
    /// A zero-total vector cannot be rescaled and is returned unchanged.
    pub fn scaled_to(&self, target_total: f64) -> Vec<f64> {
        let total = self.total();
        if total <= 0.0 {
            return self.values.clone();
        }
        let factor = target_total / total;
        self.values.iter().map(|v| v * factor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_numbered_zones() {
        let p = TripEndVector::productions("north", vec![10.0, 20.0, 30.0]).unwrap();
        assert_eq!(p.kind(), TripEndKind::Productions);
        assert_eq!(p.zones(), &[ZoneId::new(1), ZoneId::new(2), ZoneId::new(3)]);
        assert_eq!(p.total(), 60.0);
        assert_eq!(p.area().as_str(), "north");
    }

    #[test]
    fn test_negative_value_rejected() {
        let err = TripEndVector::attractions("a", vec![1.0, -2.0]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NegativeValue {
                what: "attraction",
                index: 1,
                value: -2.0
            }
        );
    }

    #[test]
    fn test_duplicate_zone_rejected() {
        let err = TripEndVector::new(
            TripEndKind::Productions,
            AreaId::new("a"),
            SegmentId::default(),
            vec![ZoneId::new(4), ZoneId::new(4)],
            vec![1.0, 1.0],
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateZone("4".to_string()));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = TripEndVector::new(
            TripEndKind::Productions,
            AreaId::new("a"),
            SegmentId::default(),
            vec![ZoneId::new(1)],
            vec![1.0, 2.0],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_scaled_to() {
        let a = TripEndVector::attractions("a", vec![1.0, 3.0]).unwrap();
        let scaled = a.scaled_to(8.0);
        assert_relative_eq!(scaled[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(scaled[1], 6.0, epsilon = 1e-12);

        let zero = TripEndVector::attractions("a", vec![0.0, 0.0]).unwrap();
        assert_eq!(zero.scaled_to(5.0), vec![0.0, 0.0]);
    }

    #[test]
    fn test_with_segment() {
        let p = TripEndVector::productions("a", vec![1.0]).unwrap().with_segment("hb_w");
        assert_eq!(p.segment().as_str(), "hb_w");
    }
}
