//! Area partitions: one independently calibrated slice of the model.

use super::bands::TargetDistribution;
use super::cost::CostMatrix;
use super::error::ValidationError;
use super::ids::{AreaId, SegmentId, ZoneId};
use super::trip_ends::{TripEndKind, TripEndVector};
use crate::math::deterrence::DeterrenceParameters;

/// A named subset of zones with everything needed to calibrate it.
///
/// Construct with [`AreaPartition::builder`]; the builder checks that trip
/// ends, cost matrix, and zone list describe the same area and segment.
///
/// # Examples
///
/// ```rust
/// use gravity_core::types::{AreaPartition, CostMatrix, TargetDistribution, TripEndVector};
///
/// let area = AreaPartition::builder("north")
///     .productions(TripEndVector::productions("north", vec![10.0, 20.0]).unwrap())
///     .attractions(TripEndVector::attractions("north", vec![15.0, 15.0]).unwrap())
///     .cost(CostMatrix::from_rows(&[vec![1.0, 6.0], vec![6.0, 1.0]]).unwrap())
///     .target(TargetDistribution::from_triples(&[(0.0, 5.0, 0.6), (5.0, 10.0, 0.4)]).unwrap())
///     .build()
///     .expect("consistent area");
///
/// assert_eq!(area.n_zones(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct AreaPartition {
    id: AreaId,
    segment: SegmentId,
    zones: Vec<ZoneId>,
    productions: TripEndVector,
    attractions: TripEndVector,
    cost: CostMatrix,
    target: TargetDistribution,
    initial_parameters: DeterrenceParameters,
}

impl AreaPartition {
    /// Starts building an area with the given ID.
    pub fn builder(id: impl Into<AreaId>) -> AreaPartitionBuilder {
        AreaPartitionBuilder {
            id: id.into(),
            productions: None,
            attractions: None,
            cost: None,
            target: None,
            initial_parameters: None,
        }
    }

    /// Area identifier.
    #[inline]
    pub fn id(&self) -> &AreaId {
        &self.id
    }

    /// Travel segment shared by both trip-end vectors.
    #[inline]
    pub fn segment(&self) -> &SegmentId {
        &self.segment
    }

    /// Zones of this area, in matrix order.
    #[inline]
    pub fn zones(&self) -> &[ZoneId] {
        &self.zones
    }

    /// Number of zones.
    #[inline]
    pub fn n_zones(&self) -> usize {
        self.zones.len()
    }

    /// Row marginals.
    #[inline]
    pub fn productions(&self) -> &TripEndVector {
        &self.productions
    }

    /// Column marginals.
    #[inline]
    pub fn attractions(&self) -> &TripEndVector {
        &self.attractions
    }

    /// Cost matrix, possibly a view into a larger shared buffer.
    #[inline]
    pub fn cost(&self) -> &CostMatrix {
        &self.cost
    }

    /// Observed trip-length distribution.
    #[inline]
    pub fn target(&self) -> &TargetDistribution {
        &self.target
    }

    /// First-guess deterrence parameters.
    #[inline]
    pub fn initial_parameters(&self) -> &DeterrenceParameters {
        &self.initial_parameters
    }

    /// Replaces the cost matrix, keeping the zone count.
    pub fn with_cost(mut self, cost: CostMatrix) -> Result<Self, ValidationError> {
        if cost.n_zones() != self.zones.len() {
            return Err(ValidationError::shape_mismatch(
                "area cost matrix",
                self.zones.len(),
                cost.n_zones(),
            ));
        }
        self.cost = cost;
        Ok(self)
    }
}

/// Builder for [`AreaPartition`].
#[derive(Debug, Clone)]
pub struct AreaPartitionBuilder {
    id: AreaId,
    productions: Option<TripEndVector>,
    attractions: Option<TripEndVector>,
    cost: Option<CostMatrix>,
    target: Option<TargetDistribution>,
    initial_parameters: Option<DeterrenceParameters>,
}

impl AreaPartitionBuilder {
    /// Sets the productions vector.
    pub fn productions(mut self, productions: TripEndVector) -> Self {
        self.productions = Some(productions);
        self
    }

    /// Sets the attractions vector.
    pub fn attractions(mut self, attractions: TripEndVector) -> Self {
        self.attractions = Some(attractions);
        self
    }

    /// Sets the cost matrix.
    pub fn cost(mut self, cost: CostMatrix) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Sets the target distribution.
    pub fn target(mut self, target: TargetDistribution) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the first-guess parameters. Defaults to log-normal defaults.
    pub fn initial_parameters(mut self, parameters: DeterrenceParameters) -> Self {
        self.initial_parameters = Some(parameters);
        self
    }

    /// Validates and builds the partition.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if a component is missing, a trip-end
    /// vector has the wrong kind, area, or segment, the two vectors cover
    /// different zones, or the cost matrix size disagrees.
    pub fn build(self) -> Result<AreaPartition, ValidationError> {
        let id = self.id;
        let missing = |what: &str| ValidationError::empty_input(format!("area {}: missing {}", id, what));

        let productions = self.productions.ok_or_else(|| missing("productions"))?;
        let attractions = self.attractions.ok_or_else(|| missing("attractions"))?;
        let cost = self.cost.ok_or_else(|| missing("cost matrix"))?;
        let target = self.target.ok_or_else(|| missing("target distribution"))?;

        if productions.is_empty() {
            return Err(ValidationError::empty_input(format!("area {}: no zones", id)));
        }
        for (vector, kind) in [
            (&productions, TripEndKind::Productions),
            (&attractions, TripEndKind::Attractions),
        ] {
            if vector.kind() != kind {
                return Err(ValidationError::inconsistent("trip-end kind", kind, vector.kind()));
            }
            if vector.area() != &id {
                return Err(ValidationError::inconsistent("area", &id, vector.area()));
            }
        }
        if productions.segment() != attractions.segment() {
            return Err(ValidationError::inconsistent(
                "segment",
                productions.segment(),
                attractions.segment(),
            ));
        }
        if productions.zones() != attractions.zones() {
            return Err(ValidationError::inconsistent(
                "zone list",
                format!("{} production zones", productions.len()),
                format!("{} attraction zones in a different order or set", attractions.len()),
            ));
        }
        if cost.n_zones() != productions.len() {
            return Err(ValidationError::shape_mismatch(
                "area cost matrix",
                productions.len(),
                cost.n_zones(),
            ));
        }

        Ok(AreaPartition {
            segment: productions.segment().clone(),
            zones: productions.zones().to_vec(),
            id,
            productions,
            attractions,
            cost,
            target,
            initial_parameters: self.initial_parameters.unwrap_or_default(),
        })
    }
}
