//! JSON area bundle.
//!
//! ```json
//! {
//!   "cost": { "zones": [1, 2, 3], "values": [[1, 4, 8], [4, 1, 6], [8, 6, 1]] },
//!   "areas": [
//!     {
//!       "id": "north",
//!       "segment": "commute",
//!       "zones": [1, 2],
//!       "productions": [100, 80],
//!       "attractions": [90, 90],
//!       "target": [
//!         { "lower": 0, "upper": 3, "share": 0.6 },
//!         { "lower": 3, "share": 0.4 }
//!       ],
//!       "initial_parameters": { "function": "log_normal", "values": [1.0, 2.0] }
//!     }
//!   ]
//! }
//! ```
//!
//! Areas either carry their own `cost` rows or slice the bundle-level cost
//! matrix by zone. A band without `upper` is open-ended. Areas without
//! `initial_parameters` start from the configured family's defaults.

use crate::error::{CliError, Result};
use gravity_core::config::DistributionConfig;
use gravity_core::math::DeterrenceParameters;
use gravity_core::types::{
    AreaId, AreaPartition, CostBand, CostMatrix, SegmentId, TargetDistribution, TripEndKind, TripEndVector,
    ValidationError, ZoneId,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Whole input file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaBundle {
    /// Shared cost matrix that areas may slice.
    #[serde(default)]
    pub cost: Option<CostSpec>,
    /// Areas to calibrate.
    pub areas: Vec<AreaSpec>,
}

/// Cost matrix over a zone list.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostSpec {
    /// Zone of each row and column.
    pub zones: Vec<ZoneId>,
    /// Row-major nested costs.
    pub values: Vec<Vec<f64>>,
}

/// One area.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaSpec {
    /// Area name.
    pub id: String,
    /// Segment name; the default segment if absent.
    #[serde(default)]
    pub segment: Option<String>,
    /// Zones, in matrix order.
    pub zones: Vec<ZoneId>,
    /// Productions per zone.
    pub productions: Vec<f64>,
    /// Attractions per zone.
    pub attractions: Vec<f64>,
    /// Own cost rows; otherwise sliced from the bundle cost.
    #[serde(default)]
    pub cost: Option<Vec<Vec<f64>>>,
    /// Observed trip-length distribution.
    pub target: Vec<BandSpec>,
    /// Treat `share` values as trip counts to be normalised.
    #[serde(default)]
    pub target_is_counts: bool,
    /// Starting parameters.
    #[serde(default)]
    pub initial_parameters: Option<DeterrenceParameters>,
}

/// One cost band; `upper` absent means unbounded.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BandSpec {
    /// Inclusive lower bound.
    pub lower: f64,
    /// Exclusive upper bound.
    #[serde(default)]
    pub upper: Option<f64>,
    /// Share (or count) of trips.
    pub share: f64,
}

impl From<BandSpec> for CostBand {
    fn from(spec: BandSpec) -> Self {
        CostBand::new(spec.lower, spec.upper.unwrap_or(f64::INFINITY), spec.share)
    }
}

impl AreaBundle {
    /// Reads a bundle from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CliError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parses a bundle from JSON text.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Validates every area and builds the partitions.
    ///
    /// Areas slicing the bundle cost share its buffer.
    pub fn into_areas(self, config: &DistributionConfig) -> Result<Vec<AreaPartition>> {
        let shared = match self.cost {
            Some(spec) => Some(SharedCost::new(spec)?),
            None => None,
        };
        if self.areas.is_empty() {
            return Err(ValidationError::empty_input("bundle has no areas").into());
        }
        self.areas
            .into_iter()
            .map(|spec| {
                let id = spec.id.clone();
                build_area(spec, shared.as_ref(), config).map_err(|e| CliError::area(id, e))
            })
            .collect()
    }
}

struct SharedCost {
    matrix: CostMatrix,
    index: HashMap<ZoneId, usize>,
}

impl SharedCost {
    fn new(spec: CostSpec) -> Result<Self> {
        if spec.zones.len() != spec.values.len() {
            return Err(ValidationError::shape_mismatch("bundle cost zones", spec.values.len(), spec.zones.len()).into());
        }
        let matrix = CostMatrix::from_rows(&spec.values)?;
        let mut index = HashMap::with_capacity(spec.zones.len());
        for (i, zone) in spec.zones.iter().enumerate() {
            if index.insert(*zone, i).is_some() {
                return Err(ValidationError::DuplicateZone(zone.to_string()).into());
            }
        }
        Ok(Self { matrix, index })
    }

    fn slice(&self, zones: &[ZoneId]) -> std::result::Result<CostMatrix, ValidationError> {
        let indices = zones
            .iter()
            .map(|zone| {
                self.index.get(zone).copied().ok_or_else(|| {
                    ValidationError::inconsistent("bundle cost zones", format!("zone {}", zone), "missing")
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.matrix.select(&indices)
    }
}

fn build_area(
    spec: AreaSpec,
    shared: Option<&SharedCost>,
    config: &DistributionConfig,
) -> std::result::Result<AreaPartition, ValidationError> {
    let area = AreaId::new(spec.id);
    let segment = spec.segment.map(SegmentId::new).unwrap_or_default();
    let productions = TripEndVector::new(
        TripEndKind::Productions,
        area.clone(),
        segment.clone(),
        spec.zones.clone(),
        spec.productions,
    )?;
    let attractions = TripEndVector::new(
        TripEndKind::Attractions,
        area.clone(),
        segment,
        spec.zones.clone(),
        spec.attractions,
    )?;

    let cost = match (spec.cost, shared) {
        (Some(rows), _) => CostMatrix::from_rows(&rows)?,
        (None, Some(shared)) => shared.slice(&spec.zones)?,
        (None, None) => return Err(ValidationError::empty_input("no cost rows and no bundle cost matrix")),
    };

    let bands: Vec<CostBand> = spec.target.into_iter().map(CostBand::from).collect();
    let target = if spec.target_is_counts {
        TargetDistribution::from_counts(bands)?
    } else {
        TargetDistribution::new(bands)?
    };

    let initial = spec
        .initial_parameters
        .unwrap_or_else(|| DeterrenceParameters::defaults(config.deterrence_function));

    AreaPartition::builder(area)
        .productions(productions)
        .attractions(attractions)
        .cost(cost)
        .target(target)
        .initial_parameters(initial)
        .build()
}
