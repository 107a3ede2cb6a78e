//! Core data types for trip distribution.
//!
//! This module provides:
//! - `ids`: Zone, area, and segment identifiers
//! - `trip_ends`: Productions and attractions per zone
//! - `cost`: Immutable, shareable travel cost matrices with zero-copy area views
//! - `matrix`: Dense origin-destination matrices
//! - `bands`: Cost bands and target trip-length distributions
//! - `area`: Area partitions combining all of the above
//! - `error`: Structured validation and solver errors
//!
//! # Re-exports
//!
//! Every public type is re-exported at this module level.

pub mod area;
pub mod bands;
pub mod cost;
pub mod error;
pub mod ids;
pub mod matrix;
pub mod trip_ends;

pub use area::{AreaPartition, AreaPartitionBuilder};
pub use bands::{CostBand, TargetDistribution, SHARE_SUM_TOLERANCE};
pub use cost::CostMatrix;
pub use error::{SolverError, ValidationError};
pub use ids::{AreaId, SegmentId, ZoneId};
pub use matrix::OdMatrix;
pub use trip_ends::{TripEndKind, TripEndVector};
