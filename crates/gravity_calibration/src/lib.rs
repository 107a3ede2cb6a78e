//! # gravity_calibration (L2: Calibration)
//!
//! Fits deterrence parameters for one area so the balanced gravity matrix
//! reproduces an observed trip-length distribution.
//!
//! This crate provides:
//! - Deterrence-weighted seed construction (`seed`)
//! - The calibrator state machine with a single fallback retry (`calibrator`, `state`)
//! - Immutable calibration results (`result`)
//! - Cooperative cancellation shared with the orchestrator (`cancel`)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        gravity_calibration (L2)         │
//! │  seed → balance → evaluate → iterate    │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │            gravity_core (L1)            │
//! │  Furness, bands, deterrence, Jacobian   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use gravity_calibration::{CalibrationInputs, CalibrationState, GravityCalibrator};
//! use gravity_core::math::DeterrenceParameters;
//! use gravity_core::types::{AreaPartition, CostMatrix, TargetDistribution, TripEndVector};
//!
//! let area = AreaPartition::builder("north")
//!     .productions(TripEndVector::productions("north", vec![40.0, 60.0]).unwrap())
//!     .attractions(TripEndVector::attractions("north", vec![50.0, 50.0]).unwrap())
//!     .cost(CostMatrix::from_rows(&[vec![1.0, 6.0], vec![6.0, 1.0]]).unwrap())
//!     .target(TargetDistribution::from_triples(&[(0.0, 3.0, 0.7), (3.0, 9.0, 0.3)]).unwrap())
//!     .initial_parameters(DeterrenceParameters::default())
//!     .build()
//!     .unwrap();
//!
//! let result = GravityCalibrator::default().calibrate(&CalibrationInputs::from_area(&area)).unwrap();
//! assert_eq!(result.state_trace()[0], CalibrationState::Initialized);
//! assert!(result.state_trace().last().unwrap().is_terminal());
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod calibrator;
pub mod cancel;
pub mod result;
pub mod seed;
pub mod state;

pub use calibrator::{CalibrationInputs, CalibratorConfig, GravityCalibrator};
pub use cancel::CancellationToken;
pub use result::{CalibrationResult, CalibrationStatus};
pub use state::CalibrationState;
