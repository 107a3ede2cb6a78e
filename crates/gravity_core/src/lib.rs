//! # gravity_core: Foundation for Gravity-Model Trip Distribution
//!
//! ## Layer 1 (Foundation) Role
//!
//! gravity_core is the bottom layer of the workspace, providing:
//! - Zone, area, and segment identifiers (`types::ids`)
//! - Trip-end vectors, cost matrices, OD matrices, and cost bands (`types`)
//! - Validation and solver error types (`types::error`)
//! - Furness balancing (`math::furness`)
//! - Trip-length distribution evaluation (`math::distribution`)
//! - Deterrence functions and finite-difference Jacobians (`math::deterrence`, `math::jacobian`)
//! - Run configuration (`config`)
//!
//! It has no dependencies on other gravity_* crates.
//!
//! ## Usage Examples
//!
//! ```rust
//! use gravity_core::math::{balance, evaluate};
//! use gravity_core::types::{CostMatrix, OdMatrix, TargetDistribution};
//!
//! let seed = OdMatrix::filled(2, 2, 1.0);
//! let balanced = balance(seed, &[30.0, 10.0], &[20.0, 20.0], 100, 1e-9).unwrap();
//! assert!(balanced.converged);
//!
//! let cost = CostMatrix::from_rows(&[vec![2.0, 8.0], vec![8.0, 2.0]]).unwrap();
//! let target = TargetDistribution::from_triples(&[(0.0, 5.0, 0.5), (5.0, 10.0, 0.5)]).unwrap();
//! let achieved = evaluate(&balanced.matrix, &cost, &target).unwrap();
//! assert!((achieved.shares.iter().sum::<f64>() - 1.0).abs() < 1e-12);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod config;
pub mod math;
pub mod types;
