//! Numerical building blocks of the gravity model.
//!
//! - `furness`: Doubly-constrained matrix balancing
//! - `distribution`: Achieved trip-length distribution and error metrics
//! - `deterrence`: Cost deterrence function families and parameters
//! - `jacobian`: Finite-difference Jacobian of band shares
//! - `linalg`: Damped normal-equation solve

pub mod deterrence;
pub mod distribution;
pub mod furness;
pub mod jacobian;
pub mod linalg;

pub use deterrence::{DeterrenceFunction, DeterrenceParameters, ParameterBounds, COST_FLOOR};
pub use distribution::{evaluate, r_squared, squared_share_error, AchievedDistribution, BandIndex};
pub use furness::{balance, FurnessBalancer, FurnessConfig, FurnessDiagnostics, FurnessResult};
pub use jacobian::{estimate_jacobian, estimate_jacobian_with_base, Jacobian, PerturbationPattern};
pub use linalg::damped_gauss_newton_step;
