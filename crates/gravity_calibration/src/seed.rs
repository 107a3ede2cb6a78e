//! Gravity seed construction.

use gravity_core::math::DeterrenceParameters;
use gravity_core::types::{CostMatrix, OdMatrix};

/// Builds the deterrence-weighted outer product `P_i * A_j * f(c_ij)`.
///
/// `productions` and `attractions` must both have `cost.n_zones()` entries.
/// Cells are capped at `f64::MAX` so the balancer always sees finite values.
///
/// # Examples
///
/// ```
/// use gravity_calibration::seed::build_seed;
/// use gravity_core::math::{DeterrenceFunction, DeterrenceParameters};
/// use gravity_core::types::CostMatrix;
///
/// let cost = CostMatrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap();
/// let params = DeterrenceParameters::new(DeterrenceFunction::Power, vec![1.0]).unwrap();
/// let seed = build_seed(&[10.0, 20.0], &[5.0, 5.0], &cost, &params);
///
/// assert_eq!(seed.get(0, 0), 50.0);
/// assert_eq!(seed.get(1, 0), 50.0);
/// ```
pub fn build_seed(productions: &[f64], attractions: &[f64], cost: &CostMatrix, params: &DeterrenceParameters) -> OdMatrix {
    let n = cost.n_zones();
    let mut seed = OdMatrix::zeros(n, n);
    for (i, &p) in productions.iter().enumerate().take(n) {
        if p == 0.0 {
            continue;
        }
        for ((cell, c), &a) in seed.row_mut(i).iter_mut().zip(cost.row(i)).zip(attractions) {
            *cell = (p * a * params.weight(c)).min(f64::MAX);
        }
    }
    seed
}
