//! Damped normal-equation solve for Gauss-Newton parameter updates.
//!
//! ```text
//! (J^T J + λI) δ = -J^T r
//! ```

use crate::math::jacobian::Jacobian;
use crate::types::SolverError;

/// Solves for the damped Gauss-Newton step `δ`.
///
/// `residuals` are achieved minus target shares; the step moves parameters
/// to reduce their sum of squares.
///
/// # Errors
///
/// Returns [`SolverError`] if the system is empty, the dimensions disagree,
/// or the damped matrix is not positive definite.
pub fn damped_gauss_newton_step(jacobian: &Jacobian, residuals: &[f64], lambda: f64) -> Result<Vec<f64>, SolverError> {
    let n = jacobian.cols();
    let m = jacobian.rows();
    if n == 0 || m == 0 {
        return Err(SolverError::EmptySystem(format!("{} residuals, {} parameters", m, n)));
    }
    if residuals.len() != m {
        return Err(SolverError::DimensionMismatch {
            jacobian_rows: m,
            residuals: residuals.len(),
        });
    }

    let mut jtj = vec![0.0; n * n];
    let mut rhs = vec![0.0; n];
    for a in 0..n {
        for b in 0..=a {
            let sum: f64 = (0..m).map(|k| jacobian.get(k, a) * jacobian.get(k, b)).sum();
            jtj[a * n + b] = sum;
            jtj[b * n + a] = sum;
        }
        jtj[a * n + a] += lambda;
        rhs[a] = -(0..m).map(|k| jacobian.get(k, a) * residuals[k]).sum::<f64>();
    }

    solve_cholesky(&jtj, &rhs).ok_or(SolverError::NotPositiveDefinite)
}

/// Solves `A x = b` for symmetric positive definite `A` (row-major, `n × n`).
pub fn solve_cholesky(a: &[f64], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n * n {
        return None;
    }

    // A = L L^T
    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i * n + i] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }

    // L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[i * n + j] * y[j]).sum();
        y[i] = (b[i] - sum) / l[i * n + i];
    }

    // L^T x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[j * n + i] * x[j]).sum();
        x[i] = (y[i] - sum) / l[i * n + i];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::deterrence::{DeterrenceFunction, DeterrenceParameters};
    use crate::math::jacobian::estimate_jacobian;
    use crate::types::ValidationError;
    use approx::assert_relative_eq;

    // ========================================
    // Cholesky Tests
    // ========================================

    #[test]
    fn test_cholesky_simple() {
        let x = solve_cholesky(&[4.0, 2.0, 2.0, 2.0], &[8.0, 5.0]).unwrap();
        assert_relative_eq!(x[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_non_positive_definite() {
        assert!(solve_cholesky(&[-1.0, 0.0, 0.0, 1.0], &[1.0, 1.0]).is_none());
        assert!(solve_cholesky(&[1.0], &[1.0, 2.0]).is_none());
    }

    // ========================================
    // Gauss-Newton Step Tests
    // ========================================

    #[test]
    fn test_undamped_step_solves_linear_problem() {
        // shares = [a, b]; target = [0.3, 0.7]
        let params = DeterrenceParameters::new(DeterrenceFunction::LogNormal, vec![1.0, 2.0]).unwrap();
        let jac = estimate_jacobian(&params, |p| Ok::<_, ValidationError>(p.values().to_vec()), 1e-6).unwrap();
        let residuals = [1.0 - 0.3, 2.0 - 0.7];
        let step = damped_gauss_newton_step(&jac, &residuals, 0.0).unwrap();
        assert_relative_eq!(step[0], -0.7, epsilon = 1e-6);
        assert_relative_eq!(step[1], -1.3, epsilon = 1e-6);
    }

    #[test]
    fn test_damping_shrinks_step() {
        let params = DeterrenceParameters::new(DeterrenceFunction::Power, vec![1.0]).unwrap();
        let jac = estimate_jacobian(&params, |p| Ok::<_, ValidationError>(vec![p.values()[0]]), 1e-6).unwrap();
        let free = damped_gauss_newton_step(&jac, &[1.0], 0.0).unwrap();
        let damped = damped_gauss_newton_step(&jac, &[1.0], 1.0).unwrap();
        assert!(damped[0].abs() < free[0].abs());
        assert!(damped[0] < 0.0);
    }

    #[test]
    fn test_singular_system_needs_damping() {
        let jac = estimate_jacobian(
            &DeterrenceParameters::default(),
            |_p| Ok::<_, ValidationError>(vec![0.5, 0.5]),
            1e-4,
        )
        .unwrap();
        assert_eq!(
            damped_gauss_newton_step(&jac, &[0.1, -0.1], 0.0),
            Err(SolverError::NotPositiveDefinite)
        );
        let step = damped_gauss_newton_step(&jac, &[0.1, -0.1], 1e-3).unwrap();
        assert_eq!(step, vec![0.0, 0.0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let jac = Jacobian::zeros(3, 1);
        assert!(matches!(
            damped_gauss_newton_step(&jac, &[0.0], 1.0),
            Err(SolverError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            damped_gauss_newton_step(&Jacobian::zeros(0, 0), &[], 1.0),
            Err(SolverError::EmptySystem(_))
        ));
    }
}
