//! Linear algebra utilities.
//!
//! One-sided Jacobi SVD, truncated pseudoinverse with rank report,
//! pivoted dense solve and complex eigenvalues of 2x2 blocks.

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use optics_types::error::{OpticsError, OpticsResult};

const JACOBI_MAX_SWEEPS: usize = 60;
const JACOBI_ORTHO_TOL: f64 = 1e-15;
const PIVOT_REL_TOL: f64 = 1e-14;

/// Eigenvalues of a real 2x2 matrix, as a complex-conjugate or real pair.
///
/// For a symplectic block (det = 1) with |trace| < 2 the pair is
/// `exp(±i mu)` and `mu` is the phase advance.
pub fn eig_2x2(a: &[[f64; 2]; 2]) -> [Complex64; 2] {
    let trace = a[0][0] + a[1][1];
    let det = a[0][0] * a[1][1] - a[0][1] * a[1][0];
    let disc = Complex64::new(trace * trace - 4.0 * det, 0.0).sqrt();
    let half_trace = Complex64::new(0.5 * trace, 0.0);
    [half_trace + 0.5 * disc, half_trace - 0.5 * disc]
}

/// Thin SVD by one-sided (Hestenes) Jacobi rotations on the columns of `a`.
///
/// Returns (U, sigma, Vt) with A ≈ U * diag(sigma) * Vt, sigma sorted
/// descending, U: m x k, Vt: k x n, k = min(m, n).
pub fn svd_small(a: &Array2<f64>) -> (Array2<f64>, Array1<f64>, Array2<f64>) {
    let (m, n) = a.dim();
    let k = m.min(n);

    let mut w = a.clone();
    let mut v: Array2<f64> = Array2::eye(n);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut rotated = false;
        for i in 0..n {
            for j in (i + 1)..n {
                let mut alpha = 0.0;
                let mut beta = 0.0;
                let mut gamma = 0.0;
                for r in 0..m {
                    alpha += w[[r, i]] * w[[r, i]];
                    beta += w[[r, j]] * w[[r, j]];
                    gamma += w[[r, i]] * w[[r, j]];
                }
                if gamma == 0.0 || gamma.abs() <= JACOBI_ORTHO_TOL * (alpha * beta).sqrt() {
                    continue;
                }
                rotated = true;

                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let cos = 1.0 / (1.0 + t * t).sqrt();
                let sin = t * cos;

                for r in 0..m {
                    let wi = w[[r, i]];
                    let wj = w[[r, j]];
                    w[[r, i]] = cos * wi - sin * wj;
                    w[[r, j]] = sin * wi + cos * wj;
                }
                for r in 0..n {
                    let vi = v[[r, i]];
                    let vj = v[[r, j]];
                    v[[r, i]] = cos * vi - sin * vj;
                    v[[r, j]] = sin * vi + cos * vj;
                }
            }
        }
        if !rotated {
            break;
        }
    }

    let norms: Vec<f64> = (0..n)
        .map(|j| w.column(j).iter().map(|x| x * x).sum::<f64>().sqrt())
        .collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| norms[j].total_cmp(&norms[i]));

    let mut u = Array2::zeros((m, k));
    let mut sigma = Array1::zeros(k);
    let mut vt = Array2::zeros((k, n));
    for (idx, &col) in order.iter().take(k).enumerate() {
        let s = norms[col];
        sigma[idx] = s;
        if s > 0.0 {
            for r in 0..m {
                u[[r, idx]] = w[[r, col]] / s;
            }
        }
        for r in 0..n {
            vt[[idx, r]] = v[[r, col]];
        }
    }

    (u, sigma, vt)
}

/// Pseudoinverse truncated at `sv_cutoff_rel * sigma_max`.
///
/// Returns the pseudoinverse together with the numerical rank, i.e. the
/// number of singular values that survived the truncation. For an
/// under-determined system the product `pinv * b` is the minimum-norm
/// least-squares solution.
pub fn pinv_truncated(a: &Array2<f64>, sv_cutoff_rel: f64) -> (Array2<f64>, usize) {
    let (u, sigma, vt) = svd_small(a);
    let sigma_max = sigma.iter().copied().fold(0.0_f64, f64::max);
    let cutoff = sv_cutoff_rel * sigma_max;
    let rank = sigma.iter().filter(|&&s| s > cutoff && s > 0.0).count();
    (pinv_from_svd(a.dim(), &u, &sigma, &vt, cutoff), rank)
}

fn pinv_from_svd(
    (m, n): (usize, usize),
    u: &Array2<f64>,
    sigma: &Array1<f64>,
    vt: &Array2<f64>,
    cutoff: f64,
) -> Array2<f64> {
    let mut result = Array2::zeros((n, m));
    for idx in 0..sigma.len() {
        if sigma[idx] > cutoff && sigma[idx] > 0.0 {
            let inv_s = 1.0 / sigma[idx];
            for i in 0..n {
                for j in 0..m {
                    result[[i, j]] += vt[[idx, i]] * inv_s * u[[j, idx]];
                }
            }
        }
    }
    result
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
pub fn solve_dense(a: &Array2<f64>, b: &Array1<f64>) -> OpticsResult<Array1<f64>> {
    let (m, n) = a.dim();
    if m != n || b.len() != n {
        return Err(OpticsError::LinAlg(format!(
            "solve_dense shape mismatch: A={m}x{n}, b={}",
            b.len()
        )));
    }
    let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !scale.is_finite() || scale == 0.0 {
        return Err(OpticsError::LinAlg(
            "solve_dense matrix is zero or non-finite".to_string(),
        ));
    }

    let mut aug = a.clone();
    let mut rhs = b.clone();
    for col in 0..n {
        let mut pivot_row = col;
        for row in (col + 1)..n {
            if aug[[row, col]].abs() > aug[[pivot_row, col]].abs() {
                pivot_row = row;
            }
        }
        if aug[[pivot_row, col]].abs() <= PIVOT_REL_TOL * scale {
            return Err(OpticsError::LinAlg(format!(
                "solve_dense singular matrix at column {col}"
            )));
        }
        if pivot_row != col {
            for k in 0..n {
                aug.swap([col, k], [pivot_row, k]);
            }
            rhs.swap(col, pivot_row);
        }
        for row in (col + 1)..n {
            let factor = aug[[row, col]] / aug[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                aug[[row, k]] -= factor * aug[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut acc = rhs[row];
        for k in (row + 1)..n {
            acc -= aug[[row, k]] * x[k];
        }
        x[row] = acc / aug[[row, row]];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_eig_2x2_rotation_is_unit_circle() {
        let mu = 2.0 * PI * 0.31;
        let a = [[mu.cos(), mu.sin()], [-mu.sin(), mu.cos()]];
        let [l1, l2] = eig_2x2(&a);
        assert!((l1.norm() - 1.0).abs() < 1e-12);
        assert!((l1.arg().abs() - mu).abs() < 1e-12);
        assert!((l1 - l2.conj()).norm() < 1e-12);
    }

    #[test]
    fn test_eig_2x2_hyperbolic_is_real() {
        let a = [[2.0, 1.0], [1.0, 1.0]];
        let [l1, l2] = eig_2x2(&a);
        assert!(l1.im.abs() < 1e-15 && l2.im.abs() < 1e-15);
        assert!((l1.re * l2.re - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_svd_identity() {
        let a = Array2::eye(3);
        let (u, sigma, vt) = svd_small(&a);
        for i in 0..3 {
            assert!((sigma[i] - 1.0).abs() < 1e-10, "sigma[{i}] = {}", sigma[i]);
        }
        let reconstructed = u.dot(&Array2::from_diag(&sigma)).dot(&vt);
        for i in 0..3 {
            for j in 0..3 {
                let diff: f64 = reconstructed[[i, j]] - a[[i, j]];
                assert!(diff.abs() < 1e-10, "Reconstruction failed at ({i}, {j})");
            }
        }
    }

    #[test]
    fn test_svd_wide_matrix_reconstructs() {
        let a = Array2::from_shape_vec((2, 4), vec![1.0, 2.0, 0.5, -1.0, 0.0, 3.0, 1.0, 2.0])
            .unwrap();
        let (u, sigma, vt) = svd_small(&a);
        assert_eq!(u.dim(), (2, 2));
        assert_eq!(vt.dim(), (2, 4));
        assert!(sigma[0] >= sigma[1]);
        let reconstructed = u.dot(&Array2::from_diag(&sigma)).dot(&vt);
        for ((i, j), &val) in a.indexed_iter() {
            assert!((reconstructed[[i, j]] - val).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pinv_truncated_identity() {
        let a = Array2::eye(3);
        let (pinv, rank) = pinv_truncated(&a, 1e-10);
        assert_eq!(rank, 3);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (pinv[[i, j]] - expected).abs() < 1e-10,
                    "pinv identity failed at ({i}, {j})"
                );
            }
        }
    }

    #[test]
    fn test_pinv_truncated_reports_rank_of_redundant_rows() {
        // Second row is twice the first: rank 1.
        let a = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 2.0, 4.0, 6.0]).unwrap();
        let (_, rank) = pinv_truncated(&a, 1e-10);
        assert_eq!(rank, 1);
    }

    #[test]
    fn test_pinv_truncated_min_norm_solution() {
        // x + y = 2 has minimum-norm solution (1, 1).
        let a = Array2::from_shape_vec((1, 2), vec![1.0, 1.0]).unwrap();
        let (pinv, rank) = pinv_truncated(&a, 1e-10);
        assert_eq!(rank, 1);
        let x = pinv.dot(&Array1::from_vec(vec![2.0]));
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_dense_matches_known_solution() {
        let a = Array2::from_shape_vec((3, 3), vec![0.0, 2.0, 1.0, 1.0, 1.0, 0.0, 3.0, 0.0, 1.0])
            .unwrap();
        let x_true = Array1::from_vec(vec![1.0, -2.0, 0.5]);
        let b = a.dot(&x_true);
        let x = solve_dense(&a, &b).unwrap();
        for i in 0..3 {
            assert!((x[i] - x_true[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_solve_dense_rejects_singular() {
        let a = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 2.0, 4.0]).unwrap();
        let b = Array1::from_vec(vec![1.0, 1.0]);
        assert!(matches!(solve_dense(&a, &b), Err(OpticsError::LinAlg(_))));
    }
}
