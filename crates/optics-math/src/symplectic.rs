//! 4x4 transverse transfer matrices and symplecticity checks.
//!
//! Ordering is `(x, px, y, py)`; the symplectic form is
//! `J = diag(J2, J2)` with `J2 = [[0, 1], [-1, 0]]`.

/// Transverse transfer matrix, row-major.
pub type Matrix4 = [[f64; 4]; 4];

pub fn identity4() -> Matrix4 {
    let mut m = [[0.0; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

/// `a * b`.
pub fn mat_mul4(a: &Matrix4, b: &Matrix4) -> Matrix4 {
    let mut out = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[i][k] * b[k][j];
            }
            out[i][j] = sum;
        }
    }
    out
}

pub fn mat_vec4(a: &Matrix4, v: &[f64; 4]) -> [f64; 4] {
    let mut out = [0.0; 4];
    for i in 0..4 {
        out[i] = a[i][0] * v[0] + a[i][1] * v[1] + a[i][2] * v[2] + a[i][3] * v[3];
    }
    out
}

pub fn transpose4(a: &Matrix4) -> Matrix4 {
    let mut out = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            out[j][i] = a[i][j];
        }
    }
    out
}

pub fn symplectic_form4() -> Matrix4 {
    let mut j = [[0.0; 4]; 4];
    j[0][1] = 1.0;
    j[1][0] = -1.0;
    j[2][3] = 1.0;
    j[3][2] = -1.0;
    j
}

/// Maximum absolute entry of `M^T J M - J`. Zero for an exactly symplectic map.
pub fn symplecticity_error(m: &Matrix4) -> f64 {
    let j = symplectic_form4();
    let mtjm = mat_mul4(&transpose4(m), &mat_mul4(&j, m));
    let mut err = 0.0_f64;
    for r in 0..4 {
        for c in 0..4 {
            err = err.max((mtjm[r][c] - j[r][c]).abs());
        }
    }
    err
}

/// 2x2 sub-block; `plane` 0 is horizontal, 1 vertical.
pub fn block2(m: &Matrix4, row_plane: usize, col_plane: usize) -> [[f64; 2]; 2] {
    let r = 2 * row_plane;
    let c = 2 * col_plane;
    [[m[r][c], m[r][c + 1]], [m[r + 1][c], m[r + 1][c + 1]]]
}

/// Frobenius norm of the off-diagonal (x-y coupling) blocks.
pub fn coupling_norm(m: &Matrix4) -> f64 {
    let mut sum = 0.0;
    for (rp, cp) in [(0, 1), (1, 0)] {
        let b = block2(m, rp, cp);
        sum += b[0][0].powi(2) + b[0][1].powi(2) + b[1][0].powi(2) + b[1][1].powi(2);
    }
    sum.sqrt()
}
