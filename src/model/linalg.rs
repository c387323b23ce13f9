//! Small dense symmetric solvers for per-row least squares
//!
//! Matrices are row-major `n x n` slices.

/// Relative pivot tolerance below which a matrix is treated as singular
const PIVOT_TOL: f64 = 1e-10;

/// Cholesky factor `L` of a symmetric positive definite matrix.
///
/// Returns `None` when a pivot falls below the tolerance relative to its
/// diagonal entry, i.e. the matrix is (numerically) rank deficient.
pub fn cholesky(a: &[f64], n: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; n * n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                let scale = a[i * n + i].abs().max(f64::MIN_POSITIVE);
                if !(sum > PIVOT_TOL * scale) {
                    return None;
                }
                l[i * n + j] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    Some(l)
}

/// Solve `L L' x = b` given the Cholesky factor
pub fn cholesky_solve(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * y[j];
        }
        y[i] = sum / l[i * n + i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
    x
}

/// Inverse of a symmetric positive definite matrix, `None` if singular
pub fn invert_spd(a: &[f64], n: usize) -> Option<Vec<f64>> {
    let l = cholesky(a, n)?;
    let mut inv = vec![0.0; n * n];
    for i in 0..n {
        let mut e = vec![0.0; n];
        e[i] = 1.0;
        let col = cholesky_solve(&l, &e, n);
        for j in 0..n {
            inv[j * n + i] = col[j];
        }
    }
    Some(inv)
}

/// Quadratic form `c' A c`
pub fn quadratic_form(a: &[f64], c: &[f64]) -> f64 {
    let n = c.len();
    let mut total = 0.0;
    for i in 0..n {
        if c[i] == 0.0 {
            continue;
        }
        for j in 0..n {
            total += c[i] * a[i * n + j] * c[j];
        }
    }
    total
}
