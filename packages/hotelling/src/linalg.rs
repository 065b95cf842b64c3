//! Small dense linear algebra for the T² statistic.

/// Column means of `rows`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(rows: &[Vec<f64>], dimensions: usize) -> Vec<f64> {
    let n = rows.len() as f64;
    let mut out = vec![0.0; dimensions];
    for row in rows {
        for (acc, &x) in out.iter_mut().zip(row) {
            *acc += x;
        }
    }
    for acc in &mut out {
        *acc /= n;
    }
    out
}

/// Sample covariance (divisor `n − 1`) of `rows` around `mean`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::needless_range_loop)]
pub fn covariance(rows: &[Vec<f64>], mean: &[f64]) -> Vec<Vec<f64>> {
    let p = mean.len();
    let denom = (rows.len() as f64 - 1.0).max(1.0);
    let mut cov = vec![vec![0.0; p]; p];

    for row in rows {
        for i in 0..p {
            let di = row[i] - mean[i];
            for j in 0..=i {
                cov[i][j] += di * (row[j] - mean[j]);
            }
        }
    }
    for i in 0..p {
        for j in 0..=i {
            cov[i][j] /= denom;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}

/// Lower-triangular Cholesky factor `L` with `L·Lᵀ = a`, or `None` if `a`
/// is not (numerically) positive definite.
#[must_use]
#[allow(clippy::needless_range_loop)]
pub fn cholesky(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let p = a.len();
    let scale = (0..p).map(|i| a[i][i].abs()).fold(0.0, f64::max);
    let tolerance = scale * 1e-12;
    let mut l = vec![vec![0.0; p]; p];

    for i in 0..p {
        for j in 0..=i {
            let dot: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let pivot = a[i][i] - dot;
                if !pivot.is_finite() || pivot <= tolerance {
                    return None;
                }
                l[i][i] = pivot.sqrt();
            } else {
                l[i][j] = (a[i][j] - dot) / l[j][j];
            }
        }
    }
    Some(l)
}

/// `xᵀ (L·Lᵀ)⁻¹ x` via forward substitution: with `L·y = x` the form is
/// `yᵀy`.
#[must_use]
#[allow(clippy::needless_range_loop)]
pub fn quadratic_form(l: &[Vec<f64>], x: &[f64]) -> f64 {
    let mut y = vec![0.0; x.len()];
    for i in 0..x.len() {
        let dot: f64 = (0..i).map(|k| l[i][k] * y[k]).sum();
        y[i] = (x[i] - dot) / l[i][i];
    }
    y.iter().map(|v| v * v).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_covariance() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 6.0], vec![5.0, 7.0]];
        let m = mean(&rows, 2);
        assert!((m[0] - 3.0).abs() < 1e-12);
        assert!((m[1] - 5.0).abs() < 1e-12);

        let cov = covariance(&rows, &m);
        assert!((cov[0][0] - 4.0).abs() < 1e-12);
        assert!((cov[0][1] - 5.0).abs() < 1e-12);
        assert!((cov[1][0] - 5.0).abs() < 1e-12);
        assert!((cov[1][1] - 7.0).abs() < 1e-12);
    }

    #[test]
    fn cholesky_reconstructs_matrix() {
        let a = vec![
            vec![4.0, 12.0, -16.0],
            vec![12.0, 37.0, -43.0],
            vec![-16.0, -43.0, 98.0],
        ];
        let l = cholesky(&a).unwrap();
        assert!((l[0][0] - 2.0).abs() < 1e-12);
        assert!((l[1][0] - 6.0).abs() < 1e-12);
        assert!((l[2][2] - 3.0).abs() < 1e-12);
        for i in 0..3 {
            for j in 0..3 {
                let v: f64 = (0..3).map(|k| l[i][k] * l[j][k]).sum();
                assert!((v - a[i][j]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn singular_matrix_has_no_factor() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(cholesky(&a).is_none());
        assert!(cholesky(&[vec![0.0]]).is_none());
    }

    #[test]
    fn quadratic_form_matches_inverse() {
        // a⁻¹ = [[2, -1], [-1, 1]] for a = [[1, 1], [1, 2]].
        let a = vec![vec![1.0, 1.0], vec![1.0, 2.0]];
        let l = cholesky(&a).unwrap();
        let x = [1.0, 2.0];
        let expected = 2.0 - 2.0 * 2.0 + 4.0;
        assert!((quadratic_form(&l, &x) - expected).abs() < 1e-12);
    }
}
