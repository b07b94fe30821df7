//! Dense linear algebra and small vector helpers
use crate::types::{BemError, Result, TranspositionMode};
use cauchy::c64;
use num::Zero;
use rlst::{DynamicArray, RawAccess, Shape};

/// Difference of two points
pub fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Dot product
pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Cross product
pub fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Euclidean norm
pub fn norm(a: &[f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Distance between two points
pub fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    norm(&sub(a, b))
}

/// Cross product of a complex vector with a real vector
pub fn cross_complex_real(a: &[c64; 3], b: &[f64; 3]) -> [c64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Cross product of two complex vectors
pub fn cross_complex(a: &[c64; 3], b: &[c64; 3]) -> [c64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Inner product `sum conj(a_i) b_i`
pub fn inner(a: &[c64], b: &[c64]) -> c64 {
    a.iter().zip(b).map(|(x, y)| x.conj() * y).sum()
}

/// Euclidean norm of a complex vector
pub fn norm2(x: &[c64]) -> f64 {
    x.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt()
}

/// Compute `y += alpha op(A) x` for a dense column-major matrix `A`
pub fn gemv(
    mode: TranspositionMode,
    matrix: &[c64],
    shape: [usize; 2],
    x: &[c64],
    y: &mut [c64],
    alpha: c64,
) {
    let [rows, cols] = shape;
    let conjugate = mode.is_conjugated();
    let entry = |i: usize, j: usize| {
        let a = matrix[i + rows * j];
        if conjugate {
            a.conj()
        } else {
            a
        }
    };
    if mode.is_transposed() {
        for (j, yj) in y.iter_mut().enumerate().take(cols) {
            let mut sum = c64::zero();
            for (i, xi) in x.iter().enumerate().take(rows) {
                sum += entry(i, j) * xi;
            }
            *yj += alpha * sum;
        }
    } else {
        for (j, xj) in x.iter().enumerate().take(cols) {
            let s = alpha * xj;
            if s.is_zero() {
                continue;
            }
            for (i, yi) in y.iter_mut().enumerate().take(rows) {
                *yi += entry(i, j) * s;
            }
        }
    }
}

/// LU decomposition with partial pivoting, `A = P L U`
///
/// `L` has unit diagonal and is stored below the diagonal of `lu` (column-major).
/// Row `k` was swapped with row `pivots[k]` at elimination step `k`.
#[derive(Debug, Clone)]
pub struct LuDecomposition {
    n: usize,
    lu: Vec<c64>,
    pivots: Vec<usize>,
}

impl LuDecomposition {
    /// Factorise a column-major n x n matrix
    pub fn new(n: usize, mut lu: Vec<c64>) -> Result<Self> {
        if lu.len() != n * n {
            return Err(BemError::DimensionMismatch {
                expected: n * n,
                actual: lu.len(),
            });
        }
        let mut pivots = vec![0; n];

        for k in 0..n {
            let (max_row, max_val) = (k..n)
                .map(|i| (i, lu[i + n * k].norm()))
                .fold((k, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !(max_val > 0.0 && max_val.is_finite()) {
                return Err(BemError::SingularMatrix);
            }
            pivots[k] = max_row;
            if max_row != k {
                for j in 0..n {
                    lu.swap(k + n * j, max_row + n * j);
                }
            }

            let pivot_inv = c64::new(1.0, 0.0) / lu[k + n * k];
            for i in (k + 1)..n {
                lu[i + n * k] *= pivot_inv;
            }
            for j in (k + 1)..n {
                let ukj = lu[k + n * j];
                if ukj.is_zero() {
                    continue;
                }
                for i in (k + 1)..n {
                    let lik = lu[i + n * k];
                    lu[i + n * j] -= lik * ukj;
                }
            }
        }

        Ok(Self { n, lu, pivots })
    }

    /// Factorise a square rlst array
    pub fn from_array(matrix: &DynamicArray<c64, 2>) -> Result<Self> {
        let [rows, cols] = matrix.shape();
        if rows != cols {
            return Err(BemError::DimensionMismatch {
                expected: rows,
                actual: cols,
            });
        }
        Self::new(rows, matrix.data().to_vec())
    }

    /// Dimension
    pub fn dim(&self) -> usize {
        self.n
    }

    fn check(&self, b: &[c64]) -> Result<()> {
        if b.len() != self.n {
            Err(BemError::DimensionMismatch {
                expected: self.n,
                actual: b.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Overwrite `b` with `(P L)^{-1} b`
    pub fn lower_solve(&self, b: &mut [c64]) {
        let n = self.n;
        for (k, p) in self.pivots.iter().enumerate() {
            b.swap(k, *p);
        }
        for j in 0..n {
            let bj = b[j];
            for i in (j + 1)..n {
                b[i] -= self.lu[i + n * j] * bj;
            }
        }
    }

    /// Overwrite `b` with `U^{-1} b`
    pub fn upper_solve(&self, b: &mut [c64]) {
        let n = self.n;
        for j in (0..n).rev() {
            b[j] /= self.lu[j + n * j];
            let bj = b[j];
            for i in 0..j {
                b[i] -= self.lu[i + n * j] * bj;
            }
        }
    }

    /// Overwrite `b` with `U^{-T} b`
    pub fn upper_transpose_solve(&self, b: &mut [c64]) {
        let n = self.n;
        for i in 0..n {
            let mut value = b[i];
            for k in 0..i {
                value -= self.lu[k + n * i] * b[k];
            }
            b[i] = value / self.lu[i + n * i];
        }
    }

    /// Overwrite `b` with `(P L)^{-T} b`
    pub fn lower_transpose_solve(&self, b: &mut [c64]) {
        let n = self.n;
        for i in (0..n).rev() {
            let mut value = b[i];
            for k in (i + 1)..n {
                value -= self.lu[k + n * i] * b[k];
            }
            b[i] = value;
        }
        for (k, p) in self.pivots.iter().enumerate().rev() {
            b.swap(k, *p);
        }
    }

    /// Solve `A x = b` in place
    pub fn solve(&self, b: &mut [c64]) -> Result<()> {
        self.check(b)?;
        self.lower_solve(b);
        self.upper_solve(b);
        Ok(())
    }

    /// Solve `A^T x = b` in place
    pub fn solve_transpose(&self, b: &mut [c64]) -> Result<()> {
        self.check(b)?;
        self.upper_transpose_solve(b);
        self.lower_transpose_solve(b);
        Ok(())
    }
}
