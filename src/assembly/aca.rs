//! Adaptive cross approximation
use crate::linalg::{inner, norm2};
use crate::types::{Result, TranspositionMode};
use cauchy::c64;
use num::Zero;
use rlst::{rlst_dynamic_array2, DynamicArray, RawAccessMut};
use std::ops::Range;

/// A matrix stored as a sum of outer products `sum_k u_k v_k^T`
#[derive(Debug, Clone)]
pub struct LowRankMatrix {
    shape: [usize; 2],
    u: Vec<Vec<c64>>,
    v: Vec<Vec<c64>>,
}

impl LowRankMatrix {
    /// Create a zero matrix
    pub fn new(shape: [usize; 2]) -> Self {
        Self {
            shape,
            u: vec![],
            v: vec![],
        }
    }

    /// Number of rows and columns
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    /// Number of terms
    pub fn rank(&self) -> usize {
        self.u.len()
    }

    /// Number of stored scalars
    pub fn storage(&self) -> usize {
        self.rank() * (self.shape[0] + self.shape[1])
    }

    /// Column factors
    pub fn u(&self) -> &[Vec<c64>] {
        &self.u
    }

    /// Row factors
    pub fn v(&self) -> &[Vec<c64>] {
        &self.v
    }

    /// Add the term `u v^T`
    pub fn push(&mut self, u: Vec<c64>, v: Vec<c64>) {
        debug_assert_eq!(u.len(), self.shape[0]);
        debug_assert_eq!(v.len(), self.shape[1]);
        self.u.push(u);
        self.v.push(v);
    }

    /// Entry `(i, j)`
    pub fn entry(&self, i: usize, j: usize) -> c64 {
        self.u.iter().zip(&self.v).map(|(u, v)| u[i] * v[j]).sum()
    }

    /// Subtract row `i` of this matrix from `row`
    pub fn subtract_row(&self, i: usize, row: &mut [c64]) {
        for (u, v) in self.u.iter().zip(&self.v) {
            let ui = u[i];
            if ui.is_zero() {
                continue;
            }
            for (r, vj) in row.iter_mut().zip(v) {
                *r -= ui * vj;
            }
        }
    }

    /// Subtract column `j` of this matrix from `col`
    pub fn subtract_col(&self, j: usize, col: &mut [c64]) {
        for (u, v) in self.u.iter().zip(&self.v) {
            let vj = v[j];
            if vj.is_zero() {
                continue;
            }
            for (c, ui) in col.iter_mut().zip(u) {
                *c -= ui * vj;
            }
        }
    }

    /// Multiply by a scalar
    pub fn scale(&mut self, scalar: c64) {
        for u in self.u.iter_mut() {
            u.iter_mut().for_each(|x| *x *= scalar);
        }
    }

    /// Compute `y += alpha op(A) x`
    pub fn apply(&self, mode: TranspositionMode, x: &[c64], y: &mut [c64], alpha: c64) {
        let conjugate = mode.is_conjugated();
        for (u, v) in self.u.iter().zip(&self.v) {
            let (input, output) = if mode.is_transposed() {
                (u, v)
            } else {
                (v, u)
            };
            let mut s = c64::zero();
            for (a, b) in input.iter().zip(x) {
                s += if conjugate { a.conj() * b } else { a * b };
            }
            s *= alpha;
            for (yi, a) in y.iter_mut().zip(output) {
                *yi += if conjugate { a.conj() * s } else { a * s };
            }
        }
    }

    /// The sub-matrix with the given rows and columns
    pub fn restrict(&self, rows: Range<usize>, cols: Range<usize>) -> Self {
        Self {
            shape: [rows.len(), cols.len()],
            u: self.u.iter().map(|u| u[rows.clone()].to_vec()).collect(),
            v: self.v.iter().map(|v| v[cols.clone()].to_vec()).collect(),
        }
    }

    /// The sum of two low-rank matrices, stored by concatenating their terms
    pub fn concat(mut self, other: &LowRankMatrix) -> Self {
        debug_assert_eq!(self.shape, other.shape);
        self.u.extend(other.u.iter().cloned());
        self.v.extend(other.v.iter().cloned());
        self
    }

    /// Compute an approximation with fewer terms by running ACA on this matrix
    pub fn recompress(&self, eps: f64) -> Self {
        let [m, n] = self.shape;
        if self.rank() == 0 || m == 0 || n == 0 {
            return Self::new(self.shape);
        }
        let outcome = aca(
            self.shape,
            |i, row| {
                row.fill(c64::zero());
                self.subtract_row(i, row);
                row.iter_mut().for_each(|x| *x = -*x);
                Ok(())
            },
            |j, col| {
                col.fill(c64::zero());
                self.subtract_col(j, col);
                col.iter_mut().for_each(|x| *x = -*x);
                Ok(())
            },
            eps,
            usize::min(m, n),
        );
        match outcome {
            Ok(AcaOutcome::Converged(r)) if r.rank() < self.rank() => r,
            _ => self.clone(),
        }
    }

    /// Convert to a dense column-major matrix
    pub fn to_dense(&self) -> DynamicArray<c64, 2> {
        let [m, _] = self.shape;
        let mut output = rlst_dynamic_array2!(c64, self.shape);
        let data = output.data_mut();
        for (u, v) in self.u.iter().zip(&self.v) {
            for (j, vj) in v.iter().enumerate() {
                for (i, ui) in u.iter().enumerate() {
                    data[i + m * j] += ui * vj;
                }
            }
        }
        output
    }
}

/// Result of adaptive cross approximation
#[derive(Debug, Clone)]
pub enum AcaOutcome {
    /// The stopping criterion was met
    Converged(LowRankMatrix),
    /// The maximum rank was reached before the stopping criterion was met
    RankExceeded(LowRankMatrix),
}

enum Pivot {
    Row(usize),
    Col(usize),
}

fn argmax(values: &[c64], used: &[bool]) -> Option<usize> {
    values
        .iter()
        .zip(used)
        .enumerate()
        .filter(|(_, (_, u))| !**u)
        .map(|(i, (v, _))| (i, v.norm()))
        .fold(None, |best: Option<(usize, f64)>, cur| match best {
            Some(b) if b.1 >= cur.1 => Some(b),
            _ => Some(cur),
        })
        .map(|(i, _)| i)
}

/// The unused index whose entries in `factors` have the smallest norm
fn least_approximated(factors: &[Vec<c64>], used: &[bool]) -> Option<usize> {
    (0..used.len())
        .filter(|i| !used[*i])
        .map(|i| (i, factors.iter().map(|f| f[i].norm_sqr()).sum::<f64>()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Approximate a matrix given through its rows and columns by a low-rank matrix
///
/// `row(i, buffer)` and `col(j, buffer)` write row `i` and column `j` of the
/// matrix into `buffer`. Pivots are chosen by partial pivoting. A new term
/// `u_k v_k^T` satisfies the stopping criterion if
/// `|u_k| |v_k| <= eps |S_k|_F`, where `S_k` is the current approximation. Once
/// a term satisfies it, the criterion is verified by two further terms, the
/// first starting from the least approximated row and the second from the
/// least approximated column. A zero residual counts as satisfying the
/// criterion.
pub fn aca<R, C>(
    shape: [usize; 2],
    mut row: R,
    mut col: C,
    eps: f64,
    max_rank: usize,
) -> Result<AcaOutcome>
where
    R: FnMut(usize, &mut [c64]) -> Result<()>,
    C: FnMut(usize, &mut [c64]) -> Result<()>,
{
    let [m, n] = shape;
    let mut approx = LowRankMatrix::new(shape);
    if m == 0 || n == 0 {
        return Ok(AcaOutcome::Converged(approx));
    }

    let mut used_rows = vec![false; m];
    let mut used_cols = vec![false; n];
    let mut row_buffer = vec![c64::zero(); n];
    let mut col_buffer = vec![c64::zero(); m];
    let mut norm_sqr = 0.0;
    let mut satisfied = 0;
    let mut pivot = Pivot::Row(0);

    loop {
        if satisfied == 3
            || used_rows.iter().all(|u| *u)
            || used_cols.iter().all(|u| *u)
        {
            return Ok(AcaOutcome::Converged(approx));
        }
        if approx.rank() >= max_rank {
            return Ok(AcaOutcome::RankExceeded(approx));
        }

        let term = match pivot {
            Pivot::Row(i) => {
                used_rows[i] = true;
                row(i, &mut row_buffer)?;
                approx.subtract_row(i, &mut row_buffer);
                match argmax(&row_buffer, &used_cols) {
                    Some(j) if !row_buffer[j].is_zero() => {
                        used_cols[j] = true;
                        col(j, &mut col_buffer)?;
                        approx.subtract_col(j, &mut col_buffer);
                        let scale = c64::new(1.0, 0.0) / row_buffer[j];
                        Some((
                            col_buffer.clone(),
                            row_buffer.iter().map(|x| x * scale).collect::<Vec<_>>(),
                        ))
                    }
                    _ => None,
                }
            }
            Pivot::Col(j) => {
                used_cols[j] = true;
                col(j, &mut col_buffer)?;
                approx.subtract_col(j, &mut col_buffer);
                match argmax(&col_buffer, &used_rows) {
                    Some(i) if !col_buffer[i].is_zero() => {
                        used_rows[i] = true;
                        row(i, &mut row_buffer)?;
                        approx.subtract_row(i, &mut row_buffer);
                        let scale = c64::new(1.0, 0.0) / col_buffer[i];
                        Some((
                            col_buffer.iter().map(|x| x * scale).collect::<Vec<_>>(),
                            row_buffer.clone(),
                        ))
                    }
                    _ => None,
                }
            }
        };

        match term {
            Some((u, v)) => {
                let term_norm = norm2(&u) * norm2(&v);
                let overlap: c64 = approx
                    .u
                    .iter()
                    .zip(&approx.v)
                    .map(|(uk, vk)| inner(uk, &u) * inner(vk, &v))
                    .sum();
                norm_sqr = (norm_sqr + 2.0 * overlap.re + term_norm * term_norm).max(0.0);
                if !term_norm.is_finite() {
                    return Ok(AcaOutcome::RankExceeded(approx));
                }
                if term_norm <= eps * norm_sqr.sqrt() {
                    satisfied += 1;
                } else {
                    satisfied = 0;
                }
                approx.push(u, v);
            }
            None => satisfied += 1,
        }

        let next_row = match satisfied {
            0 => approx
                .u
                .last()
                .and_then(|u| argmax(u, &used_rows))
                .or_else(|| least_approximated(&approx.u, &used_rows)),
            1 => least_approximated(&approx.u, &used_rows),
            _ => None,
        };
        pivot = match (satisfied, next_row) {
            (0 | 1, Some(i)) => Pivot::Row(i),
            _ => match least_approximated(&approx.v, &used_cols) {
                Some(j) => Pivot::Col(j),
                None => return Ok(AcaOutcome::Converged(approx)),
            },
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use rlst::RawAccess;

    fn separated_kernel(m: usize, n: usize) -> impl Fn(usize, usize) -> c64 {
        move |i, j| {
            let x = [i as f64 / m as f64, 0.3 * (i as f64).sin(), 0.0];
            let y = [3.0 + j as f64 / n as f64, 0.0, 0.2 * (j as f64).cos()];
            let r = crate::linalg::distance(&x, &y);
            c64::new(0.0, r).exp() / r
        }
    }

    fn run(
        shape: [usize; 2],
        f: &impl Fn(usize, usize) -> c64,
        eps: f64,
        max_rank: usize,
    ) -> AcaOutcome {
        aca(
            shape,
            |i, row| {
                for (j, r) in row.iter_mut().enumerate() {
                    *r = f(i, j);
                }
                Ok(())
            },
            |j, col| {
                for (i, c) in col.iter_mut().enumerate() {
                    *c = f(i, j);
                }
                Ok(())
            },
            eps,
            max_rank,
        )
        .unwrap()
    }

    fn relative_error(
        shape: [usize; 2],
        f: &impl Fn(usize, usize) -> c64,
        a: &LowRankMatrix,
    ) -> f64 {
        let mut diff = 0.0;
        let mut total = 0.0;
        for i in 0..shape[0] {
            for j in 0..shape[1] {
                diff += (f(i, j) - a.entry(i, j)).norm_sqr();
                total += f(i, j).norm_sqr();
            }
        }
        (diff / total).sqrt()
    }

    #[test]
    fn test_aca_smooth_kernel() {
        let shape = [60, 50];
        let f = separated_kernel(60, 50);
        let AcaOutcome::Converged(a) = run(shape, &f, 1e-6, 40) else {
            panic!("ACA did not converge");
        };
        assert!(a.rank() < 20);
        assert!(relative_error(shape, &f, &a) < 1e-4);
    }

    #[test]
    fn test_aca_exact_low_rank() {
        let f = |i: usize, j: usize| {
            c64::new(i as f64, 1.0) * c64::new(1.0, j as f64)
                + c64::new((i * i) as f64, 0.0) * c64::new(0.5, 0.0)
        };
        let AcaOutcome::Converged(a) = run([20, 30], &f, 1e-10, 20) else {
            panic!("ACA did not converge");
        };
        assert!(a.rank() <= 5);
        assert!(relative_error([20, 30], &f, &a) < 1e-10);
    }

    #[test]
    fn test_aca_zero_matrix() {
        let f = |_: usize, _: usize| c64::zero();
        let AcaOutcome::Converged(a) = run([10, 10], &f, 1e-4, 5) else {
            panic!("ACA did not converge");
        };
        assert_eq!(a.rank(), 0);
    }

    #[test]
    fn test_aca_rank_exceeded() {
        let f = |i: usize, j: usize| {
            if i == j {
                c64::new(1.0, 0.0)
            } else {
                c64::zero()
            }
        };
        assert!(matches!(
            run([12, 12], &f, 1e-4, 3),
            AcaOutcome::RankExceeded(a) if a.rank() == 3
        ));
    }

    #[test]
    fn test_low_rank_apply() {
        let mut a = LowRankMatrix::new([3, 2]);
        a.push(
            vec![c64::new(1.0, 1.0), c64::new(2.0, 0.0), c64::new(0.0, -1.0)],
            vec![c64::new(1.0, 0.0), c64::new(0.0, 2.0)],
        );
        a.push(
            vec![c64::new(0.5, 0.0), c64::new(0.0, 1.0), c64::new(1.0, 0.0)],
            vec![c64::new(-1.0, 1.0), c64::new(3.0, 0.0)],
        );
        let dense = a.to_dense();
        let x2 = [c64::new(1.0, -1.0), c64::new(2.0, 0.5)];
        let x3 = [c64::new(0.0, 1.0), c64::new(1.0, 0.0), c64::new(2.0, 2.0)];
        for mode in [
            TranspositionMode::NoTranspose,
            TranspositionMode::Conjugate,
            TranspositionMode::Transpose,
            TranspositionMode::ConjugateTranspose,
        ] {
            let (x, nout): (&[c64], usize) = if mode.is_transposed() {
                (&x3, 2)
            } else {
                (&x2, 3)
            };
            let mut y = vec![c64::zero(); nout];
            a.apply(mode, x, &mut y, c64::new(2.0, 0.0));
            for (r, yr) in y.iter().enumerate() {
                let mut expected = c64::zero();
                for (s, xs) in x.iter().enumerate() {
                    let (i, j) = if mode.is_transposed() { (s, r) } else { (r, s) };
                    let entry = dense.data()[i + 3 * j];
                    expected += if mode.is_conjugated() {
                        entry.conj()
                    } else {
                        entry
                    } * xs;
                }
                assert_relative_eq!((yr - 2.0 * expected).norm(), 0.0, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn test_recompress() {
        let shape = [40, 30];
        let f = separated_kernel(40, 30);
        let AcaOutcome::Converged(a) = run(shape, &f, 1e-8, 40) else {
            panic!("ACA did not converge");
        };
        let doubled = a.clone().concat(&a);
        let recompressed = doubled.recompress(1e-8);
        assert!(recompressed.rank() <= a.rank() + 3);
        let g = |i: usize, j: usize| 2.0 * f(i, j);
        assert!(relative_error(shape, &g, &recompressed) < 1e-5);

        let restricted = a.restrict(5..15, 10..30);
        assert_eq!(restricted.shape(), [10, 20]);
        assert_relative_eq!(
            (restricted.entry(2, 3) - a.entry(7, 13)).norm(),
            0.0,
            epsilon = 1e-14
        );
    }
}
