//! Preconditioners
//!
//! A preconditioner is a discrete operator that approximates the inverse of
//! the weak form of a boundary operator. The approximate LU inverse factorises
//! an H-matrix in the hierarchically off-diagonal low-rank format: the
//! off-diagonal blocks of every pair of sibling clusters are approximated by
//! ACA and the diagonal leaves are factorised densely.
use crate::assembly::aca::{aca, AcaOutcome, LowRankMatrix};
use crate::assembly::cluster_tree::ClusterTree;
use crate::assembly::hmatrix::HMatrix;
use crate::linalg::LuDecomposition;
use crate::operator::{apply_new, BlockDiagonalOperator};
use crate::traits::{scale_output, DiscreteOperator};
use crate::types::{BemError, Result, TranspositionMode};
use cauchy::c64;
use log::{debug, info};
use num::Zero;
use rayon::prelude::*;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

fn check_tolerance(tolerance: f64) -> Result<()> {
    if tolerance > 0.0 && tolerance.is_finite() {
        Ok(())
    } else {
        Err(BemError::InvalidArgument(format!(
            "preconditioner tolerance {tolerance} must be positive and finite"
        )))
    }
}

/// Apply `solve` for `A` to `x` for the inverse of `op(A)`
fn apply_inverse<S, T>(mode: TranspositionMode, x: &[c64], solve: S, solve_transpose: T) -> Result<Vec<c64>>
where
    S: Fn(&mut [c64]) -> Result<()>,
    T: Fn(&mut [c64]) -> Result<()>,
{
    let conjugate = mode.is_conjugated();
    let mut z = if conjugate {
        x.iter().map(|v| v.conj()).collect::<Vec<_>>()
    } else {
        x.to_vec()
    };
    if mode.is_transposed() {
        solve_transpose(&mut z)?;
    } else {
        solve(&mut z)?;
    }
    if conjugate {
        z.iter_mut().for_each(|v| *v = v.conj());
    }
    Ok(z)
}

fn accumulate(z: &[c64], y: &mut [c64], alpha: c64, beta: c64) {
    scale_output(y, beta);
    for (yi, zi) in y.iter_mut().zip(z) {
        *yi += alpha * zi;
    }
}

/// The inverse of a discrete operator computed by a dense LU decomposition
#[derive(Debug, Clone)]
pub struct DenseLuInverse {
    lu: LuDecomposition,
}

impl DenseLuInverse {
    /// Create new
    pub fn new(operator: &dyn DiscreteOperator) -> Result<Self> {
        let dense = operator.to_dense()?;
        Ok(Self {
            lu: LuDecomposition::from_array(&dense)?,
        })
    }
}

impl DiscreteOperator for DenseLuInverse {
    fn shape(&self) -> [usize; 2] {
        [self.lu.dim(), self.lu.dim()]
    }

    fn apply(
        &self,
        mode: TranspositionMode,
        x: &[c64],
        y: &mut [c64],
        alpha: c64,
        beta: c64,
    ) -> Result<()> {
        self.check_dimensions(mode, x, y)?;
        let z = apply_inverse(
            mode,
            x,
            |b| self.lu.solve(b),
            |b| self.lu.solve_transpose(b),
        )?;
        accumulate(&z, y, alpha, beta);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum LuFactor {
    Leaf(LuDecomposition),
    Split {
        children: [usize; 2],
        /// `U12 = L1^{-1} A12`
        upper: LowRankMatrix,
        /// `L21 = A21 U1^{-1}`
        lower: LowRankMatrix,
    },
}

/// Approximate inverse of an H-matrix by a hierarchical LU decomposition
///
/// Every cluster `t` with children `t1` and `t2` is factorised as
/// `[L1 0; L21 L2] [U1 U12; 0 U2]`, where `L2 U2` is the factorisation of the
/// Schur complement `A22 - L21 U12`. The Schur complement updates are low-rank
/// and are recompressed with the tolerance before they are passed down the tree.
#[derive(Debug, Clone)]
pub struct ApproximateLuInverse {
    tree: Arc<ClusterTree>,
    factors: Vec<Option<LuFactor>>,
    tolerance: f64,
}

impl ApproximateLuInverse {
    /// Create new
    ///
    /// The H-matrix must use the same cluster tree for its rows and columns.
    pub fn new(hmatrix: &HMatrix, tolerance: f64) -> Result<Self> {
        check_tolerance(tolerance)?;
        if !hmatrix.shares_trees() {
            return Err(BemError::IncompatibleSpaces(
                "the approximate LU inverse needs an H-matrix with identical row and column trees"
                    .to_string(),
            ));
        }
        let tree = hmatrix.row_tree().clone();
        let off_diagonal = tree
            .internal_nodes()
            .into_par_iter()
            .map(|node| {
                let [c1, c2] = tree.node(node).children().ok_or(BemError::DimensionMismatch {
                    expected: 2,
                    actual: 0,
                })?;
                let r1 = tree.node(c1).range();
                let r2 = tree.node(c2).range();
                let upper = compress_block(hmatrix, r1.clone(), r2.clone(), tolerance)?;
                let lower = compress_block(hmatrix, r2, r1, tolerance)?;
                Ok((node, (upper, lower)))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        let root = tree.root();
        let mut inverse = Self {
            factors: vec![None; tree.number_of_nodes()],
            tree,
            tolerance,
        };
        let mut off_diagonal = off_diagonal;
        inverse.factorise(hmatrix, root, None, &mut off_diagonal)?;
        let max_rank = inverse
            .factors
            .iter()
            .flatten()
            .map(|f| match f {
                LuFactor::Leaf(_) => 0,
                LuFactor::Split { upper, lower, .. } => usize::max(upper.rank(), lower.rank()),
            })
            .max()
            .unwrap_or(0);
        info!(
            "Approximate LU inverse of a {0}x{0} H-matrix: tolerance {tolerance:e}, maximum off-diagonal rank {max_rank}",
            inverse.tree.size()
        );
        Ok(inverse)
    }

    /// Tolerance used for the off-diagonal blocks and the Schur complement updates
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Factorise the block `A[node, node] + correction`
    fn factorise(
        &mut self,
        hmatrix: &HMatrix,
        node: usize,
        correction: Option<LowRankMatrix>,
        off_diagonal: &mut HashMap<usize, (LowRankMatrix, LowRankMatrix)>,
    ) -> Result<()> {
        let range = self.tree.node(node).range();
        let n = range.len();
        let Some([c1, c2]) = self.tree.node(node).children() else {
            let mut block = hmatrix.dense_block(range.clone(), range);
            if let Some(correction) = &correction {
                for (u, v) in correction.u().iter().zip(correction.v()) {
                    for (j, vj) in v.iter().enumerate() {
                        for (i, ui) in u.iter().enumerate() {
                            block[i + n * j] += ui * vj;
                        }
                    }
                }
            }
            self.factors[node] = Some(LuFactor::Leaf(LuDecomposition::new(n, block)?));
            return Ok(());
        };

        let n1 = self.tree.node(c1).size();
        let first = 0..n1;
        let second = n1..n;
        let restrict = |rows: &Range<usize>, cols: &Range<usize>| {
            correction
                .as_ref()
                .map(|c| c.restrict(rows.clone(), cols.clone()))
                .filter(|c| c.rank() > 0)
        };

        self.factorise(hmatrix, c1, restrict(&first, &first), off_diagonal)?;

        let (a12, a21) = off_diagonal
            .remove(&node)
            .unwrap_or_else(|| (LowRankMatrix::new([n1, n - n1]), LowRankMatrix::new([n - n1, n1])));
        let a12 = match restrict(&first, &second) {
            Some(c) => a12.concat(&c).recompress(self.tolerance),
            None => a12,
        };
        let a21 = match restrict(&second, &first) {
            Some(c) => a21.concat(&c).recompress(self.tolerance),
            None => a21,
        };

        let mut upper = LowRankMatrix::new(a12.shape());
        for (u, v) in a12.u().iter().zip(a12.v()) {
            let mut u = u.clone();
            self.lower_solve(c1, &mut u);
            upper.push(u, v.clone());
        }
        let mut lower = LowRankMatrix::new(a21.shape());
        for (p, q) in a21.u().iter().zip(a21.v()) {
            let mut q = q.clone();
            self.upper_transpose_solve(c1, &mut q);
            lower.push(p.clone(), q);
        }

        // -L21 U12 = sum_b (-sum_a p_a (q_a . u_b)) v_b^T
        let mut schur = LowRankMatrix::new([n - n1, n - n1]);
        for (u, v) in upper.u().iter().zip(upper.v()) {
            let mut column = vec![c64::zero(); n - n1];
            for (p, q) in lower.u().iter().zip(lower.v()) {
                let w: c64 = q.iter().zip(u).map(|(a, b)| a * b).sum();
                for (c, pi) in column.iter_mut().zip(p) {
                    *c -= pi * w;
                }
            }
            schur.push(column, v.clone());
        }
        let update = match restrict(&second, &second) {
            Some(c) => c.concat(&schur),
            None => schur,
        }
        .recompress(self.tolerance);
        debug!(
            "Cluster {node}: off-diagonal ranks {} and {}, Schur update rank {}",
            upper.rank(),
            lower.rank(),
            update.rank()
        );

        self.factors[node] = Some(LuFactor::Split {
            children: [c1, c2],
            upper,
            lower,
        });
        self.factorise(hmatrix, c2, Some(update).filter(|u| u.rank() > 0), off_diagonal)
    }

    /// Size of the first child of a split node
    fn first_size(&self, c1: usize) -> usize {
        self.tree.node(c1).size()
    }

    /// Overwrite `b` with `L^{-1} b` for the factor of `node`
    fn lower_solve(&self, node: usize, b: &mut [c64]) {
        match &self.factors[node] {
            Some(LuFactor::Leaf(lu)) => lu.lower_solve(b),
            Some(LuFactor::Split {
                children: [c1, c2],
                lower,
                ..
            }) => {
                let n1 = self.first_size(*c1);
                let (b1, b2) = b.split_at_mut(n1);
                self.lower_solve(*c1, b1);
                lower.apply(TranspositionMode::NoTranspose, b1, b2, -c64::new(1.0, 0.0));
                self.lower_solve(*c2, b2);
            }
            None => {}
        }
    }

    /// Overwrite `b` with `U^{-1} b` for the factor of `node`
    fn upper_solve(&self, node: usize, b: &mut [c64]) {
        match &self.factors[node] {
            Some(LuFactor::Leaf(lu)) => lu.upper_solve(b),
            Some(LuFactor::Split {
                children: [c1, c2],
                upper,
                ..
            }) => {
                let n1 = self.first_size(*c1);
                let (b1, b2) = b.split_at_mut(n1);
                self.upper_solve(*c2, b2);
                upper.apply(TranspositionMode::NoTranspose, b2, b1, -c64::new(1.0, 0.0));
                self.upper_solve(*c1, b1);
            }
            None => {}
        }
    }

    /// Overwrite `b` with `U^{-T} b` for the factor of `node`
    fn upper_transpose_solve(&self, node: usize, b: &mut [c64]) {
        match &self.factors[node] {
            Some(LuFactor::Leaf(lu)) => lu.upper_transpose_solve(b),
            Some(LuFactor::Split {
                children: [c1, c2],
                upper,
                ..
            }) => {
                let n1 = self.first_size(*c1);
                let (b1, b2) = b.split_at_mut(n1);
                self.upper_transpose_solve(*c1, b1);
                upper.apply(TranspositionMode::Transpose, b1, b2, -c64::new(1.0, 0.0));
                self.upper_transpose_solve(*c2, b2);
            }
            None => {}
        }
    }

    /// Overwrite `b` with `L^{-T} b` for the factor of `node`
    fn lower_transpose_solve(&self, node: usize, b: &mut [c64]) {
        match &self.factors[node] {
            Some(LuFactor::Leaf(lu)) => lu.lower_transpose_solve(b),
            Some(LuFactor::Split {
                children: [c1, c2],
                lower,
                ..
            }) => {
                let n1 = self.first_size(*c1);
                let (b1, b2) = b.split_at_mut(n1);
                self.lower_transpose_solve(*c2, b2);
                lower.apply(TranspositionMode::Transpose, b2, b1, -c64::new(1.0, 0.0));
                self.lower_transpose_solve(*c1, b1);
            }
            None => {}
        }
    }

    /// Solve `A x = b` or `A^T x = b` for a vector in DOF order
    fn solve(&self, b: &mut [c64], transpose: bool) -> Result<()> {
        let size = self.tree.size();
        if b.len() != size {
            return Err(BemError::DimensionMismatch {
                expected: size,
                actual: b.len(),
            });
        }
        let permutation = self.tree.permutation();
        let mut permuted = permutation.iter().map(|dof| b[*dof]).collect::<Vec<_>>();
        let root = self.tree.root();
        if transpose {
            self.upper_transpose_solve(root, &mut permuted);
            self.lower_transpose_solve(root, &mut permuted);
        } else {
            self.lower_solve(root, &mut permuted);
            self.upper_solve(root, &mut permuted);
        }
        for (dof, value) in permutation.iter().zip(permuted) {
            b[*dof] = value;
        }
        Ok(())
    }
}

/// Approximate the block of `hmatrix` with the given rows and columns, given as positions
fn compress_block(
    hmatrix: &HMatrix,
    rows: Range<usize>,
    cols: Range<usize>,
    tolerance: f64,
) -> Result<LowRankMatrix> {
    let shape = [rows.len(), cols.len()];
    let outcome = aca(
        shape,
        |i, row| {
            let start = rows.start + i;
            row.copy_from_slice(&hmatrix.dense_block(start..start + 1, cols.clone()));
            Ok(())
        },
        |j, col| {
            let start = cols.start + j;
            col.copy_from_slice(&hmatrix.dense_block(rows.clone(), start..start + 1));
            Ok(())
        },
        tolerance,
        usize::min(shape[0], shape[1]),
    )?;
    Ok(match outcome {
        AcaOutcome::Converged(matrix) | AcaOutcome::RankExceeded(matrix) => matrix,
    })
}

impl DiscreteOperator for ApproximateLuInverse {
    fn shape(&self) -> [usize; 2] {
        [self.tree.size(), self.tree.size()]
    }

    fn apply(
        &self,
        mode: TranspositionMode,
        x: &[c64],
        y: &mut [c64],
        alpha: c64,
        beta: c64,
    ) -> Result<()> {
        self.check_dimensions(mode, x, y)?;
        let z = apply_inverse(mode, x, |b| self.solve(b, false), |b| self.solve(b, true))?;
        accumulate(&z, y, alpha, beta);
        Ok(())
    }
}

/// A preconditioner for GMRES
///
/// Wraps a discrete operator that approximates the inverse of the system matrix.
#[derive(Clone)]
pub struct Preconditioner {
    operator: Arc<dyn DiscreteOperator>,
}

impl std::fmt::Debug for Preconditioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preconditioner")
            .field("shape", &self.operator.shape())
            .finish()
    }
}

impl Preconditioner {
    /// Use a discrete operator as a preconditioner
    pub fn from_operator(operator: Arc<dyn DiscreteOperator>) -> Self {
        Self { operator }
    }

    /// Approximate LU inverse of a discrete operator
    ///
    /// H-matrices are factorised hierarchically. Other operators, and
    /// H-matrices with different row and column trees, are inverted densely.
    pub fn approximate_lu(operator: &dyn DiscreteOperator, tolerance: f64) -> Result<Self> {
        check_tolerance(tolerance)?;
        let inverse: Arc<dyn DiscreteOperator> = match operator.as_hmatrix() {
            Some(hmatrix) if hmatrix.shares_trees() => {
                Arc::new(ApproximateLuInverse::new(hmatrix, tolerance)?)
            }
            _ => {
                info!("Operator is not an H-matrix with a shared cluster tree: using a dense LU inverse");
                Arc::new(DenseLuInverse::new(operator)?)
            }
        };
        Ok(Self::from_operator(inverse))
    }

    /// A block diagonal preconditioner
    pub fn block_diagonal(blocks: Vec<Arc<dyn DiscreteOperator>>) -> Self {
        Self::from_operator(Arc::new(BlockDiagonalOperator::new(blocks)))
    }

    /// The operator
    pub fn operator(&self) -> &Arc<dyn DiscreteOperator> {
        &self.operator
    }

    /// Apply the preconditioner to a vector
    pub fn apply(&self, x: &[c64]) -> Result<Vec<c64>> {
        apply_new(self.operator.as_ref(), TranspositionMode::NoTranspose, x)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assembly::{AcaOptions, RankCapPolicy};
    use crate::linalg::norm2;
    use crate::operator::DenseDiscreteOperator;
    use num::One;
    use rand::{Rng, SeedableRng};
    use rlst::{rlst_dynamic_array2, DynamicArray, RawAccessMut};

    fn points(n: usize) -> Vec<[f64; 3]> {
        (0..n)
            .map(|i| {
                let t = i as f64 / n as f64;
                let phi = 2.0 * std::f64::consts::PI * t * 7.0;
                [t.cos() * phi.cos(), t.cos() * phi.sin(), 2.0 * t - 1.0]
            })
            .collect()
    }

    /// A diagonally dominant matrix with a smooth off-diagonal kernel
    fn matrix(points: &[[f64; 3]]) -> impl Fn(usize, usize) -> c64 + Sync + '_ {
        move |i, j| {
            if i == j {
                c64::new(30.0, 1.0)
            } else {
                let d = crate::linalg::distance(&points[i], &points[j]);
                c64::new(d.cos(), d.sin()) / (1.0 + 10.0 * d)
            }
        }
    }

    fn hmatrix(n: usize, eps: f64) -> (HMatrix, DynamicArray<c64, 2>) {
        let pts = points(n);
        let f = matrix(&pts);
        let tree = Arc::new(ClusterTree::new(&pts, 8));
        let options = AcaOptions::default()
            .eps(eps)
            .eta(2.0)
            .max_rank(n)
            .rank_cap_policy(RankCapPolicy::DenseFallback);
        let h = HMatrix::assemble(
            tree.clone(),
            tree,
            &options,
            |rows, cols| {
                let mut block = rlst_dynamic_array2!(c64, [rows.len(), cols.len()]);
                for (j, c) in cols.iter().enumerate() {
                    for (i, r) in rows.iter().enumerate() {
                        block.data_mut()[i + rows.len() * j] = f(*r, *c);
                    }
                }
                Ok(block)
            },
            None,
        )
        .unwrap();
        let mut dense = rlst_dynamic_array2!(c64, [n, n]);
        for j in 0..n {
            for i in 0..n {
                dense.data_mut()[i + n * j] = f(i, j);
            }
        }
        (h, dense)
    }

    fn random_vector(n: usize, seed: u64) -> Vec<c64> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| c64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5))
            .collect()
    }

    #[test]
    fn test_approximate_lu_recovers_vector() {
        let n = 120;
        let (h, dense) = hmatrix(n, 1e-8);
        let dense_op = DenseDiscreteOperator::new(dense);
        let inverse = ApproximateLuInverse::new(&h, 1e-8).unwrap();
        let x = random_vector(n, 3);
        for mode in [
            TranspositionMode::NoTranspose,
            TranspositionMode::Transpose,
            TranspositionMode::Conjugate,
            TranspositionMode::ConjugateTranspose,
        ] {
            let b = apply_new(&dense_op, mode, &x).unwrap();
            let recovered = apply_new(&inverse, mode, &b).unwrap();
            let error = norm2(
                &recovered
                    .iter()
                    .zip(&x)
                    .map(|(a, b)| a - b)
                    .collect::<Vec<_>>(),
            );
            assert!(error < 1e-5 * norm2(&x), "{mode:?}: error {error}");
        }
    }

    #[test]
    fn test_coarse_tolerance_is_still_close() {
        let n = 120;
        let (h, dense) = hmatrix(n, 1e-8);
        let dense_op = DenseDiscreteOperator::new(dense);
        let inverse = ApproximateLuInverse::new(&h, 1e-2).unwrap();
        assert_eq!(inverse.tolerance(), 1e-2);
        let x = random_vector(n, 5);
        let b = dense_op.matvec(&x).unwrap();
        let recovered = inverse.matvec(&b).unwrap();
        let error = norm2(
            &recovered
                .iter()
                .zip(&x)
                .map(|(a, b)| a - b)
                .collect::<Vec<_>>(),
        );
        assert!(error < 0.1 * norm2(&x));
    }

    #[test]
    fn test_dense_fallback_and_alpha_beta() {
        let n = 6;
        let mut dense = rlst_dynamic_array2!(c64, [n, n]);
        for j in 0..n {
            for i in 0..n {
                dense.data_mut()[i + n * j] = if i == j {
                    c64::new(3.0, 0.0)
                } else {
                    c64::new(0.1 * (i as f64), 0.2 * (j as f64))
                };
            }
        }
        let operator = DenseDiscreteOperator::new(dense);
        let preconditioner = Preconditioner::approximate_lu(&operator, 1e-6).unwrap();
        let x = random_vector(n, 9);
        let b = operator.matvec(&x).unwrap();
        let recovered = preconditioner.apply(&b).unwrap();
        for (a, e) in recovered.iter().zip(&x) {
            assert!((a - e).norm() < 1e-12);
        }
        let mut y = vec![c64::one(); n];
        preconditioner
            .operator()
            .apply(
                TranspositionMode::NoTranspose,
                &b,
                &mut y,
                c64::new(2.0, 0.0),
                c64::new(-1.0, 0.0),
            )
            .unwrap();
        for (a, e) in y.iter().zip(&x) {
            assert!((a - (2.0 * e - 1.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_invalid_tolerance() {
        let (h, _) = hmatrix(40, 1e-6);
        assert!(matches!(
            ApproximateLuInverse::new(&h, 0.0),
            Err(BemError::InvalidArgument(_))
        ));
        assert!(Preconditioner::approximate_lu(&h, f64::NAN).is_err());
    }

    #[test]
    fn test_block_diagonal() {
        let mut a = rlst_dynamic_array2!(c64, [1, 1]);
        a.data_mut()[0] = c64::new(0.5, 0.0);
        let mut b = rlst_dynamic_array2!(c64, [2, 2]);
        b.data_mut()[0] = c64::new(2.0, 0.0);
        b.data_mut()[3] = c64::new(4.0, 0.0);
        let blocks: Vec<Arc<dyn DiscreteOperator>> = vec![
            Arc::new(DenseDiscreteOperator::new(a)),
            Arc::new(DenseDiscreteOperator::new(b)),
        ];
        let preconditioner = Preconditioner::block_diagonal(blocks);
        let y = preconditioner.apply(&[c64::one(); 3]).unwrap();
        assert_eq!(y, vec![c64::new(0.5, 0.0), c64::new(2.0, 0.0), c64::new(4.0, 0.0)]);
    }
}
