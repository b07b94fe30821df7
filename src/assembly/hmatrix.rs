//! Hierarchical matrices compressed with adaptive cross approximation
use crate::assembly::aca::{aca, AcaOutcome, LowRankMatrix};
use crate::assembly::cluster_tree::{BlockClusterTree, ClusterTree};
use crate::assembly::{AcaOptions, AssemblyDiagnostics, RankCapPolicy};
use crate::linalg::gemv;
use crate::traits::{scale_output, DiscreteOperator};
use crate::types::{check_abort, AbortSignal, BemError, Result, TranspositionMode};
use cauchy::c64;
use log::warn;
use num::Zero;
use rayon::prelude::*;
use rlst::{DynamicArray, RawAccess};
use std::ops::Range;
use std::sync::Arc;

/// Storage of one block
#[derive(Debug, Clone)]
pub enum BlockData {
    /// Dense column-major block
    Dense {
        /// Number of rows and columns
        shape: [usize; 2],
        /// Entries
        data: Vec<c64>,
    },
    /// Low-rank block
    LowRank(LowRankMatrix),
}

impl BlockData {
    fn storage(&self) -> usize {
        match self {
            BlockData::Dense { data, .. } => data.len(),
            BlockData::LowRank(m) => m.storage(),
        }
    }

    fn apply(&self, mode: TranspositionMode, x: &[c64], y: &mut [c64], alpha: c64) {
        match self {
            BlockData::Dense { shape, data } => gemv(mode, data, *shape, x, y, alpha),
            BlockData::LowRank(m) => m.apply(mode, x, y, alpha),
        }
    }

    fn entry(&self, i: usize, j: usize) -> c64 {
        match self {
            BlockData::Dense { shape, data } => data[i + shape[0] * j],
            BlockData::LowRank(m) => m.entry(i, j),
        }
    }
}

/// A block of an H-matrix
#[derive(Debug, Clone)]
pub struct HBlock {
    row_node: usize,
    col_node: usize,
    data: BlockData,
}

impl HBlock {
    /// Node of the row cluster tree
    pub fn row_node(&self) -> usize {
        self.row_node
    }
    /// Node of the column cluster tree
    pub fn col_node(&self) -> usize {
        self.col_node
    }
    /// The stored data
    pub fn data(&self) -> &BlockData {
        &self.data
    }
}

/// What happened when a block was assembled
enum BlockKind {
    Dense,
    LowRank,
    DenseFallback,
    Truncated,
}

/// An H-matrix
///
/// Rows and columns are indexed by DOFs. Each block covers the DOFs of a
/// pair of cluster tree nodes.
#[derive(Debug, Clone)]
pub struct HMatrix {
    shape: [usize; 2],
    row_tree: Arc<ClusterTree>,
    col_tree: Arc<ClusterTree>,
    blocks: Vec<HBlock>,
    diagnostics: AssemblyDiagnostics,
}

impl HMatrix {
    /// Assemble an H-matrix
    ///
    /// `entries(rows, cols)` must return the dense sub-matrix with the given
    /// row and column DOFs. Admissible blocks are compressed with ACA and
    /// blocks are assembled in parallel.
    pub fn assemble<F>(
        row_tree: Arc<ClusterTree>,
        col_tree: Arc<ClusterTree>,
        options: &AcaOptions,
        entries: F,
        abort: Option<&AbortSignal>,
    ) -> Result<Self>
    where
        F: Fn(&[usize], &[usize]) -> Result<DynamicArray<c64, 2>> + Sync,
    {
        let block_tree = BlockClusterTree::new(&row_tree, &col_tree, options.eta);
        let assembled = block_tree
            .blocks()
            .par_iter()
            .map(|block| {
                check_abort(abort)?;
                let rows = row_tree.indices(block.row);
                let cols = col_tree.indices(block.col);
                let (data, kind) = if block.admissible {
                    compress_block(rows, cols, options, &entries)?
                } else {
                    (assemble_dense(rows, cols, &entries)?, BlockKind::Dense)
                };
                Ok((
                    HBlock {
                        row_node: block.row,
                        col_node: block.col,
                        data,
                    },
                    kind,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let shape = [row_tree.size(), col_tree.size()];
        let mut diagnostics = AssemblyDiagnostics {
            total_entries: shape[0] * shape[1],
            ..Default::default()
        };
        let mut blocks = Vec::with_capacity(assembled.len());
        for (block, kind) in assembled {
            match kind {
                BlockKind::Dense => diagnostics.dense_blocks += 1,
                BlockKind::LowRank => diagnostics.low_rank_blocks += 1,
                BlockKind::DenseFallback => {
                    diagnostics.dense_blocks += 1;
                    diagnostics.dense_fallbacks += 1;
                }
                BlockKind::Truncated => {
                    diagnostics.low_rank_blocks += 1;
                    diagnostics.truncated_blocks += 1;
                }
            }
            diagnostics.stored_entries += block.data.storage();
            blocks.push(block);
        }

        Ok(Self {
            shape,
            row_tree,
            col_tree,
            blocks,
            diagnostics,
        })
    }

    /// Record the number of cell pairs whose quadrature order was clamped
    pub fn set_clamped_pairs(&mut self, clamped_pairs: usize) {
        self.diagnostics.clamped_pairs = clamped_pairs;
    }

    /// The row cluster tree
    pub fn row_tree(&self) -> &Arc<ClusterTree> {
        &self.row_tree
    }

    /// The column cluster tree
    pub fn col_tree(&self) -> &Arc<ClusterTree> {
        &self.col_tree
    }

    /// Check if rows and columns use the same cluster tree
    pub fn shares_trees(&self) -> bool {
        Arc::ptr_eq(&self.row_tree, &self.col_tree)
    }

    /// The blocks
    pub fn blocks(&self) -> &[HBlock] {
        &self.blocks
    }

    /// The largest rank of a low-rank block
    pub fn max_rank(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| match &b.data {
                BlockData::LowRank(m) => m.rank(),
                BlockData::Dense { .. } => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Dense sub-matrix, with rows and columns given as ranges of positions in the cluster tree permutations
    ///
    /// The output is column-major.
    pub fn dense_block(&self, rows: Range<usize>, cols: Range<usize>) -> Vec<c64> {
        let nrows = rows.len();
        let mut output = vec![c64::zero(); nrows * cols.len()];
        for block in &self.blocks {
            let block_rows = self.row_tree.node(block.row_node).range();
            let block_cols = self.col_tree.node(block.col_node).range();
            let r = intersect(&rows, &block_rows);
            let c = intersect(&cols, &block_cols);
            if r.is_empty() || c.is_empty() {
                continue;
            }
            for j in c.clone() {
                for i in r.clone() {
                    output[(i - rows.start) + nrows * (j - cols.start)] += block
                        .data
                        .entry(i - block_rows.start, j - block_cols.start);
                }
            }
        }
        output
    }
}

fn intersect(a: &Range<usize>, b: &Range<usize>) -> Range<usize> {
    let start = usize::max(a.start, b.start);
    let end = usize::min(a.end, b.end).max(start);
    start..end
}

fn assemble_dense<F>(rows: &[usize], cols: &[usize], entries: &F) -> Result<BlockData>
where
    F: Fn(&[usize], &[usize]) -> Result<DynamicArray<c64, 2>> + Sync,
{
    Ok(BlockData::Dense {
        shape: [rows.len(), cols.len()],
        data: entries(rows, cols)?.data().to_vec(),
    })
}

fn compress_block<F>(
    rows: &[usize],
    cols: &[usize],
    options: &AcaOptions,
    entries: &F,
) -> Result<(BlockData, BlockKind)>
where
    F: Fn(&[usize], &[usize]) -> Result<DynamicArray<c64, 2>> + Sync,
{
    let shape = [rows.len(), cols.len()];
    let outcome = aca(
        shape,
        |i, buffer| {
            buffer.copy_from_slice(entries(&rows[i..i + 1], cols)?.data());
            Ok(())
        },
        |j, buffer| {
            buffer.copy_from_slice(entries(rows, &cols[j..j + 1])?.data());
            Ok(())
        },
        options.eps,
        options.max_rank,
    )?;
    match outcome {
        AcaOutcome::Converged(m) => {
            if m.storage() >= shape[0] * shape[1] {
                Ok((assemble_dense(rows, cols, entries)?, BlockKind::Dense))
            } else {
                Ok((BlockData::LowRank(m), BlockKind::LowRank))
            }
        }
        AcaOutcome::RankExceeded(m) => {
            let error = BemError::CompressionRankExceeded {
                rows: shape[0],
                cols: shape[1],
                max_rank: options.max_rank,
            };
            match options.rank_cap_policy {
                RankCapPolicy::Fail => Err(error),
                RankCapPolicy::DenseFallback => {
                    warn!("{error}; assembling the block densely");
                    Ok((assemble_dense(rows, cols, entries)?, BlockKind::DenseFallback))
                }
                RankCapPolicy::Truncate => {
                    warn!("{error}; keeping the truncated approximation");
                    Ok((BlockData::LowRank(m), BlockKind::Truncated))
                }
            }
        }
    }
}

impl DiscreteOperator for HMatrix {
    fn shape(&self) -> [usize; 2] {
        self.shape
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
        let (input_tree, output_tree) = if mode.is_transposed() {
            (&self.row_tree, &self.col_tree)
        } else {
            (&self.col_tree, &self.row_tree)
        };
        let contributions = self
            .blocks
            .par_iter()
            .map(|block| {
                let (input_node, output_node) = if mode.is_transposed() {
                    (block.row_node, block.col_node)
                } else {
                    (block.col_node, block.row_node)
                };
                let local_x = input_tree
                    .indices(input_node)
                    .iter()
                    .map(|dof| x[*dof])
                    .collect::<Vec<_>>();
                let mut local_y = vec![c64::zero(); output_tree.node(output_node).size()];
                block.data.apply(mode, &local_x, &mut local_y, alpha);
                (output_node, local_y)
            })
            .collect::<Vec<_>>();

        scale_output(y, beta);
        for (node, local_y) in contributions {
            for (dof, value) in output_tree.indices(node).iter().zip(local_y) {
                y[*dof] += value;
            }
        }
        Ok(())
    }

    fn as_hmatrix(&self) -> Option<&HMatrix> {
        Some(self)
    }

    fn diagnostics(&self) -> AssemblyDiagnostics {
        self.diagnostics.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::shapes::regular_sphere;
    use crate::linalg::distance;
    use approx::assert_relative_eq;
    use rlst::{rlst_dynamic_array2, RawAccessMut};

    fn kernel_entries(
        points: &[[f64; 3]],
    ) -> impl Fn(&[usize], &[usize]) -> Result<DynamicArray<c64, 2>> + Sync + '_ {
        move |rows, cols| {
            let mut output = rlst_dynamic_array2!(c64, [rows.len(), cols.len()]);
            let data = output.data_mut();
            for (j, c) in cols.iter().enumerate() {
                for (i, r) in rows.iter().enumerate() {
                    let d = distance(&points[*r], &points[*c]);
                    data[i + rows.len() * j] = if d == 0.0 {
                        c64::new(10.0, 0.0)
                    } else {
                        c64::new(0.0, d).exp() / d
                    };
                }
            }
            Ok(output)
        }
    }

    fn setup_on_sphere(level: u32, options: &AcaOptions) -> (Vec<[f64; 3]>, HMatrix) {
        let points = regular_sphere(level).vertices().to_vec();
        let tree = Arc::new(ClusterTree::new(&points, options.min_block_size));
        let hmatrix = HMatrix::assemble(
            tree.clone(),
            tree,
            options,
            kernel_entries(&points),
            None,
        )
        .unwrap();
        (points, hmatrix)
    }

    fn setup(options: &AcaOptions) -> (Vec<[f64; 3]>, HMatrix) {
        setup_on_sphere(3, options)
    }

    #[test]
    fn test_hmatrix_matvec() {
        // Blocks of 8 DOFs on the finer sphere are large enough for ACA to pay off
        let options = AcaOptions::default().eps(1e-6).min_block_size(8);
        let (points, hmatrix) = setup_on_sphere(4, &options);
        let n = points.len();
        let all = (0..n).collect::<Vec<_>>();
        let dense = kernel_entries(&points)(&all, &all).unwrap();

        let diagnostics = hmatrix.diagnostics();
        assert!(diagnostics.low_rank_blocks > 0);
        assert!(diagnostics.compression_ratio() < 1.0);
        assert!(hmatrix.shares_trees());

        let x = (0..n)
            .map(|i| c64::new((i as f64).cos(), (i as f64 * 0.3).sin()))
            .collect::<Vec<_>>();
        for mode in [
            TranspositionMode::NoTranspose,
            TranspositionMode::Conjugate,
            TranspositionMode::Transpose,
            TranspositionMode::ConjugateTranspose,
        ] {
            let mut expected = vec![c64::zero(); n];
            gemv(mode, dense.data(), [n, n], &x, &mut expected, c64::new(1.0, 0.0));
            let mut y = vec![c64::new(1.0, 0.0); n];
            hmatrix
                .apply(mode, &x, &mut y, c64::new(1.0, 0.0), c64::zero())
                .unwrap();
            let error = y
                .iter()
                .zip(&expected)
                .map(|(a, b)| (a - b).norm_sqr())
                .sum::<f64>()
                .sqrt();
            let norm = expected.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
            assert!(error < 1e-4 * norm);
        }
    }

    #[test]
    fn test_dense_block() {
        let options = AcaOptions::default().eps(1e-8);
        let (points, hmatrix) = setup(&options);
        let perm = hmatrix.row_tree().permutation().to_vec();
        let block = hmatrix.dense_block(3..20, 40..47);
        let expected = kernel_entries(&points)(&perm[3..20], &perm[40..47]).unwrap();
        for (a, b) in block.iter().zip(expected.data()) {
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_rank_cap_policies() {
        let base = AcaOptions::default().eps(1e-12).max_rank(1);
        let (_, fallback) = setup(&base.clone().rank_cap_policy(RankCapPolicy::DenseFallback));
        assert!(fallback.diagnostics().dense_fallbacks > 0);
        assert_eq!(fallback.diagnostics().low_rank_blocks, 0);

        let (_, truncated) = setup(&base.clone().rank_cap_policy(RankCapPolicy::Truncate));
        assert!(truncated.diagnostics().truncated_blocks > 0);
        assert_eq!(truncated.max_rank(), 1);

        let points = regular_sphere(3).vertices().to_vec();
        let tree = Arc::new(ClusterTree::new(&points, base.min_block_size));
        let result = HMatrix::assemble(
            tree.clone(),
            tree,
            &base.rank_cap_policy(RankCapPolicy::Fail),
            kernel_entries(&points),
            None,
        );
        assert!(matches!(
            result,
            Err(BemError::CompressionRankExceeded { max_rank: 1, .. })
        ));
    }

    #[test]
    fn test_abort() {
        let points = regular_sphere(2).vertices().to_vec();
        let tree = Arc::new(ClusterTree::new(&points, 8));
        let signal = AbortSignal::new();
        signal.abort();
        let result = HMatrix::assemble(
            tree.clone(),
            tree,
            &AcaOptions::default(),
            kernel_entries(&points),
            Some(&signal),
        );
        assert!(matches!(result, Err(BemError::Aborted)));
    }
}
