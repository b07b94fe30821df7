//! Boundary operator assembly
pub mod aca;
pub mod boundary;
pub mod cluster_tree;
pub(crate) mod common;
pub mod hmatrix;
pub mod kernels;
pub mod potential;

pub use crate::quadrature::{AccuracyOptions, QuadratureOrder};
pub use common::SparseMatrixData;

use crate::function::RaviartThomasSpace;
use crate::operator::{
    AssembledBoundaryOperator, BoundaryOperator, DenseDiscreteOperator, DiscreteOperatorSum,
    OperatorKind, ScaledDiscreteOperator, SparseDiscreteOperator,
};
use crate::quadrature::QuadratureStrategy;
use crate::traits::{BoundaryIntegrand, DiscreteOperator, FunctionSpace};
use crate::types::{AbortSignal, BemError, Result};
use boundary::integrands::{DoubleLayerBoundaryIntegrand, SingleLayerBoundaryIntegrand};
use boundary::BoundaryAssembler;
use cluster_tree::ClusterTree;
use hmatrix::HMatrix;
use kernels::HelmholtzKernel;
use log::{info, warn};
use std::sync::Arc;

/// What to do when ACA does not converge within the maximum rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankCapPolicy {
    /// Assemble the block densely and report it as a warning
    #[default]
    DenseFallback,
    /// Fail with [`BemError::CompressionRankExceeded`]
    Fail,
    /// Keep the truncated approximation and report it as a warning
    Truncate,
}

/// Options for adaptive cross approximation
#[derive(Debug, Clone, PartialEq)]
pub struct AcaOptions {
    /// Relative tolerance of each compressed block
    pub eps: f64,
    /// Admissibility parameter: a block is compressed if `min(diam) <= eta * dist`
    pub eta: f64,
    /// Maximum number of DOFs in a leaf of the cluster tree
    pub min_block_size: usize,
    /// Maximum rank of a compressed block
    pub max_rank: usize,
    /// Handling of blocks that exceed the maximum rank
    pub rank_cap_policy: RankCapPolicy,
}

impl Default for AcaOptions {
    fn default() -> Self {
        Self {
            eps: 1e-4,
            eta: 1.2,
            min_block_size: 16,
            max_rank: 30,
            rank_cap_policy: RankCapPolicy::default(),
        }
    }
}

impl AcaOptions {
    /// Set the tolerance
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }
    /// Set the admissibility parameter
    pub fn eta(mut self, eta: f64) -> Self {
        self.eta = eta;
        self
    }
    /// Set the leaf size of the cluster tree
    pub fn min_block_size(mut self, size: usize) -> Self {
        self.min_block_size = size;
        self
    }
    /// Set the maximum rank
    pub fn max_rank(mut self, rank: usize) -> Self {
        self.max_rank = rank;
        self
    }
    /// Set the rank cap policy
    pub fn rank_cap_policy(mut self, policy: RankCapPolicy) -> Self {
        self.rank_cap_policy = policy;
        self
    }
}

/// How integral operators are stored
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AssemblyMode {
    /// Dense matrix
    #[default]
    Dense,
    /// H-matrix compressed with adaptive cross approximation
    Aca(AcaOptions),
}

/// Options for assembly
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyOptions {
    /// Storage of integral operators
    pub mode: AssemblyMode,
    /// Maximum number of cells or cell pairs in a batch sent to a worker
    pub batch_size: usize,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            mode: AssemblyMode::Dense,
            batch_size: 128,
        }
    }
}

impl AssemblyOptions {
    /// Set the assembly mode
    pub fn mode(mut self, mode: AssemblyMode) -> Self {
        self.mode = mode;
        self
    }
    /// Set the batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }
}

/// Everything assembly needs besides the operator
#[derive(Debug, Clone, Default)]
pub struct AssemblyContext {
    /// Quadrature accuracy
    pub accuracy: AccuracyOptions,
    /// Assembly options
    pub options: AssemblyOptions,
    /// Signal that aborts assembly between batches or blocks
    pub abort: Option<AbortSignal>,
}

impl AssemblyContext {
    /// Create new
    pub fn new(accuracy: AccuracyOptions, options: AssemblyOptions) -> Self {
        Self {
            accuracy,
            options,
            abort: None,
        }
    }
    /// Context for dense assembly with default accuracy
    pub fn dense() -> Self {
        Self::default()
    }
    /// Context for H-matrix assembly with default accuracy
    pub fn aca(options: AcaOptions) -> Self {
        Self::new(
            AccuracyOptions::default(),
            AssemblyOptions::default().mode(AssemblyMode::Aca(options)),
        )
    }
    /// Attach an abort signal
    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = Some(abort);
        self
    }
}

/// Summary of how an operator was assembled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyDiagnostics {
    /// Number of dense blocks
    pub dense_blocks: usize,
    /// Number of low-rank blocks
    pub low_rank_blocks: usize,
    /// Number of admissible blocks stored densely because ACA hit the rank cap
    pub dense_fallbacks: usize,
    /// Number of admissible blocks whose approximation was truncated at the rank cap
    pub truncated_blocks: usize,
    /// Number of cell pair integrals whose quadrature order was clamped
    pub clamped_pairs: usize,
    /// Number of stored matrix entries
    pub stored_entries: usize,
    /// Number of entries of the full matrix
    pub total_entries: usize,
}

impl AssemblyDiagnostics {
    /// Stored entries divided by the number of entries of the full matrix
    pub fn compression_ratio(&self) -> f64 {
        if self.total_entries == 0 {
            1.0
        } else {
            self.stored_entries as f64 / self.total_entries as f64
        }
    }

    /// Add the diagnostics of another operator
    pub fn merge(&mut self, other: &AssemblyDiagnostics) {
        self.dense_blocks += other.dense_blocks;
        self.low_rank_blocks += other.low_rank_blocks;
        self.dense_fallbacks += other.dense_fallbacks;
        self.truncated_blocks += other.truncated_blocks;
        self.clamped_pairs += other.clamped_pairs;
        self.stored_entries += other.stored_entries;
        self.total_entries += other.total_entries;
    }
}

/// Assemble a boundary operator
///
/// Elementary integral operators are stored densely or as H-matrices
/// depending on `context`. The identity is always stored as a sparse matrix.
/// Sums and scalings are not materialised: they are combined when applied.
pub fn assemble(
    operator: &BoundaryOperator,
    context: &AssemblyContext,
) -> Result<AssembledBoundaryOperator> {
    let strategy = QuadratureStrategy::new(&context.accuracy)?;
    let weak_form = assemble_weak_form(operator, context, &strategy)?;
    let diagnostics = weak_form.diagnostics();
    info!(
        "Assembled {} ({}x{}): {} dense and {} low-rank blocks, compression ratio {:.3}",
        operator.label(),
        weak_form.shape()[0],
        weak_form.shape()[1],
        diagnostics.dense_blocks,
        diagnostics.low_rank_blocks,
        diagnostics.compression_ratio()
    );
    Ok(AssembledBoundaryOperator::new(operator.clone(), weak_form))
}

fn assemble_weak_form(
    operator: &BoundaryOperator,
    context: &AssemblyContext,
    strategy: &QuadratureStrategy,
) -> Result<Arc<dyn DiscreteOperator>> {
    match operator.kind() {
        OperatorKind::Identity { pairing } => {
            let matrix = boundary::assemble_identity(
                operator.dual_to_range().as_ref(),
                operator.domain().as_ref(),
                *pairing,
                strategy,
            )?;
            Ok(Arc::new(SparseDiscreteOperator::new(matrix)))
        }
        OperatorKind::SingleLayer { wavenumber } => assemble_integral_operator(
            SingleLayerBoundaryIntegrand::new(*wavenumber),
            *wavenumber,
            operator,
            context,
            strategy,
        ),
        OperatorKind::DoubleLayer { wavenumber } => assemble_integral_operator(
            DoubleLayerBoundaryIntegrand::new(),
            *wavenumber,
            operator,
            context,
            strategy,
        ),
        OperatorKind::Scaled { scalar, operator } => Ok(Arc::new(ScaledDiscreteOperator::new(
            *scalar,
            assemble_weak_form(operator, context, strategy)?,
        ))),
        OperatorKind::Sum { left, right } => {
            left.check_summable(right)?;
            let terms = vec![
                assemble_weak_form(left, context, strategy)?,
                assemble_weak_form(right, context, strategy)?,
            ];
            Ok(Arc::new(DiscreteOperatorSum::new(terms)?))
        }
    }
}

/// Cluster trees for the test and trial DOFs, shared if the DOF positions coincide
fn cluster_trees(
    test_space: &RaviartThomasSpace,
    trial_space: &RaviartThomasSpace,
    min_block_size: usize,
) -> (Arc<ClusterTree>, Arc<ClusterTree>) {
    let centres = |space: &RaviartThomasSpace| {
        (0..space.global_size())
            .map(|dof| space.dof_centre(dof))
            .collect::<Vec<_>>()
    };
    let test_centres = centres(test_space);
    let trial_centres = centres(trial_space);
    let test_tree = Arc::new(ClusterTree::new(&test_centres, min_block_size));
    if test_centres == trial_centres {
        (test_tree.clone(), test_tree)
    } else {
        let trial_tree = Arc::new(ClusterTree::new(&trial_centres, min_block_size));
        (test_tree, trial_tree)
    }
}

fn assemble_integral_operator<I: BoundaryIntegrand>(
    integrand: I,
    wavenumber: f64,
    operator: &BoundaryOperator,
    context: &AssemblyContext,
    strategy: &QuadratureStrategy,
) -> Result<Arc<dyn DiscreteOperator>> {
    let test_space = operator.dual_to_range();
    let trial_space = operator.domain();
    let abort = context.abort.as_ref();
    let assembler = BoundaryAssembler::new(
        integrand,
        HelmholtzKernel::new(wavenumber),
        strategy,
        test_space.as_ref(),
        trial_space.as_ref(),
        context.options.batch_size,
    )?;

    let result: Arc<dyn DiscreteOperator> = match &context.options.mode {
        AssemblyMode::Dense => {
            let matrix = assembler.assemble_into_dense(abort)?;
            let entries = test_space.global_size() * trial_space.global_size();
            let diagnostics = AssemblyDiagnostics {
                dense_blocks: 1,
                clamped_pairs: assembler.clamped_pairs(),
                stored_entries: entries,
                total_entries: entries,
                ..Default::default()
            };
            Arc::new(DenseDiscreteOperator::with_diagnostics(matrix, diagnostics))
        }
        AssemblyMode::Aca(options) => {
            let (row_tree, col_tree) =
                cluster_trees(test_space, trial_space, options.min_block_size);
            let mut hmatrix = HMatrix::assemble(
                row_tree,
                col_tree,
                options,
                |rows, cols| assembler.assemble_entries(rows, cols),
                abort,
            )?;
            hmatrix.set_clamped_pairs(assembler.clamped_pairs());
            Arc::new(hmatrix)
        }
    };
    if assembler.clamped_pairs() > 0 {
        warn!(
            "{}",
            BemError::SingularIntegrationFailure(format!(
                "quadrature order clamped to the maximum for {} cell pairs of {}",
                assembler.clamped_pairs(),
                operator.label()
            ))
        );
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = AcaOptions::default();
        assert_eq!(options.eps, 1e-4);
        assert_eq!(options.max_rank, 30);
        assert_eq!(options.rank_cap_policy, RankCapPolicy::DenseFallback);
        assert_eq!(AssemblyOptions::default().batch_size, 128);
        assert_eq!(AssemblyOptions::default().mode, AssemblyMode::Dense);
    }

    #[test]
    fn test_diagnostics_merge() {
        let mut a = AssemblyDiagnostics {
            dense_blocks: 2,
            stored_entries: 10,
            total_entries: 100,
            ..Default::default()
        };
        let b = AssemblyDiagnostics {
            low_rank_blocks: 3,
            dense_fallbacks: 1,
            stored_entries: 30,
            total_entries: 100,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.dense_blocks, 2);
        assert_eq!(a.low_rank_blocks, 3);
        assert_eq!(a.dense_fallbacks, 1);
        assert_eq!(a.compression_ratio(), 0.2);
        assert_eq!(AssemblyDiagnostics::default().compression_ratio(), 1.0);
    }
}
