//! Discrete operators
use crate::assembly::{AssemblyDiagnostics, SparseMatrixData};
use crate::linalg::gemv;
use crate::traits::{scale_output, DiscreteOperator};
use crate::types::{BemError, Result, TranspositionMode};
use cauchy::c64;
use num::{One, Zero};
use rlst::{DynamicArray, RawAccess, Shape};
use std::sync::Arc;

/// A dense matrix
#[derive(Debug, Clone)]
pub struct DenseDiscreteOperator {
    shape: [usize; 2],
    data: Vec<c64>,
    diagnostics: AssemblyDiagnostics,
}

impl DenseDiscreteOperator {
    /// Create new
    pub fn new(matrix: DynamicArray<c64, 2>) -> Self {
        let shape = matrix.shape();
        let entries = shape[0] * shape[1];
        Self::with_diagnostics(
            matrix,
            AssemblyDiagnostics {
                dense_blocks: 1,
                stored_entries: entries,
                total_entries: entries,
                ..Default::default()
            },
        )
    }

    /// Create new with diagnostics from assembly
    pub fn with_diagnostics(matrix: DynamicArray<c64, 2>, diagnostics: AssemblyDiagnostics) -> Self {
        Self {
            shape: matrix.shape(),
            data: matrix.data().to_vec(),
            diagnostics,
        }
    }

    /// The column-major entries
    pub fn data(&self) -> &[c64] {
        &self.data
    }
}

impl DiscreteOperator for DenseDiscreteOperator {
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
        scale_output(y, beta);
        gemv(mode, &self.data, self.shape, x, y, alpha);
        Ok(())
    }

    fn diagnostics(&self) -> AssemblyDiagnostics {
        self.diagnostics.clone()
    }
}

/// A sparse matrix stored as triplets
#[derive(Debug, Clone)]
pub struct SparseDiscreteOperator {
    matrix: SparseMatrixData,
}

impl SparseDiscreteOperator {
    /// Create new
    pub fn new(matrix: SparseMatrixData) -> Self {
        Self { matrix }
    }

    /// The triplets
    pub fn matrix(&self) -> &SparseMatrixData {
        &self.matrix
    }
}

impl DiscreteOperator for SparseDiscreteOperator {
    fn shape(&self) -> [usize; 2] {
        self.matrix.shape
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
        scale_output(y, beta);
        let m = &self.matrix;
        for ((row, col), value) in m.rows.iter().zip(&m.cols).zip(&m.data) {
            let value = if mode.is_conjugated() {
                value.conj()
            } else {
                *value
            };
            if mode.is_transposed() {
                y[*col] += alpha * value * x[*row];
            } else {
                y[*row] += alpha * value * x[*col];
            }
        }
        Ok(())
    }

    fn diagnostics(&self) -> AssemblyDiagnostics {
        AssemblyDiagnostics {
            stored_entries: self.matrix.len(),
            total_entries: self.matrix.shape[0] * self.matrix.shape[1],
            ..Default::default()
        }
    }
}

/// The sum of discrete operators, evaluated when applied
pub struct DiscreteOperatorSum {
    shape: [usize; 2],
    terms: Vec<Arc<dyn DiscreteOperator>>,
}

impl DiscreteOperatorSum {
    /// Create new
    pub fn new(terms: Vec<Arc<dyn DiscreteOperator>>) -> Result<Self> {
        let Some(first) = terms.first() else {
            return Err(BemError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        };
        let shape = first.shape();
        for term in &terms {
            let [rows, cols] = term.shape();
            if rows != shape[0] {
                return Err(BemError::DimensionMismatch {
                    expected: shape[0],
                    actual: rows,
                });
            }
            if cols != shape[1] {
                return Err(BemError::DimensionMismatch {
                    expected: shape[1],
                    actual: cols,
                });
            }
        }
        Ok(Self { shape, terms })
    }

    /// The terms
    pub fn terms(&self) -> &[Arc<dyn DiscreteOperator>] {
        &self.terms
    }
}

impl DiscreteOperator for DiscreteOperatorSum {
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
        scale_output(y, beta);
        for term in &self.terms {
            term.apply(mode, x, y, alpha, c64::one())?;
        }
        Ok(())
    }

    fn diagnostics(&self) -> AssemblyDiagnostics {
        let mut diagnostics = AssemblyDiagnostics::default();
        for term in &self.terms {
            diagnostics.merge(&term.diagnostics());
        }
        diagnostics
    }
}

/// A discrete operator multiplied by a scalar, evaluated when applied
pub struct ScaledDiscreteOperator {
    scalar: c64,
    operator: Arc<dyn DiscreteOperator>,
}

impl ScaledDiscreteOperator {
    /// Create new
    pub fn new(scalar: c64, operator: Arc<dyn DiscreteOperator>) -> Self {
        Self { scalar, operator }
    }

    /// The scalar
    pub fn scalar(&self) -> c64 {
        self.scalar
    }

    /// The operator that is scaled
    pub fn operator(&self) -> &Arc<dyn DiscreteOperator> {
        &self.operator
    }
}

impl DiscreteOperator for ScaledDiscreteOperator {
    fn shape(&self) -> [usize; 2] {
        self.operator.shape()
    }

    fn apply(
        &self,
        mode: TranspositionMode,
        x: &[c64],
        y: &mut [c64],
        alpha: c64,
        beta: c64,
    ) -> Result<()> {
        let scalar = if mode.is_conjugated() {
            self.scalar.conj()
        } else {
            self.scalar
        };
        self.operator.apply(mode, x, y, alpha * scalar, beta)
    }

    fn diagnostics(&self) -> AssemblyDiagnostics {
        self.operator.diagnostics()
    }
}

/// A block diagonal operator
pub struct BlockDiagonalOperator {
    shape: [usize; 2],
    blocks: Vec<Arc<dyn DiscreteOperator>>,
    offsets: Vec<[usize; 2]>,
}

impl BlockDiagonalOperator {
    /// Create new
    pub fn new(blocks: Vec<Arc<dyn DiscreteOperator>>) -> Self {
        let mut offsets = Vec::with_capacity(blocks.len());
        let mut shape = [0, 0];
        for block in &blocks {
            offsets.push(shape);
            let [rows, cols] = block.shape();
            shape[0] += rows;
            shape[1] += cols;
        }
        Self {
            shape,
            blocks,
            offsets,
        }
    }

    /// The diagonal blocks
    pub fn blocks(&self) -> &[Arc<dyn DiscreteOperator>] {
        &self.blocks
    }
}

impl DiscreteOperator for BlockDiagonalOperator {
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
        let (input, output) = if mode.is_transposed() { (0, 1) } else { (1, 0) };
        for (block, offset) in self.blocks.iter().zip(&self.offsets) {
            let shape = block.shape();
            let x_block = &x[offset[input]..offset[input] + shape[input]];
            let y_block = &mut y[offset[output]..offset[output] + shape[output]];
            block.apply(mode, x_block, y_block, alpha, beta)?;
        }
        Ok(())
    }

    fn diagnostics(&self) -> AssemblyDiagnostics {
        let mut diagnostics = AssemblyDiagnostics::default();
        for block in &self.blocks {
            diagnostics.merge(&block.diagnostics());
        }
        diagnostics.total_entries = self.shape[0] * self.shape[1];
        diagnostics
    }
}

/// The identity map on vectors of a given length
#[derive(Debug, Clone, Copy)]
pub struct IdentityOperator {
    size: usize,
}

impl IdentityOperator {
    /// Create new
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl DiscreteOperator for IdentityOperator {
    fn shape(&self) -> [usize; 2] {
        [self.size, self.size]
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
        scale_output(y, beta);
        for (yi, xi) in y.iter_mut().zip(x) {
            *yi += alpha * xi;
        }
        Ok(())
    }
}

/// Compute `op(A) x` into a new vector
pub(crate) fn apply_new(
    operator: &dyn DiscreteOperator,
    mode: TranspositionMode,
    x: &[c64],
) -> Result<Vec<c64>> {
    let size = if mode.is_transposed() {
        operator.shape()[1]
    } else {
        operator.shape()[0]
    };
    let mut y = vec![c64::zero(); size];
    operator.apply(mode, x, &mut y, c64::one(), c64::zero())?;
    Ok(y)
}
