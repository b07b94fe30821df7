//! Discrete operators
use crate::assembly::hmatrix::HMatrix;
use crate::assembly::AssemblyDiagnostics;
use crate::types::{BemError, Result, TranspositionMode};
use cauchy::c64;
use num::{One, Zero};
use rlst::{rlst_dynamic_array2, DynamicArray, RawAccessMut};

/// A linear map between coefficient vectors
pub trait DiscreteOperator: Send + Sync {
    /// Number of rows and columns
    fn shape(&self) -> [usize; 2];

    /// Compute `y = alpha op(A) x + beta y`, where `op` is given by `mode`
    fn apply(
        &self,
        mode: TranspositionMode,
        x: &[c64],
        y: &mut [c64],
        alpha: c64,
        beta: c64,
    ) -> Result<()>;

    /// Compute `A x`
    fn matvec(&self, x: &[c64]) -> Result<Vec<c64>> {
        let mut y = vec![c64::zero(); self.shape()[0]];
        self.apply(
            TranspositionMode::NoTranspose,
            x,
            &mut y,
            c64::one(),
            c64::zero(),
        )?;
        Ok(y)
    }

    /// Materialise the operator as a dense matrix
    fn to_dense(&self) -> Result<DynamicArray<c64, 2>> {
        let [rows, cols] = self.shape();
        let mut output = rlst_dynamic_array2!(c64, [rows, cols]);
        let mut unit = vec![c64::zero(); cols];
        for j in 0..cols {
            unit[j] = c64::one();
            let column = self.matvec(&unit)?;
            output.data_mut()[j * rows..(j + 1) * rows].copy_from_slice(&column);
            unit[j] = c64::zero();
        }
        Ok(output)
    }

    /// Get the operator as an H-matrix, if it is stored as one
    fn as_hmatrix(&self) -> Option<&HMatrix> {
        None
    }

    /// Assembly diagnostics
    fn diagnostics(&self) -> AssemblyDiagnostics {
        AssemblyDiagnostics::default()
    }

    /// Check the input and output sizes for an application with a given mode
    fn check_dimensions(&self, mode: TranspositionMode, x: &[c64], y: &[c64]) -> Result<()> {
        let [rows, cols] = self.shape();
        let (input, output) = if mode.is_transposed() {
            (rows, cols)
        } else {
            (cols, rows)
        };
        if x.len() != input {
            Err(BemError::DimensionMismatch {
                expected: input,
                actual: x.len(),
            })
        } else if y.len() != output {
            Err(BemError::DimensionMismatch {
                expected: output,
                actual: y.len(),
            })
        } else {
            Ok(())
        }
    }
}

/// Scale `y` by `beta`, overwriting it when `beta` is zero
pub(crate) fn scale_output(y: &mut [c64], beta: c64) {
    if beta.is_zero() {
        y.fill(c64::zero());
    } else if beta != c64::one() {
        y.iter_mut().for_each(|v| *v *= beta);
    }
}
