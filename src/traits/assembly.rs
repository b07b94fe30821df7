//! Assembly
use crate::assembly::kernels::GreenKernelEvalType;
use cauchy::c64;
use rlst::DynamicArray;

pub trait BoundaryIntegrand: Sync {
    //! Integrand of a boundary operator
    /// The kernel data needed by the integrand
    fn kernel_eval_type(&self) -> GreenKernelEvalType;

    /// Evaluate the integrand for one test and one trial basis function at a pair of points
    ///
    /// `kernel` holds the kernel value, followed by its gradient with respect
    /// to the test point if requested.
    fn evaluate(
        &self,
        kernel: &[c64],
        test_value: &[f64; 3],
        test_divergence: f64,
        trial_value: &[f64; 3],
        trial_divergence: f64,
    ) -> c64;
}

pub trait PotentialIntegrand: Sync {
    //! Integrand of a potential operator
    /// The kernel data needed by the integrand
    fn kernel_eval_type(&self) -> GreenKernelEvalType;

    /// Evaluate the integrand for a density at a source point
    fn evaluate(&self, kernel: &[c64], density: &[c64; 3], density_divergence: c64) -> [c64; 3];
}

pub trait KernelEvaluator: Sync {
    //! Kernel evaluator

    /// Evaluate the kernel values for all source and target pairs
    ///
    /// For each source, the kernel is evaluated for exactly one target. This is equivalent to taking the diagonal of the matrix assembled by `assemble_st`
    fn assemble_pairwise_st(
        &self,
        eval_type: GreenKernelEvalType,
        sources: &[f64],
        targets: &[f64],
        result: &mut [c64],
    );

    /// Evaluate the kernel values for all sources and all targets
    ///
    /// For every source, the kernel is evaluated for every target.
    fn assemble_st(
        &self,
        eval_type: GreenKernelEvalType,
        sources: &[f64],
        targets: &[f64],
        result: &mut [c64],
    );
}

pub trait CellPairAssembler {
    //! Assembler for the contributions from a pair of cells

    /// Assemble contributions into `local_mat`
    fn assemble(&mut self, local_mat: &mut DynamicArray<c64, 2>);
    /// Set the test cell
    fn set_test_cell(&mut self, test_cell: usize);
    /// Set the trial cell
    fn set_trial_cell(&mut self, trial_cell: usize);
}
