//! Green's function kernels
use crate::traits::KernelEvaluator;
use cauchy::c64;
use std::f64::consts::FRAC_1_PI;

const M_INV_4PI: f64 = 0.25 * FRAC_1_PI;

/// Which kernel data to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreenKernelEvalType {
    /// Kernel value only
    Value,
    /// Kernel value followed by the gradient with respect to the target point
    ValueDeriv,
}

impl GreenKernelEvalType {
    /// Number of values produced per source-target pair
    pub fn value_count(&self) -> usize {
        match self {
            GreenKernelEvalType::Value => 1,
            GreenKernelEvalType::ValueDeriv => 4,
        }
    }
}

/// Helmholtz Green's function `exp(ik|x-y|) / (4 pi |x-y|)` in three dimensions
#[derive(Debug, Clone, Copy)]
pub struct HelmholtzKernel {
    wavenumber: f64,
}

impl HelmholtzKernel {
    /// Create new
    pub fn new(wavenumber: f64) -> Self {
        Self { wavenumber }
    }

    /// Wavenumber
    pub fn wavenumber(&self) -> f64 {
        self.wavenumber
    }

    /// Evaluate for a single target `x` and source `y`, writing into `result`
    ///
    /// Coincident points give zero.
    #[inline]
    pub fn evaluate(&self, eval_type: GreenKernelEvalType, x: &[f64], y: &[f64], result: &mut [c64]) {
        let diff0 = y[0] - x[0];
        let diff1 = y[1] - x[1];
        let diff2 = y[2] - x[2];
        let diff_norm = (diff0 * diff0 + diff1 * diff1 + diff2 * diff2).sqrt();
        let inv_diff_norm = if diff_norm == 0.0 { 0.0 } else { 1.0 / diff_norm };

        let kr = self.wavenumber * diff_norm;
        let g_re = kr.cos() * inv_diff_norm * M_INV_4PI;
        let g_im = kr.sin() * inv_diff_norm * M_INV_4PI;
        result[0] = c64::new(g_re, g_im);

        if eval_type == GreenKernelEvalType::ValueDeriv {
            // Derivative with respect to the target
            let inv_diff_norm_squared = inv_diff_norm * inv_diff_norm;
            let g_deriv_re = (g_re + g_im * kr) * inv_diff_norm_squared;
            let g_deriv_im = (g_im - g_re * kr) * inv_diff_norm_squared;
            result[1] = c64::new(g_deriv_re * diff0, g_deriv_im * diff0);
            result[2] = c64::new(g_deriv_re * diff1, g_deriv_im * diff1);
            result[3] = c64::new(g_deriv_re * diff2, g_deriv_im * diff2);
        }
    }
}

impl KernelEvaluator for HelmholtzKernel {
    fn assemble_pairwise_st(
        &self,
        eval_type: GreenKernelEvalType,
        sources: &[f64],
        targets: &[f64],
        result: &mut [c64],
    ) {
        let n = eval_type.value_count();
        for ((y, x), r) in sources
            .chunks_exact(3)
            .zip(targets.chunks_exact(3))
            .zip(result.chunks_exact_mut(n))
        {
            self.evaluate(eval_type, x, y, r);
        }
    }

    /// The result for target `t` and source `s` starts at `(t * nsources + s) * n`,
    /// where `n` is the number of values per pair.
    fn assemble_st(
        &self,
        eval_type: GreenKernelEvalType,
        sources: &[f64],
        targets: &[f64],
        result: &mut [c64],
    ) {
        let n = eval_type.value_count();
        let nsources = sources.len() / 3;
        for (t, x) in targets.chunks_exact(3).enumerate() {
            for (s, y) in sources.chunks_exact(3).enumerate() {
                let start = (t * nsources + s) * n;
                self.evaluate(eval_type, x, y, &mut result[start..start + n]);
            }
        }
    }
}
