//! Integrands of the Maxwell boundary operators
use crate::assembly::kernels::GreenKernelEvalType;
use crate::linalg::cross;
use crate::traits::BoundaryIntegrand;
use cauchy::c64;

/// Maxwell single layer integrand
///
/// `ik G u.v + G div(u) div(v) / (ik)`
#[derive(Debug, Clone, Copy)]
pub struct SingleLayerBoundaryIntegrand {
    ik: c64,
    inv_ik: c64,
}

impl SingleLayerBoundaryIntegrand {
    /// Create new
    pub fn new(wavenumber: f64) -> Self {
        let ik = c64::new(0.0, wavenumber);
        Self { ik, inv_ik: 1.0 / ik }
    }
}

impl BoundaryIntegrand for SingleLayerBoundaryIntegrand {
    fn kernel_eval_type(&self) -> GreenKernelEvalType {
        GreenKernelEvalType::Value
    }

    fn evaluate(
        &self,
        kernel: &[c64],
        test_value: &[f64; 3],
        test_divergence: f64,
        trial_value: &[f64; 3],
        trial_divergence: f64,
    ) -> c64 {
        let dot = test_value[0] * trial_value[0]
            + test_value[1] * trial_value[1]
            + test_value[2] * trial_value[2];
        kernel[0] * (self.ik * dot + self.inv_ik * (test_divergence * trial_divergence))
    }
}

/// Maxwell double layer integrand
///
/// `(grad_x G x u).v`, which equals `grad_x G . (u x v)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleLayerBoundaryIntegrand;

impl DoubleLayerBoundaryIntegrand {
    /// Create new
    pub fn new() -> Self {
        Self
    }
}

impl BoundaryIntegrand for DoubleLayerBoundaryIntegrand {
    fn kernel_eval_type(&self) -> GreenKernelEvalType {
        GreenKernelEvalType::ValueDeriv
    }

    fn evaluate(
        &self,
        kernel: &[c64],
        test_value: &[f64; 3],
        _test_divergence: f64,
        trial_value: &[f64; 3],
        _trial_divergence: f64,
    ) -> c64 {
        let c = cross(trial_value, test_value);
        kernel[1] * c[0] + kernel[2] * c[1] + kernel[3] * c[2]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_layer() {
        let integrand = SingleLayerBoundaryIntegrand::new(2.0);
        let kernel = [c64::new(0.5, 0.25)];
        let value = integrand.evaluate(&kernel, &[1.0, 2.0, 0.0], 3.0, &[0.0, 1.0, 1.0], -1.0);
        let expected = kernel[0] * (c64::new(0.0, 4.0) + c64::new(0.0, 1.5));
        assert_relative_eq!((value - expected).norm(), 0.0, epsilon = 1e-15);
        assert_eq!(integrand.kernel_eval_type(), GreenKernelEvalType::Value);
    }

    #[test]
    fn test_double_layer() {
        let integrand = DoubleLayerBoundaryIntegrand::new();
        let kernel = [
            c64::new(0.0, 0.0),
            c64::new(1.0, 0.0),
            c64::new(0.0, 1.0),
            c64::new(2.0, 0.0),
        ];
        // u = e_x, v = e_y, u x v = e_z
        let value = integrand.evaluate(&kernel, &[0.0, 1.0, 0.0], 0.0, &[1.0, 0.0, 0.0], 0.0);
        assert_relative_eq!((value - c64::new(2.0, 0.0)).norm(), 0.0, epsilon = 1e-15);
        // Antisymmetric in the basis functions
        let swapped = integrand.evaluate(&kernel, &[1.0, 0.0, 0.0], 0.0, &[0.0, 1.0, 0.0], 0.0);
        assert_relative_eq!((value + swapped).norm(), 0.0, epsilon = 1e-15);
    }
}
