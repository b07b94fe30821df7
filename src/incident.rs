//! Incident fields
use crate::linalg::{cross, cross_complex_real, dot, norm};
use crate::types::{BemError, Result};
use cauchy::c64;

/// An electric plane wave `E(x) = p exp(ik d.x)`
///
/// The direction `d` is a unit vector and the polarisation `p` is orthogonal to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneWave {
    direction: [f64; 3],
    polarization: [f64; 3],
    wavenumber: f64,
}

impl PlaneWave {
    /// Create new
    ///
    /// The direction is normalised. The polarisation must be orthogonal to the direction.
    pub fn new(direction: [f64; 3], polarization: [f64; 3], wavenumber: f64) -> Result<Self> {
        let length = norm(&direction);
        if !(length > 0.0 && length.is_finite()) {
            return Err(BemError::InvalidArgument(
                "plane wave direction must be a non-zero vector".to_string(),
            ));
        }
        let direction = direction.map(|d| d / length);
        if dot(&direction, &polarization).abs() > 1e-12 * norm(&polarization).max(1.0) {
            return Err(BemError::InvalidArgument(
                "plane wave polarisation must be orthogonal to its direction".to_string(),
            ));
        }
        Ok(Self {
            direction,
            polarization,
            wavenumber,
        })
    }

    /// A z-polarised plane wave travelling in the x direction
    pub fn default_pec_example(wavenumber: f64) -> Self {
        Self {
            direction: [1.0, 0.0, 0.0],
            polarization: [0.0, 0.0, 1.0],
            wavenumber,
        }
    }

    /// Direction of propagation
    pub fn direction(&self) -> &[f64; 3] {
        &self.direction
    }

    /// Polarisation
    pub fn polarization(&self) -> &[f64; 3] {
        &self.polarization
    }

    /// Wavenumber
    pub fn wavenumber(&self) -> f64 {
        self.wavenumber
    }

    fn phase(&self, point: &[f64; 3]) -> c64 {
        let kx = self.wavenumber * dot(&self.direction, point);
        c64::new(kx.cos(), kx.sin())
    }

    /// The electric field at a point
    pub fn field(&self, point: &[f64; 3]) -> [c64; 3] {
        let phase = self.phase(point);
        self.polarization.map(|p| phase * p)
    }

    /// The tangential trace `E x n`
    pub fn dirichlet_trace(&self, point: &[f64; 3], normal: &[f64; 3]) -> [c64; 3] {
        cross_complex_real(&self.field(point), normal)
    }

    /// The Neumann trace `(curl E / (ik)) x n`, which equals `(d x p) exp(ik d.x) x n`
    pub fn neumann_trace(&self, point: &[f64; 3], normal: &[f64; 3]) -> [c64; 3] {
        let phase = self.phase(point);
        let curl = cross(&self.direction, &self.polarization).map(|c| phase * c);
        cross_complex_real(&curl, normal)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_example() {
        let wave = PlaneWave::default_pec_example(2.0);
        let e = wave.field(&[0.25, 3.0, -1.0]);
        assert_relative_eq!(e[0].norm(), 0.0);
        assert_relative_eq!(e[1].norm(), 0.0);
        assert_relative_eq!(e[2].re, 0.5f64.cos(), epsilon = 1e-14);
        assert_relative_eq!(e[2].im, 0.5f64.sin(), epsilon = 1e-14);
    }

    #[test]
    fn test_traces_are_tangential() {
        let wave = PlaneWave::new([1.0, 1.0, 0.0], [0.0, 0.0, 2.0], 3.0).unwrap();
        let normal = [0.0, 0.6, 0.8];
        let point = [0.1, 0.2, 0.3];
        for trace in [
            wave.dirichlet_trace(&point, &normal),
            wave.neumann_trace(&point, &normal),
        ] {
            let normal_part = trace[0] * normal[0] + trace[1] * normal[1] + trace[2] * normal[2];
            assert_relative_eq!(normal_part.norm(), 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_neumann_trace_matches_curl() {
        let k = 1.7;
        let wave = PlaneWave::new([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], k).unwrap();
        let point = [0.3, -0.4, 0.2];
        let normal = [1.0, 0.0, 0.0];
        // curl E by central differences
        let h = 1e-6;
        let derivative = |axis: usize, component: usize| {
            let mut plus = point;
            let mut minus = point;
            plus[axis] += h;
            minus[axis] -= h;
            (wave.field(&plus)[component] - wave.field(&minus)[component]) / (2.0 * h)
        };
        let curl = [
            derivative(1, 2) - derivative(2, 1),
            derivative(2, 0) - derivative(0, 2),
            derivative(0, 1) - derivative(1, 0),
        ];
        let ik = c64::new(0.0, k);
        let expected = cross_complex_real(&curl.map(|c| c / ik), &normal);
        let trace = wave.neumann_trace(&point, &normal);
        for d in 0..3 {
            assert_relative_eq!((trace[d] - expected[d]).norm(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_invalid_waves() {
        assert!(PlaneWave::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], 1.0).is_err());
        assert!(PlaneWave::new([1.0, 0.0, 0.0], [1.0, 0.0, 1.0], 1.0).is_err());
    }
}
