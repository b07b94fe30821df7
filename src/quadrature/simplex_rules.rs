//! Gauss rules on the reference interval and triangle.
use crate::quadrature::types::{NumericalQuadratureDefinition, ReferenceCell};
use crate::types::{BemError, Result};
use itertools::iproduct;

/// Largest number of Gauss-Legendre points per direction that is tabulated
pub const MAX_GAUSS_POINTS: usize = 32;

lazy_static! {
    static ref GAUSS_LEGENDRE_RULES: Vec<(Vec<f64>, Vec<f64>)> =
        (1..=MAX_GAUSS_POINTS).map(gauss_legendre).collect();
}

/// Compute the n-point Gauss-Legendre rule on [0, 1]
fn gauss_legendre(npoints: usize) -> (Vec<f64>, Vec<f64>) {
    let n = npoints as f64;
    let mut points = vec![0.0; npoints];
    let mut weights = vec![0.0; npoints];

    let legendre = |x: f64| -> (f64, f64) {
        let mut p_prev = 1.0;
        let mut p = x;
        for k in 2..=npoints {
            let k = k as f64;
            let p_next = ((2.0 * k - 1.0) * x * p - (k - 1.0) * p_prev) / k;
            p_prev = p;
            p = p_next;
        }
        (p, n * (x * p - p_prev) / (x * x - 1.0))
    };

    for i in 0..npoints {
        let mut x = f64::cos(std::f64::consts::PI * (i as f64 + 0.75) / (n + 0.5));
        for _ in 0..100 {
            let (p, dp) = legendre(x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() <= 1e-16 {
                break;
            }
        }
        let (_, dp) = legendre(x);
        points[i] = 0.5 * (1.0 - x);
        weights[i] = 1.0 / ((1.0 - x * x) * dp * dp);
    }
    (points, weights)
}

/// Number of points per direction needed to integrate polynomials of the given order
pub fn points_per_direction(order: usize) -> usize {
    (order + 3) / 2
}

/// Return a simplex rule for a given number of points.
///
/// Triangle rules are collapsed Gauss products, so the number of points must
/// be a square.
pub fn simplex_rule(cell: ReferenceCell, npoints: usize) -> Result<NumericalQuadratureDefinition> {
    match cell {
        ReferenceCell::Interval => {
            if npoints == 0 || npoints > MAX_GAUSS_POINTS {
                return Err(BemError::QuadratureConfig(format!(
                    "no interval rule with {npoints} points"
                )));
            }
            let (points, weights) = &GAUSS_LEGENDRE_RULES[npoints - 1];
            Ok(NumericalQuadratureDefinition {
                dim: 1,
                order: 2 * npoints - 1,
                npoints,
                weights: weights.clone(),
                points: points.clone(),
            })
        }
        ReferenceCell::Triangle => {
            let m = (npoints as f64).sqrt().round() as usize;
            if m == 0 || m * m != npoints || m > MAX_GAUSS_POINTS {
                return Err(BemError::QuadratureConfig(format!(
                    "no triangle rule with {npoints} points"
                )));
            }
            let (gauss_points, gauss_weights) = &GAUSS_LEGENDRE_RULES[m - 1];
            let mut points = Vec::with_capacity(2 * npoints);
            let mut weights = Vec::with_capacity(npoints);
            for (i, j) in iproduct!(0..m, 0..m) {
                let s = gauss_points[i];
                points.push(s);
                points.push(gauss_points[j] * (1.0 - s));
                weights.push(gauss_weights[i] * gauss_weights[j] * (1.0 - s));
            }
            Ok(NumericalQuadratureDefinition {
                dim: 2,
                order: 2 * m - 2,
                npoints,
                weights,
                points,
            })
        }
    }
}

/// Return the smallest simplex rule that integrates polynomials of the given order exactly
pub fn simplex_rule_for_order(
    cell: ReferenceCell,
    order: usize,
) -> Result<NumericalQuadratureDefinition> {
    match cell {
        ReferenceCell::Interval => simplex_rule(cell, order / 2 + 1),
        ReferenceCell::Triangle => {
            let m = points_per_direction(order);
            simplex_rule(cell, m * m)
        }
    }
}

/// For a given cell return the numbers of points for which rules are available.
pub fn available_rules(cell: ReferenceCell) -> Vec<usize> {
    match cell {
        ReferenceCell::Interval => (1..=MAX_GAUSS_POINTS).collect(),
        ReferenceCell::Triangle => (1..=MAX_GAUSS_POINTS).map(|m| m * m).collect(),
    }
}
