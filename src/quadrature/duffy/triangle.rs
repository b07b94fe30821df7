//! Duffy rules for triangles.
use crate::quadrature::{
    duffy::common::{next_triangle_vertex, TriangleMap},
    simplex_rules::simplex_rule,
    types::{
        CellToCellConnectivity, NumericalQuadratureDefinition, ReferenceCell,
        TestTrialNumericalQuadratureDefinition,
    },
};
use crate::types::{BemError, Result};
use itertools::iproduct;

/// One sub-domain of a Duffy decomposition.
///
/// Maps the hypercube coordinates (eta1, eta2, eta3, xi) to a test point, a
/// trial point and the Jacobian of the sub-domain map.
type DuffyPart = fn(f64, f64, f64, f64) -> ([f64; 2], [f64; 2], f64);

fn identical_jacobian(e1: f64, e2: f64, xi: f64) -> f64 {
    xi * xi * xi * e1 * e1 * e2
}

const IDENTICAL_PARTS: [DuffyPart; 6] = [
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi, xi * (1.0 - e1 + e12)],
            [xi * (1.0 - e123), xi * (1.0 - e1)],
            identical_jacobian(e1, e2, xi),
        )
    },
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi * (1.0 - e123), xi * (1.0 - e1)],
            [xi, xi * (1.0 - e1 + e12)],
            identical_jacobian(e1, e2, xi),
        )
    },
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi, xi * (e1 - e12 + e123)],
            [xi * (1.0 - e12), xi * (e1 - e12)],
            identical_jacobian(e1, e2, xi),
        )
    },
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi * (1.0 - e12), xi * (e1 - e12)],
            [xi, xi * (e1 - e12 + e123)],
            identical_jacobian(e1, e2, xi),
        )
    },
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi * (1.0 - e123), xi * (e1 - e123)],
            [xi, xi * (e1 - e12)],
            identical_jacobian(e1, e2, xi),
        )
    },
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi, xi * (e1 - e12)],
            [xi * (1.0 - e123), xi * (e1 - e123)],
            identical_jacobian(e1, e2, xi),
        )
    },
];

const EDGE_PARTS: [DuffyPart; 5] = [
    |e1, e2, e3, xi| {
        let e12 = e1 * e2;
        (
            [xi, xi * e1 * e3],
            [xi * (1.0 - e12), xi * (e1 - e12)],
            xi * xi * xi * e1 * e1,
        )
    },
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi, xi * e1],
            [xi * (1.0 - e123), xi * (e12 - e123)],
            xi * xi * xi * e1 * e1 * e2,
        )
    },
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi * (1.0 - e12), xi * (e1 - e12)],
            [xi, xi * e123],
            xi * xi * xi * e1 * e1 * e2,
        )
    },
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi * (1.0 - e123), xi * (e12 - e123)],
            [xi, xi * e1],
            xi * xi * xi * e1 * e1 * e2,
        )
    },
    |e1, e2, e3, xi| {
        let (e12, e123) = (e1 * e2, e1 * e2 * e3);
        (
            [xi * (1.0 - e123), xi * (e1 - e123)],
            [xi, xi * e12],
            xi * xi * xi * e1 * e1 * e2,
        )
    },
];

const VERTEX_PARTS: [DuffyPart; 2] = [
    |e1, e2, e3, xi| ([xi, xi * e1], [xi * e2, xi * e2 * e3], xi * xi * xi * e2),
    |e1, e2, e3, xi| ([xi * e2, xi * e2 * e3], [xi, xi * e1], xi * xi * xi * e2),
];

/// Build a rule from a decomposition of the four dimensional hypercube
fn hypercube_rule(
    interval_rule: &NumericalQuadratureDefinition,
    parts: &[DuffyPart],
    test_map: TriangleMap,
    trial_map: TriangleMap,
) -> TestTrialNumericalQuadratureDefinition {
    let n = interval_rule.npoints;
    let points = &interval_rule.points;
    let weights = &interval_rule.weights;
    let n_output_points = parts.len() * n * n * n * n;

    let mut test_points = Vec::<f64>::with_capacity(2 * n_output_points);
    let mut trial_points = Vec::<f64>::with_capacity(2 * n_output_points);
    let mut output_weights = Vec::<f64>::with_capacity(n_output_points);

    for (i1, i2, i3, i4) in iproduct!(0..n, 0..n, 0..n, 0..n) {
        let w = weights[i1] * weights[i2] * weights[i3] * weights[i4];
        for part in parts {
            let (test, trial, jacobian) = part(points[i1], points[i2], points[i3], points[i4]);
            test_points.extend_from_slice(&test_map.apply(test));
            trial_points.extend_from_slice(&trial_map.apply(trial));
            output_weights.push(w * jacobian);
        }
    }

    TestTrialNumericalQuadratureDefinition {
        dim: 2,
        order: interval_rule.order,
        npoints: n_output_points,
        weights: output_weights,
        test_points,
        trial_points,
    }
}

fn check_local_indices(connectivity: &CellToCellConnectivity, expected: usize) -> Result<()> {
    let pairs = &connectivity.local_indices;
    let valid = pairs.len() == expected
        && pairs.iter().all(|(a, b)| *a < 3 && *b < 3)
        && (expected < 2 || (pairs[0].0 != pairs[1].0 && pairs[0].1 != pairs[1].1));
    if valid {
        Ok(())
    } else {
        Err(BemError::QuadratureConfig(format!(
            "invalid local indices {:?} for a shared entity of dimension {}",
            pairs, connectivity.connectivity_dimension
        )))
    }
}

/// Create a Duffy rule on a pair of touching triangles
///
/// `npoints` is the number of Gauss points in each of the four hypercube directions.
pub fn triangle_duffy(
    connectivity: &CellToCellConnectivity,
    npoints: usize,
) -> Result<TestTrialNumericalQuadratureDefinition> {
    let rule = simplex_rule(ReferenceCell::Interval, npoints)?;

    match connectivity.connectivity_dimension {
        2 => Ok(hypercube_rule(
            &rule,
            &IDENTICAL_PARTS,
            TriangleMap::new(0, 1),
            TriangleMap::new(0, 1),
        )),
        1 => {
            check_local_indices(connectivity, 2)?;
            let (first, second) = (connectivity.local_indices[0], connectivity.local_indices[1]);
            Ok(hypercube_rule(
                &rule,
                &EDGE_PARTS,
                TriangleMap::new(first.0, second.0),
                TriangleMap::new(first.1, second.1),
            ))
        }
        0 => {
            check_local_indices(connectivity, 1)?;
            let (test_vertex, trial_vertex) = connectivity.local_indices[0];
            Ok(hypercube_rule(
                &rule,
                &VERTEX_PARTS,
                TriangleMap::new(test_vertex, next_triangle_vertex(test_vertex)),
                TriangleMap::new(trial_vertex, next_triangle_vertex(trial_vertex)),
            ))
        }
        dim => Err(BemError::QuadratureConfig(format!(
            "triangles cannot share an entity of dimension {dim}"
        ))),
    }
}
