//! Meshes of simple shapes
use crate::grid::SurfaceMesh;
use crate::linalg::norm;
use std::collections::{hash_map::Entry::Vacant, HashMap};

/// Create a regular sphere of radius 1 centred at the origin
///
/// A regular sphere is created by starting with a regular octahedron. The shape is then refined `refinement_level` times.
/// Each time the grid is refined, each triangle is split into four triangles (by adding lines connecting the midpoints of
/// each edge). The new points are then scaled so that they are a distance of 1 from the origin.
pub fn regular_sphere(refinement_level: u32) -> SurfaceMesh {
    regular_sphere_with_radius(refinement_level, 1.0)
}

/// Create a regular sphere with a given radius centred at the origin
pub fn regular_sphere_with_radius(refinement_level: u32, radius: f64) -> SurfaceMesh {
    let mut points = Vec::with_capacity(2 + usize::pow(4, refinement_level + 1));
    points.extend_from_slice(&[
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [-1.0, 0.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 0.0, -1.0],
    ]);

    let mut cells = vec![
        [0, 1, 2],
        [0, 2, 3],
        [0, 3, 4],
        [0, 4, 1],
        [5, 2, 1],
        [5, 3, 2],
        [5, 4, 3],
        [5, 1, 4],
    ];

    for _ in 0..refinement_level {
        let mut edge_points = HashMap::new();
        let mut new_cells = Vec::with_capacity(4 * cells.len());
        for c in &cells {
            let mid = [[1, 2], [0, 2], [0, 1]].map(|[i, j]| {
                let key = (c[i].min(c[j]), c[i].max(c[j]));
                if let Vacant(e) = edge_points.entry(key) {
                    let (a, b): ([f64; 3], [f64; 3]) = (points[c[i]], points[c[j]]);
                    let new_pt = [0.5 * (a[0] + b[0]), 0.5 * (a[1] + b[1]), 0.5 * (a[2] + b[2])];
                    let size = norm(&new_pt);
                    points.push(new_pt.map(|x| x / size));
                    e.insert(points.len() - 1);
                }
                edge_points[&key]
            });
            new_cells.push([c[0], mid[2], mid[1]]);
            new_cells.push([c[1], mid[0], mid[2]]);
            new_cells.push([c[2], mid[1], mid[0]]);
            new_cells.push([mid[0], mid[1], mid[2]]);
        }
        cells = new_cells;
    }

    for p in points.iter_mut() {
        *p = p.map(|x| radius * x);
    }

    SurfaceMesh::from_trusted(points, cells)
}
