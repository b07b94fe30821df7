//! Utility functions for creating Duffy rules

/// Vertices of the reference triangle
const REFERENCE_VERTICES: [[f64; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];

/// Affine map from the Duffy reference triangle to the reference triangle
///
/// The Duffy rules are written on the triangle (0, 0), (1, 0), (1, 1).
/// The map sends (0, 0) to `v0`, (1, 0) to `v1` and (1, 1) to the remaining
/// vertex `3 - v0 - v1`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TriangleMap {
    origin: [f64; 2],
    col0: [f64; 2],
    col1: [f64; 2],
}

impl TriangleMap {
    /// Create the map. `v0` and `v1` must be distinct local vertex indices.
    pub(crate) fn new(v0: usize, v1: usize) -> Self {
        let p0 = REFERENCE_VERTICES[v0];
        let p1 = REFERENCE_VERTICES[v1];
        let p2 = REFERENCE_VERTICES[3 - v0 - v1];
        Self {
            origin: p0,
            col0: [p1[0] - p0[0], p1[1] - p0[1]],
            col1: [p2[0] - p1[0], p2[1] - p1[1]],
        }
    }

    /// Map a single point
    pub(crate) fn apply(&self, point: [f64; 2]) -> [f64; 2] {
        [
            self.origin[0] + self.col0[0] * point[0] + self.col1[0] * point[1],
            self.origin[1] + self.col0[1] * point[0] + self.col1[1] * point[1],
        ]
    }
}

/// Get the next vertex in an anticlockwise direction
pub(crate) fn next_triangle_vertex(index: usize) -> usize {
    (index + 1) % 3
}
