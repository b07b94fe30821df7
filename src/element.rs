//! Lowest order Raviart-Thomas element on flat triangles
use crate::linalg::{cross, norm, sub};

/// Vertices of the reference triangle
const REFERENCE_VERTICES: [[f64; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];

const EDGE_DOFS: [[usize; 1]; 3] = [[0], [1], [2]];

/// Values of the reference basis functions at a set of points
#[derive(Debug, Clone)]
pub struct ReferenceTable {
    values: Vec<[[f64; 2]; 3]>,
}

impl ReferenceTable {
    /// Number of points
    pub fn npoints(&self) -> usize {
        self.values.len()
    }

    /// Value of basis function `basis` at point `point`
    pub fn value(&self, point: usize, basis: usize) -> &[f64; 2] {
        &self.values[point][basis]
    }
}

/// Lowest order Raviart-Thomas element
///
/// The reference function associated with the edge opposite vertex `i` is
/// `psi_i(p) = p - p_i`, which has divergence 2 and unit normal flux
/// times the edge length through that edge. Physical functions are
/// obtained with the contravariant Piola map and scaled by the signed
/// physical edge length.
#[derive(Debug, Clone, Copy, Default)]
pub struct RaviartThomasElement;

impl RaviartThomasElement {
    /// Create new
    pub fn new() -> Self {
        Self
    }

    /// Number of basis functions
    pub fn dim(&self) -> usize {
        3
    }

    /// Local DOFs associated with a sub-entity of the reference triangle
    pub fn entity_dofs(&self, entity_dim: usize, entity_number: usize) -> Option<&[usize]> {
        match (entity_dim, entity_number) {
            (0, n) if n < 3 => Some(&[]),
            (1, n) if n < 3 => Some(&EDGE_DOFS[n]),
            (2, 0) => Some(&[]),
            _ => None,
        }
    }

    /// Divergence of every reference basis function
    pub fn reference_divergence(&self) -> f64 {
        2.0
    }

    /// Tabulate the reference basis functions at points stored as consecutive (x, y) pairs
    pub fn tabulate(&self, points: &[f64]) -> ReferenceTable {
        ReferenceTable {
            values: points
                .chunks_exact(2)
                .map(|p| REFERENCE_VERTICES.map(|v| [p[0] - v[0], p[1] - v[1]]))
                .collect(),
        }
    }
}

/// Affine map from the reference triangle to a flat physical triangle
#[derive(Debug, Clone, Copy)]
pub struct CellMap {
    origin: [f64; 3],
    axes: [[f64; 3]; 2],
    jacobian_determinant: f64,
    normal: [f64; 3],
}

impl CellMap {
    /// Create the map for a triangle with the given vertices
    pub fn new(vertices: &[[f64; 3]; 3]) -> Self {
        let axes = [sub(&vertices[1], &vertices[0]), sub(&vertices[2], &vertices[0])];
        let n = cross(&axes[0], &axes[1]);
        let jacobian_determinant = norm(&n);
        Self {
            origin: vertices[0],
            axes,
            jacobian_determinant,
            normal: n.map(|x| x / jacobian_determinant),
        }
    }

    /// Twice the area of the triangle
    pub fn jacobian_determinant(&self) -> f64 {
        self.jacobian_determinant
    }

    /// Unit normal
    pub fn normal(&self) -> &[f64; 3] {
        &self.normal
    }

    /// Map a reference point
    pub fn point(&self, p: &[f64]) -> [f64; 3] {
        [0, 1, 2].map(|d| self.origin[d] + p[0] * self.axes[0][d] + p[1] * self.axes[1][d])
    }

    /// Contravariant Piola push forward of a reference vector
    pub fn piola(&self, v: &[f64; 2]) -> [f64; 3] {
        [0, 1, 2].map(|d| (v[0] * self.axes[0][d] + v[1] * self.axes[1][d]) / self.jacobian_determinant)
    }
}
