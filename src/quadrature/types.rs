//! Type definitions.

/// Reference cells on which rules are defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceCell {
    /// The interval [0, 1]
    Interval,
    /// The triangle with vertices (0, 0), (1, 0), (0, 1)
    Triangle,
}

impl ReferenceCell {
    /// Topological dimension
    pub fn dim(&self) -> usize {
        match self {
            ReferenceCell::Interval => 1,
            ReferenceCell::Triangle => 2,
        }
    }

    /// Volume of the reference cell
    pub fn volume(&self) -> f64 {
        match self {
            ReferenceCell::Interval => 1.0,
            ReferenceCell::Triangle => 0.5,
        }
    }
}

/// Definition of a numerical quadrature rule.
#[derive(Debug, Clone)]
pub struct NumericalQuadratureDefinition {
    /// The dimension d of a single point.
    pub dim: usize,

    /// The order of the quadrature rule.
    pub order: usize,

    /// The number of points of the quadrature rule.
    pub npoints: usize,

    /// The weights of the quadrature rule.
    pub weights: Vec<f64>,
    /// The point coordinates of the quadrature rule.
    ///
    /// Points are stored consecutively: the first point starts at position
    /// zero, the second at position d, and so on.
    pub points: Vec<f64>,
}

/// Definition of a quadrature rule for double test/trial integrals.
///
/// Used where such integrals cannot be evaluated as a tensor product of
/// rules on each cell, such as for weakly singular kernels on touching cells.
#[derive(Debug, Clone)]
pub struct TestTrialNumericalQuadratureDefinition {
    /// The dimension d of a single point.
    pub dim: usize,

    /// The order of the underlying interval rule.
    pub order: usize,

    /// The number of points of the quadrature rule.
    pub npoints: usize,

    /// The weights of the quadrature rule.
    pub weights: Vec<f64>,

    /// The test point coordinates, stored consecutively.
    pub test_points: Vec<f64>,

    /// The trial point coordinates, stored consecutively.
    pub trial_points: Vec<f64>,
}

/// Storage for connectivity information.
///
/// Singular quadrature rules need to know how two cells touch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellToCellConnectivity {
    /// Dimension of the shared entity (0 for a vertex, 1 for an edge, 2 for identical cells)
    pub connectivity_dimension: usize,

    /// Pairs of (test, trial) local vertex indices of the shared vertices.
    pub local_indices: Vec<(usize, usize)>,
}
