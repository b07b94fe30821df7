//! Common utility functions
use crate::element::{CellMap, ReferenceTable};
use crate::grid::SurfaceMesh;
use crate::traits::FunctionSpace;
use cauchy::c64;
use rlst::{rlst_dynamic_array2, DynamicArray, RawAccessMut};

pub(crate) fn equal_meshes(test_mesh: &SurfaceMesh, trial_mesh: &SurfaceMesh) -> bool {
    std::ptr::eq(test_mesh, trial_mesh)
}

/// Normalised distance between two cells, used to pick a quadrature order
pub(crate) fn cell_pair_distance(
    test_mesh: &SurfaceMesh,
    test_cell: usize,
    trial_mesh: &SurfaceMesh,
    trial_cell: usize,
) -> f64 {
    let d = crate::linalg::distance(test_mesh.centroid(test_cell), trial_mesh.centroid(trial_cell));
    d / f64::max(test_mesh.diameter(test_cell), trial_mesh.diameter(trial_cell))
}

/// Raw 2D data
pub(crate) struct RawData2D {
    /// Array containting data
    pub(crate) data: *mut c64,
    /// Shape of data
    pub(crate) shape: [usize; 2],
}

unsafe impl Sync for RawData2D {}

/// Data for a sparse matrix
#[derive(Debug, Clone)]
pub struct SparseMatrixData {
    /// Data
    pub data: Vec<c64>,
    /// Rows
    pub rows: Vec<usize>,
    /// Columns
    pub cols: Vec<usize>,
    /// Shape of the matrix
    pub shape: [usize; 2],
}

impl SparseMatrixData {
    /// Create new sparse matrix
    pub fn new(shape: [usize; 2]) -> Self {
        Self {
            data: vec![],
            rows: vec![],
            cols: vec![],
            shape,
        }
    }
    /// Create new sparse matrix with a known size
    pub fn new_known_size(shape: [usize; 2], size: usize) -> Self {
        Self {
            data: Vec::with_capacity(size),
            rows: Vec::with_capacity(size),
            cols: Vec::with_capacity(size),
            shape,
        }
    }
    /// Number of stored triplets
    pub fn len(&self) -> usize {
        self.data.len()
    }
    /// Check if no triplets are stored
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    /// Add another sparse matrix to this matrix
    pub fn add(&mut self, other: SparseMatrixData) {
        debug_assert!(self.shape[0] == other.shape[0]);
        debug_assert!(self.shape[1] == other.shape[1]);
        self.rows.extend(&other.rows);
        self.cols.extend(&other.cols);
        self.data.extend(&other.data);
    }
    /// Compute the sum of this sparse matrix and another sparse matrix
    pub fn sum(&self, other: SparseMatrixData) -> SparseMatrixData {
        let mut out = self.clone();
        out.add(other);
        out
    }
    /// Add the entries to a dense column-major matrix; repeated entries are summed
    pub fn add_into_dense(&self, dense: &mut DynamicArray<c64, 2>) {
        let nrows = self.shape[0];
        let data = dense.data_mut();
        for ((row, col), value) in self.rows.iter().zip(&self.cols).zip(&self.data) {
            data[row + nrows * col] += *value;
        }
    }
    /// Convert to a dense column-major matrix
    pub fn to_dense(&self) -> DynamicArray<c64, 2> {
        let mut dense = rlst_dynamic_array2!(c64, self.shape);
        self.add_into_dense(&mut dense);
        dense
    }
}

/// The basis functions of a space on one cell, mapped to a set of points
///
/// Holds the physical points, the values of the three scaled basis functions
/// at each point, their (constant) surface divergences and the Jacobian
/// determinant of the cell.
#[derive(Debug, Clone)]
pub(crate) struct MappedCell {
    pub(crate) points: Vec<f64>,
    pub(crate) values: Vec<[[f64; 3]; 3]>,
    pub(crate) divergences: [f64; 3],
    pub(crate) jdet: f64,
    pub(crate) normal: [f64; 3],
}

impl MappedCell {
    /// Create storage for `npoints` points
    pub(crate) fn new(npoints: usize) -> Self {
        Self {
            points: vec![0.0; 3 * npoints],
            values: vec![[[0.0; 3]; 3]; npoints],
            divergences: [0.0; 3],
            jdet: 0.0,
            normal: [0.0; 3],
        }
    }

    /// Map the reference `points` and their tabulated basis `table` to `cell`
    pub(crate) fn map<Space: FunctionSpace + ?Sized>(
        &mut self,
        space: &Space,
        cell: usize,
        points: &[f64],
        table: &ReferenceTable,
    ) {
        let map = CellMap::new(&space.mesh().cell_vertices(cell));
        let scales = space.cell_scales(cell);
        let divergence = space.element().reference_divergence();
        self.jdet = map.jacobian_determinant();
        self.normal = *map.normal();
        for (i, s) in scales.iter().enumerate() {
            self.divergences[i] = s * divergence / self.jdet;
        }
        for (index, (p, v)) in points
            .chunks_exact(2)
            .zip(self.values.iter_mut())
            .enumerate()
        {
            self.points[3 * index..3 * index + 3].copy_from_slice(&map.point(p));
            for (basis, s) in scales.iter().enumerate() {
                v[basis] = map.piola(table.value(index, basis)).map(|x| s * x);
            }
        }
    }
}
