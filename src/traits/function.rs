//! Function spaces
use crate::element::RaviartThomasElement;
use crate::grid::SurfaceMesh;

/// A function space
pub trait FunctionSpace: Send + Sync {
    /// Get the mesh that the space is defined on
    fn mesh(&self) -> &SurfaceMesh;

    /// Get the finite element used to define this function space
    fn element(&self) -> &RaviartThomasElement;

    /// Get the number of DOFs
    fn global_size(&self) -> usize;

    /// Get the DOF numbers associated with a cell
    fn cell_dofs(&self, cell: usize) -> Option<&[usize]>;

    /// Get the orientation signs of the basis functions on a cell
    fn cell_signs(&self, cell: usize) -> Option<&[f64]>;

    /// Get the factors that scale the Piola-mapped reference functions of a cell
    fn cell_scales(&self, cell: usize) -> [f64; 3];

    /// Get the (cell, local index) pairs that support a DOF
    fn dof_cells(&self, dof: usize) -> &[(usize, usize)];

    /// Get a representative point of a DOF, used for clustering
    fn dof_centre(&self, dof: usize) -> [f64; 3];

    /// Compute a colouring of the cells so that no two cells that share a DOF are assigned the same colour
    fn cell_colouring(&self) -> Vec<Vec<usize>>;
}
