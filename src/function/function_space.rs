//! Raviart-Thomas function space
use crate::element::RaviartThomasElement;
use crate::grid::SurfaceMesh;
use crate::traits::FunctionSpace;
use std::sync::Arc;

/// Lowest order Raviart-Thomas space on a surface mesh
///
/// There is one DOF per edge, numbered in order of first appearance when
/// scanning the cells. The basis function of an edge points out of the first
/// cell adjacent to the edge and into the second one.
#[derive(Debug)]
pub struct RaviartThomasSpace {
    mesh: Arc<SurfaceMesh>,
    element: RaviartThomasElement,
    cell_dofs: Vec<[usize; 3]>,
    cell_signs: Vec<[f64; 3]>,
    dof_cells: Vec<Vec<(usize, usize)>>,
}

impl RaviartThomasSpace {
    /// Create new function space
    pub fn new(mesh: Arc<SurfaceMesh>) -> Self {
        let ncells = mesh.number_of_cells();
        let mut dof_numbers = vec![usize::MAX; mesh.number_of_edges()];
        let mut cell_dofs = vec![[0; 3]; ncells];
        let mut cell_signs = vec![[1.0; 3]; ncells];
        let mut dof_cells: Vec<Vec<(usize, usize)>> = vec![];

        for cell in 0..ncells {
            for (local, edge) in mesh.cell_edges(cell).iter().enumerate() {
                if dof_numbers[*edge] == usize::MAX {
                    dof_numbers[*edge] = dof_cells.len();
                    dof_cells.push(vec![]);
                }
                let dof = dof_numbers[*edge];
                cell_dofs[cell][local] = dof;
                cell_signs[cell][local] = if dof_cells[dof].is_empty() { 1.0 } else { -1.0 };
                dof_cells[dof].push((cell, local));
            }
        }

        Self {
            mesh,
            element: RaviartThomasElement::new(),
            cell_dofs,
            cell_signs,
            dof_cells,
        }
    }

    /// The shared mesh
    pub fn mesh_arc(&self) -> &Arc<SurfaceMesh> {
        &self.mesh
    }

    /// Check if two spaces are the same object
    pub fn is_same(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl FunctionSpace for RaviartThomasSpace {
    fn mesh(&self) -> &SurfaceMesh {
        &self.mesh
    }
    fn element(&self) -> &RaviartThomasElement {
        &self.element
    }
    fn global_size(&self) -> usize {
        self.dof_cells.len()
    }
    fn cell_dofs(&self, cell: usize) -> Option<&[usize]> {
        self.cell_dofs.get(cell).map(|d| &d[..])
    }
    fn cell_signs(&self, cell: usize) -> Option<&[f64]> {
        self.cell_signs.get(cell).map(|s| &s[..])
    }
    fn cell_scales(&self, cell: usize) -> [f64; 3] {
        let edges = self.mesh.cell_edges(cell);
        [0, 1, 2].map(|i| self.cell_signs[cell][i] * self.mesh.edge_length(edges[i]))
    }
    fn dof_cells(&self, dof: usize) -> &[(usize, usize)] {
        &self.dof_cells[dof]
    }
    fn dof_centre(&self, dof: usize) -> [f64; 3] {
        let (cell, local) = self.dof_cells[dof][0];
        let [a, b] = *self.mesh.edge(self.mesh.cell_edges(cell)[local]);
        let (a, b) = (self.mesh.vertex(a), self.mesh.vertex(b));
        [0, 1, 2].map(|d| 0.5 * (a[d] + b[d]))
    }
    fn cell_colouring(&self) -> Vec<Vec<usize>> {
        let mut colouring: Vec<Vec<usize>> = vec![];
        let mut dof_colours = vec![vec![]; self.global_size()];
        for (cell, dofs) in self.cell_dofs.iter().enumerate() {
            let c = (0..colouring.len())
                .find(|c| dofs.iter().all(|d| !dof_colours[*d].contains(c)))
                .unwrap_or(colouring.len());
            if c == colouring.len() {
                colouring.push(vec![cell]);
            } else {
                colouring[c].push(cell);
            }
            for d in dofs {
                dof_colours[*d].push(c);
            }
        }
        colouring
    }
}
