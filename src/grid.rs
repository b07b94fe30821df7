//! Grid creation and storage
pub mod io;
pub mod shapes;

use crate::linalg::{cross, distance, dot, norm, sub};
use crate::types::{BemError, Result};
use log::warn;
use std::collections::HashMap;

/// A closed, consistently oriented triangle surface mesh
///
/// Cell normals point out of the enclosed volume. Local edge `i` of a cell is
/// the edge opposite local vertex `i`.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    vertices: Vec<[f64; 3]>,
    cells: Vec<[usize; 3]>,
    normals: Vec<[f64; 3]>,
    areas: Vec<f64>,
    diameters: Vec<f64>,
    centroids: Vec<[f64; 3]>,
    edges: Vec<[usize; 2]>,
    cell_edges: Vec<[usize; 3]>,
    edge_cells: Vec<Vec<usize>>,
    vertex_cells: Vec<Vec<usize>>,
}

impl SurfaceMesh {
    /// Create a mesh from vertex coordinates and cells
    ///
    /// The surface must be closed, manifold and consistently oriented. If it
    /// is oriented inwards, every cell is reversed.
    pub fn new(vertices: Vec<[f64; 3]>, cells: Vec<[usize; 3]>) -> Result<Self> {
        if cells.is_empty() {
            return Err(BemError::MeshImport("mesh has no cells".to_string()));
        }
        if let Some(v) = vertices.iter().find(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(BemError::MeshImport(format!(
                "vertex {v:?} has non-finite coordinates"
            )));
        }
        for (index, cell) in cells.iter().enumerate() {
            if let Some(v) = cell.iter().find(|v| **v >= vertices.len()) {
                return Err(BemError::MeshImport(format!(
                    "cell {index} references vertex {v}, but the mesh has {} vertices",
                    vertices.len()
                )));
            }
            if cell[0] == cell[1] || cell[1] == cell[2] || cell[0] == cell[2] {
                return Err(BemError::MeshImport(format!(
                    "cell {index} repeats a vertex: {cell:?}"
                )));
            }
        }

        let mesh = Self::from_trusted(vertices, cells);
        mesh.validate()?;

        if mesh.signed_volume() < 0.0 {
            warn!("Surface mesh is oriented inwards. Reversing all cells.");
            let Self {
                vertices, cells, ..
            } = mesh;
            let flipped = cells.iter().map(|c| [c[0], c[2], c[1]]).collect();
            Ok(Self::from_trusted(vertices, flipped))
        } else {
            Ok(mesh)
        }
    }

    /// Create a mesh whose topology is known to be valid
    pub(crate) fn from_trusted(vertices: Vec<[f64; 3]>, cells: Vec<[usize; 3]>) -> Self {
        let ncells = cells.len();
        let mut normals = Vec::with_capacity(ncells);
        let mut areas = Vec::with_capacity(ncells);
        let mut diameters = Vec::with_capacity(ncells);
        let mut centroids = Vec::with_capacity(ncells);

        for cell in &cells {
            let [v0, v1, v2] = cell.map(|v| vertices[v]);
            let n = cross(&sub(&v1, &v0), &sub(&v2, &v0));
            let twice_area = norm(&n);
            normals.push(if twice_area > 0.0 {
                n.map(|x| x / twice_area)
            } else {
                n
            });
            areas.push(0.5 * twice_area);
            diameters.push(
                distance(&v0, &v1)
                    .max(distance(&v1, &v2))
                    .max(distance(&v2, &v0)),
            );
            centroids.push([0, 1, 2].map(|d| (v0[d] + v1[d] + v2[d]) / 3.0));
        }

        let mut edge_index = HashMap::<(usize, usize), usize>::new();
        let mut edges = vec![];
        let mut edge_cells: Vec<Vec<usize>> = vec![];
        let mut cell_edges = vec![[0; 3]; ncells];
        let mut vertex_cells = vec![vec![]; vertices.len()];

        for (c, cell) in cells.iter().enumerate() {
            for (i, v) in cell.iter().enumerate() {
                vertex_cells[*v].push(c);
                let a = cell[(i + 1) % 3];
                let b = cell[(i + 2) % 3];
                let key = (a.min(b), a.max(b));
                let e = *edge_index.entry(key).or_insert_with(|| {
                    edges.push([key.0, key.1]);
                    edge_cells.push(vec![]);
                    edges.len() - 1
                });
                edge_cells[e].push(c);
                cell_edges[c][i] = e;
            }
        }

        Self {
            vertices,
            cells,
            normals,
            areas,
            diameters,
            centroids,
            edges,
            cell_edges,
            edge_cells,
            vertex_cells,
        }
    }

    fn validate(&self) -> Result<()> {
        for (c, (area, diameter)) in self.areas.iter().zip(&self.diameters).enumerate() {
            if *area <= 1e-12 * diameter * diameter {
                return Err(BemError::MeshImport(format!("cell {c} is degenerate")));
            }
        }
        for (e, cells) in self.edge_cells.iter().enumerate() {
            let [a, b] = self.edges[e];
            if cells.len() != 2 {
                return Err(BemError::MeshImport(format!(
                    "edge ({a}, {b}) is shared by {} cells, the surface must be closed and manifold",
                    cells.len()
                )));
            }
            let forward = |cell: usize| {
                let local = self.cell_edges[cell]
                    .iter()
                    .position(|x| *x == e)
                    .unwrap_or(0);
                let vertices = self.cells[cell];
                vertices[(local + 1) % 3] == a
            };
            if forward(cells[0]) == forward(cells[1]) {
                return Err(BemError::MeshImport(format!(
                    "cells {} and {} are not consistently oriented",
                    cells[0], cells[1]
                )));
            }
        }
        Ok(())
    }

    /// Number of vertices
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of cells
    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of edges
    pub fn number_of_edges(&self) -> usize {
        self.edges.len()
    }

    /// All vertex coordinates
    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    /// All cells
    pub fn cells(&self) -> &[[usize; 3]] {
        &self.cells
    }

    /// Coordinates of a vertex
    pub fn vertex(&self, index: usize) -> &[f64; 3] {
        &self.vertices[index]
    }

    /// Vertex indices of a cell
    pub fn cell(&self, index: usize) -> &[usize; 3] {
        &self.cells[index]
    }

    /// Coordinates of the vertices of a cell
    pub fn cell_vertices(&self, cell: usize) -> [[f64; 3]; 3] {
        self.cells[cell].map(|v| self.vertices[v])
    }

    /// Unit outward normal of a cell
    pub fn normal(&self, cell: usize) -> &[f64; 3] {
        &self.normals[cell]
    }

    /// Area of a cell
    pub fn area(&self, cell: usize) -> f64 {
        self.areas[cell]
    }

    /// Length of the longest edge of a cell
    pub fn diameter(&self, cell: usize) -> f64 {
        self.diameters[cell]
    }

    /// Centroid of a cell
    pub fn centroid(&self, cell: usize) -> &[f64; 3] {
        &self.centroids[cell]
    }

    /// Vertex indices of an edge, in increasing order
    pub fn edge(&self, index: usize) -> &[usize; 2] {
        &self.edges[index]
    }

    /// Length of an edge
    pub fn edge_length(&self, index: usize) -> f64 {
        let [a, b] = self.edges[index];
        distance(&self.vertices[a], &self.vertices[b])
    }

    /// Cells adjacent to an edge; the first is the first cell in scan order
    pub fn edge_cells(&self, index: usize) -> &[usize] {
        &self.edge_cells[index]
    }

    /// Edges of a cell; local edge `i` is opposite local vertex `i`
    pub fn cell_edges(&self, cell: usize) -> &[usize; 3] {
        &self.cell_edges[cell]
    }

    /// Cells that contain a vertex
    pub fn vertex_cells(&self, vertex: usize) -> &[usize] {
        &self.vertex_cells[vertex]
    }

    /// Cells that share at least one vertex with a cell, including the cell itself
    pub fn touching_cells(&self, cell: usize) -> Vec<usize> {
        let mut cells = self.cells[cell]
            .iter()
            .flat_map(|v| self.vertex_cells[*v].iter().copied())
            .collect::<Vec<_>>();
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    /// Pairs of local indices of the vertices shared by two cells
    pub fn shared_vertices(&self, test_cell: usize, trial_cell: usize) -> Vec<(usize, usize)> {
        let mut pairs = vec![];
        for (i, v) in self.cells[test_cell].iter().enumerate() {
            for (j, w) in self.cells[trial_cell].iter().enumerate() {
                if v == w {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// Map a point on the reference triangle to a cell
    pub fn reference_to_physical(&self, cell: usize, point: [f64; 2]) -> [f64; 3] {
        let [v0, v1, v2] = self.cell_vertices(cell);
        [0, 1, 2].map(|d| v0[d] + point[0] * (v1[d] - v0[d]) + point[1] * (v2[d] - v0[d]))
    }

    /// Total surface area
    pub fn surface_area(&self) -> f64 {
        self.areas.iter().sum()
    }

    /// Signed volume enclosed by the surface, positive for outward normals
    pub fn signed_volume(&self) -> f64 {
        self.cells
            .iter()
            .map(|c| {
                let [v0, v1, v2] = c.map(|v| self.vertices[v]);
                dot(&v0, &cross(&v1, &v2)) / 6.0
            })
            .sum()
    }
}

/// Builder for a surface mesh from arbitrary point and cell ids
#[derive(Debug, Default)]
pub struct SurfaceMeshBuilder {
    points: Vec<[f64; 3]>,
    point_indices: HashMap<usize, usize>,
    cells: Vec<[usize; 3]>,
    cell_ids: HashMap<usize, usize>,
    duplicates: Vec<String>,
}

impl SurfaceMeshBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder with preallocated storage
    pub fn new_with_capacity(npoints: usize, ncells: usize) -> Self {
        Self {
            points: Vec::with_capacity(npoints),
            point_indices: HashMap::with_capacity(npoints),
            cells: Vec::with_capacity(ncells),
            cell_ids: HashMap::with_capacity(ncells),
            duplicates: vec![],
        }
    }

    /// Add a point
    pub fn add_point(&mut self, id: usize, point: [f64; 3]) {
        if self.point_indices.insert(id, self.points.len()).is_some() {
            self.duplicates.push(format!("point {id}"));
        }
        self.points.push(point);
    }

    /// Add a cell given by the ids of its three points
    pub fn add_cell(&mut self, id: usize, cell: [usize; 3]) {
        if self.cell_ids.insert(id, self.cells.len()).is_some() {
            self.duplicates.push(format!("cell {id}"));
        }
        self.cells.push(cell);
    }

    /// Create the mesh
    pub fn create_mesh(self) -> Result<SurfaceMesh> {
        if !self.duplicates.is_empty() {
            return Err(BemError::MeshImport(format!(
                "duplicate ids: {}",
                self.duplicates.join(", ")
            )));
        }
        let cells = self
            .cells
            .iter()
            .map(|cell| {
                let mut mapped = [0; 3];
                for (m, id) in mapped.iter_mut().zip(cell) {
                    *m = *self.point_indices.get(id).ok_or_else(|| {
                        BemError::MeshImport(format!("cell references unknown point {id}"))
                    })?;
                }
                Ok(mapped)
            })
            .collect::<Result<Vec<_>>>()?;
        SurfaceMesh::new(self.points, cells)
    }
}
