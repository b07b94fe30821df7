//! Import of meshes generated with [`gmsh`](https://www.gmsh.info/).
//!
//! Only version 4.1 of the MSH format is supported, as per the [`mshio`] library.
use crate::grid::SurfaceMesh;
use crate::types::{BemError, Result};
use log::info;
use std::path::Path;

/// Read a closed triangular surface mesh from a `.msh` file
///
/// `shape` names the element shape and must be `"triangular"`.
pub fn import_gmsh(path: impl AsRef<Path>, shape: &str) -> Result<SurfaceMesh> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| BemError::MeshImport(format!("cannot read {}: {e}", path.display())))?;
    let mesh = parse_gmsh(&bytes, shape)?;
    info!(
        "Imported {} with {} vertices and {} cells",
        path.display(),
        mesh.number_of_vertices(),
        mesh.number_of_cells()
    );
    Ok(mesh)
}

/// Parse a closed triangular surface mesh from the contents of a `.msh` file
///
/// First-order triangle elements (`Tri3`) form the cells of the mesh. All
/// other elements are ignored.
pub fn parse_gmsh(bytes: &[u8], shape: &str) -> Result<SurfaceMesh> {
    if shape != "triangular" {
        return Err(BemError::MeshImport(format!(
            "unsupported element shape '{shape}', only 'triangular' meshes can be imported"
        )));
    }

    let msh = mshio::parse_msh_bytes(bytes)
        .map_err(|e| BemError::MeshImport(format!("parsing the .msh data failed: {e}")))?;
    let nodes = msh
        .data
        .nodes
        .ok_or_else(|| BemError::MeshImport("no nodes".to_string()))?;
    let elements = msh
        .data
        .elements
        .ok_or_else(|| BemError::MeshImport("no elements".to_string()))?;

    let vertices: Vec<[f64; 3]> = nodes
        .node_blocks
        .iter()
        .flat_map(|block| block.nodes.iter())
        .map(|node| [node.x, node.y, node.z])
        .collect();
    if vertices.is_empty() {
        return Err(BemError::MeshImport("no nodes".to_string()));
    }

    // Node tags are assumed to be sequential and start at 1
    let cells = elements
        .element_blocks
        .iter()
        .filter(|block| block.element_type == mshio::ElementType::Tri3)
        .flat_map(|block| block.elements.iter())
        .map(|el| {
            if el.nodes.len() != 3 {
                return Err(BemError::MeshImport(format!(
                    "triangle element has {} nodes",
                    el.nodes.len()
                )));
            }
            let mut cell = [0; 3];
            for (c, tag) in cell.iter_mut().zip(&el.nodes) {
                let tag = *tag as usize;
                if tag == 0 || tag > vertices.len() {
                    return Err(BemError::MeshImport(format!(
                        "element references unknown node tag {tag}"
                    )));
                }
                *c = tag - 1;
            }
            Ok(cell)
        })
        .collect::<Result<Vec<_>>>()?;
    if cells.is_empty() {
        return Err(BemError::MeshImport(
            "no triangle elements in the mesh".to_string(),
        ));
    }

    SurfaceMesh::new(vertices, cells)
}
