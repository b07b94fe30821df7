//! Test input/output
use approx::assert_relative_eq;
use bempp_maxwell::grid::io::{import_gmsh, parse_gmsh};
use bempp_maxwell::types::BemError;

const TETRAHEDRON: [[usize; 3]; 4] = [[1, 3, 2], [1, 2, 4], [1, 4, 3], [2, 3, 4]];

/// An MSH 4.1 file with the vertices of the unit tetrahedron and the given triangles
fn msh(triangles: &[[usize; 3]]) -> String {
    let mut content = String::from(
        "$MeshFormat\n4.1 0 8\n$EndMeshFormat\n\
         $Nodes\n1 4 1 4\n2 1 0 4\n1\n2\n3\n4\n0 0 0\n1 0 0\n0 1 0\n0 0 1\n$EndNodes\n",
    );
    let n = triangles.len();
    content.push_str(&format!("$Elements\n1 {n} 1 {n}\n2 1 2 {n}\n"));
    for (tag, [a, b, c]) in triangles.iter().enumerate() {
        content.push_str(&format!("{} {a} {b} {c}\n", tag + 1));
    }
    content.push_str("$EndElements\n");
    content
}

#[test]
fn test_parse_tetrahedron() {
    let mesh = parse_gmsh(msh(&TETRAHEDRON).as_bytes(), "triangular").unwrap();
    assert_eq!(mesh.number_of_vertices(), 4);
    assert_eq!(mesh.number_of_cells(), 4);
    assert_eq!(mesh.number_of_edges(), 6);
    assert_relative_eq!(mesh.signed_volume(), 1.0 / 6.0, epsilon = 1e-12);
    assert_relative_eq!(
        mesh.surface_area(),
        1.5 + 3.0_f64.sqrt() / 2.0,
        epsilon = 1e-12
    );
}

#[test]
fn test_inward_mesh_is_reoriented() {
    let reversed = TETRAHEDRON.map(|[a, b, c]| [a, c, b]);
    let mesh = parse_gmsh(msh(&reversed).as_bytes(), "triangular").unwrap();
    assert_relative_eq!(mesh.signed_volume(), 1.0 / 6.0, epsilon = 1e-12);
}

#[test]
fn test_import_tetrahedron_from_file() {
    let path = std::env::temp_dir().join(format!("bempp_maxwell_io_{}.msh", std::process::id()));
    std::fs::write(&path, msh(&TETRAHEDRON)).unwrap();
    let mesh = import_gmsh(&path, "triangular");
    std::fs::remove_file(&path).unwrap();
    let mesh = mesh.unwrap();
    assert_eq!(mesh.number_of_cells(), 4);
    for cell in 0..mesh.number_of_cells() {
        let centroid = mesh.centroid(cell);
        let normal = mesh.normal(cell);
        let outward = (0..3)
            .map(|d| (centroid[d] - 0.25) * normal[d])
            .sum::<f64>();
        assert!(outward > 0.0);
    }
}

#[test]
fn test_open_surface_is_rejected() {
    assert!(matches!(
        parse_gmsh(msh(&TETRAHEDRON[..3]).as_bytes(), "triangular"),
        Err(BemError::MeshImport(_))
    ));
}
