//! Assembly of the identity operator
use crate::assembly::common::{equal_meshes, MappedCell, SparseMatrixData};
use crate::linalg::{cross, dot};
use crate::operator::Pairing;
use crate::quadrature::QuadratureStrategy;
use crate::traits::FunctionSpace;
use crate::types::{BemError, Result};
use cauchy::c64;

/// Assemble the sparse matrix of the identity operator
///
/// Entry `(i, j)` is the integral of `phi_j . psi_i` for the L2 pairing and
/// of `phi_j . (psi_i x n)` for the rotated pairing, where `phi_j` is a trial
/// and `psi_i` a test basis function. Only single cell integrals appear.
pub fn assemble_identity<Space: FunctionSpace + ?Sized>(
    test_space: &Space,
    trial_space: &Space,
    pairing: Pairing,
    strategy: &QuadratureStrategy,
) -> Result<SparseMatrixData> {
    if !equal_meshes(test_space.mesh(), trial_space.mesh()) {
        return Err(BemError::IncompatibleSpaces(
            "the identity operator needs test and trial spaces on the same mesh".to_string(),
        ));
    }
    let rule = strategy.single_regular_rule();
    let table = test_space.element().tabulate(&rule.points);
    let shape = [test_space.global_size(), trial_space.global_size()];
    let ncells = test_space.mesh().number_of_cells();
    let mut output = SparseMatrixData::new_known_size(shape, 9 * ncells);

    let mut test = MappedCell::new(rule.npoints);
    let mut trial = MappedCell::new(rule.npoints);
    for cell in 0..ncells {
        test.map(test_space, cell, &rule.points, &table);
        trial.map(trial_space, cell, &rule.points, &table);
        let (Some(test_dofs), Some(trial_dofs)) =
            (test_space.cell_dofs(cell), trial_space.cell_dofs(cell))
        else {
            continue;
        };
        for (j, trial_dof) in trial_dofs.iter().enumerate() {
            for (i, test_dof) in test_dofs.iter().enumerate() {
                let value = rule
                    .weights
                    .iter()
                    .enumerate()
                    .map(|(q, w)| {
                        let v = &test.values[q][i];
                        let u = &trial.values[q][j];
                        w * match pairing {
                            Pairing::L2 => dot(u, v),
                            Pairing::Rotated => dot(u, &cross(v, &test.normal)),
                        }
                    })
                    .sum::<f64>()
                    * test.jdet;
                output.rows.push(*test_dof);
                output.cols.push(*trial_dof);
                output.data.push(c64::new(value, 0.0));
            }
        }
    }
    Ok(output)
}
