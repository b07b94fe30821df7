//! Assembly of boundary operators
mod cell_pair_assemblers;
mod identity;
pub mod integrands;

pub use cell_pair_assemblers::{NonsingularCellPairAssembler, SingularCellPairAssembler};
pub use identity::assemble_identity;

use crate::assembly::common::{cell_pair_distance, equal_meshes, RawData2D, SparseMatrixData};
use crate::assembly::kernels::HelmholtzKernel;
use crate::element::ReferenceTable;
use crate::quadrature::{CellToCellConnectivity, QuadratureStrategy, MAX_QUADRATURE_ORDER};
use crate::traits::{BoundaryIntegrand, CellPairAssembler, FunctionSpace};
use crate::types::{check_abort, AbortSignal, BemError, Result};
use cauchy::c64;
use rayon::prelude::*;
use rlst::{rlst_dynamic_array2, DynamicArray, RawAccess, RawAccessMut};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Connectivity of every way in which two distinct or identical triangles can touch
///
/// The local index pairs are sorted by test index, matching [`crate::grid::SurfaceMesh::shared_vertices`].
fn possible_connectivities() -> Vec<CellToCellConnectivity> {
    let mut connectivities = vec![];
    // Vertex-adjacent
    for i in 0..3 {
        for j in 0..3 {
            connectivities.push(CellToCellConnectivity {
                connectivity_dimension: 0,
                local_indices: vec![(i, j)],
            });
        }
    }
    // Edge-adjacent
    for i0 in 0..3 {
        for i1 in i0 + 1..3 {
            for j0 in 0..3 {
                for j1 in 0..3 {
                    if j0 != j1 {
                        connectivities.push(CellToCellConnectivity {
                            connectivity_dimension: 1,
                            local_indices: vec![(i0, j0), (i1, j1)],
                        });
                    }
                }
            }
        }
    }
    // Same cell
    connectivities.push(CellToCellConnectivity {
        connectivity_dimension: 2,
        local_indices: vec![(0, 0), (1, 1), (2, 2)],
    });
    connectivities
}

/// A singular rule with the basis tabulated at its test and trial points
struct SingularRule {
    test_points: Vec<f64>,
    trial_points: Vec<f64>,
    weights: Vec<f64>,
    test_table: ReferenceTable,
    trial_table: ReferenceTable,
}

/// A regular triangle rule with the basis tabulated at its points
struct RegularRule {
    points: Vec<f64>,
    weights: Vec<f64>,
    table: ReferenceTable,
}

/// Cell pair assemblers of one worker, created on first use
struct LocalAssemblers<'b, I: BoundaryIntegrand, Space: FunctionSpace + ?Sized> {
    regular: HashMap<usize, NonsingularCellPairAssembler<'b, I, HelmholtzKernel, Space>>,
    singular: HashMap<usize, SingularCellPairAssembler<'b, I, HelmholtzKernel, Space>>,
}

impl<'b, I: BoundaryIntegrand, Space: FunctionSpace + ?Sized> LocalAssemblers<'b, I, Space> {
    fn new() -> Self {
        Self {
            regular: HashMap::new(),
            singular: HashMap::new(),
        }
    }
}

/// Boundary assembler
///
/// Assembles a boundary operator between a test and a trial space by
/// processing batches of cells in parallel. Pairs of cells that share a
/// vertex are integrated with singular rules; all other pairs use a
/// regular rule whose order depends on their distance.
pub struct BoundaryAssembler<'a, I: BoundaryIntegrand, Space: FunctionSpace + ?Sized> {
    integrand: I,
    kernel: HelmholtzKernel,
    strategy: &'a QuadratureStrategy,
    test_space: &'a Space,
    trial_space: &'a Space,
    batch_size: usize,
    same_mesh: bool,
    singular_rules: Vec<SingularRule>,
    singular_indices: HashMap<Vec<(usize, usize)>, usize>,
    regular_rules: HashMap<usize, RegularRule>,
    clamped: AtomicUsize,
}

impl<'a, I: BoundaryIntegrand, Space: FunctionSpace + ?Sized> BoundaryAssembler<'a, I, Space> {
    /// Create new
    pub fn new(
        integrand: I,
        kernel: HelmholtzKernel,
        strategy: &'a QuadratureStrategy,
        test_space: &'a Space,
        trial_space: &'a Space,
        batch_size: usize,
    ) -> Result<Self> {
        let same_mesh = equal_meshes(test_space.mesh(), trial_space.mesh());
        let element = test_space.element();

        let mut singular_rules = vec![];
        let mut singular_indices = HashMap::new();
        if same_mesh {
            for connectivity in possible_connectivities() {
                let rule = strategy.singular_rule(&connectivity)?;
                singular_indices.insert(connectivity.local_indices, singular_rules.len());
                singular_rules.push(SingularRule {
                    test_table: element.tabulate(&rule.test_points),
                    trial_table: element.tabulate(&rule.trial_points),
                    test_points: rule.test_points,
                    trial_points: rule.trial_points,
                    weights: rule.weights,
                });
            }
        }

        let regular_rules = (strategy.double_regular_order()..=MAX_QUADRATURE_ORDER)
            .map(|order| {
                let rule = strategy.triangle_rule(order);
                (
                    order,
                    RegularRule {
                        table: element.tabulate(&rule.points),
                        points: rule.points.clone(),
                        weights: rule.weights.clone(),
                    },
                )
            })
            .collect();

        Ok(Self {
            integrand,
            kernel,
            strategy,
            test_space,
            trial_space,
            batch_size: batch_size.max(1),
            same_mesh,
            singular_rules,
            singular_indices,
            regular_rules,
            clamped: AtomicUsize::new(0),
        })
    }

    /// Shape of the assembled matrix
    pub fn shape(&self) -> [usize; 2] {
        [self.test_space.global_size(), self.trial_space.global_size()]
    }

    /// Number of cell pair integrals whose quadrature order had to be clamped
    pub fn clamped_pairs(&self) -> usize {
        self.clamped.load(Ordering::Relaxed)
    }

    /// Index of the singular rule for a pair of cells, or `None` if the cells do not touch
    fn singular_index(&self, test_cell: usize, trial_cell: usize) -> Result<Option<usize>> {
        if !self.same_mesh {
            return Ok(None);
        }
        let pairs = self
            .test_space
            .mesh()
            .shared_vertices(test_cell, trial_cell);
        if pairs.is_empty() {
            return Ok(None);
        }
        if pairs.len() == 3 && test_cell != trial_cell {
            return Err(BemError::SingularIntegrationFailure(format!(
                "cells {test_cell} and {trial_cell} share all of their vertices"
            )));
        }
        self.singular_indices
            .get(&pairs)
            .copied()
            .map(Some)
            .ok_or_else(|| {
                BemError::SingularIntegrationFailure(format!(
                    "no singular rule for cells {test_cell} and {trial_cell} touching at {pairs:?}"
                ))
            })
    }

    /// Assemble the local matrix of a pair of cells
    fn assemble_pair<'b>(
        &'b self,
        local: &mut LocalAssemblers<'b, I, Space>,
        test_cell: usize,
        trial_cell: usize,
        local_mat: &mut DynamicArray<c64, 2>,
    ) -> Result<()> {
        if let Some(index) = self.singular_index(test_cell, trial_cell)? {
            let a = local.singular.entry(index).or_insert_with(|| {
                let rule = &self.singular_rules[index];
                SingularCellPairAssembler::new(
                    &self.integrand,
                    &self.kernel,
                    self.test_space,
                    self.trial_space,
                    &rule.test_points,
                    &rule.trial_points,
                    &rule.test_table,
                    &rule.trial_table,
                    &rule.weights,
                )
            });
            a.set_test_cell(test_cell);
            a.set_trial_cell(trial_cell);
            a.assemble(local_mat);
            return Ok(());
        }

        let distance = cell_pair_distance(
            self.test_space.mesh(),
            test_cell,
            self.trial_space.mesh(),
            trial_cell,
        );
        let (order, clamped) = self.strategy.regular_order(distance);
        if clamped {
            self.clamped.fetch_add(1, Ordering::Relaxed);
        }
        let rule = self.regular_rules.get(&order).ok_or_else(|| {
            BemError::QuadratureConfig(format!("no regular rule of order {order}"))
        })?;
        let a = local.regular.entry(order).or_insert_with(|| {
            NonsingularCellPairAssembler::new(
                &self.integrand,
                &self.kernel,
                self.test_space,
                self.trial_space,
                &rule.points,
                &rule.table,
                &rule.weights,
            )
        });
        a.set_test_cell(test_cell);
        a.set_trial_cell(trial_cell);
        a.assemble(local_mat);
        Ok(())
    }

    /// Assemble the contributions of a batch of test cells paired with every non-touching trial cell
    fn assemble_batch_nonadjacent(
        &self,
        output: &RawData2D,
        test_cells: &[usize],
        abort: Option<&AbortSignal>,
    ) -> Result<()> {
        check_abort(abort)?;
        let mut local = LocalAssemblers::new();
        let mut local_mat = rlst_dynamic_array2!(c64, [3, 3]);
        let ntrial_cells = self.trial_space.mesh().number_of_cells();
        for test_cell in test_cells {
            let test_dofs = self
                .test_space
                .cell_dofs(*test_cell)
                .ok_or(BemError::DimensionMismatch {
                    expected: self.test_space.mesh().number_of_cells(),
                    actual: *test_cell,
                })?;
            for trial_cell in 0..ntrial_cells {
                if self.same_mesh
                    && !self
                        .test_space
                        .mesh()
                        .shared_vertices(*test_cell, trial_cell)
                        .is_empty()
                {
                    continue;
                }
                self.assemble_pair(&mut local, *test_cell, trial_cell, &mut local_mat)?;
                let trial_dofs = self.trial_space.cell_dofs(trial_cell).unwrap_or(&[]);
                let values = local_mat.data();
                for (j, trial_dof) in trial_dofs.iter().enumerate() {
                    for (i, test_dof) in test_dofs.iter().enumerate() {
                        // Cells of one colour share no test DOF, so no other
                        // batch writes to this row concurrently.
                        unsafe {
                            *output.data.add(*test_dof + output.shape[0] * *trial_dof) +=
                                values[i + 3 * j];
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Assemble the contributions of a batch of pairs of touching cells
    fn assemble_batch_singular(
        &self,
        cell_pairs: &[(usize, usize)],
        abort: Option<&AbortSignal>,
    ) -> Result<SparseMatrixData> {
        check_abort(abort)?;
        let mut output = SparseMatrixData::new_known_size(self.shape(), 9 * cell_pairs.len());
        let mut local = LocalAssemblers::new();
        let mut local_mat = rlst_dynamic_array2!(c64, [3, 3]);
        for (test_cell, trial_cell) in cell_pairs {
            self.assemble_pair(&mut local, *test_cell, *trial_cell, &mut local_mat)?;
            let test_dofs = self.test_space.cell_dofs(*test_cell).unwrap_or(&[]);
            let trial_dofs = self.trial_space.cell_dofs(*trial_cell).unwrap_or(&[]);
            let values = local_mat.data();
            for (j, trial_dof) in trial_dofs.iter().enumerate() {
                for (i, test_dof) in test_dofs.iter().enumerate() {
                    output.rows.push(*test_dof);
                    output.cols.push(*trial_dof);
                    output.data.push(values[i + 3 * j]);
                }
            }
        }
        Ok(output)
    }

    /// Assemble the contributions of all pairs of touching cells
    pub fn assemble_singular(&self, abort: Option<&AbortSignal>) -> Result<SparseMatrixData> {
        if !self.same_mesh {
            return Ok(SparseMatrixData::new(self.shape()));
        }
        let mesh = self.test_space.mesh();
        let cell_pairs = (0..mesh.number_of_cells())
            .flat_map(|test_cell| {
                mesh.touching_cells(test_cell)
                    .into_iter()
                    .map(move |trial_cell| (test_cell, trial_cell))
            })
            .collect::<Vec<_>>();

        cell_pairs
            .par_chunks(self.batch_size)
            .map(|batch| self.assemble_batch_singular(batch, abort))
            .try_reduce(
                || SparseMatrixData::new(self.shape()),
                |mut a, b| {
                    a.add(b);
                    Ok(a)
                },
            )
    }

    /// Assemble the contributions of all pairs of non-touching cells into a dense matrix
    pub fn assemble_nonsingular_into_dense(
        &self,
        output: &mut DynamicArray<c64, 2>,
        abort: Option<&AbortSignal>,
    ) -> Result<()> {
        let raw = RawData2D {
            data: output.data_mut().as_mut_ptr(),
            shape: self.shape(),
        };
        for colour in self.test_space.cell_colouring() {
            colour
                .par_chunks(self.batch_size)
                .map(|batch| self.assemble_batch_nonadjacent(&raw, batch, abort))
                .collect::<Result<Vec<_>>>()?;
        }
        Ok(())
    }

    /// Assemble the full operator into a dense matrix
    pub fn assemble_into_dense(&self, abort: Option<&AbortSignal>) -> Result<DynamicArray<c64, 2>> {
        let mut output = rlst_dynamic_array2!(c64, self.shape());
        self.assemble_nonsingular_into_dense(&mut output, abort)?;
        self.assemble_singular(abort)?.add_into_dense(&mut output);
        Ok(output)
    }

    /// Assemble the sub-matrix with the given test DOFs as rows and trial DOFs as columns
    pub fn assemble_entries(&self, rows: &[usize], cols: &[usize]) -> Result<DynamicArray<c64, 2>> {
        let mut output = rlst_dynamic_array2!(c64, [rows.len(), cols.len()]);
        let test_cells = dof_positions(self.test_space, rows);
        let trial_cells = dof_positions(self.trial_space, cols);

        let mut local = LocalAssemblers::new();
        let mut local_mat = rlst_dynamic_array2!(c64, [3, 3]);
        let nrows = rows.len();
        for (test_cell, test_positions) in &test_cells {
            for (trial_cell, trial_positions) in &trial_cells {
                self.assemble_pair(&mut local, *test_cell, *trial_cell, &mut local_mat)?;
                let values = local_mat.data();
                let data = output.data_mut();
                for (trial_local, col) in trial_positions {
                    for (test_local, row) in test_positions {
                        data[row + nrows * col] += values[test_local + 3 * trial_local];
                    }
                }
            }
        }
        Ok(output)
    }
}

/// For each cell in the support of the given DOFs, the (local index, position) pairs of those DOFs
fn dof_positions<Space: FunctionSpace + ?Sized>(
    space: &Space,
    dofs: &[usize],
) -> Vec<(usize, Vec<(usize, usize)>)> {
    let mut cells: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
    for (position, dof) in dofs.iter().enumerate() {
        for (cell, local) in space.dof_cells(*dof) {
            cells.entry(*cell).or_default().push((*local, position));
        }
    }
    let mut cells = cells.into_iter().collect::<Vec<_>>();
    cells.sort_unstable_by_key(|(cell, _)| *cell);
    cells
}

#[cfg(test)]
mod test {
    use super::integrands::{DoubleLayerBoundaryIntegrand, SingleLayerBoundaryIntegrand};
    use super::*;
    use crate::assembly::AccuracyOptions;
    use crate::function::RaviartThomasSpace;
    use crate::grid::shapes::regular_sphere;
    use approx::assert_relative_eq;
    use paste::paste;
    use std::sync::Arc;

    fn strategy() -> QuadratureStrategy {
        QuadratureStrategy::new(&AccuracyOptions::default()).unwrap()
    }

    #[test]
    fn test_possible_connectivities() {
        let c = possible_connectivities();
        assert_eq!(c.len(), 9 + 18 + 1);
        let mesh = regular_sphere(1);
        for test_cell in 0..mesh.number_of_cells() {
            for trial_cell in mesh.touching_cells(test_cell) {
                let pairs = mesh.shared_vertices(test_cell, trial_cell);
                assert!(c.iter().any(|x| x.local_indices == pairs));
            }
        }
    }

    macro_rules! entries_match_dense {
        ($name:ident, $integrand:expr) => {
            paste! {
                #[test]
                fn [<test_ $name _entries_match_dense>]() {
                    let mesh = Arc::new(regular_sphere(1));
                    let space = RaviartThomasSpace::new(mesh);
                    let strategy = strategy();
                    let assembler =
                        BoundaryAssembler::new($integrand, HelmholtzKernel::new(1.3), &strategy, &space, &space, 16)
                            .unwrap();
                    let dense = assembler.assemble_into_dense(None).unwrap();
                    let n = space.global_size();
                    let rows = [3, 0, 7, n - 1];
                    let cols = [5, 1, 3];
                    let block = assembler.assemble_entries(&rows, &cols).unwrap();
                    for (j, col) in cols.iter().enumerate() {
                        for (i, row) in rows.iter().enumerate() {
                            let a = block.data()[i + rows.len() * j];
                            let b = dense.data()[row + n * col];
                            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-12);
                        }
                    }
                }
            }
        };
    }

    entries_match_dense!(single_layer, SingleLayerBoundaryIntegrand::new(1.3));
    entries_match_dense!(double_layer, DoubleLayerBoundaryIntegrand::new());

    #[test]
    fn test_single_layer_is_symmetric() {
        let mesh = Arc::new(regular_sphere(1));
        let space = RaviartThomasSpace::new(mesh);
        let strategy = strategy();
        let assembler = BoundaryAssembler::new(
            SingleLayerBoundaryIntegrand::new(1.0),
            HelmholtzKernel::new(1.0),
            &strategy,
            &space,
            &space,
            8,
        )
        .unwrap();
        let dense = assembler.assemble_into_dense(None).unwrap();
        let n = space.global_size();
        let data = dense.data();
        let scale = data.iter().map(|x| x.norm()).fold(0.0, f64::max);
        for i in 0..n {
            for j in 0..n {
                assert_relative_eq!(
                    (data[i + n * j] - data[j + n * i]).norm(),
                    0.0,
                    epsilon = 1e-3 * scale
                );
            }
        }
    }

    #[test]
    fn test_aborted_assembly() {
        let mesh = Arc::new(regular_sphere(1));
        let space = RaviartThomasSpace::new(mesh);
        let strategy = strategy();
        let assembler = BoundaryAssembler::new(
            DoubleLayerBoundaryIntegrand::new(),
            HelmholtzKernel::new(1.0),
            &strategy,
            &space,
            &space,
            8,
        )
        .unwrap();
        let abort = AbortSignal::new();
        abort.abort();
        assert!(matches!(
            assembler.assemble_into_dense(Some(&abort)),
            Err(BemError::Aborted)
        ));
    }
}
