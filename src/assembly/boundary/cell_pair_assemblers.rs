//! Assemblers that assemble the contributions to the global matrix due to a single pair of cells

use crate::assembly::common::MappedCell;
use crate::element::ReferenceTable;
use crate::traits::{BoundaryIntegrand, CellPairAssembler, FunctionSpace, KernelEvaluator};
use cauchy::c64;
use num::Zero;
use rlst::{DynamicArray, RawAccessMut};

/// Assembler for the contributions from pairs of neighbouring cells
///
/// The test and trial points are paired: point `q` of the test cell
/// interacts with point `q` of the trial cell only.
pub struct SingularCellPairAssembler<
    'a,
    I: BoundaryIntegrand,
    K: KernelEvaluator,
    Space: FunctionSpace + ?Sized,
> {
    integrand: &'a I,
    kernel: &'a K,
    test_space: &'a Space,
    trial_space: &'a Space,
    test_points: &'a [f64],
    trial_points: &'a [f64],
    test_table: &'a ReferenceTable,
    trial_table: &'a ReferenceTable,
    weights: &'a [f64],
    k: Vec<c64>,
    test: MappedCell,
    trial: MappedCell,
}

impl<'a, I: BoundaryIntegrand, K: KernelEvaluator, Space: FunctionSpace + ?Sized>
    SingularCellPairAssembler<'a, I, K, Space>
{
    #[allow(clippy::too_many_arguments)]
    /// Create new
    pub fn new(
        integrand: &'a I,
        kernel: &'a K,
        test_space: &'a Space,
        trial_space: &'a Space,
        test_points: &'a [f64],
        trial_points: &'a [f64],
        test_table: &'a ReferenceTable,
        trial_table: &'a ReferenceTable,
        weights: &'a [f64],
    ) -> Self {
        let npts = weights.len();
        Self {
            integrand,
            kernel,
            test_space,
            trial_space,
            test_points,
            trial_points,
            test_table,
            trial_table,
            weights,
            k: vec![c64::zero(); npts * integrand.kernel_eval_type().value_count()],
            test: MappedCell::new(npts),
            trial: MappedCell::new(npts),
        }
    }
}

impl<'a, I: BoundaryIntegrand, K: KernelEvaluator, Space: FunctionSpace + ?Sized>
    CellPairAssembler for SingularCellPairAssembler<'a, I, K, Space>
{
    fn set_test_cell(&mut self, test_cell: usize) {
        self.test
            .map(self.test_space, test_cell, self.test_points, self.test_table);
    }
    fn set_trial_cell(&mut self, trial_cell: usize) {
        self.trial
            .map(self.trial_space, trial_cell, self.trial_points, self.trial_table);
    }
    fn assemble(&mut self, local_mat: &mut DynamicArray<c64, 2>) {
        let eval_type = self.integrand.kernel_eval_type();
        let nvalues = eval_type.value_count();
        self.kernel.assemble_pairwise_st(
            eval_type,
            &self.trial.points,
            &self.test.points,
            &mut self.k,
        );
        let jdet = self.test.jdet * self.trial.jdet;

        let data = local_mat.data_mut();
        for trial_i in 0..3 {
            for test_i in 0..3 {
                let mut entry = c64::zero();
                for (index, wt) in self.weights.iter().enumerate() {
                    entry += self.integrand.evaluate(
                        &self.k[index * nvalues..(index + 1) * nvalues],
                        &self.test.values[index][test_i],
                        self.test.divergences[test_i],
                        &self.trial.values[index][trial_i],
                        self.trial.divergences[trial_i],
                    ) * *wt;
                }
                data[test_i + 3 * trial_i] = entry * jdet;
            }
        }
    }
}

/// Assembler for the contributions from pairs of non-neighbouring cells
///
/// Every test point interacts with every trial point.
pub struct NonsingularCellPairAssembler<
    'a,
    I: BoundaryIntegrand,
    K: KernelEvaluator,
    Space: FunctionSpace + ?Sized,
> {
    integrand: &'a I,
    kernel: &'a K,
    test_space: &'a Space,
    trial_space: &'a Space,
    points: &'a [f64],
    table: &'a ReferenceTable,
    weights: &'a [f64],
    k: Vec<c64>,
    test: MappedCell,
    trial: MappedCell,
}

impl<'a, I: BoundaryIntegrand, K: KernelEvaluator, Space: FunctionSpace + ?Sized>
    NonsingularCellPairAssembler<'a, I, K, Space>
{
    #[allow(clippy::too_many_arguments)]
    /// Create new
    ///
    /// The same triangle rule is used on the test and the trial cell.
    pub fn new(
        integrand: &'a I,
        kernel: &'a K,
        test_space: &'a Space,
        trial_space: &'a Space,
        points: &'a [f64],
        table: &'a ReferenceTable,
        weights: &'a [f64],
    ) -> Self {
        let npts = weights.len();
        Self {
            integrand,
            kernel,
            test_space,
            trial_space,
            points,
            table,
            weights,
            k: vec![c64::zero(); npts * npts * integrand.kernel_eval_type().value_count()],
            test: MappedCell::new(npts),
            trial: MappedCell::new(npts),
        }
    }
}

impl<'a, I: BoundaryIntegrand, K: KernelEvaluator, Space: FunctionSpace + ?Sized>
    CellPairAssembler for NonsingularCellPairAssembler<'a, I, K, Space>
{
    fn set_test_cell(&mut self, test_cell: usize) {
        self.test
            .map(self.test_space, test_cell, self.points, self.table);
    }
    fn set_trial_cell(&mut self, trial_cell: usize) {
        self.trial
            .map(self.trial_space, trial_cell, self.points, self.table);
    }
    fn assemble(&mut self, local_mat: &mut DynamicArray<c64, 2>) {
        let eval_type = self.integrand.kernel_eval_type();
        let nvalues = eval_type.value_count();
        let npts = self.weights.len();
        self.kernel.assemble_st(
            eval_type,
            &self.trial.points,
            &self.test.points,
            &mut self.k,
        );
        let jdet = self.test.jdet * self.trial.jdet;

        let data = local_mat.data_mut();
        for trial_i in 0..3 {
            for test_i in 0..3 {
                let mut entry = c64::zero();
                for (test_index, test_wt) in self.weights.iter().enumerate() {
                    let mut inner = c64::zero();
                    for (trial_index, trial_wt) in self.weights.iter().enumerate() {
                        let start = (test_index * npts + trial_index) * nvalues;
                        inner += self.integrand.evaluate(
                            &self.k[start..start + nvalues],
                            &self.test.values[test_index][test_i],
                            self.test.divergences[test_i],
                            &self.trial.values[trial_index][trial_i],
                            self.trial.divergences[trial_i],
                        ) * *trial_wt;
                    }
                    entry += inner * *test_wt;
                }
                data[test_i + 3 * trial_i] = entry * jdet;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assembly::boundary::integrands::SingleLayerBoundaryIntegrand;
    use crate::assembly::kernels::HelmholtzKernel;
    use crate::function::RaviartThomasSpace;
    use crate::grid::shapes::regular_sphere;
    use crate::quadrature::simplex_rules::simplex_rule;
    use crate::quadrature::ReferenceCell;
    use approx::assert_relative_eq;
    use rlst::{rlst_dynamic_array2, RawAccess};
    use std::sync::Arc;

    #[test]
    fn test_non_singular_converges() {
        // Two far apart cells: a low order and a high order rule agree closely
        let mesh = Arc::new(regular_sphere(2));
        let space = RaviartThomasSpace::new(mesh.clone());
        let integrand = SingleLayerBoundaryIntegrand::new(1.0);
        let kernel = HelmholtzKernel::new(1.0);

        let (test_cell, trial_cell) = (0, mesh.number_of_cells() - 1);
        assert!(mesh.shared_vertices(test_cell, trial_cell).is_empty());

        let mut results = vec![];
        for npts in [16, 64] {
            let rule = simplex_rule(ReferenceCell::Triangle, npts).unwrap();
            let table = space.element().tabulate(&rule.points);
            let mut a = NonsingularCellPairAssembler::new(
                &integrand,
                &kernel,
                &space,
                &space,
                &rule.points,
                &table,
                &rule.weights,
            );
            a.set_test_cell(test_cell);
            a.set_trial_cell(trial_cell);
            let mut local = rlst_dynamic_array2!(c64, [3, 3]);
            a.assemble(&mut local);
            results.push(local.data().to_vec());
        }
        for (a, b) in results[0].iter().zip(&results[1]) {
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-4 * b.norm());
        }
    }

    #[test]
    fn test_singular_matches_nonsingular_for_separated_points() {
        // A paired rule built from a tensor product reproduces the
        // non-singular assembler
        let mesh = Arc::new(regular_sphere(1));
        let space = RaviartThomasSpace::new(mesh.clone());
        let integrand = SingleLayerBoundaryIntegrand::new(1.5);
        let kernel = HelmholtzKernel::new(1.5);
        let (test_cell, trial_cell) = (0, mesh.number_of_cells() - 1);

        let rule = simplex_rule(ReferenceCell::Triangle, 4).unwrap();
        let table = space.element().tabulate(&rule.points);
        let mut test_points = vec![];
        let mut trial_points = vec![];
        let mut weights = vec![];
        for i in 0..rule.npoints {
            for j in 0..rule.npoints {
                test_points.extend_from_slice(&rule.points[2 * i..2 * i + 2]);
                trial_points.extend_from_slice(&rule.points[2 * j..2 * j + 2]);
                weights.push(rule.weights[i] * rule.weights[j]);
            }
        }
        let test_table = space.element().tabulate(&test_points);
        let trial_table = space.element().tabulate(&trial_points);

        let mut a0 = NonsingularCellPairAssembler::new(
            &integrand,
            &kernel,
            &space,
            &space,
            &rule.points,
            &table,
            &rule.weights,
        );
        let mut a1 = SingularCellPairAssembler::new(
            &integrand,
            &kernel,
            &space,
            &space,
            &test_points,
            &trial_points,
            &test_table,
            &trial_table,
            &weights,
        );
        let mut result0 = rlst_dynamic_array2!(c64, [3, 3]);
        let mut result1 = rlst_dynamic_array2!(c64, [3, 3]);
        a0.set_test_cell(test_cell);
        a0.set_trial_cell(trial_cell);
        a1.set_test_cell(test_cell);
        a1.set_trial_cell(trial_cell);
        a0.assemble(&mut result0);
        a1.assemble(&mut result1);
        for (v0, v1) in result0.data().iter().zip(result1.data()) {
            assert_relative_eq!((v0 - v1).norm(), 0.0, epsilon = 1e-13);
        }
    }
}
