//! H-matrix assembly and preconditioned solves
mod common;

use bempp_maxwell::assembly::{assemble, AcaOptions, AssemblyContext};
use bempp_maxwell::function::GridFunction;
use bempp_maxwell::incident::PlaneWave;
use bempp_maxwell::operator::{BoundaryOperator, Pairing};
use bempp_maxwell::preconditioner::Preconditioner;
use bempp_maxwell::quadrature::AccuracyOptions;
use bempp_maxwell::solver::{solve, solve_direct, GmresConfig, SolverStatus};
use bempp_maxwell::traits::DiscreteOperator;
use bempp_maxwell::types::{AbortSignal, BemError};
use cauchy::c64;
use common::sphere_space;
use rand::prelude::*;
use std::sync::Arc;

fn single_layer(level: u32, wavenumber: f64) -> BoundaryOperator {
    let space = sphere_space(level);
    BoundaryOperator::single_layer(space.clone(), space.clone(), space, wavenumber)
}

fn aca_context() -> AssemblyContext {
    AssemblyContext::aca(AcaOptions::default().eps(1e-6).min_block_size(8))
}

fn plane_wave_rhs(operator: &BoundaryOperator, wavenumber: f64) -> GridFunction {
    let wave = PlaneWave::default_pec_example(wavenumber);
    GridFunction::from_function_with_dual(
        operator.range().clone(),
        operator.dual_to_range().clone(),
        Pairing::Rotated,
        &AccuracyOptions::default(),
        |p, n| wave.dirichlet_trace(p, n),
    )
    .unwrap()
}

#[test]
fn test_aca_matches_dense_assembly() {
    let operator = single_layer(2, 1.5);
    let dense = assemble(&operator, &AssemblyContext::dense()).unwrap();
    let compressed = assemble(&operator, &aca_context()).unwrap();
    assert_eq!(dense.shape(), compressed.shape());

    let diagnostics = compressed.diagnostics();
    assert!(diagnostics.low_rank_blocks > 0);
    assert!(diagnostics.dense_blocks > 0);
    assert!(diagnostics.compression_ratio() <= 1.0);
    assert!(compressed.weak_form().as_hmatrix().is_some());

    let mut rng = StdRng::seed_from_u64(7);
    let x = (0..dense.shape()[1])
        .map(|_| c64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5))
        .collect::<Vec<_>>();
    let exact = dense.weak_form().matvec(&x).unwrap();
    let approximate = compressed.weak_form().matvec(&x).unwrap();
    let error = exact
        .iter()
        .zip(&approximate)
        .map(|(a, b)| (a - b).norm_sqr())
        .sum::<f64>()
        .sqrt();
    let norm = exact.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
    assert!(error / norm < 1e-3, "relative matvec error {}", error / norm);
}

#[test]
fn test_hmatrix_lu_preconditioner_reduces_iterations() {
    let k = 1.0;
    let operator = single_layer(2, k);
    let lhs = assemble(&operator, &aca_context()).unwrap();
    let rhs = plane_wave_rhs(&operator, k);
    let config = GmresConfig::default().tolerance(1e-6).restart(200);

    let plain = solve(&lhs, &rhs, None, &config, None).unwrap();
    let preconditioner = Preconditioner::approximate_lu(lhs.weak_form().as_ref(), 1e-3).unwrap();
    let preconditioned = solve(&lhs, &rhs, Some(&preconditioner), &config, None).unwrap();

    assert!(preconditioned.converged, "{}", preconditioned.message());
    assert!(preconditioned.iterations < plain.iterations);
    assert!(preconditioned.residual_norm < 1e-6);
}

#[test]
fn test_block_diagonal_preconditioner_of_two_problems() {
    let k = 1.0;
    let operator = single_layer(1, k);
    let lhs = assemble(&operator, &AssemblyContext::dense()).unwrap();
    let inverse = Preconditioner::approximate_lu(lhs.weak_form().as_ref(), 1e-8).unwrap();
    let block = Preconditioner::block_diagonal(vec![
        inverse.operator().clone(),
        inverse.operator().clone(),
    ]);
    let n = lhs.shape()[0];
    assert_eq!(block.operator().shape(), [2 * n, 2 * n]);

    let rhs = plane_wave_rhs(&operator, k)
        .projections(lhs.dual_to_range(), lhs.range_pairing())
        .unwrap();
    let stacked = [rhs.clone(), rhs].concat();
    let solution = block.apply(&stacked).unwrap();
    let first = lhs.weak_form().matvec(&solution[..n]).unwrap();
    let second = lhs.weak_form().matvec(&solution[n..]).unwrap();
    for i in 0..n {
        assert!((first[i] - stacked[i]).norm() < 1e-6);
        assert!((second[i] - stacked[i]).norm() < 1e-6);
    }
}

#[test]
fn test_aborted_assembly_and_solve() {
    let k = 1.0;
    let operator = single_layer(1, k);
    let signal = AbortSignal::new();
    signal.abort();
    assert!(matches!(
        assemble(&operator, &aca_context().with_abort(signal.clone())),
        Err(BemError::Aborted)
    ));

    let lhs = assemble(&operator, &AssemblyContext::dense()).unwrap();
    let rhs = plane_wave_rhs(&operator, k);
    let result = solve(&lhs, &rhs, None, &GmresConfig::default(), Some(&signal)).unwrap();
    assert_eq!(result.status, SolverStatus::Aborted);
    assert!(!result.converged);
}

#[test]
fn test_iteration_limit_is_reported() {
    let k = 1.0;
    let operator = single_layer(1, k);
    let lhs = assemble(&operator, &AssemblyContext::dense()).unwrap();
    let rhs = plane_wave_rhs(&operator, k);
    let result = solve(
        &lhs,
        &rhs,
        None,
        &GmresConfig::default().tolerance(1e-12).max_iterations(2),
        None,
    )
    .unwrap();
    assert_eq!(result.status, SolverStatus::MaxIterationsReached);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.residual_history.len(), 3);
    assert!(!result.message().is_empty());
}

#[test]
fn test_direct_solve_matches_gmres() {
    let k = 1.0;
    let operator = single_layer(1, k);
    let lhs = assemble(&operator, &AssemblyContext::dense()).unwrap();
    let rhs = plane_wave_rhs(&operator, k);

    let direct = solve_direct(&lhs, &rhs).unwrap();
    assert!(direct.converged, "{}", direct.message());
    assert_eq!(direct.status, SolverStatus::Converged);
    assert_eq!(direct.iterations, 0);
    assert!(direct.residual_norm < 1e-10);

    let iterative = solve(
        &lhs,
        &rhs,
        None,
        &GmresConfig::default().tolerance(1e-12).restart(500),
        None,
    )
    .unwrap();
    assert!(iterative.converged, "{}", iterative.message());
    let x = iterative.solution.coefficients().unwrap();
    let y = direct.solution.coefficients().unwrap();
    let error = x
        .iter()
        .zip(&y)
        .map(|(a, b)| (a - b).norm_sqr())
        .sum::<f64>()
        .sqrt();
    let norm = y.iter().map(|b| b.norm_sqr()).sum::<f64>().sqrt();
    assert!(error / norm < 1e-8, "relative difference {}", error / norm);

    let zero = GridFunction::from_coefficients(
        lhs.range().clone(),
        vec![c64::new(0.0, 0.0); lhs.shape()[0]],
    )
    .unwrap();
    let trivial = solve_direct(&lhs, &zero).unwrap();
    assert!(trivial.converged);
    assert!(trivial.solution.coefficients().unwrap().iter().all(|c| c.norm() == 0.0));

    let other = plane_wave_rhs(&single_layer(0, k), k);
    assert!(matches!(
        solve_direct(&lhs, &other),
        Err(BemError::IncompatibleSpaces(_))
    ));
}

#[test]
fn test_preconditioner_from_operator() {
    let operator = single_layer(0, 1.0);
    let lhs = assemble(&operator, &AssemblyContext::dense()).unwrap();
    let preconditioner = Preconditioner::from_operator(Arc::clone(lhs.weak_form()));
    let x = vec![c64::new(1.0, 0.0); lhs.shape()[1]];
    assert_eq!(
        preconditioner.apply(&x).unwrap(),
        lhs.weak_form().matvec(&x).unwrap()
    );
}
