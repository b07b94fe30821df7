//! Iterative solution of boundary integral equations
//!
//! Restarted GMRES with right preconditioning. Non-convergence is not an
//! error: it is reported through [`SolverStatus`].
use crate::function::GridFunction;
use crate::linalg::{inner, norm2};
use crate::operator::AssembledBoundaryOperator;
use crate::preconditioner::{DenseLuInverse, Preconditioner};
use crate::traits::DiscreteOperator;
use crate::types::{AbortSignal, BemError, Result, TranspositionMode};
use cauchy::c64;
use log::{debug, info, warn};
use num::{One, Zero};

/// GMRES configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GmresConfig {
    /// Relative tolerance `|b - Ax| / |b|`
    pub tolerance: f64,
    /// Maximum total number of iterations
    pub max_iterations: usize,
    /// Number of iterations before a restart
    pub restart: usize,
}

impl Default for GmresConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 1000,
            restart: 100,
        }
    }
}

impl GmresConfig {
    /// Set the tolerance
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
    /// Set the maximum number of iterations
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
    /// Set the restart length
    pub fn restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            Err(BemError::InvalidArgument(format!(
                "GMRES tolerance {} must be non-negative and finite",
                self.tolerance
            )))
        } else if self.restart == 0 {
            Err(BemError::InvalidArgument(
                "GMRES restart length must be positive".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Why GMRES stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// The relative residual reached the tolerance
    Converged,
    /// The maximum number of iterations was reached first
    MaxIterationsReached,
    /// A non-finite value or a singular least squares problem was met
    Breakdown,
    /// The abort signal was set
    Aborted,
}

/// Result of GMRES on raw vectors
#[derive(Debug, Clone)]
pub struct GmresSolution {
    /// Solution
    pub x: Vec<c64>,
    /// Whether the tolerance was reached
    pub converged: bool,
    /// Final relative residual, recomputed from the solution
    pub residual_norm: f64,
    /// Total number of iterations
    pub iterations: usize,
    /// Number of restarts
    pub restarts: usize,
    /// Relative residual estimate after every iteration, starting with the initial residual
    pub residual_history: Vec<f64>,
    /// Why the iteration stopped
    pub status: SolverStatus,
}

/// Rotation `[c s; -conj(s) c]` that eliminates `b` from `(a, b)`
fn givens(a: c64, b: c64) -> (f64, c64, c64) {
    let norm_a = a.norm();
    if norm_a == 0.0 {
        return (0.0, c64::one(), b);
    }
    let t = (a.norm_sqr() + b.norm_sqr()).sqrt();
    let phase = a / norm_a;
    (norm_a / t, phase * b.conj() / t, phase * t)
}

fn relative_residual(a: &dyn DiscreteOperator, b: &[c64], x: &[c64], b_norm: f64) -> Result<f64> {
    let mut r = b.to_vec();
    a.apply(
        TranspositionMode::NoTranspose,
        x,
        &mut r,
        -c64::one(),
        c64::one(),
    )?;
    Ok(norm2(&r) / b_norm)
}

/// Solve `A x = b` with restarted GMRES
///
/// With a preconditioner `M`, GMRES is applied to `A M y = b` and `x = M y`.
/// The iteration stops when the relative residual reaches the tolerance,
/// after `max_iterations` iterations, when a non-finite value appears or
/// when `abort` is set.
pub fn gmres(
    a: &dyn DiscreteOperator,
    b: &[c64],
    preconditioner: Option<&dyn DiscreteOperator>,
    config: &GmresConfig,
    abort: Option<&AbortSignal>,
) -> Result<GmresSolution> {
    config.validate()?;
    let [rows, cols] = a.shape();
    if rows != cols {
        return Err(BemError::DimensionMismatch {
            expected: rows,
            actual: cols,
        });
    }
    if b.len() != rows {
        return Err(BemError::DimensionMismatch {
            expected: rows,
            actual: b.len(),
        });
    }
    if let Some(m) = preconditioner {
        if m.shape() != [rows, rows] {
            return Err(BemError::DimensionMismatch {
                expected: rows,
                actual: m.shape()[0],
            });
        }
    }

    let n = rows;
    let mut x = vec![c64::zero(); n];
    let b_norm = norm2(b);
    let mut solution = GmresSolution {
        x: vec![],
        converged: false,
        residual_norm: 0.0,
        iterations: 0,
        restarts: 0,
        residual_history: vec![],
        status: SolverStatus::Converged,
    };
    if !b_norm.is_finite() {
        solution.x = x;
        solution.residual_norm = f64::NAN;
        solution.status = SolverStatus::Breakdown;
        return Ok(solution);
    }
    if b_norm == 0.0 {
        solution.x = x;
        solution.converged = true;
        solution.residual_history.push(0.0);
        return Ok(solution);
    }

    let m = config.restart;
    let mut first_cycle = true;
    let status = loop {
        if abort.is_some_and(|s| s.is_aborted()) {
            break SolverStatus::Aborted;
        }
        let mut r = b.to_vec();
        a.apply(
            TranspositionMode::NoTranspose,
            &x,
            &mut r,
            -c64::one(),
            c64::one(),
        )?;
        let beta = norm2(&r);
        let relative = beta / b_norm;
        if solution.residual_history.is_empty() {
            solution.residual_history.push(relative);
        }
        if !relative.is_finite() {
            break SolverStatus::Breakdown;
        }
        if relative <= config.tolerance {
            break SolverStatus::Converged;
        }
        if solution.iterations >= config.max_iterations {
            break SolverStatus::MaxIterationsReached;
        }

        if !first_cycle {
            solution.restarts += 1;
        }
        first_cycle = false;

        let mut basis = Vec::with_capacity(m + 1);
        basis.push(r.iter().map(|v| v / beta).collect::<Vec<_>>());
        // Columns of the Hessenberg matrix, reduced to upper triangular form by the rotations
        let mut h: Vec<Vec<c64>> = Vec::with_capacity(m);
        let mut rotations: Vec<(f64, c64)> = Vec::with_capacity(m);
        let mut g = vec![c64::zero(); m + 1];
        g[0] = c64::new(beta, 0.0);
        let mut aborted = false;
        let mut breakdown = false;

        for j in 0..m {
            if solution.iterations >= config.max_iterations {
                break;
            }
            if abort.is_some_and(|s| s.is_aborted()) {
                aborted = true;
                break;
            }
            let mut w = vec![c64::zero(); n];
            match preconditioner {
                Some(precond) => {
                    let mut z = vec![c64::zero(); n];
                    precond.apply(
                        TranspositionMode::NoTranspose,
                        &basis[j],
                        &mut z,
                        c64::one(),
                        c64::zero(),
                    )?;
                    a.apply(TranspositionMode::NoTranspose, &z, &mut w, c64::one(), c64::zero())?;
                }
                None => a.apply(
                    TranspositionMode::NoTranspose,
                    &basis[j],
                    &mut w,
                    c64::one(),
                    c64::zero(),
                )?,
            }

            // Modified Gram-Schmidt
            let mut column = vec![c64::zero(); j + 2];
            for (i, v) in basis.iter().enumerate() {
                let hij = inner(v, &w);
                column[i] = hij;
                for (wk, vk) in w.iter_mut().zip(v) {
                    *wk -= hij * vk;
                }
            }
            let w_norm = norm2(&w);
            column[j + 1] = c64::new(w_norm, 0.0);

            for (i, (c, s)) in rotations.iter().enumerate() {
                let (x0, x1) = (column[i], column[i + 1]);
                column[i] = *c * x0 + s * x1;
                column[i + 1] = -s.conj() * x0 + *c * x1;
            }
            let (c, s, diagonal) = givens(column[j], column[j + 1]);
            column[j] = diagonal;
            column[j + 1] = c64::zero();
            rotations.push((c, s));
            g[j + 1] = -s.conj() * g[j];
            g[j] *= c;
            h.push(column);
            solution.iterations += 1;

            let estimate = g[j + 1].norm() / b_norm;
            solution.residual_history.push(estimate);
            if !(estimate.is_finite() && w_norm.is_finite()) {
                breakdown = true;
                break;
            }
            if estimate <= config.tolerance || w_norm == 0.0 {
                break;
            }
            basis.push(w.iter().map(|v| v / w_norm).collect());
        }

        // Back substitution for the least squares coefficients
        let k = h.len();
        let mut y = g[..k].to_vec();
        for i in (0..k).rev() {
            for (l, hl) in h.iter().enumerate().skip(i + 1) {
                let yl = y[l];
                y[i] -= hl[i] * yl;
            }
            if h[i][i].is_zero() {
                breakdown = true;
                break;
            }
            y[i] /= h[i][i];
        }
        if breakdown {
            break SolverStatus::Breakdown;
        }

        let mut update = vec![c64::zero(); n];
        for (v, yi) in basis.iter().zip(&y) {
            for (u, vk) in update.iter_mut().zip(v) {
                *u += yi * vk;
            }
        }
        match preconditioner {
            Some(precond) => precond.apply(
                TranspositionMode::NoTranspose,
                &update,
                &mut x,
                c64::one(),
                c64::one(),
            )?,
            None => x.iter_mut().zip(&update).for_each(|(xi, u)| *xi += u),
        }

        if aborted {
            break SolverStatus::Aborted;
        }
        debug!(
            "GMRES cycle {} finished after {} iterations, estimated relative residual {:e}",
            solution.restarts + 1,
            solution.iterations,
            solution.residual_history.last().copied().unwrap_or(relative)
        );
    };

    solution.residual_norm = relative_residual(a, b, &x, b_norm)?;
    solution.x = x;
    solution.status = status;
    solution.converged = status == SolverStatus::Converged;
    Ok(solution)
}

/// Result of solving a boundary integral equation
#[derive(Debug, Clone)]
pub struct SolverResult {
    /// The solution in the domain of the operator
    pub solution: GridFunction,
    /// Whether the tolerance was reached
    pub converged: bool,
    /// Final relative residual of the discrete system
    pub residual_norm: f64,
    /// Total number of iterations
    pub iterations: usize,
    /// Number of restarts
    pub restarts: usize,
    /// Relative residual estimate after every iteration
    pub residual_history: Vec<f64>,
    /// Why the iteration stopped
    pub status: SolverStatus,
}

impl SolverResult {
    /// A human readable summary
    pub fn message(&self) -> String {
        let reason = match self.status {
            SolverStatus::Converged => "converged",
            SolverStatus::MaxIterationsReached => "reached the maximum number of iterations",
            SolverStatus::Breakdown => "broke down",
            SolverStatus::Aborted => "was aborted",
        };
        format!(
            "GMRES {reason} after {} iterations ({} restarts) with relative residual {:e}",
            self.iterations, self.restarts, self.residual_norm
        )
    }
}

/// Solve `lhs x = rhs` with GMRES
///
/// The right-hand side is tested against the test space of `lhs`; the
/// solution is a function in its domain.
pub fn solve(
    lhs: &AssembledBoundaryOperator,
    rhs: &GridFunction,
    preconditioner: Option<&Preconditioner>,
    config: &GmresConfig,
    abort: Option<&AbortSignal>,
) -> Result<SolverResult> {
    if !rhs.space().is_same(lhs.range()) {
        return Err(BemError::IncompatibleSpaces(format!(
            "the right-hand side must be a function in the range of {}",
            lhs.label()
        )));
    }
    let b = rhs.projections(lhs.dual_to_range(), lhs.range_pairing())?;
    let result = gmres(
        lhs.weak_form().as_ref(),
        &b,
        preconditioner.map(|p| p.operator().as_ref()),
        config,
        abort,
    )?;
    let solution = GridFunction::from_coefficients(lhs.domain().clone(), result.x)?;
    let result = SolverResult {
        solution,
        converged: result.converged,
        residual_norm: result.residual_norm,
        iterations: result.iterations,
        restarts: result.restarts,
        residual_history: result.residual_history,
        status: result.status,
    };
    if result.converged {
        info!("{}", result.message());
    } else {
        warn!("{}", result.message());
    }
    Ok(result)
}

/// Solve `lhs x = rhs` with a dense LU decomposition of the weak form
///
/// Intended for small systems. The residual is recomputed from the solution
/// and the result is reported in the same form as [`solve`].
pub fn solve_direct(lhs: &AssembledBoundaryOperator, rhs: &GridFunction) -> Result<SolverResult> {
    if !rhs.space().is_same(lhs.range()) {
        return Err(BemError::IncompatibleSpaces(format!(
            "the right-hand side must be a function in the range of {}",
            lhs.label()
        )));
    }
    let a = lhs.weak_form().as_ref();
    let b = rhs.projections(lhs.dual_to_range(), lhs.range_pairing())?;
    let b_norm = norm2(&b);
    let x = if b_norm == 0.0 {
        vec![c64::zero(); a.shape()[1]]
    } else {
        DenseLuInverse::new(a)?.matvec(&b)?
    };
    let residual_norm = if b_norm == 0.0 {
        0.0
    } else {
        relative_residual(a, &b, &x, b_norm)?
    };
    let status = if residual_norm.is_finite() {
        SolverStatus::Converged
    } else {
        SolverStatus::Breakdown
    };
    let result = SolverResult {
        solution: GridFunction::from_coefficients(lhs.domain().clone(), x)?,
        converged: status == SolverStatus::Converged,
        residual_norm,
        iterations: 0,
        restarts: 0,
        residual_history: vec![residual_norm],
        status,
    };
    debug!("Direct solve of {} with relative residual {:e}", lhs.label(), residual_norm);
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operator::DenseDiscreteOperator;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rlst::{rlst_dynamic_array2, RawAccessMut};

    fn system(n: usize, seed: u64, shift: f64) -> (DenseDiscreteOperator, Vec<c64>) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut a = rlst_dynamic_array2!(c64, [n, n]);
        for j in 0..n {
            for i in 0..n {
                let mut value = c64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5) / n as f64;
                if i == j {
                    value += c64::new(shift, 0.5);
                }
                a.data_mut()[i + n * j] = value;
            }
        }
        let b = (0..n)
            .map(|_| c64::new(rng.gen::<f64>(), rng.gen::<f64>()))
            .collect();
        (DenseDiscreteOperator::new(a), b)
    }

    #[test]
    fn test_givens() {
        let (c, s, r) = givens(c64::new(3.0, 4.0), c64::new(0.0, 12.0));
        assert_relative_eq!(r.norm(), 13.0, epsilon = 1e-14);
        let second = -s.conj() * c64::new(3.0, 4.0) + c * c64::new(0.0, 12.0);
        assert_relative_eq!(second.norm(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_converges() {
        let (a, b) = system(50, 1, 1.0);
        let solution = gmres(&a, &b, None, &GmresConfig::default(), None).unwrap();
        assert!(solution.converged);
        assert_eq!(solution.status, SolverStatus::Converged);
        assert!(solution.residual_norm <= 1e-7);
        assert_eq!(solution.residual_history[0], 1.0);
        let r = a.matvec(&solution.x).unwrap();
        for (ri, bi) in r.iter().zip(&b) {
            assert!((ri - bi).norm() < 1e-6);
        }
    }

    #[test]
    fn test_restarts() {
        let (a, b) = system(60, 2, 0.3);
        let config = GmresConfig::default().restart(5).tolerance(1e-10);
        let solution = gmres(&a, &b, None, &config, None).unwrap();
        assert!(solution.converged);
        assert!(solution.restarts > 0);
        assert!(solution.iterations > 5);
        assert!(solution.residual_norm <= 1e-9);
    }

    #[test]
    fn test_max_iterations() {
        let (a, b) = system(40, 3, 0.05);
        let config = GmresConfig::default().max_iterations(3).tolerance(1e-14);
        let solution = gmres(&a, &b, None, &config, None).unwrap();
        assert!(!solution.converged);
        assert_eq!(solution.status, SolverStatus::MaxIterationsReached);
        assert_eq!(solution.iterations, 3);
        assert!(solution.residual_norm > 1e-14);
        assert!(solution.residual_norm < 1.0);
    }

    #[test]
    fn test_preconditioner_reduces_iterations() {
        let (a, b) = system(50, 4, 0.2);
        let inverse = DenseLuInverse::new(&a).unwrap();
        let config = GmresConfig::default().tolerance(1e-10);
        let plain = gmres(&a, &b, None, &config, None).unwrap();
        let preconditioned = gmres(&a, &b, Some(&inverse), &config, None).unwrap();
        assert!(plain.converged);
        assert!(preconditioned.converged);
        assert!(preconditioned.iterations <= 2);
        assert!(preconditioned.iterations < plain.iterations);
        assert!(preconditioned.residual_norm < 1e-9);
    }

    #[test]
    fn test_zero_and_non_finite_rhs() {
        let (a, _) = system(10, 5, 1.0);
        let zero = gmres(&a, &[c64::zero(); 10], None, &GmresConfig::default(), None).unwrap();
        assert!(zero.converged);
        assert_eq!(zero.iterations, 0);
        assert!(zero.x.iter().all(|v| v.is_zero()));

        let mut b = vec![c64::one(); 10];
        b[3] = c64::new(f64::NAN, 0.0);
        let nan = gmres(&a, &b, None, &GmresConfig::default(), None).unwrap();
        assert!(!nan.converged);
        assert_eq!(nan.status, SolverStatus::Breakdown);
    }

    #[test]
    fn test_abort() {
        let (a, b) = system(20, 6, 1.0);
        let abort = AbortSignal::new();
        abort.abort();
        let solution = gmres(&a, &b, None, &GmresConfig::default(), Some(&abort)).unwrap();
        assert_eq!(solution.status, SolverStatus::Aborted);
        assert!(!solution.converged);
        assert_eq!(solution.iterations, 0);
    }

    #[test]
    fn test_invalid_input() {
        let (a, b) = system(10, 7, 1.0);
        assert!(matches!(
            gmres(&a, &b[..5], None, &GmresConfig::default(), None),
            Err(BemError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            gmres(&a, &b, None, &GmresConfig::default().restart(0), None),
            Err(BemError::InvalidArgument(_))
        ));
    }
}
