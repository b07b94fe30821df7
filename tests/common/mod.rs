//! Shared helpers for the integration tests
#![allow(dead_code)]
use bempp_maxwell::assembly::{assemble, AssemblyContext};
use bempp_maxwell::function::{GridFunction, RaviartThomasSpace};
use bempp_maxwell::grid::shapes::regular_sphere;
use bempp_maxwell::incident::PlaneWave;
use bempp_maxwell::operator::{BoundaryOperator, Pairing};
use bempp_maxwell::preconditioner::Preconditioner;
use bempp_maxwell::quadrature::AccuracyOptions;
use bempp_maxwell::solver::{solve, GmresConfig, SolverResult};
use cauchy::c64;
use std::sync::Arc;

/// Raviart-Thomas space on a refined unit sphere
pub fn sphere_space(level: u32) -> Arc<RaviartThomasSpace> {
    Arc::new(RaviartThomasSpace::new(Arc::new(regular_sphere(level))))
}

/// `xi_n(rho) = rho h_n(rho)` and its derivative for `n = 0..=nmax`, with `h_n` the spherical Hankel function of the first kind
fn riccati_hankel(nmax: usize, rho: f64) -> (Vec<c64>, Vec<c64>) {
    let phase = c64::new(rho.cos(), rho.sin());
    let mut h = vec![c64::new(0.0, 0.0); nmax + 1];
    h[0] = -c64::i() * phase / rho;
    if nmax > 0 {
        h[1] = -phase * c64::new(rho, 1.0) / (rho * rho);
    }
    for n in 1..nmax {
        h[n + 1] = (2 * n + 1) as f64 / rho * h[n] - h[n - 1];
    }
    let xi = h.iter().map(|v| rho * v).collect::<Vec<_>>();
    let mut dxi = vec![c64::new(0.0, 0.0); nmax + 1];
    for n in 1..=nmax {
        dxi[n] = rho * h[n - 1] - n as f64 * h[n];
    }
    (xi, dxi)
}

/// The angular functions `pi_n` and `tau_n` for `n = 0..=nmax`
fn angular_functions(nmax: usize, mu: f64) -> (Vec<f64>, Vec<f64>) {
    let mut pi = vec![0.0; nmax + 1];
    let mut tau = vec![0.0; nmax + 1];
    if nmax >= 1 {
        pi[1] = 1.0;
    }
    for n in 2..=nmax {
        let nf = n as f64;
        pi[n] = (2.0 * nf - 1.0) / (nf - 1.0) * mu * pi[n - 1] - nf / (nf - 1.0) * pi[n - 2];
    }
    for n in 1..=nmax {
        tau[n] = n as f64 * mu * pi[n] - (n + 1) as f64 * pi[n - 1];
    }
    (pi, tau)
}

/// The exact Neumann trace `(curl E / (ik)) x n` of the total field on a
/// perfectly conducting sphere of radius `radius` centred at the origin,
/// illuminated by the plane wave `PlaneWave::default_pec_example(wavenumber)`
///
/// The point is projected onto the sphere.
pub fn mie_surface_current(wavenumber: f64, radius: f64, point: &[f64; 3]) -> [c64; 3] {
    // Local frame with the polarisation along x' and the propagation along z'
    let local = [point[2], -point[1], point[0]];
    let r = (local[0] * local[0] + local[1] * local[1] + local[2] * local[2]).sqrt();
    let cos_theta = local[2] / r;
    let sin_theta = (local[0] * local[0] + local[1] * local[1]).sqrt() / r;
    let phi = local[1].atan2(local[0]);
    let (sin_phi, cos_phi) = phi.sin_cos();

    let rho = wavenumber * radius;
    let nmax = (rho + 4.0 * rho.cbrt() + 10.0) as usize;
    let (xi, dxi) = riccati_hankel(nmax, rho);
    let (pi, tau) = angular_functions(nmax, cos_theta);

    // Tangential components of the normalised total magnetic field curl(E) / (ik)
    let mut h_theta = c64::new(0.0, 0.0);
    let mut h_phi = c64::new(0.0, 0.0);
    let mut i_power = c64::new(1.0, 0.0);
    for n in 1..=nmax {
        i_power *= c64::i();
        let nf = n as f64;
        let e_n = i_power * (2.0 * nf + 1.0) / (nf * (nf + 1.0));
        h_theta += e_n * (c64::i() * pi[n] / (rho * dxi[n]) - tau[n] / (rho * xi[n]));
        h_phi += e_n * (c64::i() * tau[n] / (rho * dxi[n]) - pi[n] / (rho * xi[n]));
    }
    h_theta *= sin_phi;
    h_phi *= cos_phi;

    // H x e_r = H_phi e_theta - H_theta e_phi
    let e_theta = [cos_theta * cos_phi, cos_theta * sin_phi, -sin_theta];
    let e_phi = [-sin_phi, cos_phi, 0.0];
    let current_local = [0, 1, 2].map(|d| h_phi * e_theta[d] - h_theta * e_phi[d]);
    [current_local[2], -current_local[1], current_local[0]]
}

/// Solve the electric field integral equation `S J = I_rot gamma_D E_inc` on a sphere
pub fn solve_efie(
    space: &Arc<RaviartThomasSpace>,
    wavenumber: f64,
    context: &AssemblyContext,
) -> SolverResult {
    let wave = PlaneWave::default_pec_example(wavenumber);
    let single_layer =
        BoundaryOperator::single_layer(space.clone(), space.clone(), space.clone(), wavenumber);
    let lhs = assemble(&single_layer, context).unwrap();
    let rhs = GridFunction::from_function_with_dual(
        space.clone(),
        space.clone(),
        Pairing::Rotated,
        &AccuracyOptions::default(),
        |p, n| wave.dirichlet_trace(p, n),
    )
    .unwrap();
    let preconditioner = Preconditioner::approximate_lu(lhs.weak_form().as_ref(), 1e-6).unwrap();
    let result = solve(
        &lhs,
        &rhs,
        Some(&preconditioner),
        &GmresConfig::default().tolerance(1e-10),
        None,
    )
    .unwrap();
    assert!(result.converged, "{}", result.message());
    result
}

/// Relative l2 difference of two sets of field values
pub fn relative_difference(a: &[[c64; 3]], b: &[[c64; 3]]) -> f64 {
    let mut difference = 0.0;
    let mut norm = 0.0;
    for (x, y) in a.iter().zip(b) {
        for d in 0..3 {
            difference += (x[d] - y[d]).norm_sqr();
            norm += y[d].norm_sqr();
        }
    }
    (difference / norm).sqrt()
}
