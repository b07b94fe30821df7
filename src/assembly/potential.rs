//! Potential operator assembly
use crate::assembly::common::MappedCell;
use crate::assembly::kernels::{GreenKernelEvalType, HelmholtzKernel};
use crate::function::GridFunction;
use crate::linalg::distance;
use crate::quadrature::QuadratureStrategy;
use crate::traits::{FunctionSpace, PotentialIntegrand};
use crate::types::{check_abort, AbortSignal, Result};
use cauchy::c64;
use itertools::Itertools;
use log::warn;
use num::Zero;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Maxwell single layer potential integrand
///
/// `ik G u - grad_x G div(u) / (ik)`
#[derive(Debug, Clone, Copy)]
pub struct SingleLayerPotentialIntegrand {
    ik: c64,
    inv_ik: c64,
}

impl SingleLayerPotentialIntegrand {
    /// Create new
    pub fn new(wavenumber: f64) -> Self {
        let ik = c64::new(0.0, wavenumber);
        Self { ik, inv_ik: 1.0 / ik }
    }
}

impl PotentialIntegrand for SingleLayerPotentialIntegrand {
    fn kernel_eval_type(&self) -> GreenKernelEvalType {
        GreenKernelEvalType::ValueDeriv
    }

    fn evaluate(&self, kernel: &[c64], density: &[c64; 3], density_divergence: c64) -> [c64; 3] {
        let a = self.ik * kernel[0];
        let b = self.inv_ik * density_divergence;
        [0, 1, 2].map(|d| a * density[d] - b * kernel[1 + d])
    }
}

/// Maxwell double layer potential integrand
///
/// `grad_x G x u`
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleLayerPotentialIntegrand;

impl DoubleLayerPotentialIntegrand {
    /// Create new
    pub fn new() -> Self {
        Self
    }
}

impl PotentialIntegrand for DoubleLayerPotentialIntegrand {
    fn kernel_eval_type(&self) -> GreenKernelEvalType {
        GreenKernelEvalType::ValueDeriv
    }

    fn evaluate(&self, kernel: &[c64], density: &[c64; 3], _density_divergence: c64) -> [c64; 3] {
        let g = &kernel[1..4];
        [
            g[1] * density[2] - g[2] * density[1],
            g[2] * density[0] - g[0] * density[2],
            g[0] * density[1] - g[1] * density[0],
        ]
    }
}

/// A density sampled at the quadrature points of one cell
struct CellSamples {
    points: Vec<[f64; 3]>,
    weights: Vec<f64>,
    values: Vec<[c64; 3]>,
    divergence: c64,
}

/// Samples of a density on every cell for one quadrature order
fn sample_density(
    function: &GridFunction,
    coefficients: &[c64],
    strategy: &QuadratureStrategy,
    order: usize,
) -> Vec<CellSamples> {
    let space = function.space().as_ref();
    let rule = strategy.triangle_rule(order);
    let table = space.element().tabulate(&rule.points);
    let mut mapped = MappedCell::new(rule.npoints);
    (0..space.mesh().number_of_cells())
        .map(|cell| {
            let Some(dofs) = space.cell_dofs(cell) else {
                return CellSamples {
                    points: vec![],
                    weights: vec![],
                    values: vec![],
                    divergence: c64::zero(),
                };
            };
            mapped.map(space, cell, &rule.points, &table);
            let divergence = dofs
                .iter()
                .zip(&mapped.divergences)
                .map(|(dof, div)| coefficients[*dof] * div)
                .sum::<c64>();
            let values = mapped
                .values
                .iter()
                .map(|basis| {
                    let mut value = [c64::zero(); 3];
                    for (b, dof) in basis.iter().zip(dofs) {
                        for d in 0..3 {
                            value[d] += coefficients[*dof] * b[d];
                        }
                    }
                    value
                })
                .collect();
            CellSamples {
                points: mapped
                    .points
                    .chunks_exact(3)
                    .map(|p| [p[0], p[1], p[2]])
                    .collect(),
                weights: rule.weights.iter().map(|w| w * mapped.jdet).collect(),
                values,
                divergence,
            }
        })
        .collect()
}

/// Assembler that evaluates a potential operator applied to a grid function at points off the surface
pub struct PotentialAssembler<'a, Integrand: PotentialIntegrand> {
    integrand: Integrand,
    kernel: HelmholtzKernel,
    strategy: &'a QuadratureStrategy,
    clamped_pairs: AtomicUsize,
}

impl<'a, Integrand: PotentialIntegrand> PotentialAssembler<'a, Integrand> {
    /// Create new
    pub fn new(integrand: Integrand, kernel: HelmholtzKernel, strategy: &'a QuadratureStrategy) -> Self {
        Self {
            integrand,
            kernel,
            strategy,
            clamped_pairs: AtomicUsize::new(0),
        }
    }

    /// Number of point-cell pairs evaluated so far whose quadrature order was clamped
    pub fn clamped_pairs(&self) -> usize {
        self.clamped_pairs.load(Ordering::Relaxed)
    }

    /// Evaluate the potential of `function` at `points`
    ///
    /// The quadrature order for each point and cell is escalated by the
    /// near-field bands when the point is close to the cell relative to its diameter.
    pub fn evaluate(
        &self,
        function: &GridFunction,
        points: &[[f64; 3]],
        abort: Option<&AbortSignal>,
    ) -> Result<Vec<[c64; 3]>> {
        let coefficients = function.coefficients()?;
        let mesh = function.space().mesh();

        // The order only changes at the band thresholds
        let mut distances = self
            .strategy
            .near_field_bands()
            .iter()
            .map(|(threshold, _)| *threshold)
            .collect::<Vec<_>>();
        distances.push(0.0);
        distances.push(f64::INFINITY);
        let samples = distances
            .into_iter()
            .map(|d| self.strategy.regular_order(d).0)
            .unique()
            .map(|order| {
                (
                    order,
                    sample_density(function, &coefficients, self.strategy, order),
                )
            })
            .collect::<BTreeMap<_, _>>();

        let eval_type = self.integrand.kernel_eval_type();
        let nvalues = eval_type.value_count();
        let field = points
            .par_iter()
            .map(|point| {
                check_abort(abort)?;
                let mut kernel = vec![c64::zero(); nvalues];
                let mut field = [c64::zero(); 3];
                for cell in 0..mesh.number_of_cells() {
                    let normalized = distance(point, mesh.centroid(cell)) / mesh.diameter(cell);
                    let (order, clamped) = self.strategy.regular_order(normalized);
                    if clamped {
                        self.clamped_pairs.fetch_add(1, Ordering::Relaxed);
                    }
                    let Some(cell_samples) = samples.get(&order).map(|s| &s[cell]) else {
                        continue;
                    };
                    for ((y, w), value) in cell_samples
                        .points
                        .iter()
                        .zip(&cell_samples.weights)
                        .zip(&cell_samples.values)
                    {
                        self.kernel.evaluate(eval_type, point, y, &mut kernel);
                        let contribution =
                            self.integrand.evaluate(&kernel, value, cell_samples.divergence);
                        for d in 0..3 {
                            field[d] += contribution[d] * w;
                        }
                    }
                }
                Ok(field)
            })
            .collect::<Result<Vec<_>>>()?;
        let clamped = self.clamped_pairs();
        if clamped > 0 {
            warn!("Quadrature order clamped for {clamped} point-cell pairs of a potential evaluation");
        }
        Ok(field)
    }
}
