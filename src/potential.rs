//! Potential operators and the representation formula
use crate::assembly::kernels::HelmholtzKernel;
use crate::assembly::potential::{
    DoubleLayerPotentialIntegrand, PotentialAssembler, SingleLayerPotentialIntegrand,
};
use crate::function::GridFunction;
use crate::quadrature::{AccuracyOptions, QuadratureStrategy};
use crate::types::{BemError, Result};
use cauchy::c64;
use log::info;
use num::{One, Zero};
use rayon::prelude::*;

/// A potential operator that maps a surface density to a field off the surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PotentialOperator {
    /// `P_S(u)(x) = int ik G u - grad_x G div(u) / (ik)`, with the wavenumber
    SingleLayer(f64),
    /// `P_D(u)(x) = int grad_x G x u`, with the wavenumber
    DoubleLayer(f64),
}

impl PotentialOperator {
    /// Wavenumber
    pub fn wavenumber(&self) -> f64 {
        match self {
            PotentialOperator::SingleLayer(k) | PotentialOperator::DoubleLayer(k) => *k,
        }
    }
}

/// Evaluate a potential operator applied to a grid function at points off the surface
pub fn evaluate(
    operator: &PotentialOperator,
    function: &GridFunction,
    points: &[[f64; 3]],
    accuracy: &AccuracyOptions,
) -> Result<Vec<[c64; 3]>> {
    let strategy = QuadratureStrategy::new(accuracy)?;
    evaluate_with_strategy(operator, function, points, &strategy)
}

fn evaluate_with_strategy(
    operator: &PotentialOperator,
    function: &GridFunction,
    points: &[[f64; 3]],
    strategy: &QuadratureStrategy,
) -> Result<Vec<[c64; 3]>> {
    let kernel = HelmholtzKernel::new(operator.wavenumber());
    match operator {
        PotentialOperator::SingleLayer(k) => {
            PotentialAssembler::new(SingleLayerPotentialIntegrand::new(*k), kernel, strategy)
                .evaluate(function, points, None)
        }
        PotentialOperator::DoubleLayer(_) => {
            PotentialAssembler::new(DoubleLayerPotentialIntegrand::new(), kernel, strategy)
                .evaluate(function, points, None)
        }
    }
}

/// One term `multiplier * P(function)` of a representation formula
#[derive(Debug, Clone)]
pub struct RepresentationTerm<'a> {
    /// Scalar factor
    pub multiplier: c64,
    /// Potential operator
    pub operator: PotentialOperator,
    /// Density
    pub function: &'a GridFunction,
}

impl<'a> RepresentationTerm<'a> {
    /// Create new
    pub fn new(multiplier: c64, operator: PotentialOperator, function: &'a GridFunction) -> Self {
        Self {
            multiplier,
            operator,
            function,
        }
    }
}

/// The terms of the scattered field of a perfect conductor, `-P_S(n) - P_D(d)`
///
/// `neumann` and `dirichlet` are the Neumann and Dirichlet traces of the scattered field.
pub fn pec_scattered_field_terms<'a>(
    wavenumber: f64,
    neumann: &'a GridFunction,
    dirichlet: &'a GridFunction,
) -> [RepresentationTerm<'a>; 2] {
    [
        RepresentationTerm::new(
            -c64::one(),
            PotentialOperator::SingleLayer(wavenumber),
            neumann,
        ),
        RepresentationTerm::new(
            -c64::one(),
            PotentialOperator::DoubleLayer(wavenumber),
            dirichlet,
        ),
    ]
}

/// Evaluate the sum of the terms of a representation formula at points off the surface
pub fn evaluate_representation(
    terms: &[RepresentationTerm],
    points: &[[f64; 3]],
    accuracy: &AccuracyOptions,
) -> Result<Vec<[c64; 3]>> {
    let strategy = QuadratureStrategy::new(accuracy)?;
    let mut field = vec![[c64::zero(); 3]; points.len()];
    for term in terms {
        let values = evaluate_with_strategy(&term.operator, term.function, points, &strategy)?;
        for (f, v) in field.iter_mut().zip(values) {
            for d in 0..3 {
                f[d] += term.multiplier * v[d];
            }
        }
    }
    Ok(field)
}

/// Evaluate a representation formula plus an incident field
pub fn evaluate_total_field<F>(
    terms: &[RepresentationTerm],
    incident: F,
    points: &[[f64; 3]],
    accuracy: &AccuracyOptions,
) -> Result<Vec<[c64; 3]>>
where
    F: Fn(&[f64; 3]) -> [c64; 3] + Sync,
{
    let mut field = evaluate_representation(terms, points, accuracy)?;
    field
        .par_iter_mut()
        .zip(points.par_iter())
        .for_each(|(f, p)| {
            let e = incident(p);
            for d in 0..3 {
                f[d] += e[d];
            }
        });
    Ok(field)
}

/// A regular grid of points in an axis-aligned box
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationBox {
    /// `[xmin, xmax, ymin, ymax, zmin, zmax]`
    pub limits: [f64; 6],
    /// Number of points in each direction
    pub dims: [usize; 3],
}

impl EvaluationBox {
    /// Create new
    pub fn new(limits: [f64; 6], dims: [usize; 3]) -> Result<Self> {
        if dims.iter().any(|n| *n == 0) {
            return Err(BemError::InvalidArgument(format!(
                "evaluation box dimensions {dims:?} must be positive"
            )));
        }
        for axis in 0..3 {
            let (lower, upper) = (limits[2 * axis], limits[2 * axis + 1]);
            if !(lower.is_finite() && upper.is_finite() && lower <= upper) {
                return Err(BemError::InvalidArgument(format!(
                    "evaluation box limits {lower}..{upper} are not an interval"
                )));
            }
        }
        Ok(Self { limits, dims })
    }

    /// Number of points
    pub fn number_of_points(&self) -> usize {
        self.dims.iter().product()
    }

    /// The points of the grid, including the faces of the box, with x varying fastest
    pub fn points(&self) -> Vec<[f64; 3]> {
        let coordinate = |axis: usize, i: usize| {
            let (lower, upper) = (self.limits[2 * axis], self.limits[2 * axis + 1]);
            if self.dims[axis] == 1 {
                lower
            } else {
                lower + (upper - lower) * i as f64 / (self.dims[axis] - 1) as f64
            }
        };
        let mut points = Vec::with_capacity(self.number_of_points());
        for k in 0..self.dims[2] {
            for j in 0..self.dims[1] {
                for i in 0..self.dims[0] {
                    points.push([coordinate(0, i), coordinate(1, j), coordinate(2, k)]);
                }
            }
        }
        points
    }
}

/// Evaluate a representation formula on the points of a box
///
/// Returns the points and the field values.
pub fn evaluate_potential_in_box(
    terms: &[RepresentationTerm],
    evaluation_box: &EvaluationBox,
    accuracy: &AccuracyOptions,
) -> Result<(Vec<[f64; 3]>, Vec<[c64; 3]>)> {
    let points = evaluation_box.points();
    info!(
        "Evaluating {} potential terms at {} points",
        terms.len(),
        points.len()
    );
    let values = evaluate_representation(terms, &points, accuracy)?;
    Ok((points, values))
}
