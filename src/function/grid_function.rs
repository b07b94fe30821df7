//! Grid functions
use crate::assembly::boundary::assemble_identity;
use crate::assembly::common::MappedCell;
use crate::assembly::AccuracyOptions;
use crate::function::RaviartThomasSpace;
use crate::linalg::{cross, LuDecomposition};
use crate::operator::{apply_new, Pairing, SparseDiscreteOperator};
use crate::quadrature::simplex_rules::simplex_rule_for_order;
use crate::quadrature::{QuadratureStrategy, ReferenceCell};
use crate::traits::FunctionSpace;
use crate::types::{BemError, Result, TranspositionMode};
use cauchy::c64;
use num::Zero;
use std::ops::Neg;
use std::sync::{Arc, OnceLock};

/// Order of the rule used to compute norms and errors
const NORM_QUADRATURE_ORDER: usize = 6;

#[derive(Debug, Clone)]
enum GridFunctionData {
    Coefficients(Vec<c64>),
    Projections {
        dual: Arc<RaviartThomasSpace>,
        pairing: Pairing,
        values: Vec<c64>,
    },
}

/// Values of a grid function at the quadrature points of every cell
#[derive(Debug, Clone)]
pub struct QuadratureSamples {
    /// Physical points
    pub points: Vec<[f64; 3]>,
    /// Unit normals
    pub normals: Vec<[f64; 3]>,
    /// Physical quadrature weights, summing to the surface area
    pub weights: Vec<f64>,
    /// Function values
    pub values: Vec<[c64; 3]>,
}

/// A function in a Raviart-Thomas space
///
/// The function is stored either by its coefficients or by its projections
/// onto a test space. Grid functions are never modified: every operation
/// returns a new function. Mass matrices needed to convert between the two
/// representations are integrated with the function's accuracy options, and
/// coefficients recovered from projections are computed once.
#[derive(Debug, Clone)]
pub struct GridFunction {
    space: Arc<RaviartThomasSpace>,
    data: GridFunctionData,
    accuracy: AccuracyOptions,
    coefficients: OnceLock<Vec<c64>>,
}

fn check_size(space: &RaviartThomasSpace, values: &[c64]) -> Result<()> {
    if values.len() != space.global_size() {
        Err(BemError::DimensionMismatch {
            expected: space.global_size(),
            actual: values.len(),
        })
    } else {
        Ok(())
    }
}

/// Compute `int f . v` or `int f . (v x n)` for every basis function `v` of `dual`
fn project<F>(
    dual: &RaviartThomasSpace,
    pairing: Pairing,
    strategy: &QuadratureStrategy,
    f: F,
) -> Vec<c64>
where
    F: Fn(&[f64; 3], &[f64; 3]) -> [c64; 3],
{
    let rule = strategy.single_regular_rule();
    let table = dual.element().tabulate(&rule.points);
    let mut mapped = MappedCell::new(rule.npoints);
    let mut projections = vec![c64::zero(); dual.global_size()];
    for cell in 0..dual.mesh().number_of_cells() {
        let Some(dofs) = dual.cell_dofs(cell) else {
            continue;
        };
        mapped.map(dual, cell, &rule.points, &table);
        for (q, w) in rule.weights.iter().enumerate() {
            let point = [0, 1, 2].map(|d| mapped.points[3 * q + d]);
            let value = f(&point, &mapped.normal);
            for (i, dof) in dofs.iter().enumerate() {
                let test = match pairing {
                    Pairing::L2 => mapped.values[q][i],
                    Pairing::Rotated => cross(&mapped.values[q][i], &mapped.normal),
                };
                projections[*dof] +=
                    (value[0] * test[0] + value[1] * test[1] + value[2] * test[2]) * w * mapped.jdet;
            }
        }
    }
    projections
}

impl GridFunction {
    /// Create a grid function from its coefficients
    pub fn from_coefficients(space: Arc<RaviartThomasSpace>, coefficients: Vec<c64>) -> Result<Self> {
        check_size(&space, &coefficients)?;
        Ok(Self::new(space, GridFunctionData::Coefficients(coefficients)))
    }

    /// Create a grid function from its projections onto a test space
    pub fn from_projections(
        space: Arc<RaviartThomasSpace>,
        dual: Arc<RaviartThomasSpace>,
        pairing: Pairing,
        projections: Vec<c64>,
    ) -> Result<Self> {
        check_size(&dual, &projections)?;
        Ok(Self::new(
            space,
            GridFunctionData::Projections {
                dual,
                pairing,
                values: projections,
            },
        ))
    }

    fn new(space: Arc<RaviartThomasSpace>, data: GridFunctionData) -> Self {
        Self {
            space,
            data,
            accuracy: AccuracyOptions::default(),
            coefficients: OnceLock::new(),
        }
    }

    /// Set the accuracy used to integrate mass matrices
    pub fn with_accuracy(mut self, accuracy: &AccuracyOptions) -> Self {
        self.accuracy = accuracy.clone();
        self.coefficients = OnceLock::new();
        self
    }

    /// The accuracy used to integrate mass matrices
    pub fn accuracy(&self) -> &AccuracyOptions {
        &self.accuracy
    }

    /// Create a grid function by L2 projection of `f(point, normal)` onto `space`
    pub fn from_function<F>(space: Arc<RaviartThomasSpace>, f: F) -> Result<Self>
    where
        F: Fn(&[f64; 3], &[f64; 3]) -> [c64; 3],
    {
        let projected = Self::from_function_with_dual(
            space.clone(),
            space,
            Pairing::L2,
            &AccuracyOptions::default(),
            f,
        )?;
        let coefficients = projected.coefficients()?;
        Self::from_coefficients(projected.space, coefficients)
    }

    /// Create a grid function from the projections of `f(point, normal)` onto a test space
    ///
    /// `f` is called once at each quadrature point of each cell.
    pub fn from_function_with_dual<F>(
        space: Arc<RaviartThomasSpace>,
        dual: Arc<RaviartThomasSpace>,
        pairing: Pairing,
        accuracy: &AccuracyOptions,
        f: F,
    ) -> Result<Self>
    where
        F: Fn(&[f64; 3], &[f64; 3]) -> [c64; 3],
    {
        let strategy = QuadratureStrategy::new(accuracy)?;
        let projections = project(&dual, pairing, &strategy, f);
        Ok(Self::from_projections(space, dual, pairing, projections)?.with_accuracy(accuracy))
    }

    /// The function space
    pub fn space(&self) -> &Arc<RaviartThomasSpace> {
        &self.space
    }

    /// Check if the function is stored by its coefficients
    pub fn has_coefficients(&self) -> bool {
        matches!(self.data, GridFunctionData::Coefficients(_))
    }

    /// The coefficients
    ///
    /// If the function is stored by its projections, this solves a system
    /// with the matrix of the identity operator from the space to the test
    /// space the first time it is called.
    pub fn coefficients(&self) -> Result<Vec<c64>> {
        if let Some(c) = self.coefficients.get() {
            return Ok(c.clone());
        }
        match &self.data {
            GridFunctionData::Coefficients(c) => Ok(c.clone()),
            GridFunctionData::Projections {
                dual,
                pairing,
                values,
            } => {
                if dual.global_size() != self.space.global_size() {
                    return Err(BemError::DimensionMismatch {
                        expected: self.space.global_size(),
                        actual: dual.global_size(),
                    });
                }
                let strategy = QuadratureStrategy::new(&self.accuracy)?;
                let mass = assemble_identity(dual.as_ref(), self.space.as_ref(), *pairing, &strategy)?;
                let lu = LuDecomposition::from_array(&mass.to_dense())?;
                let mut coefficients = values.clone();
                lu.solve(&mut coefficients)?;
                // Another thread may have filled the cache with the same values
                let _ = self.coefficients.set(coefficients.clone());
                Ok(coefficients)
            }
        }
    }

    /// The projections onto a test space
    pub fn projections(&self, dual: &Arc<RaviartThomasSpace>, pairing: Pairing) -> Result<Vec<c64>> {
        if let GridFunctionData::Projections {
            dual: d,
            pairing: p,
            values,
        } = &self.data
        {
            if d.is_same(dual) && *p == pairing {
                return Ok(values.clone());
            }
        }
        let strategy = QuadratureStrategy::new(&self.accuracy)?;
        let mass = SparseDiscreteOperator::new(assemble_identity(
            dual.as_ref(),
            self.space.as_ref(),
            pairing,
            &strategy,
        )?);
        apply_new(&mass, TranspositionMode::NoTranspose, &self.coefficients()?)
    }

    /// Evaluate the function at points on the reference triangle of a cell
    ///
    /// `points` are stored as consecutive (x, y) pairs.
    pub fn evaluate(&self, cell: usize, points: &[f64]) -> Result<Vec<[c64; 3]>> {
        let coefficients = self.coefficients()?;
        self.evaluate_with_coefficients(&coefficients, cell, points)
    }

    fn evaluate_with_coefficients(
        &self,
        coefficients: &[c64],
        cell: usize,
        points: &[f64],
    ) -> Result<Vec<[c64; 3]>> {
        let dofs = self.space.cell_dofs(cell).ok_or(BemError::DimensionMismatch {
            expected: self.space.mesh().number_of_cells(),
            actual: cell,
        })?;
        let table = self.space.element().tabulate(points);
        let mut mapped = MappedCell::new(table.npoints());
        mapped.map(self.space.as_ref(), cell, points, &table);
        Ok(mapped
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
            .collect())
    }

    /// Evaluate the function at the points of a triangle rule of the given order on every cell
    pub fn evaluate_at_quadrature(&self, order: usize) -> Result<QuadratureSamples> {
        let rule = simplex_rule_for_order(ReferenceCell::Triangle, order)?;
        let coefficients = self.coefficients()?;
        let mesh = self.space.mesh();
        let ncells = mesh.number_of_cells();
        let mut samples = QuadratureSamples {
            points: Vec::with_capacity(ncells * rule.npoints),
            normals: Vec::with_capacity(ncells * rule.npoints),
            weights: Vec::with_capacity(ncells * rule.npoints),
            values: Vec::with_capacity(ncells * rule.npoints),
        };
        for cell in 0..ncells {
            let values = self.evaluate_with_coefficients(&coefficients, cell, &rule.points)?;
            let jdet = 2.0 * mesh.area(cell);
            for (q, value) in values.into_iter().enumerate() {
                samples
                    .points
                    .push(mesh.reference_to_physical(cell, [rule.points[2 * q], rule.points[2 * q + 1]]));
                samples.normals.push(*mesh.normal(cell));
                samples.weights.push(rule.weights[q] * jdet);
                samples.values.push(value);
            }
        }
        Ok(samples)
    }

    /// The L2 norm
    pub fn l2_norm(&self) -> Result<f64> {
        let samples = self.evaluate_at_quadrature(NORM_QUADRATURE_ORDER)?;
        Ok(samples
            .weights
            .iter()
            .zip(&samples.values)
            .map(|(w, v)| w * v.iter().map(|x| x.norm_sqr()).sum::<f64>())
            .sum::<f64>()
            .sqrt())
    }

    /// The relative L2 error of this function as an approximation of `f(point, normal)`
    pub fn relative_error_against<F>(&self, f: F) -> Result<f64>
    where
        F: Fn(&[f64; 3], &[f64; 3]) -> [c64; 3],
    {
        let samples = self.evaluate_at_quadrature(NORM_QUADRATURE_ORDER)?;
        let mut error = 0.0;
        let mut norm = 0.0;
        for (((p, n), w), v) in samples
            .points
            .iter()
            .zip(&samples.normals)
            .zip(&samples.weights)
            .zip(&samples.values)
        {
            let exact = f(p, n);
            for d in 0..3 {
                error += w * (v[d] - exact[d]).norm_sqr();
                norm += w * exact[d].norm_sqr();
            }
        }
        Ok(if norm > 0.0 {
            (error / norm).sqrt()
        } else {
            error.sqrt()
        })
    }

    /// Multiply by a scalar
    pub fn scale(&self, scalar: c64) -> GridFunction {
        let data = match &self.data {
            GridFunctionData::Coefficients(c) => {
                GridFunctionData::Coefficients(c.iter().map(|x| x * scalar).collect())
            }
            GridFunctionData::Projections {
                dual,
                pairing,
                values,
            } => GridFunctionData::Projections {
                dual: dual.clone(),
                pairing: *pairing,
                values: values.iter().map(|x| x * scalar).collect(),
            },
        };
        GridFunction::new(self.space.clone(), data).with_accuracy(&self.accuracy)
    }

    /// The sum of two grid functions in the same space
    pub fn add(&self, other: &GridFunction) -> Result<GridFunction> {
        self.linear_combination(&[(c64::new(1.0, 0.0), other)])
    }

    /// The difference of two grid functions in the same space
    pub fn sub(&self, other: &GridFunction) -> Result<GridFunction> {
        self.linear_combination(&[(c64::new(-1.0, 0.0), other)])
    }

    /// Compute `self + sum_i a_i f_i`
    pub fn linear_combination(&self, terms: &[(c64, &GridFunction)]) -> Result<GridFunction> {
        for (_, f) in terms {
            if !f.space.is_same(&self.space) {
                return Err(BemError::IncompatibleSpaces(
                    "grid functions must belong to the same space to be combined".to_string(),
                ));
            }
        }
        if let GridFunctionData::Projections { dual, pairing, .. } = &self.data {
            let shares_projections = terms.iter().all(|(_, f)| {
                matches!(&f.data, GridFunctionData::Projections { dual: d, pairing: p, .. }
                    if d.is_same(dual) && p == pairing)
            });
            if shares_projections {
                let mut values = self.projections(dual, *pairing)?;
                for (a, f) in terms {
                    for (v, w) in values.iter_mut().zip(f.projections(dual, *pairing)?) {
                        *v += a * w;
                    }
                }
                return Ok(
                    Self::from_projections(self.space.clone(), dual.clone(), *pairing, values)?
                        .with_accuracy(&self.accuracy),
                );
            }
        }
        let mut coefficients = self.coefficients()?;
        for (a, f) in terms {
            for (c, d) in coefficients.iter_mut().zip(f.coefficients()?) {
                *c += a * d;
            }
        }
        Ok(Self::from_coefficients(self.space.clone(), coefficients)?.with_accuracy(&self.accuracy))
    }
}

impl Neg for &GridFunction {
    type Output = GridFunction;
    fn neg(self) -> GridFunction {
        self.scale(c64::new(-1.0, 0.0))
    }
}

impl Neg for GridFunction {
    type Output = GridFunction;
    fn neg(self) -> GridFunction {
        self.scale(c64::new(-1.0, 0.0))
    }
}
