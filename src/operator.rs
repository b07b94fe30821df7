//! Boundary operators
//!
//! A [`BoundaryOperator`] is a symbolic description of an operator between
//! function spaces. It does no numerical work: [`crate::assembly::assemble`]
//! turns it into an [`AssembledBoundaryOperator`].
mod discrete;

pub use discrete::{
    BlockDiagonalOperator, DenseDiscreteOperator, DiscreteOperatorSum, IdentityOperator,
    ScaledDiscreteOperator, SparseDiscreteOperator,
};
pub(crate) use discrete::apply_new;

use crate::assembly::AssemblyDiagnostics;
use crate::function::{GridFunction, RaviartThomasSpace};
use crate::traits::DiscreteOperator;
use crate::types::{BemError, Result};
use cauchy::c64;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

/// How test functions are paired with the range of an operator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pairing {
    /// `<u, v> = int u . v`
    L2,
    /// `<u, v> = int u . (v x n)`
    Rotated,
}

/// The kind of a boundary operator
#[derive(Clone, Debug)]
pub enum OperatorKind {
    /// Identity operator
    Identity {
        /// Pairing of the range with the test space
        pairing: Pairing,
    },
    /// Maxwell electric field single layer operator
    SingleLayer {
        /// Wavenumber
        wavenumber: f64,
    },
    /// Maxwell magnetic field double layer operator
    DoubleLayer {
        /// Wavenumber
        wavenumber: f64,
    },
    /// An operator multiplied by a scalar
    Scaled {
        /// The scalar
        scalar: c64,
        /// The operator
        operator: Box<BoundaryOperator>,
    },
    /// The sum of two operators
    Sum {
        /// First term
        left: Box<BoundaryOperator>,
        /// Second term
        right: Box<BoundaryOperator>,
    },
}

/// A boundary operator
#[derive(Clone, Debug)]
pub struct BoundaryOperator {
    domain: Arc<RaviartThomasSpace>,
    range: Arc<RaviartThomasSpace>,
    dual_to_range: Arc<RaviartThomasSpace>,
    kind: OperatorKind,
    label: String,
}

impl BoundaryOperator {
    fn new(
        domain: Arc<RaviartThomasSpace>,
        range: Arc<RaviartThomasSpace>,
        dual_to_range: Arc<RaviartThomasSpace>,
        kind: OperatorKind,
        label: String,
    ) -> Self {
        Self {
            domain,
            range,
            dual_to_range,
            kind,
            label,
        }
    }

    /// Identity operator with the L2 pairing
    pub fn identity(
        domain: Arc<RaviartThomasSpace>,
        range: Arc<RaviartThomasSpace>,
        dual_to_range: Arc<RaviartThomasSpace>,
    ) -> Self {
        Self::new(
            domain,
            range,
            dual_to_range,
            OperatorKind::Identity {
                pairing: Pairing::L2,
            },
            "Identity".to_string(),
        )
    }

    /// Identity operator with the rotated pairing used by Maxwell operators
    pub fn maxwell_identity(
        domain: Arc<RaviartThomasSpace>,
        range: Arc<RaviartThomasSpace>,
        dual_to_range: Arc<RaviartThomasSpace>,
    ) -> Self {
        Self::new(
            domain,
            range,
            dual_to_range,
            OperatorKind::Identity {
                pairing: Pairing::Rotated,
            },
            "MaxwellIdentity".to_string(),
        )
    }

    /// Maxwell electric field single layer operator
    pub fn single_layer(
        domain: Arc<RaviartThomasSpace>,
        range: Arc<RaviartThomasSpace>,
        dual_to_range: Arc<RaviartThomasSpace>,
        wavenumber: f64,
    ) -> Self {
        Self::new(
            domain,
            range,
            dual_to_range,
            OperatorKind::SingleLayer { wavenumber },
            format!("SingleLayer(k={wavenumber})"),
        )
    }

    /// Maxwell magnetic field double layer operator
    pub fn double_layer(
        domain: Arc<RaviartThomasSpace>,
        range: Arc<RaviartThomasSpace>,
        dual_to_range: Arc<RaviartThomasSpace>,
        wavenumber: f64,
    ) -> Self {
        Self::new(
            domain,
            range,
            dual_to_range,
            OperatorKind::DoubleLayer { wavenumber },
            format!("DoubleLayer(k={wavenumber})"),
        )
    }

    /// The kind of operator
    pub fn kind(&self) -> &OperatorKind {
        &self.kind
    }

    /// Domain space
    pub fn domain(&self) -> &Arc<RaviartThomasSpace> {
        &self.domain
    }

    /// Range space
    pub fn range(&self) -> &Arc<RaviartThomasSpace> {
        &self.range
    }

    /// Test space
    pub fn dual_to_range(&self) -> &Arc<RaviartThomasSpace> {
        &self.dual_to_range
    }

    /// A short description
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Check if two operators have the same domain, range and test spaces
    pub fn has_same_spaces(&self, other: &BoundaryOperator) -> bool {
        self.domain.is_same(&other.domain)
            && self.range.is_same(&other.range)
            && self.dual_to_range.is_same(&other.dual_to_range)
    }

    /// The pairing between the range and the test space
    pub fn range_pairing(&self) -> Pairing {
        match &self.kind {
            OperatorKind::Identity { pairing } => *pairing,
            OperatorKind::SingleLayer { .. } | OperatorKind::DoubleLayer { .. } => {
                Pairing::Rotated
            }
            OperatorKind::Scaled { operator, .. } => operator.range_pairing(),
            OperatorKind::Sum { left, .. } => left.range_pairing(),
        }
    }

    /// Check that two operators can be added
    ///
    /// The domain, range and test spaces must be identical and the range must
    /// be paired with the test space in the same way.
    pub fn check_summable(&self, other: &BoundaryOperator) -> Result<()> {
        if !self.has_same_spaces(other) {
            return Err(BemError::IncompatibleSpaces(format!(
                "cannot add {} and {}: domain, range and dual spaces must be identical",
                self.label, other.label
            )));
        }
        if self.range_pairing() != other.range_pairing() {
            return Err(BemError::IncompatibleSpaces(format!(
                "cannot add {} and {}: the test pairings differ",
                self.label, other.label
            )));
        }
        Ok(())
    }

    /// The sum of two operators, checking that the spaces agree
    pub fn try_add(&self, other: &BoundaryOperator) -> Result<BoundaryOperator> {
        self.check_summable(other)?;
        Ok(self.sum_unchecked(other))
    }

    fn sum_unchecked(&self, other: &BoundaryOperator) -> BoundaryOperator {
        Self::new(
            self.domain.clone(),
            self.range.clone(),
            self.dual_to_range.clone(),
            OperatorKind::Sum {
                left: Box::new(self.clone()),
                right: Box::new(other.clone()),
            },
            format!("({} + {})", self.label, other.label),
        )
    }

    fn scaled(&self, scalar: c64) -> BoundaryOperator {
        Self::new(
            self.domain.clone(),
            self.range.clone(),
            self.dual_to_range.clone(),
            OperatorKind::Scaled {
                scalar,
                operator: Box::new(self.clone()),
            },
            format!("({scalar} * {})", self.label),
        )
    }
}

impl Add<&BoundaryOperator> for &BoundaryOperator {
    type Output = BoundaryOperator;
    fn add(self, other: &BoundaryOperator) -> BoundaryOperator {
        self.sum_unchecked(other)
    }
}

impl Add for BoundaryOperator {
    type Output = BoundaryOperator;
    fn add(self, other: BoundaryOperator) -> BoundaryOperator {
        &self + &other
    }
}

impl Sub<&BoundaryOperator> for &BoundaryOperator {
    type Output = BoundaryOperator;
    fn sub(self, other: &BoundaryOperator) -> BoundaryOperator {
        self.sum_unchecked(&-other)
    }
}

impl Sub for BoundaryOperator {
    type Output = BoundaryOperator;
    fn sub(self, other: BoundaryOperator) -> BoundaryOperator {
        &self - &other
    }
}

impl Neg for &BoundaryOperator {
    type Output = BoundaryOperator;
    fn neg(self) -> BoundaryOperator {
        self.scaled(c64::new(-1.0, 0.0))
    }
}

impl Neg for BoundaryOperator {
    type Output = BoundaryOperator;
    fn neg(self) -> BoundaryOperator {
        -&self
    }
}

macro_rules! impl_scalar_mul {
    ($scalar: ty) => {
        impl Mul<$scalar> for &BoundaryOperator {
            type Output = BoundaryOperator;
            fn mul(self, scalar: $scalar) -> BoundaryOperator {
                self.scaled(c64::from(scalar))
            }
        }
        impl Mul<$scalar> for BoundaryOperator {
            type Output = BoundaryOperator;
            fn mul(self, scalar: $scalar) -> BoundaryOperator {
                self.scaled(c64::from(scalar))
            }
        }
        impl Mul<&BoundaryOperator> for $scalar {
            type Output = BoundaryOperator;
            fn mul(self, operator: &BoundaryOperator) -> BoundaryOperator {
                operator.scaled(c64::from(self))
            }
        }
        impl Mul<BoundaryOperator> for $scalar {
            type Output = BoundaryOperator;
            fn mul(self, operator: BoundaryOperator) -> BoundaryOperator {
                operator.scaled(c64::from(self))
            }
        }
    };
}

impl_scalar_mul!(f64);
impl_scalar_mul!(c64);

/// A boundary operator together with its weak form
#[derive(Clone)]
pub struct AssembledBoundaryOperator {
    operator: BoundaryOperator,
    weak_form: Arc<dyn DiscreteOperator>,
}

impl AssembledBoundaryOperator {
    /// Create new
    pub fn new(operator: BoundaryOperator, weak_form: Arc<dyn DiscreteOperator>) -> Self {
        Self {
            operator,
            weak_form,
        }
    }

    /// The symbolic operator
    pub fn operator(&self) -> &BoundaryOperator {
        &self.operator
    }

    /// The weak form, mapping coefficients in the domain to projections onto the test space
    pub fn weak_form(&self) -> &Arc<dyn DiscreteOperator> {
        &self.weak_form
    }

    /// Domain space
    pub fn domain(&self) -> &Arc<RaviartThomasSpace> {
        self.operator.domain()
    }

    /// Range space
    pub fn range(&self) -> &Arc<RaviartThomasSpace> {
        self.operator.range()
    }

    /// Test space
    pub fn dual_to_range(&self) -> &Arc<RaviartThomasSpace> {
        self.operator.dual_to_range()
    }

    /// The pairing between the range and the test space
    pub fn range_pairing(&self) -> Pairing {
        self.operator.range_pairing()
    }

    /// Number of rows and columns of the weak form
    pub fn shape(&self) -> [usize; 2] {
        self.weak_form.shape()
    }

    /// A short description
    pub fn label(&self) -> &str {
        self.operator.label()
    }

    /// Assembly diagnostics
    pub fn diagnostics(&self) -> AssemblyDiagnostics {
        self.weak_form.diagnostics()
    }

    /// Apply the operator to a grid function
    ///
    /// The result lives in the range space and is stored as its projections
    /// onto the test space.
    pub fn apply(&self, function: &GridFunction) -> Result<GridFunction> {
        if !function.space().is_same(self.domain()) {
            return Err(BemError::IncompatibleSpaces(format!(
                "{} must be applied to a function in its domain",
                self.label()
            )));
        }
        let coefficients = function.coefficients()?;
        let projections = self.weak_form.matvec(&coefficients)?;
        GridFunction::from_projections(
            self.range().clone(),
            self.dual_to_range().clone(),
            self.range_pairing(),
            projections,
        )
    }
}
