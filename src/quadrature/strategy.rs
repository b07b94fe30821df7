//! Selection of quadrature orders
use crate::quadrature::duffy::triangle_duffy;
use crate::quadrature::simplex_rules::{points_per_direction, simplex_rule_for_order};
use crate::quadrature::types::{
    CellToCellConnectivity, NumericalQuadratureDefinition, ReferenceCell,
    TestTrialNumericalQuadratureDefinition,
};
use crate::types::{BemError, Result};

/// Highest quadrature order that will be used
pub const MAX_QUADRATURE_ORDER: usize = 30;

const BASE_SINGLE_REGULAR_ORDER: usize = 4;
const BASE_DOUBLE_REGULAR_ORDER: usize = 4;
const BASE_DOUBLE_SINGULAR_ORDER: usize = 6;

/// A quadrature order, either relative to the default or absolute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadratureOrder {
    /// Offset added to the default order
    Relative(i32),
    /// Fixed order
    Absolute(usize),
}

impl Default for QuadratureOrder {
    fn default() -> Self {
        QuadratureOrder::Relative(0)
    }
}

impl QuadratureOrder {
    fn resolve(self, base: usize, name: &str) -> Result<usize> {
        let order = match self {
            QuadratureOrder::Relative(offset) => base as i64 + offset as i64,
            QuadratureOrder::Absolute(order) => order as i64,
        };
        if order < 0 || order > MAX_QUADRATURE_ORDER as i64 {
            Err(BemError::QuadratureConfig(format!(
                "{name} order {order} is outside of 0..={MAX_QUADRATURE_ORDER}"
            )))
        } else {
            Ok(order as usize)
        }
    }
}

/// Accuracy options
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyOptions {
    /// Order for integrals over a single cell
    pub single_regular: QuadratureOrder,
    /// Order for pairs of cells that do not touch
    pub double_regular: QuadratureOrder,
    /// Order for pairs of touching cells
    pub double_singular: QuadratureOrder,
    /// Pairs (threshold, extra order): cell pairs closer than `threshold`,
    /// measured in cell diameters, use the extra order on top of the regular one
    pub near_field_bands: Vec<(f64, usize)>,
}

impl Default for AccuracyOptions {
    fn default() -> Self {
        Self {
            single_regular: QuadratureOrder::default(),
            double_regular: QuadratureOrder::default(),
            double_singular: QuadratureOrder::default(),
            near_field_bands: vec![(2.0, 2)],
        }
    }
}

impl AccuracyOptions {
    /// Set the order for single cell integrals
    pub fn single_regular(mut self, order: QuadratureOrder) -> Self {
        self.single_regular = order;
        self
    }

    /// Set the order for non-touching cell pairs
    pub fn double_regular(mut self, order: QuadratureOrder) -> Self {
        self.double_regular = order;
        self
    }

    /// Set the order for touching cell pairs
    pub fn double_singular(mut self, order: QuadratureOrder) -> Self {
        self.double_singular = order;
        self
    }

    /// Replace the near-field bands
    pub fn near_field_bands(mut self, bands: Vec<(f64, usize)>) -> Self {
        self.near_field_bands = bands;
        self
    }
}

/// Quadrature strategy
///
/// Resolves accuracy options into concrete rules.
#[derive(Debug)]
pub struct QuadratureStrategy {
    single_regular_order: usize,
    double_regular_order: usize,
    double_singular_order: usize,
    near_field_bands: Vec<(f64, usize)>,
    triangle_rules: Vec<NumericalQuadratureDefinition>,
}

impl QuadratureStrategy {
    /// Create new
    pub fn new(options: &AccuracyOptions) -> Result<Self> {
        let single_regular_order = options
            .single_regular
            .resolve(BASE_SINGLE_REGULAR_ORDER, "single regular")?;
        let double_regular_order = options
            .double_regular
            .resolve(BASE_DOUBLE_REGULAR_ORDER, "double regular")?;
        let double_singular_order = options
            .double_singular
            .resolve(BASE_DOUBLE_SINGULAR_ORDER, "double singular")?;
        for (threshold, _) in &options.near_field_bands {
            if !(threshold.is_finite() && *threshold > 0.0) {
                return Err(BemError::QuadratureConfig(format!(
                    "near-field threshold {threshold} must be positive and finite"
                )));
            }
        }
        let triangle_rules = (0..=MAX_QUADRATURE_ORDER)
            .map(|order| simplex_rule_for_order(ReferenceCell::Triangle, order))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            single_regular_order,
            double_regular_order,
            double_singular_order,
            near_field_bands: options.near_field_bands.clone(),
            triangle_rules,
        })
    }

    /// Order used for single cell integrals
    pub fn single_regular_order(&self) -> usize {
        self.single_regular_order
    }

    /// Order used for well separated cell pairs
    pub fn double_regular_order(&self) -> usize {
        self.double_regular_order
    }

    /// Order used for touching cell pairs
    pub fn double_singular_order(&self) -> usize {
        self.double_singular_order
    }

    /// Near-field bands as (threshold, extra order) pairs
    pub fn near_field_bands(&self) -> &[(f64, usize)] {
        &self.near_field_bands
    }

    /// Rule for single cell integrals
    pub fn single_regular_rule(&self) -> &NumericalQuadratureDefinition {
        &self.triangle_rules[self.single_regular_order]
    }

    /// Triangle rule of a given order, clamped to the maximum order
    pub fn triangle_rule(&self, order: usize) -> &NumericalQuadratureDefinition {
        &self.triangle_rules[order.min(MAX_QUADRATURE_ORDER)]
    }

    /// Order for a non-touching pair or a point-to-cell integral.
    ///
    /// `normalized_distance` is the distance divided by the cell diameter.
    /// The second return value is true if the escalated order had to be clamped.
    pub fn regular_order(&self, normalized_distance: f64) -> (usize, bool) {
        let extra = self
            .near_field_bands
            .iter()
            .filter(|(threshold, _)| normalized_distance < *threshold)
            .map(|(_, extra)| *extra)
            .max()
            .unwrap_or(0);
        let order = self.double_regular_order + extra;
        if order > MAX_QUADRATURE_ORDER {
            (MAX_QUADRATURE_ORDER, true)
        } else {
            (order, false)
        }
    }

    /// Singular rule for a pair of touching cells
    pub fn singular_rule(
        &self,
        connectivity: &CellToCellConnectivity,
    ) -> Result<TestTrialNumericalQuadratureDefinition> {
        triangle_duffy(
            connectivity,
            points_per_direction(self.double_singular_order),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_orders() {
        let strategy = QuadratureStrategy::new(&AccuracyOptions::default()).unwrap();
        assert_eq!(strategy.single_regular_order(), 4);
        assert_eq!(strategy.regular_order(10.0), (4, false));
        assert_eq!(strategy.regular_order(1.5), (6, false));
        assert_eq!(strategy.single_regular_rule().npoints, 9);
    }

    #[test]
    fn test_relative_and_absolute_orders() {
        let options = AccuracyOptions::default()
            .double_regular(QuadratureOrder::Relative(2))
            .double_singular(QuadratureOrder::Absolute(2));
        let strategy = QuadratureStrategy::new(&options).unwrap();
        assert_eq!(strategy.double_regular_order(), 6);
        assert_eq!(strategy.double_singular_order(), 2);
        let rule = strategy
            .singular_rule(&CellToCellConnectivity {
                connectivity_dimension: 2,
                local_indices: vec![],
            })
            .unwrap();
        assert_eq!(rule.npoints, 6 * 16);
    }

    #[test]
    fn test_invalid_orders() {
        let negative = AccuracyOptions::default().single_regular(QuadratureOrder::Relative(-5));
        assert!(matches!(
            QuadratureStrategy::new(&negative),
            Err(BemError::QuadratureConfig(_))
        ));
        let too_large = AccuracyOptions::default().double_regular(QuadratureOrder::Absolute(31));
        assert!(matches!(
            QuadratureStrategy::new(&too_large),
            Err(BemError::QuadratureConfig(_))
        ));
        let bad_band = AccuracyOptions::default().near_field_bands(vec![(-1.0, 2)]);
        assert!(QuadratureStrategy::new(&bad_band).is_err());
    }

    #[test]
    fn test_escalation_is_clamped() {
        let options = AccuracyOptions::default()
            .double_regular(QuadratureOrder::Absolute(28))
            .near_field_bands(vec![(2.0, 2), (0.5, 6)]);
        let strategy = QuadratureStrategy::new(&options).unwrap();
        assert_eq!(strategy.regular_order(1.0), (30, false));
        assert_eq!(strategy.regular_order(0.1), (30, true));
    }
}
