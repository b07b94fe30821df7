//! Quadrature
pub mod duffy;
pub mod simplex_rules;
pub mod strategy;
pub mod types;

pub use strategy::{AccuracyOptions, QuadratureOrder, QuadratureStrategy, MAX_QUADRATURE_ORDER};
pub use types::{
    CellToCellConnectivity, NumericalQuadratureDefinition, ReferenceCell,
    TestTrialNumericalQuadratureDefinition,
};
