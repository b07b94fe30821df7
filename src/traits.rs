//! Trait definitions

mod assembly;
mod function;
mod operator;

pub use assembly::{BoundaryIntegrand, CellPairAssembler, KernelEvaluator, PotentialIntegrand};
pub use function::FunctionSpace;
pub use operator::DiscreteOperator;
pub(crate) use operator::scale_output;
