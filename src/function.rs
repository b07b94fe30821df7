//! Functions and function spaces
mod function_space;
mod grid_function;

pub use function_space::RaviartThomasSpace;
pub use grid_function::{GridFunction, QuadratureSamples};
