//! Bempp Maxwell
//!
//! Boundary element methods for time-harmonic electromagnetic scattering by
//! perfect electric conductors. Surface currents are discretised with lowest
//! order Raviart-Thomas functions on closed triangle meshes; the Maxwell
//! single and double layer operators are assembled densely or as H-matrices,
//! and the resulting systems are solved with preconditioned GMRES.
#![cfg_attr(feature = "strict", deny(warnings))]
#![warn(missing_docs)]

#[macro_use]
extern crate lazy_static;

pub mod assembly;
pub mod element;
pub mod function;
pub mod grid;
pub mod incident;
pub mod linalg;
pub mod operator;
pub mod potential;
pub mod preconditioner;
pub mod quadrature;
pub mod solver;
pub mod traits;
pub mod types;
