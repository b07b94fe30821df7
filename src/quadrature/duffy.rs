//! Duffy (Sauter-Schwab) rules for pairs of touching cells
mod common;
pub mod triangle;

pub use triangle::triangle_duffy;
