//! Types specific to bempp-maxwell
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error type
#[derive(thiserror::Error, Debug)]
pub enum BemError {
    /// The input mesh could not be read or does not describe a closed, oriented surface
    #[error("Mesh import error: {0}")]
    MeshImport(String),
    /// Invalid accuracy or quadrature order settings
    #[error("Invalid quadrature configuration: {0}")]
    QuadratureConfig(String),
    /// A near-singular integral could not be resolved with the configured orders
    #[error("Singular integration failure: {0}")]
    SingularIntegrationFailure(String),
    /// ACA did not reach the requested tolerance within the rank cap
    #[error("ACA rank cap of {max_rank} exceeded for a {rows}x{cols} block")]
    CompressionRankExceeded {
        /// Number of rows of the block
        rows: usize,
        /// Number of columns of the block
        cols: usize,
        /// The rank cap
        max_rank: usize,
    },
    /// Incompatible operator, space or vector sizes
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },
    /// Operators or functions are defined on incompatible spaces
    #[error("Incompatible spaces: {0}")]
    IncompatibleSpaces(String),
    /// A dense factorisation met a zero pivot
    #[error("Matrix is singular to working precision")]
    SingularMatrix,
    /// An argument is outside of its valid range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation was cancelled through an abort signal
    #[error("Operation aborted")]
    Aborted,
}

/// Result type
pub type Result<T> = std::result::Result<T, BemError>;

/// How a discrete operator is transformed before being applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranspositionMode {
    /// Use the operator as it is
    NoTranspose,
    /// Use the operator with complex-conjugated entries
    Conjugate,
    /// Use the transposed operator
    Transpose,
    /// Use the transposed operator with complex-conjugated entries
    ConjugateTranspose,
}

impl TranspositionMode {
    /// Check if rows and columns are swapped
    pub fn is_transposed(self) -> bool {
        matches!(
            self,
            TranspositionMode::Transpose | TranspositionMode::ConjugateTranspose
        )
    }

    /// Check if entries are conjugated
    pub fn is_conjugated(self) -> bool {
        matches!(
            self,
            TranspositionMode::Conjugate | TranspositionMode::ConjugateTranspose
        )
    }
}

/// A shared flag that long running operations poll between units of work
///
/// Cloning the signal shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Create a new signal that is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that operations observing this signal stop
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the signal
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Check if an abort was requested
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Check an optional abort signal
pub(crate) fn check_abort(abort: Option<&AbortSignal>) -> Result<()> {
    match abort {
        Some(signal) if signal.is_aborted() => Err(BemError::Aborted),
        _ => Ok(()),
    }
}
