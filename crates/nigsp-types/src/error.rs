// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for every NiGSP kernel stage.
///
/// Each stage validates its own inputs and fails with the most specific
/// variant; errors travel to the caller unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NigspError {
    /// Node-count or axis disagreement between inputs.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// A matrix that must be square is not.
    #[error("matrix must be square, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },

    /// A negative edge weight under the rejecting policy.
    #[error("negative weight {value} at ({row}, {col})")]
    NegativeWeight { row: usize, col: usize, value: f64 },

    /// NaN or infinite entry in an input array.
    #[error("non-finite value in {context} at flat index {index}")]
    NonFiniteValue { context: String, index: usize },

    /// Zero-degree node under a normalisation that was told not to substitute.
    #[error("node {node} has zero degree and isolated nodes are not allowed")]
    DegenerateDegree { node: usize },

    /// Out-of-range, overlapping or otherwise unusable band split.
    #[error("invalid band specification: {0}")]
    InvalidBandSpecification(String),

    /// Eigensolver did not converge or failed its recomposition self-check.
    #[error("eigendecomposition did not converge after {sweeps} sweeps (residual {residual:.3e})")]
    NonConvergentDecomposition { sweeps: usize, residual: f64 },

    /// Symmetric solver given an asymmetric matrix.
    #[error("matrix is not symmetric: |a[{row},{col}] - a[{col},{row}]| = {delta:.3e}")]
    NonSymmetricMatrix { row: usize, col: usize, delta: f64 },

    /// Boundary conversion received data it cannot interpret.
    #[error("invalid input: {0}")]
    InvalidType(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

impl NigspError {
    /// Shorthand for [`NigspError::ShapeMismatch`].
    pub fn shape(
        context: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type NigspResult<T> = Result<T, NigspError>;
