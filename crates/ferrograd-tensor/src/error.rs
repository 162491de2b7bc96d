use ferrograd_kernels::KernelError;
use thiserror::Error;

/// Error type for tensor operations.
///
/// Every fallible operation returns `Result<_, TensorError>`. Chaining operations with `?`
/// or [`Result::and_then`] stops at the first failure and hands that exact error back to the
/// caller, so no operation ever runs on the output of a failed one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    /// A shape contained a dimension of size zero.
    ///
    /// Empty tensors are not representable; every dimension must hold at least one element.
    #[error("Zero-sized dimension at axis {axis} in shape {shape:?}")]
    ZeroSizedDimension {
        /// The offending axis.
        axis: usize,
        /// The rejected shape.
        shape: Vec<usize>,
    },

    /// A shape with no dimensions was supplied.
    #[error("Shape must have at least one dimension")]
    EmptyShape,

    /// The number of elements does not match what the shape requires.
    #[error("Shape mismatch: expected {expected} elements for shape, but got {actual} elements in data")]
    InvalidShape {
        /// Expected number of elements based on shape
        expected: usize,
        /// Actual number of elements supplied
        actual: usize,
    },

    /// Tensor dimensions incompatible for the requested operation.
    ///
    /// # Examples
    /// - Matrix multiplication with incompatible inner dimensions
    /// - An `out` tensor whose shape differs from the result shape
    #[error("Dimension mismatch: {message}. Expected shape: {expected}, got: {actual}")]
    DimensionMismatch {
        /// Human-readable description of the mismatch
        message: String,
        /// Expected shape description
        expected: String,
        /// Actual shape description
        actual: String,
    },

    /// Two shapes cannot be broadcast against each other.
    #[error("Shapes {lhs:?} and {rhs:?} are not broadcastable")]
    NotBroadcastable {
        /// Left operand shape
        lhs: Vec<usize>,
        /// Right operand shape
        rhs: Vec<usize>,
    },

    /// An index, after negative-index resolution, exceeds its axis.
    #[error("Index {index} out of bounds for axis {axis} of size {size}")]
    IndexOutOfBounds {
        /// The axis being indexed
        axis: usize,
        /// The index as supplied by the caller
        index: isize,
        /// The size of the axis
        size: usize,
    },

    /// More indices were supplied than the tensor has axes.
    #[error("Too many indices: got {got} for a tensor of rank {rank}")]
    TooManyIndices {
        /// Number of indices supplied
        got: usize,
        /// Rank of the tensor
        rank: usize,
    },

    /// No indices were supplied, or fewer than the operation needs.
    #[error("Missing indices: expected {expected}, got {got}")]
    MissingIndices {
        /// Number of indices required
        expected: usize,
        /// Number of indices supplied
        got: usize,
    },

    /// An axis argument is not smaller than the tensor rank.
    #[error("Axis {axis} is out of range for a tensor of rank {rank}")]
    InvalidAxis {
        /// The requested axis
        axis: usize,
        /// Rank of the tensor
        rank: usize,
    },

    /// A permutation does not contain every axis exactly once.
    #[error("Invalid axes permutation {0:?}")]
    InvalidPermutation(Vec<usize>),

    /// A range generator was asked for an empty or infinite sequence.
    #[error("Invalid range: start {start}, end {end}, step {step}")]
    InvalidRange {
        /// First value
        start: f64,
        /// Exclusive end value
        end: f64,
        /// Increment
        step: f64,
    },

    /// An advanced-indexing expression could not be parsed.
    #[error("Cannot parse index expression {expr:?}: {reason}")]
    ParseError {
        /// The expression as supplied
        expr: String,
        /// What went wrong
        reason: String,
    },

    /// A scalar accessor was called on a tensor with more than one element.
    #[error("Expected a scalar-like tensor, got {numel} elements")]
    NotScalar {
        /// Element count of the tensor
        numel: usize,
    },

    /// An integer division met a zero divisor.
    #[error("Integer division by zero")]
    DivisionByZero,

    /// A slice kernel rejected its inputs.
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    /// The execution context is misconfigured or the worker pool failed.
    #[error("Execution error: {0}")]
    Execution(String),
}

impl TensorError {
    /// Creates an `InvalidShape` error.
    pub fn invalid_shape(expected: usize, actual: usize) -> Self {
        Self::InvalidShape { expected, actual }
    }

    /// Creates a `DimensionMismatch` error from two shapes.
    pub fn dimension_mismatch(
        message: impl Into<String>,
        expected: &[usize],
        actual: &[usize],
    ) -> Self {
        Self::DimensionMismatch {
            message: message.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }

    /// Creates a `NotBroadcastable` error.
    pub fn not_broadcastable(lhs: &[usize], rhs: &[usize]) -> Self {
        Self::NotBroadcastable {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        }
    }

    /// Returns true for shape errors (zero dimensions, element counts, rank, broadcasting).
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Self::ZeroSizedDimension { .. }
                | Self::EmptyShape
                | Self::InvalidShape { .. }
                | Self::DimensionMismatch { .. }
                | Self::NotBroadcastable { .. }
        )
    }

    /// Returns true for index errors (bounds, too many or too few indices, bad axes).
    pub fn is_index_error(&self) -> bool {
        matches!(
            self,
            Self::IndexOutOfBounds { .. }
                | Self::TooManyIndices { .. }
                | Self::MissingIndices { .. }
                | Self::InvalidAxis { .. }
                | Self::InvalidPermutation(_)
        )
    }
}
