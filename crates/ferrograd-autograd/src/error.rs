use ferrograd_tensor::{DType, TensorError};
use thiserror::Error;

/// Error type for graph construction and the backward pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradError {
    /// A tensor operation inside the graph failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// Gradients were requested for a variable of an integer element type.
    #[error("Cannot track gradients for a variable of integer type {0}")]
    IntegerGradient(DType),

    /// `backward` without an explicit seed was called on a non scalar output.
    #[error("Backward needs a scalar output or an explicit seed, got shape {shape:?}")]
    NotScalarOutput {
        /// Shape of the output the pass was started from.
        shape: Vec<usize>,
    },
}
