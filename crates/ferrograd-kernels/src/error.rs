use thiserror::Error;

/// An error type for slice kernels.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// Length mismatch for vector operations
    #[error("Length mismatch: expected equal length slices, got {0} and {1}")]
    LengthMismatch(usize, usize),

    /// An integer division met a zero divisor
    #[error("Integer division by zero")]
    DivisionByZero,

    /// Matrix buffers do not hold the elements their dimensions require
    #[error("Matrix buffer of {actual} elements cannot hold a {rows}x{cols} matrix")]
    MatrixSize {
        /// Rows of the matrix
        rows: usize,
        /// Columns of the matrix
        cols: usize,
        /// Elements in the buffer
        actual: usize,
    },
}
