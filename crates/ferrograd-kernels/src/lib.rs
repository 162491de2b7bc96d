#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Capability detection for the accelerated kernel tier.
pub mod accel;

/// Element types and the vectorized operations they support.
pub mod element;

/// Error types for the kernels module.
pub mod error;

/// module containing ops implementations.
pub mod ops;

mod portable;

pub use accel::Acceleration;
pub use element::{BinaryOp, KernelElement};
pub use error::KernelError;
