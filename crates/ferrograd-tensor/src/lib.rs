#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! A [`Tensor`] is a view over a reference-counted flat buffer: a shape, per-axis strides,
//! a dimension order and an offset. Transposes, reshapes of contiguous data, slices and
//! broadcasts are O(1) views that share the buffer, so writes through one view are seen by
//! every other view of the same storage.
//!
//! Every fallible operation returns `Result<_, TensorError>`. Chains written with `?` or
//! `and_then` stop at the first fault and hand it back unchanged.
//!
//! Operations come in two flavours:
//!
//! - methods on [`Tensor`], which run on [`ExecutionContext::global`]
//! - free functions in [`ops`], [`matmul`] and [`reduce`] taking an explicit
//!   [`ExecutionContext`], e.g. to force single-threaded scalar execution
//!
//! # Quick Start
//!
//! ```rust
//! use ferrograd_tensor::{Tensor, TensorError};
//!
//! # fn main() -> Result<(), TensorError> {
//! let t = Tensor::<f32>::range(0.0, 8.0, 1.0)?.reshape(&[2, 2, 2])?;
//! let row = t.index(&[1])?.index(&[1])?;
//! assert_eq!(row.to_vec(), vec![6.0, 7.0]);
//!
//! let x = Tensor::<f32>::zeros(&[3, 2])?.add(&Tensor::scalar(5.0), None)?;
//! assert_eq!(x.to_vec(), vec![5.0; 6]);
//!
//! let a = Tensor::<f32>::range(0.0, 5.0, 1.0)?.reshape(&[1, 5])?;
//! let dot = a.matmul(&a.transpose()?)?;
//! assert_eq!(dot.item()?, 30.0);
//! # Ok(())
//! # }
//! ```
//!
//! Running with an explicit context:
//!
//! ```rust
//! use ferrograd_tensor::{ops, reduce, ExecutionContext, ExecutionStrategy, Tensor};
//!
//! let ctx = ExecutionContext::default().with_strategy(ExecutionStrategy::Fixed(2));
//! let a = Tensor::<f64>::ones(&[64, 64]).unwrap();
//! let b = ops::mul(&ctx, &a, &Tensor::scalar(3.0), None).unwrap();
//! assert_eq!(reduce::sum(&ctx, &b, false).unwrap().item().unwrap(), 3.0 * 4096.0);
//! ```

/// Execution context: scheduling strategy, kernel tier and tuning knobs.
pub mod context;

/// Element types a tensor can hold.
pub mod element;

mod elementwise;

/// Error types for the tensor engine.
pub mod error;

pub mod index;

pub mod iter;

pub mod matmul;

pub mod ops;

/// Random tensor construction.
pub mod random;

pub mod reduce;

pub mod shape;

pub mod storage;

/// The tensor type with its constructors, views and in-place mutation.
pub mod tensor;

pub use ferrograd_kernels::Acceleration;

pub use crate::context::{ExecutionContext, ExecutionStrategy};
pub use crate::element::{DType, Element};
pub use crate::error::TensorError;
pub use crate::index::Selector;
pub use crate::random::Seed;
pub use crate::storage::TensorStorage;
pub use crate::tensor::Tensor;
