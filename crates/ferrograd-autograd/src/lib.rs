#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Operations on [`Var`] evaluate eagerly through `ferrograd-tensor` and record their operands.
//! [`Var::backward`] walks the recorded graph in reverse topological order and accumulates a
//! gradient on every node that depends on a tracked variable.
//!
//! # Example
//!
//! Fitting `y = w * x + b` with one step of gradient descent:
//!
//! ```rust
//! use ferrograd_autograd::{loss, GradError, Sgd, Var};
//! use ferrograd_tensor::Tensor;
//!
//! # fn main() -> Result<(), GradError> {
//! let x = Var::constant(Tensor::<f64>::from_vec(vec![1.0, 2.0, 3.0], &[3, 1])?);
//! let y = Var::constant(Tensor::<f64>::from_vec(vec![2.0, 4.0, 6.0], &[3, 1])?);
//! let w = Var::named_variable("w", Tensor::zeros(&[1, 1])?)?;
//! let b = Var::named_variable("b", Tensor::zeros(&[1, 1])?)?;
//!
//! let params = [w.clone(), b.clone()];
//! let opt = Sgd::new(0.1);
//! let before = loss::mse(&x.matmul(&w)?.add(&b)?, &y)?;
//! before.backward()?;
//! opt.step(&params)?;
//! opt.zero_grad(&params);
//!
//! let after = loss::mse(&x.matmul(&w)?.add(&b)?, &y)?;
//! assert!(after.value().item()? < before.value().item()?);
//! # Ok(())
//! # }
//! ```

mod backward;

/// Error types for graph construction and differentiation.
pub mod error;

pub mod loss;

mod numeric;

pub mod optim;

pub mod var;

pub use crate::error::GradError;
pub use crate::numeric::{numeric_derivative, EPSILON};
pub use crate::optim::Sgd;
pub use crate::var::{NodeId, Op, Var};
