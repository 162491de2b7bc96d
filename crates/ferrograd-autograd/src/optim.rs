//! Parameter updates.

use ferrograd_tensor::Element;

use crate::error::GradError;
use crate::var::Var;

/// Plain stochastic gradient descent: `param -= lr * grad`.
///
/// # Example
///
/// ```rust
/// use ferrograd_autograd::{GradError, Sgd, Var};
/// use ferrograd_tensor::Tensor;
///
/// # fn main() -> Result<(), GradError> {
/// let w = Var::variable(Tensor::<f32>::scalar(3.0))?;
/// w.mul(&w)?.backward()?;
///
/// let opt = Sgd::new(0.5);
/// opt.step(&[w.clone()])?;
/// assert_eq!(w.value().item()?, 0.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd<T> {
    /// Learning rate.
    pub lr: T,
}

impl<T: Element> Sgd<T> {
    /// Creates an optimiser with learning rate `lr`.
    pub fn new(lr: T) -> Self {
        Self { lr }
    }

    /// Updates every parameter in place from its accumulated gradient.
    ///
    /// Parameters that have not received a gradient are left untouched.
    pub fn step(&self, params: &[Var<T>]) -> Result<(), GradError> {
        for param in params {
            match param.grad() {
                Some(grad) => param.value().gradient_step(&grad, self.lr)?,
                None => log::trace!("sgd: {} ({:?}) has no gradient", param.alias(), param.id()),
            }
        }
        Ok(())
    }

    /// Clears the gradient of every parameter.
    pub fn zero_grad(&self, params: &[Var<T>]) {
        params.iter().for_each(Var::zero_grad);
    }
}
