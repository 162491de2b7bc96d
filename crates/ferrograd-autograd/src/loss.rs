//! Loss functions.

use ferrograd_tensor::{Element, Tensor, TensorError};

use crate::error::GradError;
use crate::var::{Op, Var};

/// Probabilities are clamped into `[EPSILON, 1 - EPSILON]` before taking the logarithm.
const EPSILON: f64 = 1e-15;

/// Mean squared error `mean((pred - target)^2)`.
///
/// `target` is usually a constant, but gradients flow into it as well when it is tracked.
/// Both operands may broadcast against each other.
///
/// # Example
///
/// ```rust
/// use ferrograd_autograd::{loss, GradError, Var};
/// use ferrograd_tensor::Tensor;
///
/// # fn main() -> Result<(), GradError> {
/// let pred = Var::variable(Tensor::<f64>::from_vec(vec![1.0, 2.0], &[2])?)?;
/// let target = Var::constant(Tensor::<f64>::from_vec(vec![0.0, 0.0], &[2])?);
/// let l = loss::mse(&pred, &target)?;
/// assert_eq!(l.value().item()?, 2.5);
/// # Ok(())
/// # }
/// ```
pub fn mse<T: Element>(pred: &Var<T>, target: &Var<T>) -> Result<Var<T>, GradError> {
    let diff = pred.value().sub(target.value(), None)?;
    let value = diff.mul(&diff, None)?.mean(false)?;
    Ok(Var::from_op(
        Op::Mse,
        value,
        vec![pred.clone(), target.clone()],
    ))
}

/// Mean cross-entropy of `softmax(logits)` against integer class labels.
///
/// `logits` has shape `(n, classes)`; `target` holds `n` class indices stored as elements
/// of the same type. No gradient flows into `target`.
///
/// # Errors
///
/// Returns [`TensorError::DimensionMismatch`] if `logits` is not rank 2 or the label count
/// differs from the row count, and [`TensorError::IndexOutOfBounds`] for a label outside
/// `0..classes`.
pub fn softmax_cross_entropy<T: Element>(
    logits: &Var<T>,
    target: &Var<T>,
) -> Result<Var<T>, GradError> {
    let classes = class_indices(logits.value(), target.value())?;
    let probs = logits.value().softmax()?;
    let total: f64 = classes
        .iter()
        .enumerate()
        .map(|(row, &class)| {
            let p = probs.get(&[row as isize, class as isize])?.to_f64();
            Ok(-p.clamp(EPSILON, 1.0 - EPSILON).ln())
        })
        .sum::<Result<f64, TensorError>>()?;
    let value = Tensor::from_vec(vec![T::from_f64(total / classes.len() as f64)], &[1])?;

    // labels never receive a gradient
    let labels = Var::constant(target.value().clone());
    Ok(Var::from_op(
        Op::SoftmaxCrossEntropy,
        value,
        vec![logits.clone(), labels],
    ))
}

/// Gradient of the mean softmax cross-entropy with respect to the logits:
/// `grad * (softmax(logits) - onehot(target)) / n`.
pub(crate) fn softmax_cross_entropy_grad<T: Element>(
    logits: &Tensor<T>,
    target: &Tensor<T>,
    grad: &Tensor<T>,
) -> Result<Tensor<T>, TensorError> {
    let classes = class_indices(logits, target)?;
    let one = T::from_f64(1.0);
    let zero = T::from_f64(0.0);
    let onehot = Tensor::from_fn(logits.shape(), |i| {
        if classes[i[0]] == i[1] {
            one
        } else {
            zero
        }
    })?;
    let share = Tensor::scalar(T::from_f64(1.0 / classes.len() as f64));
    logits
        .softmax()?
        .sub(&onehot, None)?
        .mul(&share, None)?
        .mul(grad, None)
}

fn class_indices<T: Element>(
    logits: &Tensor<T>,
    target: &Tensor<T>,
) -> Result<Vec<usize>, TensorError> {
    let &[rows, cols] = logits.shape() else {
        return Err(TensorError::DimensionMismatch {
            message: "logits must be rank 2".to_string(),
            expected: "(samples, classes)".to_string(),
            actual: format!("{:?}", logits.shape()),
        });
    };
    if target.numel() != rows {
        return Err(TensorError::DimensionMismatch {
            message: "one label per logits row".to_string(),
            expected: rows.to_string(),
            actual: target.numel().to_string(),
        });
    }
    target
        .to_vec()
        .into_iter()
        .map(|label| {
            let v = label.to_f64();
            if v >= 0.0 && v.fract() == 0.0 && (v as usize) < cols {
                Ok(v as usize)
            } else {
                Err(TensorError::IndexOutOfBounds {
                    axis: 1,
                    index: v as isize,
                    size: cols,
                })
            }
        })
        .collect()
}
