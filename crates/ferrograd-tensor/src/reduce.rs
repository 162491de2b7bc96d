//! Full and per-axis reductions.
//!
//! Full reductions fold one contiguous chunk per worker and merge the partials under a
//! lock. Reductions along an axis add the slices of that axis one after another.

use ferrograd_kernels::ops::{argmax_kernel, max_kernel, min_kernel, sum_kernel};

use crate::{
    context::ExecutionContext,
    element::Element,
    elementwise::unary,
    error::TensorError,
    ops::{add, cast},
    tensor::Tensor,
};

/// Wraps a reduced value as `(1,)`, or as an all-ones shape of the input's rank.
fn reduced<T: Element>(t: &Tensor<T>, value: T, keep_dims: bool) -> Result<Tensor<T>, TensorError> {
    if keep_dims {
        Tensor::from_vec(vec![value], &vec![1; t.rank()])
    } else {
        Ok(Tensor::scalar(value))
    }
}

/// Folds the logical elements of `t` in parallel chunks.
pub(crate) fn fold_chunks<T, A, F, M>(
    ctx: &ExecutionContext,
    t: &Tensor<T>,
    fold: F,
    merge: M,
) -> Result<A, TensorError>
where
    T: Element,
    A: Send,
    F: Fn(usize, &[T]) -> A + Send + Sync,
    M: Fn(A, A) -> A + Send + Sync,
{
    ctx.validate()?;
    let src = t.contiguous_with(ctx)?;
    let data = src.storage.read();
    let values = src.contiguous_slice(&data);
    let folded = ctx.reduce(values.len(), |r| fold(r.start, &values[r]), merge)?;
    Ok(folded)
}

fn pick<T: Element>(a: Option<T>, b: Option<T>, take_b: impl Fn(T, T) -> bool) -> Option<T> {
    match (a, b) {
        (Some(x), Some(y)) => Some(if take_b(x, y) { y } else { x }),
        (x, None) => x,
        (None, y) => y,
    }
}

fn empty_reduction() -> TensorError {
    TensorError::Execution("reduction over an empty tensor".to_string())
}

/// Sum of all elements. Integer sums wrap around on overflow.
///
/// With `keep_dims` the result keeps the rank of `t` with every axis of size 1, otherwise
/// it has shape `(1,)`.
///
/// # Example
///
/// ```rust
/// use ferrograd_tensor::{reduce, ExecutionContext, Tensor};
///
/// let t = Tensor::<i32>::range(0, 6, 1).unwrap().reshape(&[2, 3]).unwrap();
/// let s = reduce::sum(&ExecutionContext::serial(), &t, true).unwrap();
/// assert_eq!(s.shape(), &[1, 1]);
/// assert_eq!(s.item().unwrap(), 15);
/// ```
pub fn sum<T: Element>(
    ctx: &ExecutionContext,
    t: &Tensor<T>,
    keep_dims: bool,
) -> Result<Tensor<T>, TensorError> {
    let accel = ctx.acceleration;
    let total = fold_chunks(
        ctx,
        t,
        |_, chunk| sum_kernel(accel, chunk),
        |a, b| a.wrapping_add(b),
    )?;
    reduced(t, total, keep_dims)
}

/// Arithmetic mean of all elements.
///
/// Every element is widened to `f64` before it is added, so integer inputs cannot
/// overflow. The mean is converted back with the truncating [`Element::from_f64`].
///
/// # Example
///
/// ```rust
/// use ferrograd_tensor::{reduce, ExecutionContext, Tensor};
///
/// let t = Tensor::<u8>::from_vec(vec![200, 100], &[2]).unwrap();
/// let m = reduce::mean(&ExecutionContext::serial(), &t, false).unwrap();
/// assert_eq!(m.item().unwrap(), 150);
/// ```
pub fn mean<T: Element>(
    ctx: &ExecutionContext,
    t: &Tensor<T>,
    keep_dims: bool,
) -> Result<Tensor<T>, TensorError> {
    let total = fold_chunks(
        ctx,
        t,
        |_, chunk| chunk.iter().map(|&x| x.to_f64()).sum::<f64>(),
        |a, b| a + b,
    )?;
    reduced(t, T::from_f64(total / t.numel() as f64), keep_dims)
}

/// Largest element.
pub fn max<T: Element>(
    ctx: &ExecutionContext,
    t: &Tensor<T>,
    keep_dims: bool,
) -> Result<Tensor<T>, TensorError> {
    let value = fold_chunks(ctx, t, |_, chunk| max_kernel(chunk), |a, b| {
        pick(a, b, |x, y| y > x)
    })?
    .ok_or_else(empty_reduction)?;
    reduced(t, value, keep_dims)
}

/// Smallest element.
pub fn min<T: Element>(
    ctx: &ExecutionContext,
    t: &Tensor<T>,
    keep_dims: bool,
) -> Result<Tensor<T>, TensorError> {
    let value = fold_chunks(ctx, t, |_, chunk| min_kernel(chunk), |a, b| {
        pick(a, b, |x, y| y < x)
    })?
    .ok_or_else(empty_reduction)?;
    reduced(t, value, keep_dims)
}

/// Row-major position of the largest element. Ties resolve to the first occurrence.
pub fn argmax<T: Element>(ctx: &ExecutionContext, t: &Tensor<T>) -> Result<usize, TensorError> {
    let best = fold_chunks(
        ctx,
        t,
        |start, chunk| argmax_kernel(chunk).map(|i| (start + i, chunk[i])),
        |a, b| match (a, b) {
            (Some((ia, va)), Some((ib, vb))) => {
                if vb > va || (vb == va && ib < ia) {
                    Some((ib, vb))
                } else {
                    Some((ia, va))
                }
            }
            (x, None) => x,
            (None, y) => y,
        },
    )?;
    best.map(|(i, _)| i).ok_or_else(empty_reduction)
}

/// Sums over one axis by adding its slices in order.
///
/// With `keep_dims` the reduced axis stays with size 1. A rank-1 input always reduces to
/// shape `(1,)`.
///
/// # Errors
///
/// Returns [`TensorError::InvalidAxis`] if `axis` is not below the rank.
pub fn sum_along_axis<T: Element>(
    ctx: &ExecutionContext,
    t: &Tensor<T>,
    axis: usize,
    keep_dims: bool,
) -> Result<Tensor<T>, TensorError> {
    if axis >= t.rank() {
        return Err(TensorError::InvalidAxis {
            axis,
            rank: t.rank(),
        });
    }
    if t.rank() == 1 {
        return sum(ctx, t, false);
    }
    let dim = t.shape()[axis];
    let mut acc = t.select(axis, 0)?;
    for i in 1..dim {
        acc = add(ctx, &acc, &t.select(axis, i as isize)?, None)?;
    }
    if dim == 1 {
        // detach from the input buffer
        acc = acc.materialize_with(ctx)?;
    }
    if keep_dims {
        acc = acc.unsqueeze(axis)?;
    }
    Ok(acc)
}

/// Mean over one axis. Same shape rules as [`sum_along_axis`].
///
/// Integer inputs are summed in `f64`, like [`mean`].
pub fn mean_along_axis<T: Element>(
    ctx: &ExecutionContext,
    t: &Tensor<T>,
    axis: usize,
    keep_dims: bool,
) -> Result<Tensor<T>, TensorError> {
    if axis >= t.rank() {
        return Err(TensorError::InvalidAxis {
            axis,
            rank: t.rank(),
        });
    }
    let dim = t.shape()[axis] as f64;
    if T::IS_FLOAT {
        let summed = sum_along_axis(ctx, t, axis, keep_dims)?;
        return unary(ctx, &summed, Some(&summed), move |x| T::from_f64(x.to_f64() / dim));
    }
    let widened: Tensor<f64> = cast(ctx, t)?;
    let summed = sum_along_axis(ctx, &widened, axis, keep_dims)?;
    let means = unary(ctx, &summed, None, move |x| x / dim)?;
    cast(ctx, &means)
}

impl<T: Element> Tensor<T> {
    /// Sum of all elements. See [`sum`].
    pub fn sum(&self, keep_dims: bool) -> Result<Tensor<T>, TensorError> {
        sum(ExecutionContext::global(), self, keep_dims)
    }

    /// Mean of all elements. See [`mean`].
    pub fn mean(&self, keep_dims: bool) -> Result<Tensor<T>, TensorError> {
        mean(ExecutionContext::global(), self, keep_dims)
    }

    /// Largest element. See [`max`].
    pub fn max(&self, keep_dims: bool) -> Result<Tensor<T>, TensorError> {
        max(ExecutionContext::global(), self, keep_dims)
    }

    /// Smallest element. See [`min`].
    pub fn min(&self, keep_dims: bool) -> Result<Tensor<T>, TensorError> {
        min(ExecutionContext::global(), self, keep_dims)
    }

    /// Row-major position of the largest element. See [`argmax`].
    pub fn argmax(&self) -> Result<usize, TensorError> {
        argmax(ExecutionContext::global(), self)
    }

    /// Sum over `axis`. See [`sum_along_axis`].
    pub fn sum_along_axis(&self, axis: usize, keep_dims: bool) -> Result<Tensor<T>, TensorError> {
        sum_along_axis(ExecutionContext::global(), self, axis, keep_dims)
    }

    /// Mean over `axis`. See [`mean_along_axis`].
    pub fn mean_along_axis(&self, axis: usize, keep_dims: bool) -> Result<Tensor<T>, TensorError> {
        mean_along_axis(ExecutionContext::global(), self, axis, keep_dims)
    }
}
