//! Pure functions over shapes, strides and dimension orders.

use crate::error::TensorError;

/// Checks that a shape is non-empty and has no zero-sized dimension.
pub fn validate_shape(shape: &[usize]) -> Result<(), TensorError> {
    if shape.is_empty() {
        return Err(TensorError::EmptyShape);
    }
    if let Some(axis) = shape.iter().position(|&d| d == 0) {
        return Err(TensorError::ZeroSizedDimension {
            axis,
            shape: shape.to_vec(),
        });
    }
    Ok(())
}

/// Total number of elements described by a shape.
#[inline]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Computes row-major strides for a shape, the last dimension being the fastest.
///
/// # Example
///
/// ```rust
/// use ferrograd_tensor::shape::compute_strides;
///
/// assert_eq!(compute_strides(&[2, 3, 4]), vec![12, 4, 1]);
/// assert_eq!(compute_strides(&[5]), vec![1]);
/// ```
pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1;
    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

/// The identity dimension order `[0, 1, .., rank - 1]` of a freshly created tensor.
pub fn init_dim_order(rank: usize) -> Vec<usize> {
    (0..rank).collect()
}

/// Returns true if no axis has been reordered, i.e. the dimension order is non-decreasing.
pub fn is_contiguous(dim_order: &[usize]) -> bool {
    dim_order.windows(2).all(|w| w[0] <= w[1])
}

/// Returns true if the strides describe a dense row-major block for `shape`.
///
/// Size-1 axes are skipped since their stride is never used to address memory.
pub fn is_standard_layout(shape: &[usize], strides: &[usize]) -> bool {
    let mut expected = 1;
    for (&dim, &stride) in shape.iter().rev().zip(strides.iter().rev()) {
        if dim == 1 {
            continue;
        }
        if stride != expected {
            return false;
        }
        expected *= dim;
    }
    true
}

/// Checks whether two shapes can be broadcast together.
///
/// Shapes are aligned on their trailing dimension and every pair of sizes must be equal or
/// contain a 1. Missing leading dimensions of the shorter shape count as 1.
pub fn are_broadcastable(a: &[usize], b: &[usize]) -> bool {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .all(|(&x, &y)| x == y || x == 1 || y == 1)
}

/// Computes the shape resulting from broadcasting `a` against `b`.
///
/// # Errors
///
/// Returns [`TensorError::NotBroadcastable`] if the shapes are incompatible.
///
/// # Example
///
/// ```rust
/// use ferrograd_tensor::shape::broadcast_shapes;
///
/// assert_eq!(broadcast_shapes(&[3, 2], &[3, 3, 2]).unwrap(), vec![3, 3, 2]);
/// assert_eq!(broadcast_shapes(&[1, 1], &[6]).unwrap(), vec![1, 6]);
/// assert!(broadcast_shapes(&[2, 3], &[4]).is_err());
/// ```
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>, TensorError> {
    if !are_broadcastable(a, b) {
        return Err(TensorError::not_broadcastable(a, b));
    }
    let rank = a.len().max(b.len());
    let dim_at = |s: &[usize], i: usize| {
        let pad = rank - s.len();
        if i < pad {
            1
        } else {
            s[i - pad]
        }
    };
    Ok((0..rank).map(|i| dim_at(a, i).max(dim_at(b, i))).collect())
}

/// Returns true if the shape holds exactly one element.
#[inline]
pub fn is_scalar_like(shape: &[usize]) -> bool {
    shape.iter().all(|&d| d == 1)
}

/// Checks that `axes` is a permutation of `0..rank`.
pub fn validate_permutation(axes: &[usize], rank: usize) -> Result<(), TensorError> {
    let mut seen = vec![false; rank];
    if axes.len() != rank {
        return Err(TensorError::InvalidPermutation(axes.to_vec()));
    }
    for &axis in axes {
        if axis >= rank || seen[axis] {
            return Err(TensorError::InvalidPermutation(axes.to_vec()));
        }
        seen[axis] = true;
    }
    Ok(())
}
