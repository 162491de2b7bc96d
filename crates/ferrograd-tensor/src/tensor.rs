use ferrograd_kernels::ops::transpose_2d_kernel;

use crate::{
    context::ExecutionContext,
    element::{DType, Element},
    error::TensorError,
    iter::{IndexIter, StridedOffsets},
    shape::{
        broadcast_shapes, compute_strides, init_dim_order, is_contiguous, is_scalar_like,
        is_standard_layout, numel, validate_permutation, validate_shape,
    },
    storage::TensorStorage,
};

/// A typed, shaped, strided view over a shared flat buffer.
///
/// A `Tensor` is the tuple `(storage, shape, strides, dim_order, offset)`. Cloning a tensor
/// yields another view over the same storage; use [`Tensor::copy`] for an independent
/// buffer. View operations ([`Tensor::permute`], [`Tensor::broadcast_to`], partial
/// [`Tensor::index`], ...) share the storage as well, so a write through any view is
/// observed by every other view of that buffer.
///
/// # Example
///
/// ```rust
/// use ferrograd_tensor::{Tensor, TensorError};
///
/// let t = Tensor::from_vec(vec![0, 1, 2, 3, 4, 5], &[2, 3])?;
/// let tt = t.transpose()?;
/// assert_eq!(tt.shape(), &[3, 2]);
/// assert_eq!(tt.to_vec(), vec![0, 3, 1, 4, 2, 5]);
/// assert!(tt.shares_storage_with(&t));
/// # Ok::<(), TensorError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Tensor<T: Element> {
    pub(crate) storage: TensorStorage<T>,
    pub(crate) shape: Vec<usize>,
    pub(crate) strides: Vec<usize>,
    pub(crate) dim_order: Vec<usize>,
    pub(crate) offset: usize,
}

impl<T: Element> Tensor<T> {
    pub(crate) fn from_parts(
        storage: TensorStorage<T>,
        shape: Vec<usize>,
        strides: Vec<usize>,
        dim_order: Vec<usize>,
        offset: usize,
    ) -> Self {
        Self {
            storage,
            shape,
            strides,
            dim_order,
            offset,
        }
    }

    fn from_storage(storage: TensorStorage<T>, shape: &[usize]) -> Self {
        Self::from_parts(
            storage,
            shape.to_vec(),
            compute_strides(shape),
            init_dim_order(shape.len()),
            0,
        )
    }

    /// Creates a tensor taking ownership of `data`, which is laid out row-major.
    ///
    /// # Errors
    ///
    /// Fails if the shape is empty, has a zero dimension, or does not match `data.len()`.
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self, TensorError> {
        validate_shape(shape)?;
        let expected = numel(shape);
        if expected != data.len() {
            return Err(TensorError::invalid_shape(expected, data.len()));
        }
        Ok(Self::from_storage(TensorStorage::from_vec(data), shape))
    }

    /// Creates a tensor copying `data`.
    pub fn from_slice(data: &[T], shape: &[usize]) -> Result<Self, TensorError> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Creates a tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: T) -> Result<Self, TensorError> {
        validate_shape(shape)?;
        let data = vec![value; numel(shape)];
        Ok(Self::from_storage(TensorStorage::from_uniform_vec(data), shape))
    }

    /// Creates a zero-filled tensor.
    pub fn zeros(shape: &[usize]) -> Result<Self, TensorError> {
        Self::full(shape, T::zero())
    }

    /// Creates a tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Result<Self, TensorError> {
        Self::full(shape, T::one())
    }

    /// Creates a single-element tensor of shape `(1,)`.
    pub fn scalar(value: T) -> Self {
        Self::from_storage(TensorStorage::from_uniform_vec(vec![value]), &[1])
    }

    /// Creates a tensor by calling `f` with every multi-index in row-major order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ferrograd_tensor::Tensor;
    ///
    /// let t = Tensor::<i32>::from_fn(&[2, 2], |idx| (idx[0] * 2 + idx[1]) as i32).unwrap();
    /// assert_eq!(t.to_vec(), vec![0, 1, 2, 3]);
    /// ```
    pub fn from_fn<F>(shape: &[usize], f: F) -> Result<Self, TensorError>
    where
        F: Fn(&[usize]) -> T,
    {
        validate_shape(shape)?;
        let mut walker = IndexIter::new(shape);
        let mut data = Vec::with_capacity(walker.remaining());
        while let Some((_, index)) = walker.advance() {
            data.push(f(index));
        }
        Ok(Self::from_storage(TensorStorage::from_vec(data), shape))
    }

    /// Creates a rank-1 tensor holding `start, start + step, ...` up to `end` (exclusive).
    ///
    /// Negative steps count down.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidRange`] if `step` is zero or the range is empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ferrograd_tensor::Tensor;
    ///
    /// assert_eq!(Tensor::range(0, 8, 3).unwrap().to_vec(), vec![0, 3, 6]);
    /// assert_eq!(Tensor::range(3.0, 0.0, -1.5).unwrap().to_vec(), vec![3.0, 1.5]);
    /// ```
    pub fn range(start: T, end: T, step: T) -> Result<Self, TensorError> {
        let (s, e, st) = (start.to_f64(), end.to_f64(), step.to_f64());
        let invalid = || TensorError::InvalidRange {
            start: s,
            end: e,
            step: st,
        };
        if st == 0.0 || !st.is_finite() {
            return Err(invalid());
        }
        let count = ((e - s) / st).ceil();
        if count.is_nan() || count < 1.0 {
            return Err(invalid());
        }
        let count = count as usize;
        let data = (0..count)
            .map(|i| start.wrapping_add(T::from_f64(i as f64).wrapping_mul(step)))
            .collect::<Vec<_>>();
        Self::from_vec(data, &[count])
    }

    /// Creates a `rows x cols` matrix with ones on the main diagonal.
    pub fn eye(rows: usize, cols: usize) -> Result<Self, TensorError> {
        Self::from_fn(&[rows, cols], |idx| {
            if idx[0] == idx[1] {
                T::one()
            } else {
                T::zero()
            }
        })
    }

    /// Places the `n` elements of this tensor on the diagonal of an `n x n` matrix.
    pub fn diag_flat(&self) -> Result<Self, TensorError> {
        let values = self.to_vec();
        let n = values.len();
        let mut data = vec![T::zero(); n * n];
        for (i, v) in values.into_iter().enumerate() {
            data[i * n + i] = v;
        }
        Self::from_vec(data, &[n, n])
    }

    /// The size of every axis.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Per-axis element steps in the backing buffer.
    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Which creation-time axis each logical axis maps to.
    #[inline]
    pub fn dim_order(&self) -> &[usize] {
        &self.dim_order
    }

    /// Position of the first element in the backing buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of axes.
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of logical elements.
    #[inline]
    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// Runtime tag of the element type.
    #[inline]
    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// The shared buffer behind this view.
    #[inline]
    pub fn storage(&self) -> &TensorStorage<T> {
        &self.storage
    }

    /// Returns true if both tensors are views over the same buffer.
    pub fn shares_storage_with(&self, other: &Tensor<T>) -> bool {
        self.storage.ptr_eq(&other.storage)
    }

    /// Returns true if the tensor holds a single element.
    #[inline]
    pub fn is_scalar_like(&self) -> bool {
        is_scalar_like(&self.shape)
    }

    /// Returns true if the view is a dense row-major block of its buffer.
    ///
    /// Requires both an untouched dimension order and standard strides, so transposed and
    /// broadcast views are never contiguous.
    pub fn is_contiguous(&self) -> bool {
        is_contiguous(&self.dim_order) && is_standard_layout(&self.shape, &self.strides)
    }

    pub(crate) fn offsets(&self) -> StridedOffsets<'_> {
        StridedOffsets::new(&self.shape, &self.strides, self.offset)
    }

    pub(crate) fn offsets_from(&self, start: usize) -> StridedOffsets<'_> {
        StridedOffsets::starting_at(&self.shape, &self.strides, self.offset, start)
    }

    /// The logical elements of a contiguous view inside a read guard of its storage.
    pub(crate) fn contiguous_slice<'a>(&self, data: &'a [T]) -> &'a [T] {
        &data[self.offset..self.offset + self.numel()]
    }

    /// Copies the logical elements into a new vector in row-major order.
    pub fn to_vec(&self) -> Vec<T> {
        let data = self.storage.read();
        if self.is_contiguous() {
            return self.contiguous_slice(&data).to_vec();
        }
        self.offsets().map(|o| data[o]).collect()
    }

    /// Returns the value of a single-element tensor.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::NotScalar`] if the tensor has more than one element.
    pub fn item(&self) -> Result<T, TensorError> {
        if !self.is_scalar_like() {
            return Err(TensorError::NotScalar {
                numel: self.numel(),
            });
        }
        Ok(self.storage.read()[self.offset])
    }

    /// Calls `f` with the logical elements as one flat row-major slice.
    ///
    /// Non-contiguous views are gathered into a temporary buffer first.
    pub fn with_data<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        if self.is_contiguous() {
            let data = self.storage.read();
            return f(self.contiguous_slice(&data));
        }
        let values = self.to_vec();
        f(&values)
    }

    /// Calls `f` with mutable access to the logical elements as one flat row-major slice.
    ///
    /// This hands out the flat buffer, so the storage stops being treated as uniform.
    /// Non-contiguous views are gathered first and scattered back afterwards.
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        let mut data = self.storage.write();
        if self.is_contiguous() {
            let range = self.offset..self.offset + self.numel();
            return f(&mut data[range]);
        }
        let offsets: Vec<usize> = self.offsets().collect();
        let mut values: Vec<T> = offsets.iter().map(|&o| data[o]).collect();
        let result = f(&mut values);
        for (o, v) in offsets.into_iter().zip(values) {
            data[o] = v;
        }
        result
    }

    /// Reorders the axes. Shares storage, no data is moved.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidPermutation`] if `axes` is not a permutation of
    /// `0..rank`.
    pub fn permute(&self, axes: &[usize]) -> Result<Self, TensorError> {
        validate_permutation(axes, self.rank())?;
        Ok(Self::from_parts(
            self.storage.clone(),
            axes.iter().map(|&a| self.shape[a]).collect(),
            axes.iter().map(|&a| self.strides[a]).collect(),
            axes.iter().map(|&a| self.dim_order[a]).collect(),
            self.offset,
        ))
    }

    /// Reverses the order of all axes. Shares storage.
    pub fn transpose(&self) -> Result<Self, TensorError> {
        let axes: Vec<usize> = (0..self.rank()).rev().collect();
        self.permute(&axes)
    }

    /// Reinterprets the elements with a new shape of equal element count.
    ///
    /// Contiguous views are reshaped in O(1); other views are materialized first.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self, TensorError> {
        self.reshape_with(ExecutionContext::global(), shape)
    }

    pub(crate) fn reshape_with(
        &self,
        ctx: &ExecutionContext,
        shape: &[usize],
    ) -> Result<Self, TensorError> {
        validate_shape(shape)?;
        if numel(shape) != self.numel() {
            return Err(TensorError::invalid_shape(self.numel(), numel(shape)));
        }
        let base = self.contiguous_with(ctx)?;
        Ok(Self::from_parts(
            base.storage,
            shape.to_vec(),
            compute_strides(shape),
            init_dim_order(shape.len()),
            base.offset,
        ))
    }

    /// Reshapes into a rank-1 tensor.
    pub fn flatten(&self) -> Result<Self, TensorError> {
        self.reshape(&[self.numel()])
    }

    /// Inserts a size-1 axis at position `axis` (`0..=rank`).
    pub fn unsqueeze(&self, axis: usize) -> Result<Self, TensorError> {
        if axis > self.rank() {
            return Err(TensorError::InvalidAxis {
                axis,
                rank: self.rank(),
            });
        }
        let mut shape = self.shape.clone();
        shape.insert(axis, 1);
        self.reshape(&shape)
    }

    /// Removes every size-1 axis. A fully size-1 tensor becomes shape `(1,)`.
    pub fn squeeze(&self) -> Result<Self, TensorError> {
        let mut shape: Vec<usize> = self.shape.iter().copied().filter(|&d| d != 1).collect();
        if shape.is_empty() {
            shape.push(1);
        }
        self.reshape(&shape)
    }

    /// Broadcasts the view against `target`.
    ///
    /// The result shape is the broadcast of both shapes, so `(1, 1)` against `(6,)` yields
    /// `(1, 6)`. Expanded and prepended axes get stride 0; no data is copied.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::NotBroadcastable`] for incompatible shapes.
    pub fn broadcast_to(&self, target: &[usize]) -> Result<Self, TensorError> {
        let shape = broadcast_shapes(&self.shape, target)?;
        if shape == self.shape {
            return Ok(self.clone());
        }
        let pad = shape.len() - self.rank();
        let strides = (0..shape.len())
            .map(|i| {
                if i < pad || self.shape[i - pad] != shape[i] {
                    0
                } else {
                    self.strides[i - pad]
                }
            })
            .collect();
        let dim_order = (0..pad)
            .chain(self.dim_order.iter().map(|&d| d + pad))
            .collect();
        Ok(Self::from_parts(
            self.storage.clone(),
            shape,
            strides,
            dim_order,
            self.offset,
        ))
    }

    /// Returns this view if it is contiguous, otherwise a contiguous copy.
    ///
    /// Applying it to its own result returns the same buffer again.
    pub fn as_contiguous(&self) -> Result<Self, TensorError> {
        self.contiguous_with(ExecutionContext::global())
    }

    /// Copies the elements into a new, unshared, contiguous buffer.
    pub fn copy(&self) -> Result<Self, TensorError> {
        self.materialize_with(ExecutionContext::global())
    }

    pub(crate) fn contiguous_with(&self, ctx: &ExecutionContext) -> Result<Self, TensorError> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        log::trace!("materializing non-contiguous view of shape {:?}", self.shape);
        self.materialize_with(ctx)
    }

    pub(crate) fn materialize_with(&self, ctx: &ExecutionContext) -> Result<Self, TensorError> {
        let n = self.numel();
        let src = self.storage.read();
        let mut out = Vec::with_capacity(n);
        if self.is_contiguous() {
            out.extend_from_slice(self.contiguous_slice(&src));
        } else if self.rank() == 2 && self.strides == [1, self.shape[0]] {
            // plain transpose of a dense (cols, rows) block
            let (rows, cols) = (self.shape[0], self.shape[1]);
            out.resize(n, T::zero());
            transpose_2d_kernel(&src[self.offset..self.offset + n], cols, rows, &mut out)?;
        } else {
            out.resize(n, T::zero());
            let data: &[T] = &src;
            ctx.for_each_chunk_mut(&mut out, |start, chunk| {
                chunk
                    .iter_mut()
                    .zip(self.offsets_from(start))
                    .for_each(|(o, off)| *o = data[off]);
                Ok(())
            })?;
        }
        drop(src);
        Ok(Self::from_storage(TensorStorage::from_vec(out), &self.shape))
    }

    /// Writes `value` at a full multi-index. Negative indices count from the end.
    pub fn set(&self, indices: &[isize], value: T) -> Result<(), TensorError> {
        if indices.len() < self.rank() {
            return Err(TensorError::MissingIndices {
                expected: self.rank(),
                got: indices.len(),
            });
        }
        let pos = self.flat_index(indices)?;
        self.storage.write()[pos] = value;
        Ok(())
    }

    /// Sets every element of the view to `value`.
    pub fn fill(&self, value: T) {
        let mut data = self.storage.write();
        let covers_buffer =
            self.is_contiguous() && self.offset == 0 && self.numel() == data.len();
        if self.is_contiguous() {
            let range = self.offset..self.offset + self.numel();
            data[range].iter_mut().for_each(|v| *v = value);
        } else {
            for o in self.offsets() {
                data[o] = value;
            }
        }
        if covers_buffer {
            self.storage.mark_uniform(&data);
        }
    }

    /// Overwrites the view's elements, in row-major order, with `values`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidShape`] if `values.len()` differs from the element count.
    pub fn set_data(&self, values: &[T]) -> Result<(), TensorError> {
        if values.len() != self.numel() {
            return Err(TensorError::invalid_shape(self.numel(), values.len()));
        }
        let mut data = self.storage.write();
        if self.is_contiguous() {
            let range = self.offset..self.offset + self.numel();
            data[range].copy_from_slice(values);
        } else {
            for (o, &v) in self.offsets().zip(values) {
                data[o] = v;
            }
        }
        Ok(())
    }

    /// Copies the elements of `src`, which must have the same shape, into this view.
    pub fn assign(&self, src: &Tensor<T>) -> Result<(), TensorError> {
        if src.shape != self.shape {
            return Err(TensorError::dimension_mismatch(
                "assign requires equal shapes",
                &self.shape,
                &src.shape,
            ));
        }
        // gather first so that overlapping views are read before being written
        let values = src.to_vec();
        self.set_data(&values)
    }

    /// Returns true if both tensors have the same shape and identical elements.
    pub fn is_equal(&self, other: &Tensor<T>) -> bool {
        if self.shape != other.shape {
            return false;
        }
        read_pair(self, other, |a, b| {
            self.offsets()
                .zip(other.offsets())
                .all(|(x, y)| a[x] == b[y])
        })
    }

    /// Returns true if every element is within `tol` of the matching element of `other`.
    ///
    /// `other` may also be a single-element tensor, compared against every element.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::DimensionMismatch`] if `other` is neither scalar-like nor of
    /// the same shape.
    pub fn is_all_close(&self, other: &Tensor<T>, tol: f64) -> Result<bool, TensorError> {
        let close = |x: T, y: T| (x.to_f64() - y.to_f64()).abs() <= tol;
        if other.is_scalar_like() {
            let y = other.item()?;
            let data = self.storage.read();
            return Ok(self.offsets().all(|o| close(data[o], y)));
        }
        if self.shape != other.shape {
            return Err(TensorError::dimension_mismatch(
                "is_all_close requires equal shapes or a scalar",
                &self.shape,
                &other.shape,
            ));
        }
        Ok(read_pair(self, other, |a, b| {
            self.offsets()
                .zip(other.offsets())
                .all(|(x, y)| close(a[x], b[y]))
        }))
    }

    /// Returns true if any element is NaN.
    pub fn has_nan(&self) -> bool {
        if !T::IS_FLOAT {
            return false;
        }
        let data = self.storage.read();
        self.offsets().any(|o| data[o].is_nan())
    }
}

/// Runs `f` with read access to the buffers of `a` and `b`.
///
/// A single guard is taken when both share a buffer.
pub(crate) fn read_pair<T: Element, R>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    f: impl FnOnce(&[T], &[T]) -> R,
) -> R {
    let ga = a.storage.read();
    if a.storage.ptr_eq(&b.storage) {
        return f(&ga, &ga);
    }
    let gb = b.storage.read();
    f(&ga, &gb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_checks() {
        assert_eq!(
            Tensor::<f32>::zeros(&[2, 0]).err(),
            Some(TensorError::ZeroSizedDimension {
                axis: 1,
                shape: vec![2, 0]
            })
        );
        assert_eq!(
            Tensor::from_vec(vec![1, 2, 3], &[2, 2]).err(),
            Some(TensorError::invalid_shape(4, 3))
        );
        assert_eq!(
            Tensor::<i32>::from_vec(vec![], &[]).err(),
            Some(TensorError::EmptyShape)
        );
    }

    #[test]
    fn constructor_full() -> Result<(), TensorError> {
        let t = Tensor::full(&[2, 3], 7u8)?;
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.strides(), &[3, 1]);
        assert_eq!(t.dim_order(), &[0, 1]);
        assert_eq!(t.to_vec(), vec![7; 6]);
        assert!(t.storage().is_uniform());
        assert_eq!(t.dtype(), DType::U8);
        Ok(())
    }

    #[test]
    fn range_and_eye() -> Result<(), TensorError> {
        assert_eq!(Tensor::range(0, 5, 1)?.to_vec(), vec![0, 1, 2, 3, 4]);
        assert_eq!(Tensor::range(5i64, 0, -2)?.to_vec(), vec![5, 3, 1]);
        assert!(matches!(
            Tensor::range(0, 5, 0),
            Err(TensorError::InvalidRange { .. })
        ));
        assert!(Tensor::range(5, 0, 1).is_err());
        assert_eq!(
            Tensor::<i32>::eye(2, 3)?.to_vec(),
            vec![1, 0, 0, 0, 1, 0]
        );
        let d = Tensor::from_vec(vec![1, 2, 3], &[3])?.diag_flat()?;
        assert_eq!(d.shape(), &[3, 3]);
        assert_eq!(d.to_vec(), vec![1, 0, 0, 0, 2, 0, 0, 0, 3]);
        Ok(())
    }

    #[test]
    fn transpose_is_a_view() -> Result<(), TensorError> {
        let t = Tensor::range(0, 6, 1)?.reshape(&[2, 3])?;
        let tt = t.transpose()?;
        assert_eq!(tt.strides(), &[1, 3]);
        assert_eq!(tt.dim_order(), &[1, 0]);
        assert!(!tt.is_contiguous());
        assert!(tt.shares_storage_with(&t));
        assert_eq!(tt.to_vec(), vec![0, 3, 1, 4, 2, 5]);
        let back = tt.transpose()?;
        assert!(back.is_contiguous());
        assert_eq!(back.strides(), t.strides());
        Ok(())
    }

    #[test]
    fn permute_rejects_bad_axes() -> Result<(), TensorError> {
        let t = Tensor::<f32>::zeros(&[2, 3, 4])?;
        assert_eq!(
            t.permute(&[0, 0, 1]).err(),
            Some(TensorError::InvalidPermutation(vec![0, 0, 1]))
        );
        assert_eq!(t.permute(&[2, 0, 1])?.shape(), &[4, 2, 3]);
        Ok(())
    }

    #[test]
    fn reshape_contiguous_and_not() -> Result<(), TensorError> {
        let t = Tensor::range(0, 6, 1)?;
        let r = t.reshape(&[3, 2])?;
        assert!(r.shares_storage_with(&t));
        let rt = r.transpose()?.reshape(&[6])?;
        assert!(!rt.shares_storage_with(&t));
        assert_eq!(rt.to_vec(), vec![0, 2, 4, 1, 3, 5]);
        assert_eq!(
            t.reshape(&[4]).err(),
            Some(TensorError::invalid_shape(6, 4))
        );
        Ok(())
    }

    #[test]
    fn flatten_squeeze_unsqueeze() -> Result<(), TensorError> {
        let t = Tensor::<i32>::zeros(&[3, 1, 3, 1, 1])?;
        assert_eq!(t.flatten()?.shape(), &[9]);
        assert_eq!(t.squeeze()?.shape(), &[3, 3]);
        assert_eq!(Tensor::scalar(1.0f32).squeeze()?.shape(), &[1]);
        assert_eq!(t.squeeze()?.unsqueeze(2)?.shape(), &[3, 3, 1]);
        assert_eq!(
            t.unsqueeze(6).err(),
            Some(TensorError::InvalidAxis { axis: 6, rank: 5 })
        );
        Ok(())
    }

    #[test]
    fn broadcast_to_shapes() -> Result<(), TensorError> {
        let t = Tensor::range(0, 6, 1)?.reshape(&[3, 2])?;
        let b = t.broadcast_to(&[3, 3, 2])?;
        assert_eq!(b.shape(), &[3, 3, 2]);
        assert_eq!(b.strides(), &[0, 2, 1]);
        assert!(!b.is_contiguous());
        assert_eq!(&b.to_vec()[6..12], &[0, 1, 2, 3, 4, 5]);

        let ones = Tensor::<f32>::ones(&[1, 1])?;
        assert_eq!(ones.broadcast_to(&[6])?.shape(), &[1, 6]);
        assert_eq!(Tensor::scalar(2).broadcast_to(&[3])?.to_vec(), vec![2, 2, 2]);
        assert!(t.broadcast_to(&[3]).is_err());
        Ok(())
    }

    #[test]
    fn as_contiguous_is_idempotent() -> Result<(), TensorError> {
        let t = Tensor::range(0, 24, 1)?.reshape(&[2, 3, 4])?;
        let p = t.permute(&[2, 0, 1])?;
        let once = p.as_contiguous()?;
        let twice = once.as_contiguous()?;
        assert!(once.is_contiguous());
        assert!(twice.shares_storage_with(&once));
        assert_eq!(once.to_vec(), p.to_vec());
        Ok(())
    }

    #[test]
    fn materialize_rank2_transpose() -> Result<(), TensorError> {
        let t = Tensor::range(0, 12, 1)?.reshape(&[3, 4])?;
        let c = t.transpose()?.copy()?;
        assert_eq!(c.shape(), &[4, 3]);
        assert_eq!(c.to_vec(), vec![0, 4, 8, 1, 5, 9, 2, 6, 10, 3, 7, 11]);
        Ok(())
    }

    #[test]
    fn mutation_is_visible_through_views() -> Result<(), TensorError> {
        let t = Tensor::<i32>::zeros(&[2, 2])?;
        let view = t.transpose()?;
        t.set(&[0, 1], 5)?;
        assert_eq!(view.to_vec(), vec![0, 0, 5, 0]);
        view.set(&[0, -1], 9)?;
        assert_eq!(t.to_vec(), vec![0, 5, 9, 0]);
        assert!(matches!(
            t.set(&[0], 1),
            Err(TensorError::MissingIndices { .. })
        ));
        Ok(())
    }

    #[test]
    fn fill_and_uniform_flag() -> Result<(), TensorError> {
        let t = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], &[2, 2])?;
        assert!(!t.storage().is_uniform());
        t.fill(0.5);
        assert!(t.storage().is_uniform());
        t.with_data_mut(|d| d[0] = 1.0);
        assert!(!t.storage().is_uniform());
        t.transpose()?.fill(2.0);
        assert_eq!(t.to_vec(), vec![2.0; 4]);
        Ok(())
    }

    #[test]
    fn uniform_flag_survives_racing_writers() -> Result<(), TensorError> {
        let t = Tensor::<i32>::zeros(&[64])?;
        for round in 0..200 {
            std::thread::scope(|s| {
                s.spawn(|| t.fill(round));
                s.spawn(|| t.set(&[0], -1));
            });
            // whichever writer ran last, the flag must never vouch for unequal values
            if t.storage().is_uniform() {
                let values = t.to_vec();
                assert!(values.iter().all(|&v| v == values[0]), "round {round}");
            }
        }
        Ok(())
    }

    #[test]
    fn set_data_and_assign() -> Result<(), TensorError> {
        let t = Tensor::<i64>::zeros(&[2, 2])?;
        t.transpose()?.set_data(&[1, 2, 3, 4])?;
        assert_eq!(t.to_vec(), vec![1, 3, 2, 4]);
        assert_eq!(
            t.set_data(&[1]).err(),
            Some(TensorError::invalid_shape(4, 1))
        );
        // assigning a tensor onto its own transpose reads before writing
        t.assign(&t.transpose()?)?;
        assert_eq!(t.to_vec(), vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn predicates() -> Result<(), TensorError> {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3])?;
        let b = Tensor::from_vec(vec![1.0, 2.05, 3.0], &[3])?;
        assert!(a.is_equal(&a.copy()?));
        assert!(!a.is_equal(&b));
        assert!(a.is_all_close(&b, 0.1)?);
        assert!(!a.is_all_close(&b, 0.01)?);
        assert!(Tensor::full(&[2, 2], 3.0)?.is_all_close(&Tensor::scalar(3.0), 1e-9)?);
        assert!(a.is_all_close(&Tensor::zeros(&[2])?, 0.1).is_err());
        assert!(!a.has_nan());
        assert!(Tensor::from_vec(vec![1.0, f64::NAN], &[2])?.has_nan());
        Ok(())
    }

    #[test]
    fn item_requires_scalar() -> Result<(), TensorError> {
        assert_eq!(Tensor::scalar(4u8).item()?, 4);
        assert_eq!(
            Tensor::<u8>::zeros(&[2])?.item().err(),
            Some(TensorError::NotScalar { numel: 2 })
        );
        Ok(())
    }

    #[test]
    fn with_data_gathers_views() -> Result<(), TensorError> {
        let t = Tensor::range(0, 6, 1)?.reshape(&[2, 3])?;
        let sum = t.transpose()?.with_data(|d| {
            assert_eq!(d, &[0, 3, 1, 4, 2, 5]);
            d.iter().sum::<i32>()
        });
        assert_eq!(sum, 15);
        t.transpose()?.with_data_mut(|d| d[1] = 30);
        assert_eq!(t.to_vec(), vec![0, 1, 2, 30, 4, 5]);
        Ok(())
    }
}
