//! Matrix multiplication and quadrant block helpers.

use ferrograd_kernels::ops::{axpy_kernel, gemm_kernel};

use crate::{
    context::ExecutionContext,
    element::Element,
    error::TensorError,
    ops::{add, sub},
    tensor::{read_pair, Tensor},
};

/// Validates a `(m, k) @ (k, n)` product and returns `(m, k, n)`.
fn matmul_dims<T: Element>(
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<(usize, usize, usize), TensorError> {
    if a.rank() != 2 || b.rank() != 2 {
        return Err(TensorError::dimension_mismatch(
            "matmul requires rank-2 operands",
            a.shape(),
            b.shape(),
        ));
    }
    let (m, k) = (a.shape()[0], a.shape()[1]);
    let (k2, n) = (b.shape()[0], b.shape()[1]);
    if k != k2 {
        return Err(TensorError::dimension_mismatch(
            "matmul inner dimensions differ",
            a.shape(),
            b.shape(),
        ));
    }
    Ok((m, k, n))
}

/// Row-major `c = a @ b` over dense slices, one band of `block_size` rows per task.
///
/// The scalar tier walks `block_size` tiles with axpy rows. The accelerated tier hands each
/// band to [`gemm_kernel`], which is `matrixmultiply` for floats.
fn matmul_slices<T: Element>(
    ctx: &ExecutionContext,
    a: &[T],
    b: &[T],
    c: &mut [T],
    (m, k, n): (usize, usize, usize),
) -> Result<(), TensorError> {
    let bs = ctx.block_size;
    let work = m * n * k;
    let accel = ctx.acceleration;

    if !accel.is_vectorized() {
        ctx.for_each_row_mut(c, bs * n, work, |band, rows| {
            let r0 = band * bs;
            let band_rows = rows.len() / n;
            for k0 in (0..k).step_by(bs) {
                let k1 = (k0 + bs).min(k);
                for j0 in (0..n).step_by(bs) {
                    let j1 = (j0 + bs).min(n);
                    for i in 0..band_rows {
                        let a_row = &a[(r0 + i) * k..(r0 + i + 1) * k];
                        let c_tile = &mut rows[i * n + j0..i * n + j1];
                        for kk in k0..k1 {
                            axpy_kernel(accel, a_row[kk], &b[kk * n + j0..kk * n + j1], c_tile)?;
                        }
                    }
                }
            }
            Ok(())
        })
    } else {
        log::trace!("matmul {m}x{k}x{n} on the {accel} tier");
        ctx.for_each_row_mut(c, bs * n, work, |band, rows| {
            let r0 = band * bs;
            let band_rows = rows.len() / n;
            let a_band = &a[r0 * k..(r0 + band_rows) * k];
            gemm_kernel(accel, band_rows, k, n, a_band, b, rows)?;
            Ok(())
        })
    }
}

fn matmul_vec<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<(Vec<T>, usize, usize), TensorError> {
    ctx.validate()?;
    let dims = matmul_dims(a, b)?;
    let (m, _, n) = dims;
    let a = a.contiguous_with(ctx)?;
    let b = b.contiguous_with(ctx)?;
    let mut out = vec![T::zero(); m * n];
    read_pair(&a, &b, |da, db| {
        matmul_slices(
            ctx,
            a.contiguous_slice(da),
            b.contiguous_slice(db),
            &mut out,
            dims,
        )
    })?;
    Ok((out, m, n))
}

/// Matrix product of two rank-2 tensors.
///
/// Operands are made contiguous first. The output is split into bands of
/// [`ExecutionContext::block_size`] rows that run in parallel, and each band is computed in
/// `block_size` square tiles.
///
/// # Errors
///
/// Returns [`TensorError::DimensionMismatch`] unless `a` is `(m, k)` and `b` is `(k, n)`.
///
/// # Example
///
/// ```rust
/// use ferrograd_tensor::{matmul, ExecutionContext, Tensor};
///
/// let a = Tensor::<i32>::range(0, 5, 1).unwrap().reshape(&[1, 5]).unwrap();
/// let b = Tensor::<i32>::range(0, 5, 1).unwrap().reshape(&[5, 1]).unwrap();
/// let c = matmul::matmul(&ExecutionContext::serial(), &a, &b).unwrap();
/// assert_eq!(c.item().unwrap(), 30);
/// ```
pub fn matmul<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<Tensor<T>, TensorError> {
    let (out, m, n) = matmul_vec(ctx, a, b)?;
    Tensor::from_vec(out, &[m, n])
}

/// Matrix product written into `out`, which must have shape `(m, n)`.
pub fn matmul_into<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: &Tensor<T>,
) -> Result<(), TensorError> {
    let (m, _, n) = matmul_dims(a, b)?;
    if out.shape() != [m, n] {
        return Err(TensorError::dimension_mismatch(
            "matmul output has the wrong shape",
            &[m, n],
            out.shape(),
        ));
    }
    let (values, _, _) = matmul_vec(ctx, a, b)?;
    out.set_data(&values)
}

/// Splits a matrix into `[top_left, top_right, bottom_left, bottom_right]` views.
///
/// The split row is `rows / 2` and the split column `cols / 2`, so odd remainders end up
/// in the bottom and right quadrants. The quadrants share storage with `t`.
///
/// # Errors
///
/// Returns [`TensorError::DimensionMismatch`] for anything other than a matrix with at
/// least two rows and two columns.
pub fn split_quadrants<T: Element>(t: &Tensor<T>) -> Result<[Tensor<T>; 4], TensorError> {
    if t.rank() != 2 || t.shape()[0] < 2 || t.shape()[1] < 2 {
        return Err(TensorError::dimension_mismatch(
            "split requires a matrix of at least 2x2",
            &[2, 2],
            t.shape(),
        ));
    }
    let (rows, cols) = (t.shape()[0], t.shape()[1]);
    let (r, c) = (rows / 2, cols / 2);
    let top = t.narrow(0, 0, r)?;
    let bottom = t.narrow(0, r, rows - r)?;
    Ok([
        top.narrow(1, 0, c)?,
        top.narrow(1, c, cols - c)?,
        bottom.narrow(1, 0, c)?,
        bottom.narrow(1, c, cols - c)?,
    ])
}

/// Joins four quadrants into one contiguous matrix. Inverse of [`split_quadrants`].
///
/// # Errors
///
/// Returns [`TensorError::DimensionMismatch`] if a quadrant is not a matrix, or if
/// neighbouring quadrants disagree on their shared edge.
pub fn unite_quadrants<T: Element>(quadrants: &[Tensor<T>; 4]) -> Result<Tensor<T>, TensorError> {
    let [tl, tr, bl, br] = quadrants;
    if quadrants.iter().any(|q| q.rank() != 2) {
        return Err(TensorError::dimension_mismatch(
            "unite requires four matrices",
            &[2],
            &quadrants.iter().map(Tensor::rank).collect::<Vec<_>>(),
        ));
    }
    let edges_match = tl.shape()[0] == tr.shape()[0]
        && bl.shape()[0] == br.shape()[0]
        && tl.shape()[1] == bl.shape()[1]
        && tr.shape()[1] == br.shape()[1];
    if !edges_match {
        return Err(TensorError::dimension_mismatch(
            "quadrant edges do not line up",
            tl.shape(),
            br.shape(),
        ));
    }
    let rows = tl.shape()[0] + bl.shape()[0];
    let cols = tl.shape()[1] + tr.shape()[1];
    let mut out = vec![T::zero(); rows * cols];
    let placements = [
        (tl, 0, 0),
        (tr, 0, tl.shape()[1]),
        (bl, tl.shape()[0], 0),
        (br, tl.shape()[0], tl.shape()[1]),
    ];
    for (q, r0, c0) in placements {
        let width = q.shape()[1];
        for (i, row) in q.to_vec().chunks(width).enumerate() {
            let start = (r0 + i) * cols + c0;
            out[start..start + width].copy_from_slice(row);
        }
    }
    Tensor::from_vec(out, &[rows, cols])
}

/// Divide-and-conquer matrix product.
///
/// Operands larger than [`ExecutionContext::recursion_threshold`] are split into quadrants.
/// When `m`, `k` and `n` are all even and the element type is signed, Strassen's seven
/// products are used, otherwise the eight block products. Independent halves run through
/// `rayon::join`. Results match [`matmul`] exactly for integers and within rounding for
/// floats.
pub fn matmul_recursive<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<Tensor<T>, TensorError> {
    ctx.validate()?;
    matmul_dims(a, b)?;
    let inner = ctx.nested();
    ctx.run(|| recurse(&inner, a, b))?
}

fn recurse<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<Tensor<T>, TensorError> {
    let (m, k, n) = matmul_dims(a, b)?;
    if m.max(k).max(n) <= ctx.recursion_threshold || m.min(k).min(n) < 2 {
        return matmul(ctx, a, b);
    }
    let qa = split_quadrants(a)?;
    let qb = split_quadrants(b)?;
    if T::IS_SIGNED && m % 2 == 0 && k % 2 == 0 && n % 2 == 0 {
        strassen(ctx, &qa, &qb)
    } else {
        classic(ctx, &qa, &qb)
    }
}

fn classic<T: Element>(
    ctx: &ExecutionContext,
    [a11, a12, a21, a22]: &[Tensor<T>; 4],
    [b11, b12, b21, b22]: &[Tensor<T>; 4],
) -> Result<Tensor<T>, TensorError> {
    let block = |x: &Tensor<T>, y: &Tensor<T>, z: &Tensor<T>, w: &Tensor<T>| {
        add(ctx, &recurse(ctx, x, y)?, &recurse(ctx, z, w)?, None)
    };
    let (top, bottom) = ctx.join(
        || ctx.join(|| block(a11, b11, a12, b21), || block(a11, b12, a12, b22)),
        || ctx.join(|| block(a21, b11, a22, b21), || block(a21, b12, a22, b22)),
    );
    unite_quadrants(&[top.0?, top.1?, bottom.0?, bottom.1?])
}

fn strassen<T: Element>(
    ctx: &ExecutionContext,
    [a11, a12, a21, a22]: &[Tensor<T>; 4],
    [b11, b12, b21, b22]: &[Tensor<T>; 4],
) -> Result<Tensor<T>, TensorError> {
    let plus = |x: &Tensor<T>, y: &Tensor<T>| add(ctx, x, y, None);
    let minus = |x: &Tensor<T>, y: &Tensor<T>| sub(ctx, x, y, None);

    let (left, right) = ctx.join(
        || -> Result<_, TensorError> {
            let m1 = recurse(ctx, &plus(a11, a22)?, &plus(b11, b22)?)?;
            let m2 = recurse(ctx, &plus(a21, a22)?, b11)?;
            let m3 = recurse(ctx, a11, &minus(b12, b22)?)?;
            Ok((m1, m2, m3))
        },
        || -> Result<_, TensorError> {
            let m4 = recurse(ctx, a22, &minus(b21, b11)?)?;
            let m5 = recurse(ctx, &plus(a11, a12)?, b22)?;
            let m6 = recurse(ctx, &minus(a21, a11)?, &plus(b11, b12)?)?;
            let m7 = recurse(ctx, &minus(a12, a22)?, &plus(b21, b22)?)?;
            Ok((m4, m5, m6, m7))
        },
    );
    let (m1, m2, m3) = left?;
    let (m4, m5, m6, m7) = right?;

    let c11 = plus(&minus(&plus(&m1, &m4)?, &m5)?, &m7)?;
    let c12 = plus(&m3, &m5)?;
    let c21 = plus(&m2, &m4)?;
    let c22 = plus(&plus(&minus(&m1, &m2)?, &m3)?, &m6)?;
    unite_quadrants(&[c11, c12, c21, c22])
}

impl<T: Element> Tensor<T> {
    /// Matrix product with `other`. See [`matmul()`].
    pub fn matmul(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        matmul(ExecutionContext::global(), self, other)
    }

    /// Matrix product with `other` written into `out`. See [`matmul_into`].
    pub fn matmul_into(&self, other: &Tensor<T>, out: &Tensor<T>) -> Result<(), TensorError> {
        matmul_into(ExecutionContext::global(), self, other, out)
    }

    /// Divide-and-conquer matrix product. See [`matmul_recursive`].
    pub fn matmul_recursive(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        matmul_recursive(ExecutionContext::global(), self, other)
    }

    /// Splits the matrix into four quadrant views. See [`split_quadrants`].
    pub fn split_quadrants(&self) -> Result<[Tensor<T>; 4], TensorError> {
        split_quadrants(self)
    }

    /// Joins four quadrants into one matrix. See [`unite_quadrants`].
    pub fn unite_quadrants(quadrants: &[Tensor<T>; 4]) -> Result<Tensor<T>, TensorError> {
        unite_quadrants(quadrants)
    }
}
