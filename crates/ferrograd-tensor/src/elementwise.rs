//! Broadcasting-aware dispatch of elementwise operations.
//!
//! Binary operations pick the first matching path:
//!
//! 1. both operands hold a single element: one call of `op`
//! 2. both operands already have the result's element count: a pairwise loop, or an O(1)
//!    fill when both buffers are flagged uniform
//! 3. one operand holds a single element: a loop over the other one with the scalar
//!    folded in, keeping the operand order
//! 4. anything else: both operands are broadcast to the result shape with stride-0 views
//!    and walked through their strides
//!
//! Loops over contiguous operands go through the slice kernels of `ferrograd-kernels`,
//! every other loop walks the strides. The arithmetic operators carry a [`BinaryOp`] tag
//! so their contiguous loops can take the vectorized kernels; other closures run the
//! portable ones. Results are computed into a fresh buffer and copied
//! into the caller's `out` tensor afterwards, so `out` may alias an operand.

use ferrograd_kernels::{
    ops::{
        binary_kernel, binary_op_kernel, binary_op_scalar_lhs_kernel,
        binary_op_scalar_rhs_kernel, binary_scalar_lhs_kernel, binary_scalar_rhs_kernel,
        unary_kernel,
    },
    BinaryOp, KernelError,
};

use crate::{
    context::ExecutionContext,
    element::Element,
    error::TensorError,
    shape::{broadcast_shapes, numel},
    tensor::{read_pair, Tensor},
};

fn check_out<T: Element>(out: Option<&Tensor<T>>, shape: &[usize]) -> Result<(), TensorError> {
    match out {
        Some(o) if o.shape() != shape => Err(TensorError::dimension_mismatch(
            "output tensor has the wrong shape",
            shape,
            o.shape(),
        )),
        _ => Ok(()),
    }
}

fn finish<T: Element>(result: Tensor<T>, out: Option<&Tensor<T>>) -> Result<Tensor<T>, TensorError> {
    match out {
        Some(o) => {
            o.assign(&result)?;
            Ok(o.clone())
        }
        None => Ok(result),
    }
}

/// First logical element, which is also every element of a uniform buffer.
fn first<T: Element>(t: &Tensor<T>) -> T {
    t.storage.read()[t.offset]
}

fn run_pair<T, F>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    da: &[T],
    b: &Tensor<T>,
    db: &[T],
    kind: Option<BinaryOp>,
    op: &F,
) -> Result<Vec<T>, TensorError>
where
    T: Element,
    F: Fn(T, T) -> T + Send + Sync,
{
    let mut out = vec![T::zero(); a.numel()];
    let accel = ctx.acceleration;
    if a.is_contiguous() && b.is_contiguous() {
        let (sa, sb) = (a.contiguous_slice(da), b.contiguous_slice(db));
        ctx.for_each_chunk_mut(&mut out, |start, chunk| {
            let end = start + chunk.len();
            let (xa, xb) = (&sa[start..end], &sb[start..end]);
            match kind {
                Some(kind) => binary_op_kernel(accel, kind, xa, xb, chunk)?,
                None => binary_kernel(xa, xb, chunk, op)?,
            }
            Ok(())
        })?;
    } else {
        log::trace!(
            "strided elementwise path for shapes {:?} and {:?}",
            a.shape(),
            b.shape()
        );
        ctx.for_each_chunk_mut(&mut out, |start, chunk| {
            chunk
                .iter_mut()
                .zip(a.offsets_from(start).zip(b.offsets_from(start)))
                .for_each(|(o, (x, y))| *o = op(da[x], db[y]));
            Ok(())
        })?;
    }
    Ok(out)
}

fn run_single<T, K, F>(
    ctx: &ExecutionContext,
    t: &Tensor<T>,
    kernel: K,
    op: F,
) -> Result<Vec<T>, TensorError>
where
    T: Element,
    K: Fn(&[T], &mut [T]) -> Result<(), KernelError> + Send + Sync,
    F: Fn(T) -> T + Send + Sync,
{
    let mut out = vec![T::zero(); t.numel()];
    let data = t.storage.read();
    if t.is_contiguous() {
        let src = t.contiguous_slice(&data);
        ctx.for_each_chunk_mut(&mut out, |start, chunk| {
            kernel(&src[start..start + chunk.len()], chunk)?;
            Ok(())
        })?;
    } else {
        log::trace!("strided elementwise path for shape {:?}", t.shape());
        let data: &[T] = &data;
        ctx.for_each_chunk_mut(&mut out, |start, chunk| {
            chunk
                .iter_mut()
                .zip(t.offsets_from(start))
                .for_each(|(o, x)| *o = op(data[x]));
            Ok(())
        })?;
    }
    Ok(out)
}

/// Runs `out = op(a, b)` under broadcasting.
pub(crate) fn binary<T, F>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
    op: F,
) -> Result<Tensor<T>, TensorError>
where
    T: Element,
    F: Fn(T, T) -> T + Send + Sync,
{
    dispatch(ctx, a, b, out, None, op)
}

/// Runs `out = a <kind> b` under broadcasting, on the vectorized kernels where possible.
pub(crate) fn binary_op<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
    kind: BinaryOp,
) -> Result<Tensor<T>, TensorError> {
    dispatch(ctx, a, b, out, Some(kind), move |x, y| kind.apply(x, y))
}

fn dispatch<T, F>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
    kind: Option<BinaryOp>,
    op: F,
) -> Result<Tensor<T>, TensorError>
where
    T: Element,
    F: Fn(T, T) -> T + Send + Sync,
{
    ctx.validate()?;
    let shape = broadcast_shapes(a.shape(), b.shape())?;
    check_out(out, &shape)?;
    let n = numel(&shape);
    let accel = ctx.acceleration;

    if a.is_scalar_like() && b.is_scalar_like() {
        let value = op(first(a), first(b));
        return finish(Tensor::full(&shape, value)?, out);
    }

    if a.numel() == n && b.numel() == n {
        if a.storage.is_uniform() && b.storage.is_uniform() {
            let value = op(first(a), first(b));
            return finish(Tensor::full(&shape, value)?, out);
        }
        let data = read_pair(a, b, |da, db| run_pair(ctx, a, da, b, db, kind, &op))?;
        return finish(Tensor::from_vec(data, &shape)?, out);
    }

    if a.is_scalar_like() {
        let lhs = first(a);
        let data = run_single(
            ctx,
            b,
            |src, dst| match kind {
                Some(kind) => binary_op_scalar_lhs_kernel(accel, kind, lhs, src, dst),
                None => binary_scalar_lhs_kernel(lhs, src, dst, &op),
            },
            |x| op(lhs, x),
        )?;
        return finish(Tensor::from_vec(data, &shape)?, out);
    }

    if b.is_scalar_like() {
        let rhs = first(b);
        let data = run_single(
            ctx,
            a,
            |src, dst| match kind {
                Some(kind) => binary_op_scalar_rhs_kernel(accel, kind, src, rhs, dst),
                None => binary_scalar_rhs_kernel(src, rhs, dst, &op),
            },
            |x| op(x, rhs),
        )?;
        return finish(Tensor::from_vec(data, &shape)?, out);
    }

    log::trace!(
        "broadcasting {:?} and {:?} to {:?}",
        a.shape(),
        b.shape(),
        shape
    );
    let (ea, eb) = (a.broadcast_to(&shape)?, b.broadcast_to(&shape)?);
    let data = read_pair(&ea, &eb, |da, db| run_pair(ctx, &ea, da, &eb, db, kind, &op))?;
    finish(Tensor::from_vec(data, &shape)?, out)
}

/// Runs `out = op(a)` elementwise.
pub(crate) fn unary<T, F>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    out: Option<&Tensor<T>>,
    op: F,
) -> Result<Tensor<T>, TensorError>
where
    T: Element,
    F: Fn(T) -> T + Send + Sync,
{
    ctx.validate()?;
    check_out(out, a.shape())?;
    if a.is_scalar_like() || a.storage.is_uniform() {
        return finish(Tensor::full(a.shape(), op(first(a)))?, out);
    }
    let data = run_single(ctx, a, |src, dst| unary_kernel(src, dst, &op), &op)?;
    finish(Tensor::from_vec(data, a.shape())?, out)
}
