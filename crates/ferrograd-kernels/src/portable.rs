//! Scalar loops shared by the portable tier and by the vector tails.

use crate::element::{BinaryOp, KernelElement};

#[inline]
pub(crate) fn binary_op<T: KernelElement>(op: BinaryOp, a: &[T], b: &[T], out: &mut [T]) {
    out.iter_mut()
        .zip(a.iter().zip(b.iter()))
        .for_each(|(o, (&x, &y))| *o = op.apply(x, y));
}

#[inline]
pub(crate) fn binary_op_scalar<T: KernelElement>(
    op: BinaryOp,
    a: &[T],
    s: T,
    scalar_first: bool,
    out: &mut [T],
) {
    if scalar_first {
        out.iter_mut()
            .zip(a.iter())
            .for_each(|(o, &x)| *o = op.apply(s, x));
    } else {
        out.iter_mut()
            .zip(a.iter())
            .for_each(|(o, &x)| *o = op.apply(x, s));
    }
}

#[inline]
pub(crate) fn axpy<T: KernelElement>(alpha: T, x: &[T], y: &mut [T]) {
    y.iter_mut()
        .zip(x.iter())
        .for_each(|(y, &x)| *y = y.wrapping_add(alpha.wrapping_mul(x)));
}

#[inline]
pub(crate) fn dot<T: KernelElement>(a: &[T], b: &[T]) -> T {
    a.iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (&x, &y)| acc.wrapping_add(x.wrapping_mul(y)))
}

#[inline]
pub(crate) fn sum<T: KernelElement>(a: &[T]) -> T {
    a.iter().fold(T::zero(), |acc, &x| acc.wrapping_add(x))
}

/// `ikj` loop order, so the innermost loop is an axpy over a row of `b`.
pub(crate) fn gemm<T: KernelElement>(m: usize, k: usize, n: usize, a: &[T], b: &[T], c: &mut [T]) {
    if n == 0 {
        return;
    }
    for (i, c_row) in c.chunks_mut(n).take(m).enumerate() {
        c_row.iter_mut().for_each(|v| *v = T::zero());
        for kk in 0..k {
            axpy(a[i * k + kk], &b[kk * n..(kk + 1) * n], c_row);
        }
    }
}
