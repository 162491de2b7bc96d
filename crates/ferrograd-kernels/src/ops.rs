use crate::{
    accel::Acceleration,
    element::{BinaryOp, KernelElement},
    error::KernelError,
    portable,
};

/// Edge of the square tiles used by [`transpose_2d_kernel`].
const TRANSPOSE_TILE: usize = 32;

fn check_len(a: usize, b: usize) -> Result<(), KernelError> {
    if a != b {
        return Err(KernelError::LengthMismatch(a, b));
    }
    Ok(())
}

fn check_matrix(rows: usize, cols: usize, actual: usize) -> Result<(), KernelError> {
    match rows.checked_mul(cols) {
        Some(n) if n == actual => Ok(()),
        _ => Err(KernelError::MatrixSize { rows, cols, actual }),
    }
}

fn check_divisor<T: KernelElement>(op: BinaryOp, divisor: &[T]) -> Result<(), KernelError> {
    if op == BinaryOp::Div && T::EXACT && divisor.iter().any(|d| d.is_zero()) {
        return Err(KernelError::DivisionByZero);
    }
    Ok(())
}

/// Applies `op` pairwise: `out[i] = op(a[i], b[i])`.
///
/// Arbitrary closures always run the portable loop. Use [`binary_op_kernel`] for the
/// arithmetic operators that have a vectorized path.
///
/// # Errors
///
/// If the three slices do not have the same length, a `LengthMismatch` error is returned.
///
/// Example:
/// ```
/// use ferrograd_kernels::ops::binary_kernel;
///
/// let a = [1.0f32, 2.0, 3.0];
/// let b = [4.0f32, 5.0, 6.0];
/// let mut out = [0.0f32; 3];
/// binary_kernel(&a, &b, &mut out, |x, y| x.max(y - 4.5)).unwrap();
/// assert_eq!(out, [1.0, 2.0, 3.0]);
/// ```
pub fn binary_kernel<T, F>(a: &[T], b: &[T], out: &mut [T], op: F) -> Result<(), KernelError>
where
    T: Copy,
    F: Fn(T, T) -> T,
{
    check_len(a.len(), b.len())?;
    check_len(a.len(), out.len())?;
    out.iter_mut()
        .zip(a.iter().zip(b.iter()))
        .for_each(|(o, (&x, &y))| *o = op(x, y));
    Ok(())
}

/// Applies `op` against a fixed right operand: `out[i] = op(a[i], rhs)`.
///
/// # Errors
///
/// If `a` and `out` do not have the same length, a `LengthMismatch` error is returned.
pub fn binary_scalar_rhs_kernel<T, F>(a: &[T], rhs: T, out: &mut [T], op: F) -> Result<(), KernelError>
where
    T: Copy,
    F: Fn(T, T) -> T,
{
    check_len(a.len(), out.len())?;
    out.iter_mut()
        .zip(a.iter())
        .for_each(|(o, &x)| *o = op(x, rhs));
    Ok(())
}

/// Applies `op` against a fixed left operand: `out[i] = op(lhs, b[i])`.
///
/// # Errors
///
/// If `b` and `out` do not have the same length, a `LengthMismatch` error is returned.
pub fn binary_scalar_lhs_kernel<T, F>(lhs: T, b: &[T], out: &mut [T], op: F) -> Result<(), KernelError>
where
    T: Copy,
    F: Fn(T, T) -> T,
{
    check_len(b.len(), out.len())?;
    out.iter_mut()
        .zip(b.iter())
        .for_each(|(o, &y)| *o = op(lhs, y));
    Ok(())
}

/// Applies `op` to every element: `out[i] = op(a[i])`.
///
/// # Errors
///
/// If `a` and `out` do not have the same length, a `LengthMismatch` error is returned.
pub fn unary_kernel<T, F>(a: &[T], out: &mut [T], op: F) -> Result<(), KernelError>
where
    T: Copy,
    F: Fn(T) -> T,
{
    check_len(a.len(), out.len())?;
    out.iter_mut().zip(a.iter()).for_each(|(o, &x)| *o = op(x));
    Ok(())
}

/// Arithmetic `out[i] = a[i] op b[i]`.
///
/// Integer types wrap on overflow. On the accelerated tier `f32` and `f64` run eight and
/// four lanes at a time; every lane rounds exactly like the portable loop.
///
/// # Errors
///
/// Returns `LengthMismatch` if the slices differ in length, and `DivisionByZero` for an
/// integer division with a zero in `b`. Nothing is written to `out` in either case.
///
/// Example:
/// ```
/// use ferrograd_kernels::{ops::binary_op_kernel, Acceleration, BinaryOp, KernelError};
///
/// let a = [200u8, 100];
/// let mut out = [0u8; 2];
/// binary_op_kernel(Acceleration::detect(), BinaryOp::Add, &a, &[100, 100], &mut out).unwrap();
/// assert_eq!(out, [44, 200]);
///
/// let err = binary_op_kernel(Acceleration::Scalar, BinaryOp::Div, &a, &[1, 0], &mut out);
/// assert_eq!(err, Err(KernelError::DivisionByZero));
/// ```
pub fn binary_op_kernel<T: KernelElement>(
    accel: Acceleration,
    op: BinaryOp,
    a: &[T],
    b: &[T],
    out: &mut [T],
) -> Result<(), KernelError> {
    check_len(a.len(), b.len())?;
    check_len(a.len(), out.len())?;
    check_divisor(op, b)?;
    if accel.is_vectorized() {
        T::vector_binary(op, a, b, out);
    } else {
        portable::binary_op(op, a, b, out);
    }
    Ok(())
}

/// Arithmetic against a fixed right operand: `out[i] = a[i] op rhs`.
///
/// # Errors
///
/// Same as [`binary_op_kernel`].
pub fn binary_op_scalar_rhs_kernel<T: KernelElement>(
    accel: Acceleration,
    op: BinaryOp,
    a: &[T],
    rhs: T,
    out: &mut [T],
) -> Result<(), KernelError> {
    check_len(a.len(), out.len())?;
    check_divisor(op, &[rhs])?;
    if accel.is_vectorized() {
        T::vector_with_scalar(op, a, rhs, false, out);
    } else {
        portable::binary_op_scalar(op, a, rhs, false, out);
    }
    Ok(())
}

/// Arithmetic against a fixed left operand: `out[i] = lhs op b[i]`.
///
/// # Errors
///
/// Same as [`binary_op_kernel`].
pub fn binary_op_scalar_lhs_kernel<T: KernelElement>(
    accel: Acceleration,
    op: BinaryOp,
    lhs: T,
    b: &[T],
    out: &mut [T],
) -> Result<(), KernelError> {
    check_len(b.len(), out.len())?;
    check_divisor(op, b)?;
    if accel.is_vectorized() {
        T::vector_with_scalar(op, b, lhs, true, out);
    } else {
        portable::binary_op_scalar(op, b, lhs, true, out);
    }
    Ok(())
}

/// Accumulates a scaled slice into another one: `y[i] += alpha * x[i]`.
///
/// # Errors
///
/// If `x` and `y` do not have the same length, a `LengthMismatch` error is returned.
pub fn axpy_kernel<T: KernelElement>(
    accel: Acceleration,
    alpha: T,
    x: &[T],
    y: &mut [T],
) -> Result<(), KernelError> {
    check_len(x.len(), y.len())?;
    if accel.is_vectorized() {
        T::vector_axpy(alpha, x, y);
    } else {
        portable::axpy(alpha, x, y);
    }
    Ok(())
}

/// Computes the dot product of two slices.
///
/// The accelerated tier accumulates one fused multiply-add per lane and sums the lanes at
/// the end, so float results may differ from the scalar tier by rounding. Integer types
/// wrap on overflow.
///
/// # Errors
///
/// If the lengths of the slices don't match, a `LengthMismatch` error is returned.
///
/// Example:
/// ```
/// use ferrograd_kernels::{ops::dot_kernel, Acceleration};
///
/// let a = [1, 2, 3];
/// let b = [4, 5, 6];
/// assert_eq!(dot_kernel(Acceleration::Scalar, &a, &b).unwrap(), 32);
/// ```
pub fn dot_kernel<T: KernelElement>(accel: Acceleration, a: &[T], b: &[T]) -> Result<T, KernelError> {
    check_len(a.len(), b.len())?;
    if accel.is_vectorized() {
        return Ok(T::vector_dot(a, b));
    }
    Ok(portable::dot(a, b))
}

/// Sums the elements of a slice. Returns zero for an empty slice.
///
/// Integer sums wrap on overflow.
pub fn sum_kernel<T: KernelElement>(accel: Acceleration, a: &[T]) -> T {
    if accel.is_vectorized() {
        return T::vector_sum(a);
    }
    portable::sum(a)
}

/// Row-major matrix product `c = a @ b` with `a: (m, k)`, `b: (k, n)` and `c: (m, n)`.
///
/// `c` is overwritten. On the accelerated tier `f32` and `f64` go through
/// `matrixmultiply::sgemm` and `dgemm`; everything else runs an `ikj` loop.
///
/// # Errors
///
/// Returns `MatrixSize` if a buffer does not match its dimensions.
///
/// Example:
/// ```
/// use ferrograd_kernels::{ops::gemm_kernel, Acceleration};
///
/// let a = [1.0f32, 2.0, 3.0, 4.0];
/// let b = [1.0f32, 0.0, 0.0, 1.0];
/// let mut c = [0.0f32; 4];
/// gemm_kernel(Acceleration::detect(), 2, 2, 2, &a, &b, &mut c).unwrap();
/// assert_eq!(c, a);
/// ```
pub fn gemm_kernel<T: KernelElement>(
    accel: Acceleration,
    m: usize,
    k: usize,
    n: usize,
    a: &[T],
    b: &[T],
    c: &mut [T],
) -> Result<(), KernelError> {
    check_matrix(m, k, a.len())?;
    check_matrix(k, n, b.len())?;
    check_matrix(m, n, c.len())?;
    if accel.is_vectorized() {
        T::vector_gemm(m, k, n, a, b, c);
    } else {
        portable::gemm(m, k, n, a, b, c);
    }
    Ok(())
}

/// Returns the largest element of a slice, or `None` if it is empty.
///
/// Incomparable values (NaN) never replace the running maximum.
pub fn max_kernel<T: Copy + PartialOrd>(a: &[T]) -> Option<T> {
    let (&first, rest) = a.split_first()?;
    Some(rest.iter().fold(first, |m, &x| if x > m { x } else { m }))
}

/// Returns the smallest element of a slice, or `None` if it is empty.
pub fn min_kernel<T: Copy + PartialOrd>(a: &[T]) -> Option<T> {
    let (&first, rest) = a.split_first()?;
    Some(rest.iter().fold(first, |m, &x| if x < m { x } else { m }))
}

/// Returns the position of the first largest element, or `None` if the slice is empty.
pub fn argmax_kernel<T: Copy + PartialOrd>(a: &[T]) -> Option<usize> {
    let (&first, rest) = a.split_first()?;
    let (idx, _) = rest
        .iter()
        .enumerate()
        .fold((0, first), |(bi, bv), (i, &x)| if x > bv { (i + 1, x) } else { (bi, bv) });
    Some(idx)
}

/// Writes the transpose of a row-major `rows x cols` matrix into `dst`.
///
/// The copy walks square tiles so that both the reads and the writes stay in cache.
///
/// # Errors
///
/// If `src` or `dst` do not hold `rows * cols` elements, a `LengthMismatch` error is returned.
///
/// Example:
/// ```
/// use ferrograd_kernels::ops::transpose_2d_kernel;
///
/// let src = [1, 2, 3, 4, 5, 6];
/// let mut dst = [0; 6];
/// transpose_2d_kernel(&src, 2, 3, &mut dst).unwrap();
/// assert_eq!(dst, [1, 4, 2, 5, 3, 6]);
/// ```
pub fn transpose_2d_kernel<T: Copy>(
    src: &[T],
    rows: usize,
    cols: usize,
    dst: &mut [T],
) -> Result<(), KernelError> {
    check_len(src.len(), rows * cols)?;
    check_len(dst.len(), rows * cols)?;
    for r0 in (0..rows).step_by(TRANSPOSE_TILE) {
        let r1 = (r0 + TRANSPOSE_TILE).min(rows);
        for c0 in (0..cols).step_by(TRANSPOSE_TILE) {
            let c1 = (c0 + TRANSPOSE_TILE).min(cols);
            for r in r0..r1 {
                for c in c0..c1 {
                    dst[c * rows + r] = src[r * cols + c];
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TIERS: [Acceleration; 3] = [
        Acceleration::Scalar,
        Acceleration::Avx2,
        Acceleration::Neon,
    ];

    const OPS: [BinaryOp; 4] = [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div];

    #[test]
    fn test_binary_kernel_length_mismatch() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0];
        let mut out = [0.0; 3];
        let result = binary_kernel(&a, &b, &mut out, |x, y| x + y);
        assert!(matches!(result, Err(KernelError::LengthMismatch(3, 2))));
        let result = binary_op_kernel(Acceleration::detect(), BinaryOp::Add, &a, &b, &mut out);
        assert!(matches!(result, Err(KernelError::LengthMismatch(3, 2))));
    }

    #[test]
    fn test_binary_op_kernel_tiers_agree() -> Result<(), KernelError> {
        let a: Vec<f32> = (0..37).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..37).map(|i| 10.5 - i as f32).collect();
        for op in OPS {
            let mut expected = vec![0.0; 37];
            binary_op_kernel(Acceleration::Scalar, op, &a, &b, &mut expected)?;
            for accel in TIERS {
                let mut out = vec![0.0; 37];
                binary_op_kernel(accel, op, &a, &b, &mut out)?;
                assert_eq!(out, expected, "{op:?} on {accel}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_binary_op_kernel_integers_wrap() -> Result<(), KernelError> {
        let a = [200u8, 100, 0];
        let b = [100u8, 100, 1];
        for accel in TIERS {
            let mut out = [0u8; 3];
            binary_op_kernel(accel, BinaryOp::Add, &a, &b, &mut out)?;
            assert_eq!(out, [44, 200, 1]);
            binary_op_kernel(accel, BinaryOp::Sub, &a, &b, &mut out)?;
            assert_eq!(out, [100, 0, 255]);
            binary_op_kernel(accel, BinaryOp::Mul, &a, &b, &mut out)?;
            assert_eq!(out, [32, 16, 0]);
        }
        Ok(())
    }

    #[test]
    fn test_integer_division_by_zero_is_rejected() {
        for accel in TIERS {
            let mut out = [7i32; 2];
            assert_eq!(
                binary_op_kernel(accel, BinaryOp::Div, &[1, 2], &[1, 0], &mut out),
                Err(KernelError::DivisionByZero)
            );
            assert_eq!(out, [7, 7]);
            assert_eq!(
                binary_op_scalar_rhs_kernel(accel, BinaryOp::Div, &[1, 2], 0, &mut out),
                Err(KernelError::DivisionByZero)
            );
            assert_eq!(
                binary_op_scalar_lhs_kernel(accel, BinaryOp::Div, 6, &[3, 0], &mut out),
                Err(KernelError::DivisionByZero)
            );
        }
        // floats divide to infinity
        let mut out = [0.0f64; 1];
        assert!(binary_op_kernel(Acceleration::Scalar, BinaryOp::Div, &[1.0], &[0.0], &mut out).is_ok());
        assert!(out[0].is_infinite());
    }

    #[test]
    fn test_scalar_kernels_keep_operand_order() -> Result<(), KernelError> {
        let a = [10, 20, 30];
        let mut out = [0; 3];
        binary_scalar_rhs_kernel(&a, 1, &mut out, |x, y| x - y)?;
        assert_eq!(out, [9, 19, 29]);
        binary_scalar_lhs_kernel(1, &a, &mut out, |x, y| x - y)?;
        assert_eq!(out, [-9, -19, -29]);

        let f: Vec<f32> = (0..19).map(|i| i as f32).collect();
        for accel in TIERS {
            let mut out = vec![0.0; 19];
            binary_op_scalar_rhs_kernel(accel, BinaryOp::Sub, &f, 1.0, &mut out)?;
            assert_eq!(out[18], 17.0);
            binary_op_scalar_lhs_kernel(accel, BinaryOp::Div, 36.0, &f[1..], &mut out[1..])?;
            assert_eq!(out[18], 2.0);
        }
        Ok(())
    }

    #[test]
    fn test_unary_kernel() -> Result<(), KernelError> {
        let a = [-1.0f64, 0.0, 2.0];
        let mut out = [0.0; 3];
        unary_kernel(&a, &mut out, |x| x.max(0.0))?;
        assert_eq!(out, [0.0, 0.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_axpy_kernel() -> Result<(), KernelError> {
        let x = [1, 2, 3];
        let mut y = [10, 10, 10];
        axpy_kernel(Acceleration::Scalar, 2, &x, &mut y)?;
        assert_eq!(y, [12, 14, 16]);

        let xf: Vec<f32> = (0..21).map(|i| i as f32 * 0.1).collect();
        let mut expected = vec![1.0f32; 21];
        axpy_kernel(Acceleration::Scalar, 3.0, &xf, &mut expected)?;
        for accel in TIERS {
            let mut yf = vec![1.0f32; 21];
            axpy_kernel(accel, 3.0, &xf, &mut yf)?;
            assert_eq!(yf, expected);
        }
        Ok(())
    }

    #[test]
    fn test_dot_kernel_u8() -> Result<(), KernelError> {
        let a: [u8; 3] = [1, 2, 3];
        let b: [u8; 3] = [4, 5, 6];
        assert_eq!(dot_kernel(Acceleration::Scalar, &a, &b)?, 32);
        // 3 * 100 * 100 wraps modulo 256
        assert_eq!(dot_kernel(Acceleration::detect(), &[100u8; 3], &[100u8; 3])?, 48);
        Ok(())
    }

    #[test]
    fn test_dot_kernel_tiers_agree() -> Result<(), KernelError> {
        let a: Vec<f64> = (0..101).map(|i| (i as f64).sin()).collect();
        let b: Vec<f64> = (0..101).map(|i| (i as f64).cos()).collect();
        let expected = dot_kernel(Acceleration::Scalar, &a, &b)?;
        for accel in TIERS {
            assert_relative_eq!(dot_kernel(accel, &a, &b)?, expected, epsilon = 1e-12);
        }
        let a32: Vec<f32> = a.iter().map(|&x| x as f32).collect();
        let b32: Vec<f32> = b.iter().map(|&x| x as f32).collect();
        assert_relative_eq!(
            dot_kernel(Acceleration::detect(), &a32, &b32)?,
            expected as f32,
            epsilon = 1e-4
        );
        Ok(())
    }

    #[test]
    fn test_sum_kernel() {
        let a: Vec<i64> = (0..100).collect();
        for accel in TIERS {
            assert_eq!(sum_kernel(accel, &a), 4950);
            assert_eq!(sum_kernel(accel, &[200u8, 100]), 44);
        }
        let f: Vec<f32> = (0..50).map(|i| i as f32).collect();
        assert_eq!(sum_kernel(Acceleration::detect(), &f), 1225.0);
        assert_eq!(sum_kernel::<f32>(Acceleration::Scalar, &[]), 0.0);
        assert_eq!(sum_kernel::<f64>(Acceleration::detect(), &[]), 0.0);
    }

    #[test]
    fn test_gemm_kernel_tiers_agree() -> Result<(), KernelError> {
        let (m, k, n) = (9, 13, 6);
        let a: Vec<f32> = (0..m * k).map(|i| (i % 7) as f32 - 3.0).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i % 5) as f32 * 0.5).collect();
        let mut expected = vec![0.0; m * n];
        gemm_kernel(Acceleration::Scalar, m, k, n, &a, &b, &mut expected)?;
        for accel in TIERS {
            // stale values in `c` are overwritten
            let mut c = vec![f32::NAN; m * n];
            gemm_kernel(accel, m, k, n, &a, &b, &mut c)?;
            for (x, y) in c.iter().zip(&expected) {
                assert_relative_eq!(*x, *y, epsilon = 1e-4);
            }
        }

        let ai: Vec<i32> = (0..m * k).map(|i| i as i32).collect();
        let bi: Vec<i32> = (0..k * n).map(|i| i as i32).collect();
        let mut ci = vec![0; m * n];
        gemm_kernel(Acceleration::detect(), m, k, n, &ai, &bi, &mut ci)?;
        let c00: i32 = (0..k as i32).map(|kk| kk * kk * n as i32).sum();
        assert_eq!(ci[0], c00);
        Ok(())
    }

    #[test]
    fn test_gemm_kernel_checks_sizes() {
        let mut c = [0.0f64; 4];
        assert_eq!(
            gemm_kernel(Acceleration::Scalar, 2, 3, 2, &[0.0; 5], &[0.0; 6], &mut c),
            Err(KernelError::MatrixSize {
                rows: 2,
                cols: 3,
                actual: 5
            })
        );
    }

    #[test]
    fn test_extrema_kernels() {
        let a = [3, -1, 7, 7, 2];
        assert_eq!(max_kernel(&a), Some(7));
        assert_eq!(min_kernel(&a), Some(-1));
        assert_eq!(argmax_kernel(&a), Some(2));
        assert_eq!(max_kernel::<i32>(&[]), None);
        assert_eq!(argmax_kernel::<i32>(&[]), None);
    }

    #[test]
    fn test_transpose_2d_kernel_large() -> Result<(), KernelError> {
        let (rows, cols) = (45, 70);
        let src: Vec<usize> = (0..rows * cols).collect();
        let mut dst = vec![0; rows * cols];
        transpose_2d_kernel(&src, rows, cols, &mut dst)?;
        for r in 0..rows {
            for c in 0..cols {
                assert_eq!(dst[c * rows + r], src[r * cols + c]);
            }
        }
        Ok(())
    }
}
