use num_traits::Zero;
use wide::{f32x8, f64x4};

use crate::portable;

/// Arithmetic operations that have a vectorized kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `x + y`
    Add,
    /// `x - y`
    Sub,
    /// `x * y`
    Mul,
    /// `x / y`
    Div,
}

impl BinaryOp {
    /// Applies the operation to one pair of values.
    ///
    /// Integer types wrap on overflow, and an integer division by zero yields zero.
    #[inline(always)]
    pub fn apply<T: KernelElement>(self, x: T, y: T) -> T {
        match self {
            Self::Add => x.wrapping_add(y),
            Self::Sub => x.wrapping_sub(y),
            Self::Mul => x.wrapping_mul(y),
            Self::Div => x.wrapping_div(y),
        }
    }
}

/// Element type the slice kernels operate on.
///
/// The `vector_*` methods are the accelerated tier. Their default bodies are the portable
/// loops, which is what integer types keep; `f32` and `f64` override them with
/// [`wide`] lanes and [`matrixmultiply`] GEMM.
pub trait KernelElement: Copy + PartialOrd + Zero + Send + Sync + 'static {
    /// True if the type is an integer, where division by zero cannot produce a value.
    const EXACT: bool;

    /// Addition that wraps around on integer overflow.
    fn wrapping_add(self, rhs: Self) -> Self;

    /// Subtraction that wraps around on integer overflow.
    fn wrapping_sub(self, rhs: Self) -> Self;

    /// Multiplication that wraps around on integer overflow.
    fn wrapping_mul(self, rhs: Self) -> Self;

    /// Division that wraps around on integer overflow. Integer division by zero is zero.
    fn wrapping_div(self, rhs: Self) -> Self;

    /// `out[i] = op(a[i], b[i])`. All slices have the same length.
    fn vector_binary(op: BinaryOp, a: &[Self], b: &[Self], out: &mut [Self]) {
        portable::binary_op(op, a, b, out)
    }

    /// `out[i] = op(a[i], s)`, or `op(s, a[i])` when `scalar_first` is set.
    fn vector_with_scalar(op: BinaryOp, a: &[Self], s: Self, scalar_first: bool, out: &mut [Self]) {
        portable::binary_op_scalar(op, a, s, scalar_first, out)
    }

    /// `y[i] += alpha * x[i]`.
    fn vector_axpy(alpha: Self, x: &[Self], y: &mut [Self]) {
        portable::axpy(alpha, x, y)
    }

    /// Dot product of two slices of the same length.
    fn vector_dot(a: &[Self], b: &[Self]) -> Self {
        portable::dot(a, b)
    }

    /// Sum of a slice.
    fn vector_sum(a: &[Self]) -> Self {
        portable::sum(a)
    }

    /// Row-major `c = a @ b` with `a: (m, k)`, `b: (k, n)`, `c: (m, n)`.
    fn vector_gemm(m: usize, k: usize, n: usize, a: &[Self], b: &[Self], c: &mut [Self]) {
        portable::gemm(m, k, n, a, b, c)
    }
}

macro_rules! impl_int_kernel_element {
    ($($t:ty),*) => {
        $(
            impl KernelElement for $t {
                const EXACT: bool = true;

                #[inline(always)]
                fn wrapping_add(self, rhs: Self) -> Self {
                    <$t>::wrapping_add(self, rhs)
                }

                #[inline(always)]
                fn wrapping_sub(self, rhs: Self) -> Self {
                    <$t>::wrapping_sub(self, rhs)
                }

                #[inline(always)]
                fn wrapping_mul(self, rhs: Self) -> Self {
                    <$t>::wrapping_mul(self, rhs)
                }

                #[inline(always)]
                fn wrapping_div(self, rhs: Self) -> Self {
                    if rhs == 0 {
                        0
                    } else {
                        <$t>::wrapping_div(self, rhs)
                    }
                }
            }
        )*
    };
}

impl_int_kernel_element!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

macro_rules! impl_float_kernel_element {
    ($t:ty, $v:ty, $lanes:expr, $gemm:path) => {
        impl KernelElement for $t {
            const EXACT: bool = false;

            #[inline(always)]
            fn wrapping_add(self, rhs: Self) -> Self {
                self + rhs
            }

            #[inline(always)]
            fn wrapping_sub(self, rhs: Self) -> Self {
                self - rhs
            }

            #[inline(always)]
            fn wrapping_mul(self, rhs: Self) -> Self {
                self * rhs
            }

            #[inline(always)]
            fn wrapping_div(self, rhs: Self) -> Self {
                self / rhs
            }

            fn vector_binary(op: BinaryOp, a: &[Self], b: &[Self], out: &mut [Self]) {
                let f = lanes_op(op);
                let a_chunks = a.chunks_exact($lanes);
                let b_chunks = b.chunks_exact($lanes);
                let (a_rem, b_rem) = (a_chunks.remainder(), b_chunks.remainder());
                let mut out_chunks = out.chunks_exact_mut($lanes);
                for ((o, x), y) in out_chunks.by_ref().zip(a_chunks).zip(b_chunks) {
                    o.copy_from_slice(&f(load(x), load(y)).to_array());
                }
                portable::binary_op(op, a_rem, b_rem, out_chunks.into_remainder());

                fn load(s: &[$t]) -> $v {
                    let mut lanes = [0.0; $lanes];
                    lanes.copy_from_slice(s);
                    <$v>::new(lanes)
                }

                fn lanes_op(op: BinaryOp) -> fn($v, $v) -> $v {
                    match op {
                        BinaryOp::Add => |x, y| x + y,
                        BinaryOp::Sub => |x, y| x - y,
                        BinaryOp::Mul => |x, y| x * y,
                        BinaryOp::Div => |x, y| x / y,
                    }
                }
            }

            fn vector_with_scalar(
                op: BinaryOp,
                a: &[Self],
                s: Self,
                scalar_first: bool,
                out: &mut [Self],
            ) {
                let sv = <$v>::splat(s);
                let a_chunks = a.chunks_exact($lanes);
                let a_rem = a_chunks.remainder();
                let mut out_chunks = out.chunks_exact_mut($lanes);
                for (o, x) in out_chunks.by_ref().zip(a_chunks) {
                    let mut lanes = [0.0; $lanes];
                    lanes.copy_from_slice(x);
                    let xv = <$v>::new(lanes);
                    let (l, r) = if scalar_first { (sv, xv) } else { (xv, sv) };
                    let res = match op {
                        BinaryOp::Add => l + r,
                        BinaryOp::Sub => l - r,
                        BinaryOp::Mul => l * r,
                        BinaryOp::Div => l / r,
                    };
                    o.copy_from_slice(&res.to_array());
                }
                portable::binary_op_scalar(op, a_rem, s, scalar_first, out_chunks.into_remainder());
            }

            fn vector_axpy(alpha: Self, x: &[Self], y: &mut [Self]) {
                let av = <$v>::splat(alpha);
                let x_chunks = x.chunks_exact($lanes);
                let x_rem = x_chunks.remainder();
                let mut y_chunks = y.chunks_exact_mut($lanes);
                for (yc, xc) in y_chunks.by_ref().zip(x_chunks) {
                    let mut xs = [0.0; $lanes];
                    let mut ys = [0.0; $lanes];
                    xs.copy_from_slice(xc);
                    ys.copy_from_slice(yc);
                    // unfused, so every lane rounds like the portable loop
                    let res = <$v>::new(ys) + av * <$v>::new(xs);
                    yc.copy_from_slice(&res.to_array());
                }
                portable::axpy(alpha, x_rem, y_chunks.into_remainder());
            }

            fn vector_dot(a: &[Self], b: &[Self]) -> Self {
                let mut acc = <$v>::splat(0.0);
                let a_chunks = a.chunks_exact($lanes);
                let b_chunks = b.chunks_exact($lanes);
                let (a_rem, b_rem) = (a_chunks.remainder(), b_chunks.remainder());
                for (ac, bc) in a_chunks.zip(b_chunks) {
                    let mut xs = [0.0; $lanes];
                    let mut ys = [0.0; $lanes];
                    xs.copy_from_slice(ac);
                    ys.copy_from_slice(bc);
                    acc = <$v>::new(xs).mul_add(<$v>::new(ys), acc);
                }
                acc.reduce_add() + portable::dot(a_rem, b_rem)
            }

            fn vector_sum(a: &[Self]) -> Self {
                let mut acc = <$v>::splat(0.0);
                let chunks = a.chunks_exact($lanes);
                let rem = chunks.remainder();
                for c in chunks {
                    let mut xs = [0.0; $lanes];
                    xs.copy_from_slice(c);
                    acc = acc + <$v>::new(xs);
                }
                acc.reduce_add() + portable::sum(rem)
            }

            fn vector_gemm(m: usize, k: usize, n: usize, a: &[Self], b: &[Self], c: &mut [Self]) {
                if m * k > a.len() || k * n > b.len() || m * n > c.len() {
                    return portable::gemm(m, k, n, a, b, c);
                }
                // SAFETY: the three buffers hold at least (m, k), (k, n) and (m, n) row-major
                // elements, and `c` does not alias `a` or `b`
                unsafe {
                    $gemm(
                        m,
                        k,
                        n,
                        1.0,
                        a.as_ptr(),
                        k as isize,
                        1,
                        b.as_ptr(),
                        n as isize,
                        1,
                        0.0,
                        c.as_mut_ptr(),
                        n as isize,
                        1,
                    );
                }
            }
        }
    };
}

impl_float_kernel_element!(f32, f32x8, 8, matrixmultiply::sgemm);
impl_float_kernel_element!(f64, f64x4, 4, matrixmultiply::dgemm);
