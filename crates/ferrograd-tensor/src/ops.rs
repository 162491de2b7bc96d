//! Elementwise operations, conversions and in-place updates.
//!
//! Every operation is available as a free function taking an explicit
//! [`ExecutionContext`], and as a method on [`Tensor`] running on
//! [`ExecutionContext::global`].

use ferrograd_kernels::BinaryOp;
use num_traits::NumCast;

use crate::{
    context::ExecutionContext,
    element::Element,
    elementwise::{binary, binary_op, unary},
    error::TensorError,
    reduce::fold_chunks,
    tensor::Tensor,
};

/// Elementwise `a + b` under broadcasting, optionally written into `out`.
///
/// Integer sums wrap around on overflow.
///
/// # Example
///
/// ```rust
/// use ferrograd_tensor::{ops, ExecutionContext, Tensor};
///
/// let ctx = ExecutionContext::serial();
/// let a = Tensor::<f32>::zeros(&[3, 2]).unwrap();
/// let r = ops::add(&ctx, &a, &Tensor::scalar(5.0), None).unwrap();
/// assert_eq!(r.shape(), &[3, 2]);
/// assert_eq!(r.to_vec(), vec![5.0; 6]);
/// ```
pub fn add<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    binary_op(ctx, a, b, out, BinaryOp::Add)
}

/// Elementwise `a - b` under broadcasting. Integer differences wrap around.
pub fn sub<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    binary_op(ctx, a, b, out, BinaryOp::Sub)
}

/// Elementwise `a * b` under broadcasting. Integer products wrap around.
pub fn mul<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    binary_op(ctx, a, b, out, BinaryOp::Mul)
}

/// Elementwise `a / b` under broadcasting.
///
/// Float division by zero follows IEEE 754. Integer quotients truncate toward zero and
/// `MIN / -1` wraps.
///
/// # Errors
///
/// Returns [`TensorError::DivisionByZero`] if the element type is an integer and `b`
/// holds a zero. Neither `out` nor the operands are touched in that case.
pub fn div<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    ctx.validate()?;
    if !T::IS_FLOAT {
        let has_zero = fold_chunks(
            ctx,
            b,
            |_, chunk| chunk.iter().any(|d| d.is_zero()),
            |x, y| x || y,
        )?;
        if has_zero {
            return Err(TensorError::DivisionByZero);
        }
    }
    binary_op(ctx, a, b, out, BinaryOp::Div)
}

/// Elementwise `a` raised to `b` under broadcasting.
pub fn pow<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    binary(ctx, a, b, out, Element::pow)
}

/// Elementwise maximum under broadcasting.
pub fn maximum<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    binary(ctx, a, b, out, |x, y| if y > x { y } else { x })
}

/// Elementwise minimum under broadcasting.
pub fn minimum<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    b: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    binary(ctx, a, b, out, |x, y| if y < x { y } else { x })
}

/// Elementwise `-a`.
pub fn neg<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    unary(ctx, a, out, Element::negate)
}

/// Elementwise logistic function `1 / (1 + e^-x)`.
pub fn sigmoid<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    unary(ctx, a, out, |x| T::from_f64(1.0 / (1.0 + (-x.to_f64()).exp())))
}

/// Elementwise `max(x, 0)`.
pub fn relu<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    unary(ctx, a, out, |x| if x > T::zero() { x } else { T::zero() })
}

/// Elementwise `e^x`.
pub fn exp<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    unary(ctx, a, out, Element::exp)
}

/// Elementwise natural logarithm.
pub fn ln<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    unary(ctx, a, out, Element::ln)
}

/// Elementwise `-ln(x)`.
pub fn ln_neg<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    unary(ctx, a, out, |x| x.ln().negate())
}

/// Elementwise absolute value.
pub fn abs<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    unary(ctx, a, out, Element::abs)
}

/// Clamps every element into `[min, max]`.
pub fn clip<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    min: T,
    max: T,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError> {
    unary(ctx, a, out, move |x| {
        if x < min {
            min
        } else if x > max {
            max
        } else {
            x
        }
    })
}

/// Applies an arbitrary function to every element.
pub fn apply<T, F>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    f: F,
    out: Option<&Tensor<T>>,
) -> Result<Tensor<T>, TensorError>
where
    T: Element,
    F: Fn(T) -> T + Send + Sync,
{
    unary(ctx, a, out, f)
}

/// Softmax over the last axis.
///
/// Rows are shifted by their maximum before exponentiation.
pub fn softmax<T: Element>(ctx: &ExecutionContext, a: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
    ctx.validate()?;
    let row_len = a.shape()[a.rank() - 1];
    let mut data = a.to_vec();
    let n = data.len();
    ctx.for_each_row_mut(&mut data, row_len, n, |_, row| {
        let max = row
            .iter()
            .map(|&x| x.to_f64())
            .fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = row.iter().map(|&x| (x.to_f64() - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        row.iter_mut()
            .zip(exps)
            .for_each(|(v, e)| *v = T::from_f64(e / total));
        Ok(())
    })?;
    Tensor::from_vec(data, a.shape())
}

/// In-place gradient descent update `param -= grad * lr`.
///
/// `grad` may be any shape that broadcasts to the shape of `param`.
pub fn gradient_step<T: Element>(
    ctx: &ExecutionContext,
    param: &Tensor<T>,
    grad: &Tensor<T>,
    lr: T,
) -> Result<(), TensorError> {
    let scaled = mul(ctx, grad, &Tensor::scalar(lr), None)?;
    sub(ctx, param, &scaled, Some(param))?;
    Ok(())
}

/// Converts every element to another element type.
///
/// Values representable in the target type convert exactly; others go through `f64` with
/// `as`-cast truncation and saturation.
pub fn cast<T: Element, U: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
) -> Result<Tensor<U>, TensorError> {
    ctx.validate()?;
    let src = a.contiguous_with(ctx)?;
    let mut out = vec![U::zero(); a.numel()];
    let data = src.storage.read();
    let values = src.contiguous_slice(&data);
    ctx.for_each_chunk_mut(&mut out, |start, chunk| {
        chunk
            .iter_mut()
            .zip(&values[start..])
            .for_each(|(o, &x)| {
                *o = <U as NumCast>::from(x).unwrap_or_else(|| U::from_f64(x.to_f64()))
            });
        Ok(())
    })?;
    drop(data);
    Tensor::from_vec(out, a.shape())
}

/// Returns `a` if it is contiguous, otherwise a contiguous copy.
pub fn as_contiguous<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
) -> Result<Tensor<T>, TensorError> {
    ctx.validate()?;
    a.contiguous_with(ctx)
}

/// Copies `a` into a new, unshared, contiguous buffer.
pub fn copy<T: Element>(ctx: &ExecutionContext, a: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
    ctx.validate()?;
    a.materialize_with(ctx)
}

/// Reshapes `a`, materializing it first if it is not contiguous.
pub fn reshape<T: Element>(
    ctx: &ExecutionContext,
    a: &Tensor<T>,
    shape: &[usize],
) -> Result<Tensor<T>, TensorError> {
    ctx.validate()?;
    a.reshape_with(ctx, shape)
}

macro_rules! binary_methods {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        impl<T: Element> Tensor<T> {
            $(
                $(#[$doc])*
                pub fn $name(
                    &self,
                    other: &Tensor<T>,
                    out: Option<&Tensor<T>>,
                ) -> Result<Tensor<T>, TensorError> {
                    $name(ExecutionContext::global(), self, other, out)
                }
            )*
        }
    };
}

macro_rules! unary_methods {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        impl<T: Element> Tensor<T> {
            $(
                $(#[$doc])*
                pub fn $name(&self, out: Option<&Tensor<T>>) -> Result<Tensor<T>, TensorError> {
                    $name(ExecutionContext::global(), self, out)
                }
            )*
        }
    };
}

binary_methods!(
    /// Elementwise sum under broadcasting. See [`add`].
    add,
    /// Elementwise difference under broadcasting. See [`sub`].
    sub,
    /// Elementwise product under broadcasting. See [`mul`].
    mul,
    /// Elementwise quotient under broadcasting. See [`div`].
    div,
    /// Elementwise power under broadcasting. See [`pow`].
    pow,
    /// Elementwise maximum under broadcasting. See [`maximum`].
    maximum,
    /// Elementwise minimum under broadcasting. See [`minimum`].
    minimum,
);

unary_methods!(
    /// Elementwise negation. See [`neg`].
    neg,
    /// Elementwise logistic function. See [`sigmoid`].
    sigmoid,
    /// Elementwise rectifier. See [`relu`].
    relu,
    /// Elementwise exponential. See [`exp`].
    exp,
    /// Elementwise natural logarithm. See [`ln`].
    ln,
    /// Elementwise negated logarithm. See [`ln_neg`].
    ln_neg,
    /// Elementwise absolute value. See [`abs`].
    abs,
);

impl<T: Element> Tensor<T> {
    /// Clamps every element into `[min, max]`. See [`clip`].
    pub fn clip(&self, min: T, max: T, out: Option<&Tensor<T>>) -> Result<Tensor<T>, TensorError> {
        clip(ExecutionContext::global(), self, min, max, out)
    }

    /// Applies `f` to every element. See [`apply`].
    pub fn apply<F>(&self, f: F, out: Option<&Tensor<T>>) -> Result<Tensor<T>, TensorError>
    where
        F: Fn(T) -> T + Send + Sync,
    {
        apply(ExecutionContext::global(), self, f, out)
    }

    /// Softmax over the last axis. See [`softmax`].
    pub fn softmax(&self) -> Result<Tensor<T>, TensorError> {
        softmax(ExecutionContext::global(), self)
    }

    /// In-place `self -= grad * lr`. See [`gradient_step`].
    pub fn gradient_step(&self, grad: &Tensor<T>, lr: T) -> Result<(), TensorError> {
        gradient_step(ExecutionContext::global(), self, grad, lr)
    }

    /// Converts to another element type. See [`cast`].
    pub fn cast<U: Element>(&self) -> Result<Tensor<U>, TensorError> {
        cast(ExecutionContext::global(), self)
    }
}
