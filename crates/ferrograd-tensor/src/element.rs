use std::fmt;

use ferrograd_kernels::KernelElement;
use num_traits::{Num, NumCast};

/// Runtime tag describing the element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 8-bit unsigned integer.
    U8,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Numeric element stored in a [`crate::Tensor`].
///
/// The transcendental functions are computed in `f64` for integer types and truncated back.
/// Integer arithmetic wraps on overflow through the [`KernelElement`] operations.
pub trait Element:
    Num
    + NumCast
    + KernelElement
    + Copy
    + PartialOrd
    + Send
    + Sync
    + fmt::Debug
    + fmt::Display
    + 'static
{
    /// Runtime tag for this type.
    const DTYPE: DType;

    /// True for floating point types.
    const IS_FLOAT: bool;

    /// True if negative values are representable.
    const IS_SIGNED: bool;

    /// Lossy conversion to `f64`.
    fn to_f64(self) -> f64;

    /// Lossy conversion from `f64`, truncating and saturating like an `as` cast.
    fn from_f64(v: f64) -> Self;

    /// Additive inverse. Wraps for unsigned integers.
    fn negate(self) -> Self;

    /// `self` raised to `exp`.
    fn pow(self, exp: Self) -> Self;

    /// Natural exponential.
    fn exp(self) -> Self;

    /// Natural logarithm.
    fn ln(self) -> Self;

    /// Absolute value.
    fn abs(self) -> Self;

    /// True if the value is a float NaN.
    fn is_nan(self) -> bool {
        false
    }
}

macro_rules! impl_float_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;
            const IS_FLOAT: bool = true;
            const IS_SIGNED: bool = true;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn negate(self) -> Self {
                -self
            }

            #[inline]
            fn pow(self, exp: Self) -> Self {
                self.powf(exp)
            }

            #[inline]
            fn exp(self) -> Self {
                <$t>::exp(self)
            }

            #[inline]
            fn ln(self) -> Self {
                <$t>::ln(self)
            }

            #[inline]
            fn abs(self) -> Self {
                <$t>::abs(self)
            }

            #[inline]
            fn is_nan(self) -> bool {
                <$t>::is_nan(self)
            }
        }
    };
}

macro_rules! impl_int_element {
    ($t:ty, $dtype:expr, $signed:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;
            const IS_FLOAT: bool = false;
            const IS_SIGNED: bool = $signed;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn negate(self) -> Self {
                self.wrapping_neg()
            }

            #[inline]
            fn pow(self, exp: Self) -> Self {
                (self as f64).powf(exp as f64) as $t
            }

            #[inline]
            fn exp(self) -> Self {
                (self as f64).exp() as $t
            }

            #[inline]
            fn ln(self) -> Self {
                (self as f64).ln() as $t
            }

            #[inline]
            #[allow(unused_comparisons)]
            fn abs(self) -> Self {
                if self < 0 as $t {
                    self.wrapping_neg()
                } else {
                    self
                }
            }
        }
    };
}

impl_float_element!(f32, DType::F32);
impl_float_element!(f64, DType::F64);
impl_int_element!(u8, DType::U8, false);
impl_int_element!(i32, DType::I32, true);
impl_int_element!(i64, DType::I64, true);
