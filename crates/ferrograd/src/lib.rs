#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use ferrograd_kernels as kernels;

#[doc(inline)]
pub use ferrograd_tensor as tensor;

#[doc(inline)]
pub use ferrograd_autograd as autograd;
