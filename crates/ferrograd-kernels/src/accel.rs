//! Two-tier kernel selection.
//!
//! Every kernel in [`crate::ops`] has a portable loop and an accelerated variant with the
//! same input/output contract. For `f32` and `f64` the accelerated variant runs on
//! [`wide`] lanes (`f32x8`, `f64x4`) and matrix products go through [`matrixmultiply`];
//! integer types keep the portable loops on both tiers. Results only differ from the
//! portable loop by floating point reassociation in the reductions.
//!
//! `wide` picks its instructions from the target features enabled at compile time, so the
//! `Avx2` tier only fills 256-bit registers when built with `-C target-cpu=native` or
//! `-C target-feature=+avx2`. Otherwise each lane group runs as two SSE halves.

use std::fmt;

/// The instruction tier used by the kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acceleration {
    /// Portable scalar loops.
    #[default]
    Scalar,
    /// x86_64 AVX2 code paths.
    Avx2,
    /// aarch64 NEON code paths.
    Neon,
}

impl Acceleration {
    /// Inspects the running CPU and returns the best available tier.
    ///
    /// # Example
    ///
    /// ```
    /// use ferrograd_kernels::Acceleration;
    ///
    /// let accel = Acceleration::detect();
    /// assert!(accel.is_available());
    /// ```
    pub fn detect() -> Self {
        let accel = Self::detect_tier();
        log::debug!("kernel acceleration detected: {accel}");
        accel
    }

    #[cfg(target_arch = "x86_64")]
    fn detect_tier() -> Self {
        if is_x86_feature_detected!("avx2") {
            Self::Avx2
        } else {
            Self::Scalar
        }
    }

    #[cfg(target_arch = "aarch64")]
    fn detect_tier() -> Self {
        // NEON is mandatory on aarch64
        Self::Neon
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    fn detect_tier() -> Self {
        Self::Scalar
    }

    /// Returns true if this tier can run on the current CPU.
    pub fn is_available(self) -> bool {
        match self {
            Self::Scalar => true,
            Self::Avx2 => avx2_detected(),
            Self::Neon => cfg!(target_arch = "aarch64"),
        }
    }

    /// Returns true if kernels should take the vectorized path.
    ///
    /// A hand-built tier that the CPU does not support falls back to the portable loops.
    #[inline]
    pub fn is_vectorized(self) -> bool {
        self != Self::Scalar && self.is_available()
    }

    /// Short lowercase name of the tier.
    pub fn name(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Avx2 => "avx2",
            Self::Neon => "neon",
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn avx2_detected() -> bool {
    is_x86_feature_detected!("avx2")
}

#[cfg(not(target_arch = "x86_64"))]
fn avx2_detected() -> bool {
    false
}

impl fmt::Display for Acceleration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
