//! Finite differences for checking analytic gradients.

/// Step used by [`numeric_derivative`] when no better value is known.
pub const EPSILON: f64 = 1e-6;

/// Central finite difference `(f(x + eps) - f(x - eps)) / (2 * eps)`.
///
/// # Example
///
/// ```rust
/// use ferrograd_autograd::{numeric_derivative, EPSILON};
///
/// let d = numeric_derivative(|x| x * x, 3.0, EPSILON);
/// assert!((d - 6.0).abs() < 1e-6);
/// ```
pub fn numeric_derivative<F>(f: F, x: f64, eps: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    (f(x + eps) - f(x - eps)) / (2.0 * eps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_functions() {
        assert!((numeric_derivative(|x| x + 5.0, 4.0, EPSILON) - 1.0).abs() <= 1e-4);
        assert!((numeric_derivative(|x| 4.0 - x, 5.0, EPSILON) + 1.0).abs() <= 1e-4);
        assert!((numeric_derivative(|x| x * 5.0, 4.0, EPSILON) - 5.0).abs() <= 1e-4);
    }
}
