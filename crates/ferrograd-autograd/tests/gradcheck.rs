//! Analytic gradients against central finite differences.

use ferrograd_autograd::{numeric_derivative, GradError, Var};
use ferrograd_tensor::Tensor;
use proptest::prelude::*;

/// `f(x) = sigmoid(1.5 * x) * x + x^2 / (1 + exp(x)) - ln(x^2 + 1)`
fn forward(x: &Var<f64>) -> Result<Var<f64>, GradError> {
    let c = |v: f64| Var::constant(Tensor::scalar(v));
    let squared = x.mul(x)?;
    let gate = c(1.5).mul(x)?.sigmoid()?.mul(x)?;
    let damped = squared.div(&c(1.0).add(&x.exp()?)?)?;
    let log_term = squared.add(&c(1.0))?.ln()?;
    gate.add(&damped)?.sub(&log_term)
}

fn eval(x: f64) -> f64 {
    let v = Var::constant(Tensor::scalar(x));
    forward(&v)
        .and_then(|z| Ok(z.value().item()?))
        .unwrap_or(f64::NAN)
}

proptest! {
    #[test]
    fn scalar_expression_matches_finite_difference(x in -3.0f64..3.0) {
        let v = Var::variable(Tensor::scalar(x)).unwrap();
        forward(&v).unwrap().backward().unwrap();
        let analytic = v.grad().unwrap().item().unwrap();
        let numeric = numeric_derivative(eval, x, 1e-6);
        prop_assert!((analytic - numeric).abs() < 1e-5, "{analytic} vs {numeric}");
    }

    #[test]
    fn power_matches_finite_difference(base in 0.5f64..3.0, exp in -2.0f64..2.0) {
        let a = Var::variable(Tensor::scalar(base)).unwrap();
        let b = Var::variable(Tensor::scalar(exp)).unwrap();
        a.pow(&b).unwrap().backward().unwrap();

        let da = numeric_derivative(|x| x.powf(exp), base, 1e-6);
        let db = numeric_derivative(|y| base.powf(y), exp, 1e-6);
        prop_assert!((a.grad().unwrap().item().unwrap() - da).abs() < 1e-5);
        prop_assert!((b.grad().unwrap().item().unwrap() - db).abs() < 1e-5);
    }
}
