//! Numerical helpers for the closed-form calculator

/// Composite Simpson integration of f over [a, b]
///
/// Step count is even and scales with the interval so long whole-life
/// integrals keep sub-1e-8 accuracy for smooth integrands.
pub(crate) fn integrate<F: Fn(f64) -> f64>(f: F, a: f64, b: f64) -> f64 {
    if b <= a {
        return 0.0;
    }
    let steps = ((b - a) * 64.0).ceil().max(64.0) as usize;
    let n = if steps % 2 == 0 { steps } else { steps + 1 };
    let h = (b - a) / n as f64;

    let mut sum = f(a) + f(b);
    for k in 1..n {
        let x = a + h * k as f64;
        sum += if k % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    sum * h / 3.0
}

/// Central-difference first derivative
pub(crate) fn derivative<F: Fn(f64) -> f64>(f: F, x: f64) -> f64 {
    let h = 1e-5;
    (f(x + h) - f(x - h)) / (2.0 * h)
}
