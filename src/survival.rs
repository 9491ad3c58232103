//! Survival models backing the closed-form calculator
//!
//! A survival model answers one question, the probability that a life
//! aged x survives another t years. Everything else the closed-form
//! calculator needs (forces of mortality, curtate rates, bounded terms)
//! derives from that.

use crate::numerics::derivative;

/// Seam between the closed-form calculator and a mortality basis
pub trait SurvivalModel {
    /// Probability a life aged x survives t more years
    fn survival(&self, age: i32, t: f64) -> f64;

    /// Highest age the model supports; terms are clipped here
    fn max_age(&self) -> i32;

    /// Force of mortality at age x + t
    ///
    /// Default is the numerical log-derivative of the survival function;
    /// models with an analytic force override this.
    fn force(&self, age: i32, t: f64) -> f64 {
        let s = self.survival(age, t);
        if s <= 0.0 {
            return f64::INFINITY;
        }
        -derivative(|u| self.survival(age, u), t) / s
    }

    /// One-year mortality rate at integer age x
    fn mortality_rate(&self, age: i32) -> f64 {
        1.0 - self.survival(age, 1.0)
    }
}

/// Exponential lifetime with constant force of mortality
#[derive(Debug, Clone, Copy)]
pub struct ConstantForce {
    mu: f64,
}

impl ConstantForce {
    pub fn new(mu: f64) -> Self {
        Self { mu }
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }
}

impl SurvivalModel for ConstantForce {
    fn survival(&self, _age: i32, t: f64) -> f64 {
        if t <= 0.0 {
            1.0
        } else {
            (-self.mu * t).exp()
        }
    }

    fn max_age(&self) -> i32 {
        // Unbounded lifetime; far enough out that exp(-mu t) is noise
        1000
    }

    fn force(&self, _age: i32, _t: f64) -> f64 {
        self.mu
    }
}

/// Survival model defined by an arbitrary closure S(x, t)
///
/// Useful for exam-style parametric laws (uniform, Makeham, ...) without
/// a dedicated type for each.
pub struct SurvivalFn {
    f: Box<dyn Fn(i32, f64) -> f64 + Send + Sync>,
    max_age: i32,
}

impl SurvivalFn {
    pub fn new<F>(f: F, max_age: i32) -> Self
    where
        F: Fn(i32, f64) -> f64 + Send + Sync + 'static,
    {
        Self { f: Box::new(f), max_age }
    }
}

impl SurvivalModel for SurvivalFn {
    fn survival(&self, age: i32, t: f64) -> f64 {
        if t <= 0.0 {
            1.0
        } else {
            (self.f)(age, t).clamp(0.0, 1.0)
        }
    }

    fn max_age(&self) -> i32 {
        self.max_age
    }
}

impl std::fmt::Debug for SurvivalFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurvivalFn")
            .field("max_age", &self.max_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_force_survival() {
        let model = ConstantForce::new(0.02);
        assert!((model.survival(40, 10.0) - (-0.2_f64).exp()).abs() < 1e-12);
        assert_eq!(model.survival(40, 0.0), 1.0);
        assert!((model.mortality_rate(40) - (1.0 - (-0.02_f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_constant_force_is_age_independent() {
        let model = ConstantForce::new(0.05);
        assert_eq!(model.survival(20, 5.0), model.survival(80, 5.0));
        assert_eq!(model.force(20, 0.0), 0.05);
    }

    #[test]
    fn test_numerical_force_matches_analytic() {
        // Uniform (de Moivre) law to age 100: S(x, t) = 1 - t/(100 - x)
        let model = SurvivalFn::new(|x, t| 1.0 - t / (100 - x) as f64, 100);
        // mu = 1/(100 - x - t); at x = 60, t = 10 -> 1/30
        let mu = model.force(60, 10.0);
        assert!((mu - 1.0 / 30.0).abs() < 1e-6);
    }
}
